//! Opcode definitions.
//!
//! Bytecode is a flat `Vec<u8>`: one opcode byte followed by its operands in
//! little-endian order. [`Opcode::operand_layout`] fixes the operand shape of every
//! opcode so that decoding, disassembly and the builder agree.
//!
//! Jump targets are absolute byte offsets encoded as `u16`.

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

/// Operand shape following an opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLayout {
    None,
    U8,
    U16,
    /// Two operands: a `u16` followed by a `u8` (`MakeFunction`).
    U16U8,
    /// Two `u8` operands (`BuildClass`).
    U8U8,
}

impl OperandLayout {
    /// Encoded operand size in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Self::None => 0,
            Self::U8 => 1,
            Self::U16 | Self::U8U8 => 2,
            Self::U16U8 => 3,
        }
    }
}

/// VM instructions.
///
/// Stack effects are written as `[before] -> [after]` with the top of stack last.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, IntoStaticStr, Serialize, Deserialize)]
pub enum Opcode {
    Nop = 0,
    /// `[a] -> []`
    Pop,
    /// `[a] -> [a, a]`
    Dup,
    /// `[a, b] -> [b, a]`
    RotTwo,
    /// `[a, b, c] -> [c, a, b]`
    RotThree,

    /// Push constant `u16`.
    LoadConst,
    LoadNone,
    LoadTrue,
    LoadFalse,

    LoadLocal,
    StoreLocal,
    DeleteLocal,
    /// Load through cell slot `u16` (cellvars first, then freevars).
    LoadDeref,
    StoreDeref,
    /// Push the cell object itself, for building closures.
    LoadClosure,
    /// Module globals, then builtins.
    LoadGlobal,
    StoreGlobal,
    DeleteGlobal,
    /// Class-body namespace (or globals at module level), then globals, then builtins.
    LoadName,
    StoreName,
    DeleteName,

    /// `[obj] -> [obj.name]`
    LoadAttr,
    /// `[value, obj] -> []`
    StoreAttr,
    /// `[obj] -> []`
    DeleteAttr,

    /// `[container, key] -> [container[key]]`
    BinarySubscr,
    /// `[value, container, key] -> []`
    StoreSubscr,
    /// `[container, key] -> []`
    DeleteSubscr,

    /// `[a, b] -> [a op b]`, operator from [`BinaryOp`].
    BinaryOp,
    /// `[a, b] -> [a op= b]`, operator from [`BinaryOp`].
    InplaceOp,
    UnaryNeg,
    UnaryPos,
    UnaryNot,
    UnaryInvert,
    /// `[a, b] -> [a op b]`, operator from [`CompareOp`].
    CompareOp,

    /// Pop `u16` items into a new list.
    BuildList,
    BuildTuple,
    BuildSet,
    /// Pop `u16` key/value pairs (key below value) into a new dict.
    BuildDict,
    /// `[list, ..(u16 items).., value] -> [list, ..]`: appends to the list `u16` slots below.
    ListAppend,
    /// `[seq] -> [item_n-1, .., item_0]`: leaves item 0 on top.
    UnpackSequence,

    Jump,
    PopJumpIfFalse,
    PopJumpIfTrue,
    /// Jump keeping the value if falsy, otherwise pop it.
    JumpIfFalseOrPop,
    JumpIfTrueOrPop,

    /// `[iterable] -> [iterator]`
    GetIter,
    /// `[iterator] -> [iterator, item]`, or pop the iterator and jump to `u16` when exhausted.
    ForIter,

    /// Build a function from code constant `u16`; `u8` flags select the extra stack
    /// operands, see [`MakeFunctionFlags`].
    MakeFunction,
    /// `[callable, args..] -> [result]` with `u8` positional arguments.
    CallFunction,
    /// `[callable, args.., kwnames] -> [result]`; `u8` counts all arguments, the trailing
    /// ones are keywords named by the `kwnames` tuple.
    CallFunctionKw,
    /// `[callable, args_tuple, kwargs_dict] -> [result]`
    CallFunctionEx,
    ReturnValue,

    /// `[body, name, bases.., metaclass?, kwargs?] -> [class]` with `u8` bases and
    /// [`BuildClassFlags`].
    BuildClass,

    /// Push the module named by name `u16`.
    ImportName,
    /// `[module] -> [module, module.name]`
    ImportFrom,

    /// `u8` operand count: 0 re-raises the handled exception, 1 raises TOS,
    /// 2 raises `[exc, cause]`.
    Raise,
    /// `[exc] -> ...`: re-raises an exception that reached a handler, keeping its traceback.
    Reraise,
    /// `[exc, class] -> [exc, matches]`
    CheckExcMatch,
    /// Leaves the innermost `except` block.
    PopExcept,

    /// `[manager] -> [exit, enter_result]`
    EnterWith,
    /// `[exit] -> []`: calls `exit(None, None, None)`.
    ExitWith,
    /// `[exit, exc] -> []`: calls `exit(type, exc, None)`; re-raises unless suppressed.
    ExitWithExc,

    /// `[value] -> [sent]` across a suspension.
    YieldValue,
    /// `[iterable] -> [iterator]`; coroutines pass through unchanged.
    GetYieldFromIter,
    /// `[iterator, sent] -> [result]`, suspending while the iterator yields.
    YieldFrom,
    /// `[awaitable] -> [iterator]`
    GetAwaitable,
}

impl Opcode {
    /// Operand shape following this opcode.
    #[must_use]
    pub fn operand_layout(self) -> OperandLayout {
        match self {
            Self::BinaryOp
            | Self::InplaceOp
            | Self::CompareOp
            | Self::CallFunction
            | Self::CallFunctionKw
            | Self::Raise => OperandLayout::U8,
            Self::LoadConst
            | Self::LoadLocal
            | Self::StoreLocal
            | Self::DeleteLocal
            | Self::LoadDeref
            | Self::StoreDeref
            | Self::LoadClosure
            | Self::LoadGlobal
            | Self::StoreGlobal
            | Self::DeleteGlobal
            | Self::LoadName
            | Self::StoreName
            | Self::DeleteName
            | Self::LoadAttr
            | Self::StoreAttr
            | Self::DeleteAttr
            | Self::BuildList
            | Self::BuildTuple
            | Self::BuildSet
            | Self::BuildDict
            | Self::ListAppend
            | Self::UnpackSequence
            | Self::Jump
            | Self::PopJumpIfFalse
            | Self::PopJumpIfTrue
            | Self::JumpIfFalseOrPop
            | Self::JumpIfTrueOrPop
            | Self::ForIter
            | Self::ImportName
            | Self::ImportFrom => OperandLayout::U16,
            Self::MakeFunction => OperandLayout::U16U8,
            Self::BuildClass => OperandLayout::U8U8,
            _ => OperandLayout::None,
        }
    }

    /// Whether the `u16` operand is an absolute jump target.
    #[must_use]
    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jump
                | Self::PopJumpIfFalse
                | Self::PopJumpIfTrue
                | Self::JumpIfFalseOrPop
                | Self::JumpIfTrueOrPop
                | Self::ForIter
        )
    }
}

/// Binary and in-place operators, the `u8` operand of `BinaryOp`/`InplaceOp`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Serialize, Deserialize)]
pub enum BinaryOp {
    Add = 0,
    Sub,
    Mul,
    TrueDiv,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    And,
    Or,
    Xor,
    MatMul,
}

impl BinaryOp {
    /// `(forward, reflected, in-place)` dunder names.
    #[must_use]
    pub fn dunders(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Add => ("__add__", "__radd__", "__iadd__"),
            Self::Sub => ("__sub__", "__rsub__", "__isub__"),
            Self::Mul => ("__mul__", "__rmul__", "__imul__"),
            Self::TrueDiv => ("__truediv__", "__rtruediv__", "__itruediv__"),
            Self::FloorDiv => ("__floordiv__", "__rfloordiv__", "__ifloordiv__"),
            Self::Mod => ("__mod__", "__rmod__", "__imod__"),
            Self::Pow => ("__pow__", "__rpow__", "__ipow__"),
            Self::LShift => ("__lshift__", "__rlshift__", "__ilshift__"),
            Self::RShift => ("__rshift__", "__rrshift__", "__irshift__"),
            Self::And => ("__and__", "__rand__", "__iand__"),
            Self::Or => ("__or__", "__ror__", "__ior__"),
            Self::Xor => ("__xor__", "__rxor__", "__ixor__"),
            Self::MatMul => ("__matmul__", "__rmatmul__", "__imatmul__"),
        }
    }

    /// Operator symbol used in error messages.
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::TrueDiv => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "** or pow()",
            Self::LShift => "<<",
            Self::RShift => ">>",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::MatMul => "@",
        }
    }
}

/// Comparison operators, the `u8` operand of `CompareOp`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Serialize, Deserialize)]
pub enum CompareOp {
    Lt = 0,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOp {
    /// `(dunder, reflected dunder)` for rich comparisons.
    #[must_use]
    pub fn dunders(self) -> Option<(&'static str, &'static str)> {
        match self {
            Self::Lt => Some(("__lt__", "__gt__")),
            Self::Le => Some(("__le__", "__ge__")),
            Self::Eq => Some(("__eq__", "__eq__")),
            Self::Ne => Some(("__ne__", "__ne__")),
            Self::Gt => Some(("__gt__", "__lt__")),
            Self::Ge => Some(("__ge__", "__le__")),
            _ => None,
        }
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
        }
    }
}

/// Flag bits for the `MakeFunction` `u8` operand. Extra operands are pushed in this
/// order below the code constant: defaults tuple, keyword-defaults dict, closure tuple.
pub struct MakeFunctionFlags;

impl MakeFunctionFlags {
    pub const DEFAULTS: u8 = 1;
    pub const KW_DEFAULTS: u8 = 1 << 1;
    pub const CLOSURE: u8 = 1 << 2;
}

/// Flag bits for the second `BuildClass` operand.
pub struct BuildClassFlags;

impl BuildClassFlags {
    /// An explicit metaclass is on the stack after the bases.
    pub const METACLASS: u8 = 1;
    /// A dict of class keyword arguments is on the stack last.
    pub const KWARGS: u8 = 1 << 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_round_trip_through_repr() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_repr(byte) {
                assert_eq!(op as u8, byte);
            }
        }
        assert_eq!(Opcode::from_repr(Opcode::GetAwaitable as u8), Some(Opcode::GetAwaitable));
    }

    #[test]
    fn jumps_carry_u16_targets() {
        assert!(Opcode::ForIter.is_jump());
        assert_eq!(Opcode::ForIter.operand_layout(), OperandLayout::U16);
        assert_eq!(Opcode::MakeFunction.operand_layout().size(), 3);
    }
}

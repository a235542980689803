//! Programmatic assembly of code objects.
//!
//! [`CodeBuilder`] is what an embedding compiler (and the test-suite) uses to produce
//! [`Code`]: it interns constants and names, allocates local and cell slots, records
//! source lines as instructions are emitted, and resolves forward jumps through
//! [`Label`]s when the code object is finished.

use std::rc::Rc;

use super::{
    code::{CellVar, Code, CodeKind, Constant, ExceptionEntry, LocationEntry, Signature},
    op::{BinaryOp, CompareOp, Opcode, OperandLayout},
};

/// A jump target that may be bound after it is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug)]
struct PendingHandler {
    start: Label,
    end: Label,
    handler: Label,
    stack_depth: u16,
}

/// Builder for [`Code`] objects.
///
/// Parameters must be declared (with [`with_params`](Self::with_params) or
/// [`with_signature`](Self::with_signature)) before any other local is allocated, and
/// cell variables before free variables, since both determine slot numbering.
#[derive(Debug)]
pub struct CodeBuilder {
    name: String,
    filename: String,
    kind: CodeKind,
    signature: Signature,
    bytecode: Vec<u8>,
    constants: Vec<Constant>,
    names: Vec<String>,
    local_names: Vec<String>,
    cell_vars: Vec<CellVar>,
    free_vars: Vec<String>,
    locations: Vec<LocationEntry>,
    handlers: Vec<PendingHandler>,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, Label)>,
    line: u32,
}

impl CodeBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: "<module>".to_owned(),
            kind: CodeKind::Function,
            signature: Signature::default(),
            bytecode: Vec::new(),
            constants: Vec::new(),
            names: Vec::new(),
            local_names: Vec::new(),
            cell_vars: Vec::new(),
            free_vars: Vec::new(),
            locations: Vec::new(),
            handlers: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
            line: 1,
        }
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: CodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declares plain positional parameters.
    #[must_use]
    pub fn with_params(self, positional: &[&str]) -> Self {
        self.with_signature(positional, None, &[], None)
    }

    /// Declares the full parameter list.
    #[must_use]
    pub fn with_signature(
        mut self,
        positional: &[&str],
        varargs: Option<&str>,
        kwonly: &[&str],
        varkw: Option<&str>,
    ) -> Self {
        assert!(self.local_names.is_empty(), "parameters must be declared before other locals");
        self.local_names.extend(positional.iter().map(|p| (*p).to_owned()));
        self.local_names.extend(varargs.map(str::to_owned));
        self.local_names.extend(kwonly.iter().map(|p| (*p).to_owned()));
        self.local_names.extend(varkw.map(str::to_owned));
        self.signature = Signature {
            positional: positional.len() as u16,
            kwonly: kwonly.len() as u16,
            varargs: varargs.is_some(),
            varkw: varkw.is_some(),
        };
        self
    }

    /// Current bytecode offset.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.bytecode.len() as u32
    }

    /// Sets the source line recorded for subsequently emitted instructions.
    pub fn set_line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    pub fn constant(&mut self, constant: Constant) -> u16 {
        if !matches!(constant, Constant::Code(_))
            && let Some(idx) = self.constants.iter().position(|c| *c == constant)
        {
            return idx as u16;
        }
        self.constants.push(constant);
        (self.constants.len() - 1) as u16
    }

    /// Interns a name for attribute, global and name opcodes.
    pub fn name(&mut self, name: &str) -> u16 {
        intern(&mut self.names, name)
    }

    /// Slot of a local variable, allocating it on first use.
    pub fn local(&mut self, name: &str) -> u16 {
        intern(&mut self.local_names, name)
    }

    /// Declares a cell variable; when `name` is a parameter its value seeds the cell.
    pub fn cell_var(&mut self, name: &str) -> u16 {
        assert!(self.free_vars.is_empty(), "cell variables must be declared before free variables");
        if let Some(idx) = self.cell_vars.iter().position(|c| c.name == name) {
            return idx as u16;
        }
        let param_slot = self.local_names[..self.signature.param_slots()]
            .iter()
            .position(|p| p == name)
            .map(|slot| slot as u16);
        self.cell_vars.push(CellVar {
            name: name.to_owned(),
            param_slot,
        });
        (self.cell_vars.len() - 1) as u16
    }

    /// Declares a free variable and returns its cell slot.
    pub fn free_var(&mut self, name: &str) -> u16 {
        let idx = intern(&mut self.free_vars, name);
        self.cell_vars.len() as u16 + idx
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the current offset.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.offset());
        self
    }

    /// Registers a handler for instructions emitted between `start` and `end`.
    ///
    /// Registration order does not matter: the finished table is ordered innermost
    /// (narrowest range) first.
    pub fn add_handler(&mut self, start: Label, end: Label, handler: Label, stack_depth: u16) -> &mut Self {
        self.handlers.push(PendingHandler {
            start,
            end,
            handler,
            stack_depth,
        });
        self
    }

    fn record_location(&mut self) {
        let offset = self.offset();
        if self.locations.last().is_none_or(|last| last.line != self.line) {
            self.locations.push(LocationEntry {
                offset,
                line: self.line,
                column: 0,
            });
        }
    }

    /// Emits an opcode without operands.
    pub fn emit(&mut self, op: Opcode) -> &mut Self {
        debug_assert_eq!(op.operand_layout(), OperandLayout::None, "{op} takes operands");
        self.record_location();
        self.bytecode.push(op as u8);
        self
    }

    pub fn emit_u8(&mut self, op: Opcode, operand: u8) -> &mut Self {
        debug_assert_eq!(op.operand_layout(), OperandLayout::U8, "{op} operand");
        self.record_location();
        self.bytecode.push(op as u8);
        self.bytecode.push(operand);
        self
    }

    pub fn emit_u16(&mut self, op: Opcode, operand: u16) -> &mut Self {
        debug_assert_eq!(op.operand_layout(), OperandLayout::U16, "{op} operand");
        self.record_location();
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
        self
    }

    /// Emits a jump whose target is patched when the code object is built.
    pub fn emit_jump(&mut self, op: Opcode, target: Label) -> &mut Self {
        debug_assert!(op.is_jump(), "{op} is not a jump");
        self.record_location();
        self.bytecode.push(op as u8);
        self.fixups.push((self.bytecode.len(), target));
        self.bytecode.extend_from_slice(&[0, 0]);
        self
    }

    // convenience emitters

    pub fn load_const(&mut self, constant: Constant) -> &mut Self {
        let idx = self.constant(constant);
        self.emit_u16(Opcode::LoadConst, idx)
    }

    pub fn load_int(&mut self, value: i64) -> &mut Self {
        self.load_const(Constant::Int(value))
    }

    pub fn load_str(&mut self, value: &str) -> &mut Self {
        self.load_const(Constant::Str(value.to_owned()))
    }

    pub fn load_none(&mut self) -> &mut Self {
        self.emit(Opcode::LoadNone)
    }

    pub fn load_local(&mut self, name: &str) -> &mut Self {
        let slot = self.local(name);
        self.emit_u16(Opcode::LoadLocal, slot)
    }

    pub fn store_local(&mut self, name: &str) -> &mut Self {
        let slot = self.local(name);
        self.emit_u16(Opcode::StoreLocal, slot)
    }

    pub fn load_global(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_u16(Opcode::LoadGlobal, idx)
    }

    pub fn store_global(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_u16(Opcode::StoreGlobal, idx)
    }

    pub fn load_name(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_u16(Opcode::LoadName, idx)
    }

    pub fn store_name(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_u16(Opcode::StoreName, idx)
    }

    pub fn load_attr(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_u16(Opcode::LoadAttr, idx)
    }

    pub fn store_attr(&mut self, name: &str) -> &mut Self {
        let idx = self.name(name);
        self.emit_u16(Opcode::StoreAttr, idx)
    }

    pub fn binary(&mut self, op: BinaryOp) -> &mut Self {
        self.emit_u8(Opcode::BinaryOp, op as u8)
    }

    pub fn inplace(&mut self, op: BinaryOp) -> &mut Self {
        self.emit_u8(Opcode::InplaceOp, op as u8)
    }

    pub fn compare(&mut self, op: CompareOp) -> &mut Self {
        self.emit_u8(Opcode::CompareOp, op as u8)
    }

    pub fn call(&mut self, argc: u8) -> &mut Self {
        self.emit_u8(Opcode::CallFunction, argc)
    }

    /// Calls with `positional` arguments followed by keyword arguments named `kwnames`.
    pub fn call_kw(&mut self, positional: u8, kwnames: &[&str]) -> &mut Self {
        let names = Constant::Tuple(kwnames.iter().map(|n| Constant::Str((*n).to_owned())).collect());
        self.load_const(names);
        self.emit_u8(Opcode::CallFunctionKw, positional + kwnames.len() as u8)
    }

    /// Emits `MakeFunction` for a nested code object.
    pub fn make_function(&mut self, code: Code, flags: u8) -> &mut Self {
        let idx = self.constant(Constant::Code(Rc::new(code)));
        self.record_location();
        self.bytecode.push(Opcode::MakeFunction as u8);
        self.bytecode.extend_from_slice(&idx.to_le_bytes());
        self.bytecode.push(flags);
        self
    }

    pub fn build_class(&mut self, bases: u8, flags: u8) -> &mut Self {
        self.record_location();
        self.bytecode.push(Opcode::BuildClass as u8);
        self.bytecode.push(bases);
        self.bytecode.push(flags);
        self
    }

    pub fn return_value(&mut self) -> &mut Self {
        self.emit(Opcode::ReturnValue)
    }

    /// Finishes the code object, resolving labels.
    ///
    /// # Panics
    /// When a referenced label was never bound.
    #[must_use]
    pub fn build(mut self) -> Code {
        for (pos, label) in std::mem::take(&mut self.fixups) {
            let target = self.resolve(label) as u16;
            self.bytecode[pos..pos + 2].copy_from_slice(&target.to_le_bytes());
        }
        let mut exception_table: Vec<ExceptionEntry> = self
            .handlers
            .iter()
            .map(|h| ExceptionEntry {
                start: self.resolve(h.start),
                end: self.resolve(h.end),
                handler: self.resolve(h.handler),
                stack_depth: h.stack_depth,
            })
            .collect();
        exception_table.sort_by_key(|entry| entry.end.saturating_sub(entry.start));
        Code {
            name: self.name,
            filename: self.filename,
            kind: self.kind,
            signature: self.signature,
            bytecode: self.bytecode,
            constants: self.constants,
            names: self.names,
            local_names: self.local_names,
            cell_vars: self.cell_vars,
            free_vars: self.free_vars,
            locations: self.locations,
            exception_table,
        }
    }

    fn resolve(&self, label: Label) -> u32 {
        self.labels[label.0].unwrap_or_else(|| panic!("label {} of `{}` was never bound", label.0, self.name))
    }
}

fn intern(table: &mut Vec<String>, name: &str) -> u16 {
    if let Some(idx) = table.iter().position(|n| n == name) {
        return idx as u16;
    }
    table.push(name.to_owned());
    (table.len() - 1) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_jumps_are_patched() {
        let mut b = CodeBuilder::new("f");
        let end = b.new_label();
        b.emit(Opcode::LoadTrue).emit_jump(Opcode::PopJumpIfFalse, end);
        b.load_int(1).emit(Opcode::Pop);
        b.bind(end);
        b.load_none().return_value();
        let code = b.build();
        let target = u16::from_le_bytes([code.bytecode[2], code.bytecode[3]]);
        assert_eq!(target, 8);
        assert_eq!(code.bytecode[usize::from(target)], Opcode::LoadNone as u8);
    }

    #[test]
    fn constants_and_names_are_interned() {
        let mut b = CodeBuilder::new("f");
        assert_eq!(b.constant(Constant::Int(3)), b.constant(Constant::Int(3)));
        assert_eq!(b.name("x"), b.name("x"));
        assert_ne!(b.name("x"), b.name("y"));
    }

    #[test]
    fn parameter_cells_remember_their_slot() {
        let mut b = CodeBuilder::new("outer").with_params(&["a", "b"]);
        b.cell_var("b");
        let free = b.free_var("z");
        let code = b.build();
        assert_eq!(code.cell_vars()[0].param_slot, Some(1));
        assert_eq!(free, 1);
    }

    #[test]
    fn handlers_are_ordered_innermost_first() {
        let mut b = CodeBuilder::new("f");
        let (outer_start, inner_start, inner_end, outer_end) =
            (b.new_label(), b.new_label(), b.new_label(), b.new_label());
        let (outer_handler, inner_handler) = (b.new_label(), b.new_label());
        // the outer range is registered first
        b.add_handler(outer_start, outer_end, outer_handler, 0);
        b.add_handler(inner_start, inner_end, inner_handler, 0);
        b.bind(outer_start).load_none();
        b.bind(inner_start).emit(Opcode::Pop);
        b.bind(inner_end).load_none();
        b.bind(outer_end).return_value();
        b.bind(outer_handler).load_none().return_value();
        b.bind(inner_handler).load_none().return_value();
        let code = b.build();

        let inner = code.handler_for(1).unwrap();
        assert_eq!((inner.start, inner.end), (1, 2));
        assert_eq!(code.exception_table[0], inner);
        let outer = code.handler_for(0).unwrap();
        assert_eq!((outer.start, outer.end), (0, 3));
        assert!(code.handler_for(3).is_none());
    }

    #[test]
    fn location_table_tracks_lines() {
        let mut b = CodeBuilder::new("f");
        b.set_line(3).load_none();
        b.set_line(4).emit(Opcode::Pop);
        b.load_none().return_value();
        let code = b.build();
        assert_eq!(code.line_for(0), 3);
        assert_eq!(code.line_for(1), 4);
        assert_eq!(code.line_for(2), 4);
    }
}

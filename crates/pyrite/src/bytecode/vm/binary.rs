//! Arithmetic, bitwise and sequence operators.
//!
//! Builtin operands are computed natively. When either operand uses dunder dispatch,
//! the forward method is tried first, then the reflected one; a right operand whose
//! class is a proper subclass of the left operand's class gets the first try.

use super::Vm;
use crate::{
    bytecode::op::BinaryOp,
    exception::{ExcType, RunResult},
    heap::HeapData,
    value::{Complex, Value},
};

impl Vm {
    /// `lhs op rhs`.
    pub fn binary_op(&mut self, lhs: Value, rhs: Value, op: BinaryOp) -> RunResult<Value> {
        if self.uses_dunders(lhs) || self.uses_dunders(rhs) {
            return self.dunder_binary(lhs, rhs, op);
        }
        match self.native_binary(lhs, rhs, op)? {
            Some(value) => Ok(value),
            None => Err(self.unsupported(lhs, rhs, op)),
        }
    }

    /// `lhs op= rhs`: `__iop__` first, then the plain operator. Lists extend in place.
    pub fn inplace_op(&mut self, lhs: Value, rhs: Value, op: BinaryOp) -> RunResult<Value> {
        if self.uses_dunders(lhs) {
            let (_, _, inplace) = op.dunders();
            if let Some(result) = self.dispatch_dunder(lhs, inplace, &[rhs])? {
                return Ok(result);
            }
            return self.binary_op(lhs, rhs, op);
        }
        if let Value::Ref(id) = lhs
            && matches!(self.heap.get(id), HeapData::List(_))
        {
            match op {
                BinaryOp::Add => {
                    let items = self.collect_iter(rhs)?;
                    if let HeapData::List(list) = self.heap.get_mut(id) {
                        list.extend(items);
                    }
                    return Ok(lhs);
                }
                BinaryOp::Mul => {
                    let Some(n) = rhs.as_int() else {
                        return Err(self.unsupported_inplace(lhs, rhs, op));
                    };
                    let len = self.len_of(lhs)?;
                    self.tracker.check_sequence_size(len.saturating_mul(n.max(0) as usize))?;
                    if let HeapData::List(list) = self.heap.get_mut(id) {
                        let original = std::mem::take(list);
                        for _ in 0..n.max(0) {
                            list.extend(original.iter().copied());
                        }
                    }
                    return Ok(lhs);
                }
                _ => {}
            }
        }
        if let Value::Ref(id) = lhs
            && matches!(self.heap.get(id), HeapData::Set(_))
            && let Some(other) = self.set_operand(rhs)
        {
            let result = match self.heap.get(id) {
                HeapData::Set(set) => match op {
                    BinaryOp::Or => Some(set.union(&other)),
                    BinaryOp::And => Some(set.intersection(&other)),
                    BinaryOp::Sub => Some(set.difference(&other)),
                    BinaryOp::Xor => Some(set.symmetric_difference(&other)),
                    _ => None,
                },
                _ => None,
            };
            if let Some(result) = result {
                if let HeapData::Set(set) = self.heap.get_mut(id) {
                    *set = result;
                }
                return Ok(lhs);
            }
        }
        match self.native_binary(lhs, rhs, op)? {
            Some(value) => Ok(value),
            None => Err(self.unsupported_inplace(lhs, rhs, op)),
        }
    }

    fn dunder_binary(&mut self, lhs: Value, rhs: Value, op: BinaryOp) -> RunResult<Value> {
        let (forward, reflected, _) = op.dunders();
        let lhs_type = self.type_of(lhs);
        let rhs_type = self.type_of(rhs);
        let rhs_first = lhs_type != rhs_type
            && self.mro_of(rhs_type).contains(&lhs_type)
            && self.lookup_mro(rhs_type, reflected).is_some();

        if rhs_first && let Some(result) = self.dispatch_dunder(rhs, reflected, &[lhs])? {
            return Ok(result);
        }
        if let Some(result) = self.dispatch_dunder(lhs, forward, &[rhs])? {
            return Ok(result);
        }
        if !rhs_first
            && lhs_type != rhs_type
            && let Some(result) = self.dispatch_dunder(rhs, reflected, &[lhs])?
        {
            return Ok(result);
        }
        Err(self.unsupported(lhs, rhs, op))
    }

    fn unsupported(&self, lhs: Value, rhs: Value, op: BinaryOp) -> crate::exception::RunError {
        ExcType::unsupported_operand(op.symbol(), self.type_name(lhs), self.type_name(rhs))
    }

    fn unsupported_inplace(&self, lhs: Value, rhs: Value, op: BinaryOp) -> crate::exception::RunError {
        let symbol = format!("{}=", op.symbol().split(' ').next().unwrap_or_default());
        ExcType::unsupported_operand(&symbol, self.type_name(lhs), self.type_name(rhs))
    }

    /// Builtin semantics; `Ok(None)` when the operand types are not supported.
    fn native_binary(&mut self, lhs: Value, rhs: Value, op: BinaryOp) -> RunResult<Option<Value>> {
        if let (Some(a), Some(b)) = (int_operand(lhs), int_operand(rhs)) {
            return int_binary(a, b, op).map(Some);
        }
        if lhs.is_number() && rhs.is_number() {
            if matches!(lhs, Value::Complex(_)) || matches!(rhs, Value::Complex(_)) {
                return complex_binary(to_complex(lhs), to_complex(rhs), op);
            }
            if let (Some(a), Some(b)) = (lhs.as_float(), rhs.as_float()) {
                return float_binary(a, b, op);
            }
        }
        self.sequence_binary(lhs, rhs, op)
    }

    fn sequence_binary(&mut self, lhs: Value, rhs: Value, op: BinaryOp) -> RunResult<Option<Value>> {
        match op {
            BinaryOp::Add => self.concat(lhs, rhs),
            BinaryOp::Mul => {
                if let Some(n) = rhs.as_int() {
                    self.repeat(lhs, n)
                } else if let Some(n) = lhs.as_int() {
                    self.repeat(rhs, n)
                } else {
                    Ok(None)
                }
            }
            BinaryOp::Or | BinaryOp::And | BinaryOp::Sub | BinaryOp::Xor => self.set_binary(lhs, rhs, op),
            _ => Ok(None),
        }
    }

    fn concat(&mut self, lhs: Value, rhs: Value) -> RunResult<Option<Value>> {
        let (Value::Ref(a), Value::Ref(b)) = (lhs, rhs) else {
            return Ok(None);
        };
        match (self.heap.get(a), self.heap.get(b)) {
            (HeapData::Str(x), HeapData::Str(y)) => {
                let joined = format!("{x}{y}");
                self.tracker.check_sequence_size(joined.len())?;
                self.new_str(joined).map(Some)
            }
            (HeapData::Bytes(x), HeapData::Bytes(y)) => {
                let joined = [x.as_slice(), y.as_slice()].concat();
                self.tracker.check_sequence_size(joined.len())?;
                self.new_bytes(joined).map(Some)
            }
            (HeapData::List(x), HeapData::List(y)) => {
                let joined = [x.as_slice(), y.as_slice()].concat();
                self.tracker.check_sequence_size(joined.len())?;
                self.new_list(joined).map(Some)
            }
            (HeapData::Tuple(x), HeapData::Tuple(y)) => {
                let joined = [x.as_slice(), y.as_slice()].concat();
                self.tracker.check_sequence_size(joined.len())?;
                self.new_tuple(joined).map(Some)
            }
            (HeapData::List(_), _) => Err(ExcType::type_error(format!(
                "can only concatenate list (not \"{}\") to list",
                self.type_name(rhs)
            ))),
            (HeapData::Tuple(_), _) => Err(ExcType::type_error(format!(
                "can only concatenate tuple (not \"{}\") to tuple",
                self.type_name(rhs)
            ))),
            (HeapData::Str(_), _) => Err(ExcType::type_error(format!(
                "can only concatenate str (not \"{}\") to str",
                self.type_name(rhs)
            ))),
            _ => Ok(None),
        }
    }

    fn repeat(&mut self, seq: Value, n: i64) -> RunResult<Option<Value>> {
        let Value::Ref(id) = seq else { return Ok(None) };
        let n = usize::try_from(n).unwrap_or(0);
        match self.heap.get(id) {
            HeapData::Str(s) => {
                self.tracker.check_sequence_size(s.len().saturating_mul(n))?;
                let repeated = s.repeat(n);
                self.new_str(repeated).map(Some)
            }
            HeapData::Bytes(b) => {
                self.tracker.check_sequence_size(b.len().saturating_mul(n))?;
                let repeated = b.repeat(n);
                self.new_bytes(repeated).map(Some)
            }
            HeapData::List(items) => {
                self.tracker.check_sequence_size(items.len().saturating_mul(n))?;
                let repeated = items.repeat(n);
                self.new_list(repeated).map(Some)
            }
            HeapData::Tuple(items) => {
                self.tracker.check_sequence_size(items.len().saturating_mul(n))?;
                let repeated = items.repeat(n);
                self.new_tuple(repeated).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Members of a set or frozenset operand.
    fn set_operand(&self, value: Value) -> Option<crate::types::set::Set> {
        match value {
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::Set(set) | HeapData::FrozenSet(set) => Some(set.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    fn set_binary(&mut self, lhs: Value, rhs: Value, op: BinaryOp) -> RunResult<Option<Value>> {
        let (Some(a), Some(b)) = (self.set_operand(lhs), self.set_operand(rhs)) else {
            return Ok(None);
        };
        let result = match op {
            BinaryOp::Or => a.union(&b),
            BinaryOp::And => a.intersection(&b),
            BinaryOp::Sub => a.difference(&b),
            BinaryOp::Xor => a.symmetric_difference(&b),
            _ => return Ok(None),
        };
        // the result takes the left operand's type
        let frozen = matches!(lhs, Value::Ref(id) if matches!(self.heap.get(id), HeapData::FrozenSet(_)));
        let data = if frozen { HeapData::FrozenSet(result) } else { HeapData::Set(result) };
        Ok(Some(Value::Ref(self.alloc(data)?)))
    }

    /// `-value`.
    pub fn unary_neg(&mut self, value: Value) -> RunResult<Value> {
        match value {
            Value::Bool(b) => Ok(Value::Int(-i64::from(b))),
            Value::Int(i) => i
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| ExcType::overflow_error("integer negation overflow")),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Complex(c) => Ok(Value::Complex(Complex::new(-c.re, -c.im))),
            _ => self.unary_dunder(value, "__neg__", "-"),
        }
    }

    /// `+value`.
    pub fn unary_pos(&mut self, value: Value) -> RunResult<Value> {
        match value {
            Value::Bool(b) => Ok(Value::Int(i64::from(b))),
            Value::Int(_) | Value::Float(_) | Value::Complex(_) => Ok(value),
            _ => self.unary_dunder(value, "__pos__", "+"),
        }
    }

    /// `~value`.
    pub fn unary_invert(&mut self, value: Value) -> RunResult<Value> {
        match value.as_int() {
            Some(i) => Ok(Value::Int(!i)),
            None => self.unary_dunder(value, "__invert__", "~"),
        }
    }

    fn unary_dunder(&mut self, value: Value, dunder: &str, symbol: &str) -> RunResult<Value> {
        if self.uses_dunders(value)
            && let Some(result) = self.dispatch_dunder(value, dunder, &[])?
        {
            return Ok(result);
        }
        Err(ExcType::type_error(format!(
            "bad operand type for unary {symbol}: '{}'",
            self.type_name(value)
        )))
    }
}

fn int_operand(value: Value) -> Option<i64> {
    match value {
        Value::Int(_) | Value::Bool(_) => value.as_int(),
        _ => None,
    }
}

fn to_complex(value: Value) -> Complex {
    match value {
        Value::Complex(c) => c,
        other => Complex::new(other.as_float().unwrap_or_default(), 0.0),
    }
}

fn overflow() -> crate::exception::RunError {
    ExcType::overflow_error("integer overflow")
}

/// Floor division and modulo with Python's sign rules.
fn int_floor_div_mod(a: i64, b: i64) -> RunResult<(i64, i64)> {
    if b == 0 {
        return Err(ExcType::zero_division("integer division or modulo by zero"));
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    let r = a.checked_rem(b).ok_or_else(overflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok((q - 1, r + b))
    } else {
        Ok((q, r))
    }
}

fn int_binary(a: i64, b: i64, op: BinaryOp) -> RunResult<Value> {
    let value = match op {
        BinaryOp::Add => Value::Int(a.checked_add(b).ok_or_else(overflow)?),
        BinaryOp::Sub => Value::Int(a.checked_sub(b).ok_or_else(overflow)?),
        BinaryOp::Mul => Value::Int(a.checked_mul(b).ok_or_else(overflow)?),
        BinaryOp::TrueDiv => {
            if b == 0 {
                return Err(ExcType::zero_division("division by zero"));
            }
            Value::Float(a as f64 / b as f64)
        }
        BinaryOp::FloorDiv => Value::Int(int_floor_div_mod(a, b)?.0),
        BinaryOp::Mod => Value::Int(int_floor_div_mod(a, b)?.1),
        BinaryOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(ExcType::zero_division("0.0 cannot be raised to a negative power"));
                }
                Value::Float((a as f64).powf(b as f64))
            } else {
                let exp = u32::try_from(b).map_err(|_| overflow())?;
                Value::Int(a.checked_pow(exp).ok_or_else(overflow)?)
            }
        }
        BinaryOp::LShift => {
            if b < 0 {
                return Err(ExcType::value_error("negative shift count"));
            }
            let shift = u32::try_from(b).ok().filter(|s| *s < 64).ok_or_else(overflow)?;
            let shifted = a.checked_shl(shift).ok_or_else(overflow)?;
            if shifted >> shift != a {
                return Err(overflow());
            }
            Value::Int(shifted)
        }
        BinaryOp::RShift => {
            if b < 0 {
                return Err(ExcType::value_error("negative shift count"));
            }
            Value::Int(a >> b.min(63))
        }
        BinaryOp::And => Value::Int(a & b),
        BinaryOp::Or => Value::Int(a | b),
        BinaryOp::Xor => Value::Int(a ^ b),
        BinaryOp::MatMul => {
            return Err(ExcType::unsupported_operand(op.symbol(), "int", "int"));
        }
    };
    Ok(value)
}

fn float_binary(a: f64, b: f64, op: BinaryOp) -> RunResult<Option<Value>> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::TrueDiv => {
            if b == 0.0 {
                return Err(ExcType::zero_division("float division by zero"));
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(ExcType::zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(ExcType::zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ExcType::zero_division("0.0 cannot be raised to a negative power"));
            }
            a.powf(b)
        }
        _ => return Ok(None),
    };
    Ok(Some(Value::Float(value)))
}

fn complex_binary(a: Complex, b: Complex, op: BinaryOp) -> RunResult<Option<Value>> {
    let value = match op {
        BinaryOp::Add => Complex::new(a.re + b.re, a.im + b.im),
        BinaryOp::Sub => Complex::new(a.re - b.re, a.im - b.im),
        BinaryOp::Mul => Complex::new(a.re * b.re - a.im * b.im, a.re * b.im + a.im * b.re),
        BinaryOp::TrueDiv => {
            let denom = b.re * b.re + b.im * b.im;
            if denom == 0.0 {
                return Err(ExcType::zero_division("complex division by zero"));
            }
            Complex::new(
                (a.re * b.re + a.im * b.im) / denom,
                (a.im * b.re - a.re * b.im) / denom,
            )
        }
        _ => return Ok(None),
    };
    Ok(Some(Value::Complex(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_division_rounds_toward_negative_infinity() {
        assert_eq!(int_floor_div_mod(7, 2).unwrap(), (3, 1));
        assert_eq!(int_floor_div_mod(-7, 2).unwrap(), (-4, 1));
        assert_eq!(int_floor_div_mod(7, -2).unwrap(), (-4, -1));
        assert!(int_floor_div_mod(1, 0).is_err());
    }

    #[test]
    fn integer_overflow_is_an_error() {
        let err = int_binary(i64::MAX, 1, BinaryOp::Add).unwrap_err();
        assert_eq!(err.to_string(), "OverflowError: integer overflow");
        assert!(int_binary(1, 70, BinaryOp::LShift).is_err());
    }

    #[test]
    fn float_modulo_takes_divisor_sign() {
        let Some(Value::Float(r)) = float_binary(-1.0, 3.0, BinaryOp::Mod).unwrap() else {
            panic!("expected a float");
        };
        assert_eq!(r, 2.0);
    }

    #[test]
    fn complex_multiplication() {
        let Some(Value::Complex(c)) =
            complex_binary(Complex::new(1.0, 2.0), Complex::new(3.0, 4.0), BinaryOp::Mul).unwrap()
        else {
            panic!("expected a complex");
        };
        assert_eq!((c.re, c.im), (-5.0, 10.0));
    }
}

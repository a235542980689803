//! Comparisons.
//!
//! `==` between builtin values is structural; instances compare through `__eq__`
//! (falling back to identity). Ordering follows Python: numbers by value, strings and
//! bytes lexicographically, sequences element by element, sets by inclusion.

use std::cmp::Ordering;

use super::Vm;
use crate::{
    bytecode::op::CompareOp,
    exception::{ExcType, RunResult},
    heap::HeapData,
    value::Value,
};

impl Vm {
    /// Evaluates `lhs op rhs`.
    pub fn compare_op(&mut self, lhs: Value, rhs: Value, op: CompareOp) -> RunResult<Value> {
        match op {
            CompareOp::Is => Ok(Value::Bool(lhs.is(rhs))),
            CompareOp::IsNot => Ok(Value::Bool(!lhs.is(rhs))),
            CompareOp::In => Ok(Value::Bool(self.contains(rhs, lhs)?)),
            CompareOp::NotIn => Ok(Value::Bool(!self.contains(rhs, lhs)?)),
            CompareOp::Eq => self.rich_eq(lhs, rhs, false),
            CompareOp::Ne => self.rich_eq(lhs, rhs, true),
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => self.rich_order(lhs, rhs, op),
        }
    }

    /// `lhs == rhs` as a Rust bool.
    pub fn values_equal(&mut self, lhs: Value, rhs: Value) -> RunResult<bool> {
        let result = self.rich_eq(lhs, rhs, false)?;
        self.truthy(result)
    }

    fn rich_eq(&mut self, lhs: Value, rhs: Value, negate: bool) -> RunResult<Value> {
        if self.uses_dunders(lhs) || self.uses_dunders(rhs) {
            let dunder = if negate { "__ne__" } else { "__eq__" };
            if let Some(result) = self.reflected_compare(lhs, rhs, dunder, dunder)? {
                return Ok(result);
            }
            return Ok(Value::Bool(lhs.is(rhs) != negate));
        }
        let equal = self.builtin_eq(lhs, rhs)?;
        Ok(Value::Bool(equal != negate))
    }

    /// Tries `lhs.forward(rhs)` then `rhs.reflected(lhs)`, giving a right operand of a
    /// proper subclass the first try.
    fn reflected_compare(
        &mut self,
        lhs: Value,
        rhs: Value,
        forward: &str,
        reflected: &str,
    ) -> RunResult<Option<Value>> {
        let lhs_type = self.type_of(lhs);
        let rhs_type = self.type_of(rhs);
        let rhs_first = lhs_type != rhs_type && self.mro_of(rhs_type).contains(&lhs_type);
        if rhs_first
            && self.uses_dunders(rhs)
            && let Some(result) = self.dispatch_dunder(rhs, reflected, &[lhs])?
        {
            return Ok(Some(result));
        }
        if self.uses_dunders(lhs)
            && let Some(result) = self.dispatch_dunder(lhs, forward, &[rhs])?
        {
            return Ok(Some(result));
        }
        if !rhs_first
            && self.uses_dunders(rhs)
            && let Some(result) = self.dispatch_dunder(rhs, reflected, &[lhs])?
        {
            return Ok(Some(result));
        }
        Ok(None)
    }

    /// Structural equality of builtin values.
    fn builtin_eq(&mut self, lhs: Value, rhs: Value) -> RunResult<bool> {
        if lhs.is(rhs) {
            return Ok(!matches!(lhs, Value::Float(f) if f.is_nan()));
        }
        if lhs.is_number() && rhs.is_number() {
            return Ok(numbers_equal(lhs, rhs));
        }
        let (Value::Ref(a), Value::Ref(b)) = (lhs, rhs) else {
            return Ok(false);
        };
        match (self.heap.get(a), self.heap.get(b)) {
            (HeapData::Str(x), HeapData::Str(y)) => Ok(x == y),
            (HeapData::Bytes(x), HeapData::Bytes(y)) => Ok(x == y),
            (HeapData::Range(x), HeapData::Range(y)) => Ok(x == y),
            (HeapData::List(x), HeapData::List(y)) | (HeapData::Tuple(x), HeapData::Tuple(y)) => {
                if x.len() != y.len() {
                    return Ok(false);
                }
                let pairs: Vec<(Value, Value)> = x.iter().copied().zip(y.iter().copied()).collect();
                for (p, q) in pairs {
                    if !(p.is(q) || self.values_equal(p, q)?) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (HeapData::Dict(x), HeapData::Dict(y)) => {
                if x.len() != y.len() {
                    return Ok(false);
                }
                let mut pairs = Vec::with_capacity(x.len());
                for (hk, value) in x.hash_keys().zip(x.values()) {
                    match y.get(hk) {
                        Some(other) => pairs.push((value, other)),
                        None => return Ok(false),
                    }
                }
                for (p, q) in pairs {
                    if !(p.is(q) || self.values_equal(p, q)?) {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (HeapData::Set(x) | HeapData::FrozenSet(x), HeapData::Set(y) | HeapData::FrozenSet(y)) => {
                Ok(x.len() == y.len() && x.is_subset(y))
            }
            _ => Ok(false),
        }
    }

    fn rich_order(&mut self, lhs: Value, rhs: Value, op: CompareOp) -> RunResult<Value> {
        if self.uses_dunders(lhs) || self.uses_dunders(rhs) {
            if let Some((forward, reflected)) = op.dunders()
                && let Some(result) = self.reflected_compare(lhs, rhs, forward, reflected)?
            {
                return Ok(result);
            }
            return Err(self.unorderable(lhs, rhs, op));
        }
        if let Some(result) = self.set_order(lhs, rhs, op) {
            return Ok(Value::Bool(result));
        }
        match self.builtin_cmp(lhs, rhs)? {
            Some(ordering) => Ok(Value::Bool(match op {
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })),
            // NaN compares false both ways
            None if lhs.as_float().is_some() && rhs.as_float().is_some() => Ok(Value::Bool(false)),
            None => Err(self.unorderable(lhs, rhs, op)),
        }
    }

    fn unorderable(&self, lhs: Value, rhs: Value, op: CompareOp) -> crate::exception::RunError {
        ExcType::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            self.type_name(lhs),
            self.type_name(rhs)
        ))
    }

    /// Subset ordering of sets; `None` unless both operands are sets.
    fn set_order(&self, lhs: Value, rhs: Value, op: CompareOp) -> Option<bool> {
        let (Value::Ref(a), Value::Ref(b)) = (lhs, rhs) else {
            return None;
        };
        let (HeapData::Set(x) | HeapData::FrozenSet(x), HeapData::Set(y) | HeapData::FrozenSet(y)) =
            (self.heap.get(a), self.heap.get(b))
        else {
            return None;
        };
        Some(match op {
            CompareOp::Le => x.is_subset(y),
            CompareOp::Lt => x.len() < y.len() && x.is_subset(y),
            CompareOp::Ge => y.is_subset(x),
            _ => y.len() < x.len() && y.is_subset(x),
        })
    }

    /// Total ordering of comparable builtin values; `None` when unordered.
    pub(crate) fn builtin_cmp(&mut self, lhs: Value, rhs: Value) -> RunResult<Option<Ordering>> {
        if let (Some(a), Some(b)) = (int_value(lhs), int_value(rhs)) {
            return Ok(Some(a.cmp(&b)));
        }
        if lhs.is_number() && rhs.is_number() {
            return Ok(match (lhs.as_float(), rhs.as_float()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            });
        }
        let (Value::Ref(a), Value::Ref(b)) = (lhs, rhs) else {
            return Ok(None);
        };
        match (self.heap.get(a), self.heap.get(b)) {
            (HeapData::Str(x), HeapData::Str(y)) => Ok(Some(x.cmp(y))),
            (HeapData::Bytes(x), HeapData::Bytes(y)) => Ok(Some(x.cmp(y))),
            (HeapData::List(x), HeapData::List(y)) | (HeapData::Tuple(x), HeapData::Tuple(y)) => {
                let (x, y) = (x.clone(), y.clone());
                for (p, q) in x.iter().zip(y.iter()) {
                    if p.is(*q) || self.values_equal(*p, *q)? {
                        continue;
                    }
                    if self.uses_dunders(*p) || self.uses_dunders(*q) {
                        let less = self.rich_order(*p, *q, CompareOp::Lt)?;
                        return Ok(Some(if self.truthy(less)? { Ordering::Less } else { Ordering::Greater }));
                    }
                    return match self.builtin_cmp(*p, *q)? {
                        Some(ordering) => Ok(Some(ordering)),
                        None => Err(self.unorderable(*p, *q, CompareOp::Lt)),
                    };
                }
                Ok(Some(x.len().cmp(&y.len())))
            }
            _ => Ok(None),
        }
    }

    /// Orders two values for `sorted`/`min`/`max`, going through `__lt__` for instances.
    pub(crate) fn less_than(&mut self, lhs: Value, rhs: Value) -> RunResult<bool> {
        let result = self.compare_op(lhs, rhs, CompareOp::Lt)?;
        self.truthy(result)
    }
}

fn int_value(value: Value) -> Option<i64> {
    match value {
        Value::Int(_) | Value::Bool(_) => value.as_int(),
        _ => None,
    }
}

fn numbers_equal(lhs: Value, rhs: Value) -> bool {
    match (lhs, rhs) {
        (Value::Complex(a), Value::Complex(b)) => a.re == b.re && a.im == b.im,
        (Value::Complex(c), other) | (other, Value::Complex(c)) => {
            c.im == 0.0 && other.as_float().is_some_and(|f| f == c.re)
        }
        _ => match (int_value(lhs), int_value(rhs)) {
            (Some(a), Some(b)) => a == b,
            _ => lhs.as_float() == rhs.as_float(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Complex;

    #[test]
    fn numeric_equality_crosses_types() {
        assert!(numbers_equal(Value::Int(1), Value::Float(1.0)));
        assert!(numbers_equal(Value::Bool(true), Value::Int(1)));
        assert!(numbers_equal(Value::Complex(Complex::new(2.0, 0.0)), Value::Int(2)));
        assert!(!numbers_equal(Value::Float(f64::NAN), Value::Float(f64::NAN)));
    }
}

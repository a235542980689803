//! Implementation of the id() builtin function.

use crate::{exception::RunResult, native::CallContext, value::Value};

/// Base of the synthetic address space shared with object reprs.
const HEAP_ADDRESS_BASE: usize = 0x1000;

/// Implementation of the id() builtin function.
///
/// Heap objects report their slot address, which is also what their default repr shows.
/// Immediates have no identity of their own; equal immediates share an id.
pub(super) fn builtin_id(ctx: &mut CallContext<'_>) -> RunResult<usize> {
    ctx.check_arity(1, Some(1))?;
    let value = ctx.arg(0)?;
    let id = match value {
        Value::Ref(id) => (HEAP_ADDRESS_BASE + id.index() * 0x10) as i64,
        Value::None | Value::Undefined => 1,
        Value::NotImplemented => 2,
        Value::Bool(b) => 3 + i64::from(b),
        Value::Int(i) => i.wrapping_mul(2).wrapping_add(1),
        Value::Float(f) => f.to_bits() as i64,
        Value::Complex(c) => (c.re.to_bits() ^ c.im.to_bits().rotate_left(17)) as i64,
    };
    ctx.ret(Value::Int(id))
}

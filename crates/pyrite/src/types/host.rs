use std::{any::Any, fmt};

use crate::value::Value;

/// Opaque host data stored in the heap as a `HostExtension` value.
///
/// Embedders wrap their own state in a guest-visible value with
/// [`Vm::new_host_extension`](crate::Vm::new_host_extension) and get it back with
/// [`Vm::host_data`](crate::Vm::host_data). Any guest values the extension holds must be
/// reported by [`child_values`](Self::child_values) so the collector keeps them alive.
pub trait HostData: Any + fmt::Debug {
    /// Name reported by `type(x).__name__` and in reprs.
    fn type_name(&self) -> &str;

    fn child_values(&self) -> Vec<Value> {
        Vec::new()
    }
}

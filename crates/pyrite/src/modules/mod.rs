//! Native modules importable by guest code.
//!
//! Each module is built with [`ModuleBuilder`](crate::native::ModuleBuilder) and
//! registered at VM creation, so `import abc` is a table lookup.

pub(crate) mod abc;
pub(crate) mod dataclasses;
pub(crate) mod enum_mod;

use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

use crate::{Vm, exception::RunResult, value::Value};

/// Modules available to `import`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub(crate) enum StandardLib {
    Abc,
    Enum,
    Dataclasses,
}

impl StandardLib {
    fn create(self, vm: &mut Vm) -> RunResult<()> {
        match self {
            Self::Abc => abc::create_module(vm),
            Self::Enum => enum_mod::create_module(vm),
            Self::Dataclasses => dataclasses::create_module(vm),
        }
    }
}

/// Creates and registers every native module.
pub(crate) fn register_all(vm: &mut Vm) -> RunResult<()> {
    for module in StandardLib::iter() {
        module.create(vm)?;
        tracing::debug!(target: "pyrite::vm", module = %module, "module registered");
    }
    Ok(())
}

/// Sets `__module__` on a natively created class so reprs show `module.Name`.
pub(crate) fn set_module_name(vm: &mut Vm, class: Value, module: &str) -> RunResult<()> {
    let name = vm.new_str(module)?;
    vm.set_class_attr(class, "__module__", name)
}

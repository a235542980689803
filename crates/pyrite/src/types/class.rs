//! Classes, instances and modules, plus the C3 linearization algorithm.

use super::{AttrMap, function::push_values};
use crate::{
    exception::{ExcType, RunResult},
    heap::{Heap, HeapData, HeapId},
};

/// Maximum number of classes in a single MRO.
pub const MAX_MRO_LENGTH: usize = 2600;

/// Maximum depth of a single base class's linearization.
pub const MAX_INHERITANCE_DEPTH: usize = 1000;

/// How instances of a class are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstanceLayout {
    /// `HeapData::Instance` with an attribute dict; `object` and all guest classes.
    Object,
    /// Instances are classes themselves: `type` and metaclasses.
    Class,
    /// A builtin value type (`int`, `list`, ...) that guest classes cannot extend.
    Builtin,
}

/// A class object.
#[derive(Debug)]
pub(crate) struct ClassObject {
    pub name: String,
    /// Direct bases in declaration order.
    pub bases: Vec<HeapId>,
    /// Method resolution order: this class first, `object` last.
    pub mro: Vec<HeapId>,
    pub metaclass: HeapId,
    pub namespace: AttrMap,
    /// Sorted names of unimplemented abstract methods; non-empty makes the class abstract.
    pub abstract_methods: Vec<String>,
    /// Virtual subclasses added by `register`.
    pub registry: Vec<HeapId>,
    /// Classes naming this one as a direct base. Not traced by the collector; dead
    /// entries are dropped during the sweep.
    pub subclasses: Vec<HeapId>,
    pub layout: InstanceLayout,
}

impl ClassObject {
    pub fn new(name: impl Into<String>, metaclass: HeapId, layout: InstanceLayout) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            mro: Vec::new(),
            metaclass,
            namespace: AttrMap::default(),
            abstract_methods: Vec::new(),
            registry: Vec::new(),
            subclasses: Vec::new(),
            layout,
        }
    }

    pub fn collect_child_ids(&self, out: &mut Vec<HeapId>) {
        out.extend(self.bases.iter().copied());
        out.extend(self.mro.iter().copied());
        out.push(self.metaclass);
        out.extend(self.registry.iter().copied());
        push_values(out, self.namespace.values().copied());
    }
}

/// An instance of a guest class (including exception instances).
#[derive(Debug)]
pub(crate) struct Instance {
    pub class_id: HeapId,
    pub attrs: AttrMap,
}

/// A module namespace.
#[derive(Debug)]
pub(crate) struct Module {
    pub name: String,
    pub attrs: AttrMap,
}

/// C3 merge of the given linearizations.
///
/// Repeatedly takes the first head that does not appear in the tail of any list.
/// Returns `None` when no head qualifies, i.e. the hierarchy is inconsistent.
pub(crate) fn c3_merge(self_id: HeapId, mut linearizations: Vec<Vec<HeapId>>) -> Option<Vec<HeapId>> {
    let mut result = vec![self_id];
    loop {
        linearizations.retain(|l| !l.is_empty());
        if linearizations.is_empty() {
            return Some(result);
        }

        let next = linearizations
            .iter()
            .map(|lin| lin[0])
            .find(|candidate| !linearizations.iter().any(|other| other[1..].contains(candidate)))?;

        result.push(next);
        for lin in &mut linearizations {
            if lin[0] == next {
                lin.remove(0);
            }
        }
    }
}

/// Computes the MRO of class `self_id` with the given direct bases.
///
/// `bases` must be non-empty; a class without explicit bases gets `object`.
pub(crate) fn compute_c3_mro(self_id: HeapId, bases: &[HeapId], heap: &Heap) -> RunResult<Vec<HeapId>> {
    if bases.contains(&self_id) {
        return Err(ExcType::type_error("a class cannot inherit from itself"));
    }
    for (i, base) in bases.iter().enumerate() {
        if bases[..i].contains(base) {
            let name = class_name(heap, *base);
            return Err(ExcType::type_error(format!("duplicate base class {name}")));
        }
    }

    let mut linearizations = Vec::with_capacity(bases.len() + 1);
    for &base_id in bases {
        match heap.get(base_id) {
            HeapData::Class(cls) => {
                if cls.mro.len() > MAX_INHERITANCE_DEPTH {
                    return Err(ExcType::type_error(format!(
                        "inheritance chain too deep (maximum depth {MAX_INHERITANCE_DEPTH})"
                    )));
                }
                linearizations.push(cls.mro.clone());
            }
            _ => return Err(ExcType::type_error("bases must be classes")),
        }
    }
    linearizations.push(bases.to_vec());

    let Some(mro) = c3_merge(self_id, linearizations) else {
        let names: Vec<String> = bases.iter().map(|&id| class_name(heap, id)).collect();
        return Err(ExcType::inconsistent_mro(&names));
    };
    if mro.len() > MAX_MRO_LENGTH {
        return Err(ExcType::type_error(format!(
            "MRO too long ({} classes, maximum {MAX_MRO_LENGTH})",
            mro.len()
        )));
    }
    Ok(mro)
}

pub(crate) fn class_name(heap: &Heap, id: HeapId) -> String {
    match heap.get(id) {
        HeapData::Class(cls) => cls.name.clone(),
        _ => "?".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(i: usize) -> HeapId {
        HeapId::new(i)
    }

    #[test]
    fn diamond_linearizes_left_to_right() {
        // object=0, A=1, B(A)=2, C(A)=3, D(B, C)=4
        let b = vec![id(2), id(1), id(0)];
        let c = vec![id(3), id(1), id(0)];
        let mro = c3_merge(id(4), vec![b, c, vec![id(2), id(3)]]).unwrap();
        assert_eq!(mro, vec![id(4), id(2), id(3), id(1), id(0)]);
    }

    #[test]
    fn conflicting_orders_have_no_merge() {
        // X=1, Y=2 both direct children of object=0; A(X, Y)=3, B(Y, X)=4, C(A, B)
        let a = vec![id(3), id(1), id(2), id(0)];
        let b = vec![id(4), id(2), id(1), id(0)];
        assert_eq!(c3_merge(id(5), vec![a, b, vec![id(3), id(4)]]), None);
    }

    #[test]
    fn single_base_prepends_self() {
        let mro = c3_merge(id(7), vec![vec![id(0)], vec![id(0)]]).unwrap();
        assert_eq!(mro, vec![id(7), id(0)]);
    }
}

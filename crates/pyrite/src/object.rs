use std::fmt;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    Vm,
    exception::{ExcType, RunResult},
    exception_public::Exception,
    heap::{HeapData, HeapId},
    types::str_bytes::{bytes_repr, str_repr},
    value::{Complex, Value, complex_repr, float_repr},
};

/// An owned snapshot of a guest value, independent of the VM heap.
///
/// Hosts use `Object` to pass data into guest code and to inspect results after a run.
/// Containers are copied deeply. Values with no structural form (instances, classes,
/// functions, generators) come back as [`Object::Repr`] and cannot be sent back in.
///
/// `Display` renders the value the way guest `repr()` would.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex { re: f64, im: f64 },
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Object>),
    Tuple(Vec<Object>),
    /// Entries in insertion order.
    Dict(Vec<(Object, Object)>),
    Set(Vec<Object>),
    FrozenSet(Vec<Object>),
    /// Output only: the guest `repr()` of a value without a structural form, or of a
    /// container reached again while it was being converted.
    Repr(String),
}

impl Object {
    /// Whether this object can be converted back into a guest value.
    #[must_use]
    pub fn is_input(&self) -> bool {
        match self {
            Self::Repr(_) => false,
            Self::List(items) | Self::Tuple(items) | Self::Set(items) | Self::FrozenSet(items) => {
                items.iter().all(Self::is_input)
            }
            Self::Dict(pairs) => pairs.iter().all(|(k, v)| k.is_input() && v.is_input()),
            _ => true,
        }
    }
}

fn write_items(f: &mut fmt::Formatter<'_>, items: &[Object]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => f.write_str(&float_repr(*v)),
            Self::Complex { re, im } => f.write_str(&complex_repr(Complex::new(*re, *im))),
            Self::Str(s) => f.write_str(&str_repr(s)),
            Self::Bytes(b) => f.write_str(&bytes_repr(b)),
            Self::List(items) => {
                f.write_str("[")?;
                write_items(f, items)?;
                f.write_str("]")
            }
            Self::Tuple(items) => {
                f.write_str("(")?;
                write_items(f, items)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Self::Dict(pairs) => {
                f.write_str("{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Set(items) if items.is_empty() => f.write_str("set()"),
            Self::Set(items) => {
                f.write_str("{")?;
                write_items(f, items)?;
                f.write_str("}")
            }
            Self::FrozenSet(items) if items.is_empty() => f.write_str("frozenset()"),
            Self::FrozenSet(items) => {
                f.write_str("frozenset({")?;
                write_items(f, items)?;
                f.write_str("})")
            }
            Self::Repr(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Object {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl<T: Into<Object>> From<Vec<T>> for Object {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Children of a container, copied out so conversion can recurse without holding a
/// heap borrow.
enum Container {
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Set(Vec<Value>),
    FrozenSet(Vec<Value>),
}

impl Vm {
    /// Converts a guest value into an owned [`Object`].
    ///
    /// Fails only when rendering the `repr` of an opaque value raises.
    pub fn to_object(&mut self, value: Value) -> Result<Object, Exception> {
        let mut visiting = AHashSet::new();
        self.value_to_object(value, &mut visiting).map_err(|err| self.to_exception(err))
    }

    fn value_to_object(&mut self, value: Value, visiting: &mut AHashSet<HeapId>) -> RunResult<Object> {
        let id = match value {
            Value::None => return Ok(Object::None),
            Value::Bool(b) => return Ok(Object::Bool(b)),
            Value::Int(i) => return Ok(Object::Int(i)),
            Value::Float(f) => return Ok(Object::Float(f)),
            Value::Complex(c) => return Ok(Object::Complex { re: c.re, im: c.im }),
            Value::Undefined | Value::NotImplemented => return Ok(Object::Repr(self.repr_of(value)?)),
            Value::Ref(id) => id,
        };
        let container = match self.heap.get(id) {
            HeapData::Str(s) => return Ok(Object::Str(s.clone())),
            HeapData::Bytes(b) => return Ok(Object::Bytes(b.clone())),
            HeapData::List(items) => Some(Container::List(items.clone())),
            HeapData::Tuple(items) => Some(Container::Tuple(items.clone())),
            HeapData::Dict(dict) => Some(Container::Dict(dict.items())),
            HeapData::Set(set) => Some(Container::Set(set.values())),
            HeapData::FrozenSet(set) => Some(Container::FrozenSet(set.values())),
            _ => None,
        };
        let Some(container) = container else {
            return Ok(Object::Repr(self.repr_of(value)?));
        };
        if !visiting.insert(id) {
            let marker = match container {
                Container::Dict(_) => "{...}",
                Container::List(_) => "[...]",
                _ => "(...)",
            };
            return Ok(Object::Repr(marker.to_owned()));
        }
        let object = match container {
            Container::List(items) => Object::List(self.values_to_objects(items, visiting)?),
            Container::Tuple(items) => Object::Tuple(self.values_to_objects(items, visiting)?),
            Container::Set(items) => Object::Set(self.values_to_objects(items, visiting)?),
            Container::FrozenSet(items) => Object::FrozenSet(self.values_to_objects(items, visiting)?),
            Container::Dict(pairs) => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    out.push((self.value_to_object(k, visiting)?, self.value_to_object(v, visiting)?));
                }
                Object::Dict(out)
            }
        };
        visiting.remove(&id);
        Ok(object)
    }

    fn values_to_objects(&mut self, items: Vec<Value>, visiting: &mut AHashSet<HeapId>) -> RunResult<Vec<Object>> {
        items.into_iter().map(|item| self.value_to_object(item, visiting)).collect()
    }

    /// Allocates a guest value from an [`Object`].
    ///
    /// [`Object::Repr`] has no guest form and raises `TypeError`; unhashable dict keys or
    /// set members raise as they would in guest code.
    pub fn from_object(&mut self, object: &Object) -> Result<Value, Exception> {
        self.object_to_value(object).map_err(|err| self.to_exception(err))
    }

    fn object_to_value(&mut self, object: &Object) -> RunResult<Value> {
        match object {
            Object::None => Ok(Value::None),
            Object::Bool(b) => Ok(Value::Bool(*b)),
            Object::Int(i) => Ok(Value::Int(*i)),
            Object::Float(f) => Ok(Value::Float(*f)),
            Object::Complex { re, im } => Ok(Value::Complex(Complex::new(*re, *im))),
            Object::Str(s) => self.new_str(s.as_str()),
            Object::Bytes(b) => self.new_bytes(b.as_slice()),
            Object::List(items) => {
                let values = self.objects_to_values(items)?;
                self.new_list(values)
            }
            Object::Tuple(items) => {
                let values = self.objects_to_values(items)?;
                self.new_tuple(values)
            }
            Object::Set(items) => {
                let values = self.objects_to_values(items)?;
                self.new_set(values)
            }
            Object::FrozenSet(items) => {
                let values = self.objects_to_values(items)?;
                self.new_frozenset(values)
            }
            Object::Dict(pairs) => {
                let mut values = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    values.push((self.object_to_value(k)?, self.object_to_value(v)?));
                }
                self.new_dict(values)
            }
            Object::Repr(_) => Err(ExcType::type_error("Repr objects are output only")),
        }
    }

    fn objects_to_values(&mut self, objects: &[Object]) -> RunResult<Vec<Value>> {
        objects.iter().map(|object| self.object_to_value(object)).collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn display_matches_guest_repr() {
        let object = Object::Dict(vec![
            (Object::from("a"), Object::Tuple(vec![Object::Int(1)])),
            (Object::from("b"), Object::Set(vec![])),
            (Object::None, Object::FrozenSet(vec![Object::Float(2.5)])),
        ]);
        assert_eq!(object.to_string(), "{'a': (1,), 'b': set(), None: frozenset({2.5})}");
        assert_eq!(Object::Bool(false).to_string(), "False");
    }

    #[test]
    fn repr_is_not_input() {
        assert!(Object::from(vec![1_i64, 2]).is_input());
        assert!(!Object::List(vec![Object::Repr("<object>".to_owned())]).is_input());
    }
}

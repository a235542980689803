use std::fmt;

use crate::heap::HeapId;

/// A complex number, stored as two `f64` components.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    #[must_use]
    pub const fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// A runtime value.
///
/// Small immutable values are stored inline; everything else is a `Ref` into the
/// VM's heap arena. `Value` is `Copy`: copying a `Ref` aliases the same heap slot, so
/// mutation of a list, dict, set or instance is visible through every copy.
/// Heap lifetime is managed by the mark-sweep collector rather than by counting
/// references.
///
/// `==` on `Value` compares representations (heap values by slot), not guest
/// equality; use [`Vm::values_equal`](crate::Vm::values_equal) for `==` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Value {
    /// Marker for an unbound local slot or a missing argument. Never visible to guest code.
    Undefined,
    #[default]
    None,
    NotImplemented,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(Complex),
    Ref(HeapId),
}

impl Value {
    #[must_use]
    pub fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    #[must_use]
    pub fn is_undefined(self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn is_not_implemented(self) -> bool {
        matches!(self, Self::NotImplemented)
    }

    #[must_use]
    pub fn as_int(self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i),
            Self::Bool(b) => Some(i64::from(b)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(f),
            Self::Int(i) => Some(i as f64),
            Self::Bool(b) => Some(f64::from(u8::from(b))),
            _ => None,
        }
    }

    #[must_use]
    pub fn ref_id(self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// The `is` operator.
    ///
    /// Heap values compare by slot; immediates compare by value, which matches CPython for
    /// singletons and cached small integers.
    #[must_use]
    pub fn is(self, other: Self) -> bool {
        match (self, other) {
            (Self::Ref(a), Self::Ref(b)) => a == b,
            (Self::None, Self::None)
            | (Self::NotImplemented, Self::NotImplemented)
            | (Self::Undefined, Self::Undefined) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Complex(a), Self::Complex(b)) => a.re.to_bits() == b.re.to_bits() && a.im.to_bits() == b.im.to_bits(),
            _ => false,
        }
    }

    /// Whether the value is a number of any builtin numeric type (bool included).
    #[must_use]
    pub fn is_number(self) -> bool {
        matches!(self, Self::Bool(_) | Self::Int(_) | Self::Float(_) | Self::Complex(_))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<HeapId> for Value {
    fn from(id: HeapId) -> Self {
        Self::Ref(id)
    }
}

/// Formats a float the way CPython's `repr` does for the common cases.
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        "nan".to_owned()
    } else if f.is_infinite() {
        if f > 0.0 { "inf".to_owned() } else { "-inf".to_owned() }
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else if f.abs() >= 1e16 || (f != 0.0 && f.abs() < 1e-4) {
        let s = format!("{f:e}");
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp:0>2}"),
            Some((mantissa, exp)) => format!("{mantissa}e-{:0>2}", &exp[1..]),
            None => s,
        }
    } else {
        format!("{f}")
    }
}

pub(crate) fn complex_repr(c: Complex) -> String {
    fn part(f: f64) -> String {
        if f.fract() == 0.0 && f.is_finite() && f.abs() < 1e16 {
            format!("{}", f as i64)
        } else {
            float_repr(f)
        }
    }
    if c.re == 0.0 && c.re.is_sign_positive() {
        format!("{}j", part(c.im))
    } else {
        let sign = if c.im < 0.0 || (c.im == 0.0 && c.im.is_sign_negative()) { '-' } else { '+' };
        format!("({}{sign}{}j)", part(c.re), part(c.im.abs()))
    }
}

impl fmt::Display for Value {
    /// Debug-oriented rendering that does not need the heap; use `Vm::repr` for guest output.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "<undefined>"),
            Self::None => write!(f, "None"),
            Self::NotImplemented => write!(f, "NotImplemented"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{}", float_repr(*v)),
            Self::Complex(c) => write!(f, "{}", complex_repr(*c)),
            Self::Ref(id) => write!(f, "<ref {}>", id.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_repr_matches_python_forms() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.5), "0.5");
        assert_eq!(float_repr(-2.0), "-2.0");
        assert_eq!(float_repr(1e20), "1e+20");
        assert_eq!(float_repr(f64::INFINITY), "inf");
    }

    #[test]
    fn complex_repr_matches_python_forms() {
        assert_eq!(complex_repr(Complex::new(1.0, 2.0)), "(1+2j)");
        assert_eq!(complex_repr(Complex::new(0.0, 3.0)), "3j");
        assert_eq!(complex_repr(Complex::new(1.5, -1.0)), "(1.5-1j)");
    }

    #[test]
    fn identity_of_immediates() {
        assert!(Value::None.is(Value::None));
        assert!(Value::Int(5).is(Value::Int(5)));
        assert!(!Value::Int(1).is(Value::Bool(true)));
    }
}

use smallvec::SmallVec;

use crate::value::Value;

/// Arguments of a call: positional values plus keyword arguments in call order.
///
/// Most calls pass a handful of positional arguments, which stay inline.
#[derive(Debug, Clone, Default)]
pub struct ArgValues {
    pub(crate) positional: SmallVec<[Value; 4]>,
    pub(crate) kwargs: Vec<(String, Value)>,
}

impl ArgValues {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn one(value: Value) -> Self {
        Self::positional([value])
    }

    #[must_use]
    pub fn two(a: Value, b: Value) -> Self {
        Self::positional([a, b])
    }

    #[must_use]
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            kwargs: Vec::new(),
        }
    }

    /// Adds a keyword argument.
    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.push((name.into(), value));
        self
    }

    pub(crate) fn with_kwargs(positional: impl IntoIterator<Item = Value>, kwargs: Vec<(String, Value)>) -> Self {
        Self {
            positional: positional.into_iter().collect(),
            kwargs,
        }
    }

    /// Inserts a receiver in front of the positional arguments.
    pub(crate) fn prepend(&mut self, receiver: Value) {
        self.positional.insert(0, receiver);
    }

    #[must_use]
    pub fn positional_values(&self) -> &[Value] {
        &self.positional
    }

    #[must_use]
    pub fn kwargs(&self) -> &[(String, Value)] {
        &self.kwargs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.positional.len() + self.kwargs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.kwargs.is_empty()
    }
}

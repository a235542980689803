//! Suspendable generator and coroutine objects.

use crate::{bytecode::vm::Frame, heap::HeapId, value::Value};

/// Lifecycle of a generator or coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum GeneratorState {
    /// Created but never resumed.
    Created,
    /// Paused at a `yield` or `await`.
    Suspended,
    /// Returned or raised; further sends fail.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flavor {
    Generator,
    Coroutine,
}

/// Outcome of resuming a generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resumption {
    /// The generator suspended, producing a value.
    Yielded(Value),
    /// The generator finished with a return value.
    Returned(Value),
}

impl Resumption {
    /// `(value, is_done)`.
    #[must_use]
    pub fn into_pair(self) -> (Value, bool) {
        match self {
            Self::Yielded(v) => (v, false),
            Self::Returned(v) => (v, true),
        }
    }

    #[must_use]
    pub fn value(self) -> Value {
        self.into_pair().0
    }

    #[must_use]
    pub fn is_done(self) -> bool {
        matches!(self, Self::Returned(_))
    }
}

#[derive(Debug)]
pub(crate) struct Generator {
    pub name: String,
    pub flavor: Flavor,
    pub state: GeneratorState,
    /// Set while the frame is executing; resuming then fails.
    pub running: bool,
    /// The suspended frame. Taken out while running, dropped once exhausted.
    pub frame: Option<Frame>,
}

impl Generator {
    pub fn new(frame: Frame, flavor: Flavor) -> Self {
        Self {
            name: frame.code.name().to_owned(),
            flavor,
            state: GeneratorState::Created,
            running: false,
            frame: Some(frame),
        }
    }

    pub fn collect_child_ids(&self, out: &mut Vec<HeapId>) {
        if let Some(frame) = &self.frame {
            frame.collect_child_ids(out);
        }
    }
}

//! Execution limits for a [`Vm`](crate::Vm).
//!
//! Limits are plain configuration: a [`ResourceLimits`] value is handed to
//! [`Vm::with_limits`](crate::Vm::with_limits) and the VM keeps a [`LimitTracker`]
//! that counts instructions, allocations and frame depth against it. Exceeding a
//! limit produces an uncatchable guest exception so that guest code cannot
//! suppress it with `try`/`except`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::exception::{ExcType, RunError, SimpleException};

/// Default maximum frame depth, matching CPython's default recursion limit.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Configurable limits for a single VM.
///
/// Every limit is optional; `None` means unlimited. The default configuration only
/// bounds recursion depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of nested frames (guest calls, class bodies and generator resumptions).
    pub max_recursion_depth: Option<usize>,
    /// Maximum number of executed bytecode instructions over the VM's lifetime.
    pub max_operations: Option<usize>,
    /// Maximum number of heap allocations over the VM's lifetime.
    pub max_allocations: Option<usize>,
    /// Run the garbage collector from `Vm::run_module` after this many allocations.
    #[serde(default)]
    pub gc_interval: Option<usize>,
    /// Maximum length of a string, bytes, list or tuple built by repetition or concatenation.
    #[serde(default)]
    pub max_sequence_length: Option<usize>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLimits {
    /// Creates the default limits: recursion bounded, everything else unlimited.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            max_operations: None,
            max_allocations: None,
            gc_interval: None,
            max_sequence_length: None,
        }
    }

    /// Limits with nothing bounded at all.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_recursion_depth: None,
            max_operations: None,
            max_allocations: None,
            gc_interval: None,
            max_sequence_length: None,
        }
    }

    #[must_use]
    pub fn max_recursion_depth(mut self, limit: usize) -> Self {
        self.max_recursion_depth = Some(limit);
        self
    }

    #[must_use]
    pub fn max_operations(mut self, limit: usize) -> Self {
        self.max_operations = Some(limit);
        self
    }

    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    #[must_use]
    pub fn gc_interval(mut self, interval: usize) -> Self {
        self.gc_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn max_sequence_length(mut self, limit: usize) -> Self {
        self.max_sequence_length = Some(limit);
        self
    }
}

/// Error returned when a resource limit is exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum instruction count exceeded.
    Operation { limit: usize, count: usize },
    /// Maximum frame depth exceeded.
    Recursion { limit: usize, depth: usize },
    /// A built sequence would exceed the maximum length.
    SequenceLength { limit: usize, length: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Operation { limit, count } => {
                write!(f, "operation limit exceeded: {count} > {limit}")
            }
            Self::Recursion { .. } => write!(f, "maximum recursion depth exceeded"),
            Self::SequenceLength { limit, length } => {
                write!(f, "sequence length limit exceeded: {length} > {limit}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        let exc_type = match err {
            ResourceError::Allocation { .. } | ResourceError::SequenceLength { .. } => ExcType::MemoryError,
            ResourceError::Operation { .. } => ExcType::TimeoutError,
            ResourceError::Recursion { .. } => ExcType::RecursionError,
        };
        RunError::uncatchable(SimpleException::new_msg(exc_type, err.to_string()))
    }
}

/// Running counters checked against a [`ResourceLimits`].
#[derive(Debug, Clone)]
pub(crate) struct LimitTracker {
    limits: ResourceLimits,
    operations: usize,
    allocations: usize,
    allocations_since_gc: usize,
}

impl LimitTracker {
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            operations: 0,
            allocations: 0,
            allocations_since_gc: 0,
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Counts one executed instruction.
    #[inline]
    pub fn on_instruction(&mut self) -> Result<(), ResourceError> {
        self.operations += 1;
        match self.limits.max_operations {
            Some(limit) if self.operations > limit => Err(ResourceError::Operation {
                limit,
                count: self.operations,
            }),
            _ => Ok(()),
        }
    }

    /// Counts one heap allocation.
    #[inline]
    pub fn on_allocate(&mut self) -> Result<(), ResourceError> {
        self.allocations += 1;
        self.allocations_since_gc += 1;
        match self.limits.max_allocations {
            Some(limit) if self.allocations > limit => Err(ResourceError::Allocation {
                limit,
                count: self.allocations,
            }),
            _ => Ok(()),
        }
    }

    /// Checks that pushing one more frame on top of `depth` frames is allowed.
    #[inline]
    pub fn check_recursion(&self, depth: usize) -> Result<(), ResourceError> {
        match self.limits.max_recursion_depth {
            Some(limit) if depth >= limit => Err(ResourceError::Recursion { limit, depth }),
            _ => Ok(()),
        }
    }

    /// Checks the length of a sequence about to be built.
    #[inline]
    pub fn check_sequence_size(&self, length: usize) -> Result<(), ResourceError> {
        match self.limits.max_sequence_length {
            Some(limit) if length > limit => Err(ResourceError::SequenceLength { limit, length }),
            _ => Ok(()),
        }
    }

    /// Whether enough allocations happened since the last collection to run another one.
    pub fn gc_due(&self) -> bool {
        self.limits
            .gc_interval
            .is_some_and(|interval| self.allocations_since_gc >= interval)
    }

    pub fn reset_gc_counter(&mut self) {
        self.allocations_since_gc = 0;
    }

    pub fn operations(&self) -> usize {
        self.operations
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_limit_trips_after_limit() {
        let mut tracker = LimitTracker::new(ResourceLimits::unlimited().max_operations(2));
        assert!(tracker.on_instruction().is_ok());
        assert!(tracker.on_instruction().is_ok());
        assert_eq!(
            tracker.on_instruction(),
            Err(ResourceError::Operation { limit: 2, count: 3 })
        );
    }

    #[test]
    fn recursion_limit_counts_existing_depth() {
        let tracker = LimitTracker::new(ResourceLimits::unlimited().max_recursion_depth(3));
        assert!(tracker.check_recursion(2).is_ok());
        assert!(tracker.check_recursion(3).is_err());
    }

    #[test]
    fn gc_interval_is_reported_and_reset() {
        let mut tracker = LimitTracker::new(ResourceLimits::new().gc_interval(2));
        tracker.on_allocate().unwrap();
        assert!(!tracker.gc_due());
        tracker.on_allocate().unwrap();
        assert!(tracker.gc_due());
        tracker.reset_gc_counter();
        assert!(!tracker.gc_due());
    }
}

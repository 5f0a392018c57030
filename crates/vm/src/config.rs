//! Runtime configuration.

use crate::heap::DEFAULT_MAX_FIELDS;
use ember_common::Priority;

/// Timeslice budgets, in milliseconds, for the three fixed priority tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeslices {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

impl Default for Timeslices {
    fn default() -> Self {
        Self {
            low: 20,
            medium: 40,
            high: 80,
        }
    }
}

impl Timeslices {
    /// Slice length for a module's requested priority.
    pub fn for_priority(&self, priority: Priority) -> u64 {
        match priority {
            Priority::User(ms) => u64::from(ms),
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
        }
    }
}

/// Limits and defaults applied to every instance a runtime loads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack cells for modules that request 0.
    pub default_stack_size: usize,
    /// Largest stack a module may request.
    pub max_stack_size: usize,
    /// Live-object count that triggers the first collection.
    pub initial_gc_threshold: usize,
    /// Maximum number of loaded instances.
    pub max_instances: usize,
    /// Largest object NEW may allocate, in fields.
    pub max_object_fields: usize,
    pub timeslices: Timeslices,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_stack_size: 1024,
            max_stack_size: 1 << 20,
            initial_gc_threshold: 64,
            max_instances: 64,
            max_object_fields: DEFAULT_MAX_FIELDS,
            timeslices: Timeslices::default(),
        }
    }
}

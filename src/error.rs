//! Error types for configuration and scheduling.
//!
//! Deciding on a message never fails; these errors only surface while building a
//! [`CooldownConfig`](crate::CooldownConfig) or wiring up a scheduler.

/// Errors produced when validating cooldown configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Cooldown initiation threshold must be > 0.
    #[error("cooldown_initiation_threshold must be > 0 (got {provided})")]
    InvalidThreshold {
        /// Value provided by caller.
        provided: u32,
    },
}

/// Errors produced by [`Scheduler`](crate::Scheduler) implementations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler worker has shut down and accepts no more tasks.
    #[error("scheduler is shut down")]
    Closed,
    /// `spawn()` was called outside of a tokio runtime.
    #[error("no tokio runtime available to host the scheduler worker")]
    NoRuntime,
    /// The dedicated scheduler thread or its runtime could not be created.
    #[error("failed to start scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl SchedulerError {
    /// Check if the scheduler refused work because it is shut down.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

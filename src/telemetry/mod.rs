//! Telemetry for duplicate message cooldowns.
//!
//! The filter emits a [`CooldownEvent`] whenever a message starts or leaves its
//! cooldown and after every decay pass. Events flow through a [`TelemetrySink`],
//! which can log, record, or forward them.
//!
//! Sinks are called from the scheduler worker, never from inside `decide`, so
//! a sink may log through a subscriber that runs the filter itself. They still
//! share the worker with every other scheduled task and must not block.

pub mod events;
pub mod sinks;

pub use events::CooldownEvent;
pub use sinks::{LogSink, MemorySink, MulticastSink, NullSink, TelemetrySink};

#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # hush
//!
//! Cooldown for duplicate log messages: once the exact same message has been
//! emitted `threshold` times in quick succession it is suppressed for a fixed
//! cooldown, then allowed again.
//!
//! ## Features
//!
//! - **Exact-match duplicate counting** on a sharded concurrent map with
//!   per-message atomic counters
//! - **Linear decay** forgiving a configurable number of duplicates per second
//! - **One eviction per threshold crossing**, decided by the atomic increment itself
//! - **Injectable scheduler** shared by all filters, with a deterministic test double
//! - **`tracing` integration** through [`DuplicateMessageLayer`] (feature `layer`)
//!
//! ## Quick Start
//!
//! ```rust
//! use hush::{CooldownConfig, CooldownFilter, CooldownScheduler, Verdict};
//! use std::sync::Arc;
//!
//! let scheduler = Arc::new(CooldownScheduler::dedicated().unwrap());
//! let filter = CooldownFilter::new(CooldownConfig::default(), scheduler);
//! filter.activate().unwrap();
//!
//! let verdicts: Vec<Verdict> = (0..25).map(|_| filter.decide(Some("db timeout"))).collect();
//! assert_eq!(verdicts.iter().filter(|v| v.is_deny()).count(), 6);
//!
//! filter.deactivate();
//! ```

pub mod config;
pub mod error;
pub mod filter;
#[cfg(feature = "layer")]
pub mod layer;
pub mod registry;
pub mod scheduler;
pub mod telemetry;

// Re-exports
pub use config::CooldownConfig;
pub use error::{ConfigError, SchedulerError};
pub use filter::{CooldownFilter, Observation, Verdict, DECAY_INTERVAL};
#[cfg(feature = "layer")]
pub use layer::DuplicateMessageLayer;
pub use registry::{DecaySummary, Registry};
pub use scheduler::{CooldownScheduler, ManualScheduler, Scheduler, TaskGroup};
pub use telemetry::{CooldownEvent, TelemetrySink};

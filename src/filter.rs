//! Duplicate message cooldown filter.
//!
//! Every candidate log message goes through [`CooldownFilter::decide`]. The
//! filter counts exact duplicates per message text; the call that brings a count
//! to the configured threshold schedules a one-shot eviction `cooldown` seconds
//! later, and every call at or above the threshold is denied until that eviction
//! removes the counter. A periodic decay tick forgives a steady trickle of
//! duplicates and drops counters of messages that went quiet.

use crate::config::CooldownConfig;
use crate::error::SchedulerError;
use crate::registry::{DecaySummary, Registry};
use crate::scheduler::{Scheduler, TaskGroup};
use crate::telemetry::{CooldownEvent, NullSink, TelemetrySink};
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::Duration;

/// Period of the decay tick, also the delay before the first tick.
pub const DECAY_INTERVAL: Duration = Duration::from_secs(1);

/// What the logging framework should do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No opinion; the framework applies its normal rules.
    Neutral,
    /// Suppress this message.
    Deny,
}

impl Verdict {
    /// True for [`Verdict::Deny`].
    pub fn is_deny(self) -> bool {
        matches!(self, Verdict::Deny)
    }
}

/// Detailed outcome of counting one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Post-increment duplicate count.
    pub count: i64,
    /// True when this call moved the count onto the threshold and scheduled the
    /// eviction.
    pub crossed_threshold: bool,
    /// Resulting verdict.
    pub verdict: Verdict,
}

/// State reachable from scheduled callbacks.
#[derive(Debug)]
struct Shared {
    config: CooldownConfig,
    registry: Registry,
    sink: Arc<dyn TelemetrySink>,
}

impl Shared {
    fn decay_sweep(&self) -> DecaySummary {
        let summary = self.registry.decay(
            self.config.threshold(),
            self.config.acceptable_duplicates_per_second(),
        );
        if summary.visited > 0 {
            tracing::trace!(
                target: "hush::filter",
                visited = summary.visited,
                decayed = summary.decayed,
                removed = summary.removed,
                "decay sweep"
            );
            self.sink.emit(&CooldownEvent::DecaySwept(summary));
        }
        summary
    }

    fn announce_cooldown(&self, message: &str, count: i64) {
        let cooldown = self.config.cooldown_duration();
        tracing::warn!(
            target: "hush::filter",
            count,
            cooldown_secs = cooldown.as_secs(),
            log_message = message,
            "duplicate message threshold reached, suppressing"
        );
        self.sink.emit(&CooldownEvent::CooldownStarted {
            message: message.to_owned(),
            count,
            cooldown,
        });
    }

    fn evict(&self, message: &str) -> bool {
        let removed = self.registry.remove(message);
        if removed {
            tracing::debug!(target: "hush::filter", log_message = message, "cooldown elapsed, clearing count");
            self.sink.emit(&CooldownEvent::CooldownLifted { message: message.to_owned() });
        }
        removed
    }
}

/// Suppresses exact duplicate log messages once they repeat too often.
///
/// The filter starts inactive: [`activate`](Self::activate) it before use and
/// [`deactivate`](Self::deactivate) it on shutdown. While inactive every message
/// is [`Verdict::Neutral`] and nothing is counted. Dropping the filter cancels
/// its scheduled work.
///
/// # Examples
/// ```
/// use hush::{CooldownConfig, CooldownFilter, ManualScheduler, Verdict};
/// use std::sync::Arc;
///
/// let scheduler = ManualScheduler::new();
/// let config = CooldownConfig::new(3, 30, 1).unwrap();
/// let filter = CooldownFilter::new(config, Arc::new(scheduler.clone()));
/// filter.activate().unwrap();
///
/// assert_eq!(filter.decide(Some("disk full")), Verdict::Neutral);
/// assert_eq!(filter.decide(Some("disk full")), Verdict::Neutral);
/// assert_eq!(filter.decide(Some("disk full")), Verdict::Deny);
/// assert_eq!(filter.decide(None), Verdict::Neutral);
/// ```
#[derive(Debug)]
pub struct CooldownFilter {
    shared: Arc<Shared>,
    scheduler: Arc<dyn Scheduler>,
    group: ArcSwapOption<TaskGroup>,
}

impl CooldownFilter {
    /// Create an inactive filter that schedules its work on `scheduler`.
    ///
    /// The scheduler is usually shared by every filter in the process.
    pub fn new(config: CooldownConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                registry: Registry::new(),
                sink: Arc::new(NullSink),
            }),
            scheduler,
            group: ArcSwapOption::empty(),
        }
    }

    /// Route cooldown events to `sink`.
    ///
    /// Meant to be called while building the filter; an active filter is
    /// deactivated and starts over with an empty registry.
    pub fn with_sink<S: TelemetrySink + 'static>(mut self, sink: S) -> Self {
        self.deactivate();
        self.shared = Arc::new(Shared {
            config: self.shared.config,
            registry: Registry::new(),
            sink: Arc::new(sink),
        });
        self
    }

    /// Start (or restart) the filter.
    ///
    /// Clears the registry and, when decay is enabled, schedules the decay tick
    /// every [`DECAY_INTERVAL`]. Work scheduled by a previous activation is
    /// cancelled first.
    pub fn activate(&self) -> Result<(), SchedulerError> {
        if let Some(previous) = self.group.swap(None) {
            previous.cancel();
        }
        self.shared.registry.clear();

        let group = TaskGroup::new();
        if self.shared.config.decay_enabled() {
            let shared = Arc::clone(&self.shared);
            let scheduled = self.scheduler.schedule_at_fixed_rate(
                &group,
                DECAY_INTERVAL,
                DECAY_INTERVAL,
                Arc::new(move || {
                    shared.decay_sweep();
                }),
            );
            if let Err(err) = scheduled {
                group.cancel();
                return Err(err);
            }
        }
        self.group.store(Some(Arc::new(group)));

        tracing::debug!(
            target: "hush::filter",
            threshold = self.shared.config.threshold(),
            cooldown_secs = self.shared.config.cooldown_duration().as_secs(),
            decay_per_second = self.shared.config.acceptable_duplicates_per_second(),
            "duplicate message filter activated"
        );
        Ok(())
    }

    /// Stop the filter: cancel the decay tick and pending evictions, then clear
    /// the registry.
    pub fn deactivate(&self) {
        if let Some(group) = self.group.swap(None) {
            group.cancel();
            tracing::debug!(target: "hush::filter", "duplicate message filter deactivated");
        }
        self.shared.registry.clear();
    }

    /// Whether the filter is currently active.
    pub fn is_active(&self) -> bool {
        self.group.load().is_some()
    }

    /// Decide whether `message` may be logged.
    ///
    /// `None` (an event without message text) is always [`Verdict::Neutral`]
    /// and leaves the registry untouched.
    pub fn decide(&self, message: Option<&str>) -> Verdict {
        message.and_then(|m| self.observe(m)).map_or(Verdict::Neutral, |o| o.verdict)
    }

    /// Count one occurrence of `message` and report the resulting state.
    ///
    /// Returns `None` when the filter is inactive.
    pub fn observe(&self, message: &str) -> Option<Observation> {
        let guard = self.group.load();
        let group = guard.as_deref()?;

        let threshold = self.shared.config.threshold();
        let step = self.shared.registry.increment(message, threshold);
        if step.crossed_threshold {
            self.start_cooldown(group, message, step.count);
        }

        let verdict =
            if step.count >= i64::from(threshold) { Verdict::Deny } else { Verdict::Neutral };
        Some(Observation { count: step.count, crossed_threshold: step.crossed_threshold, verdict })
    }

    /// Apply one decay step to every counter. Normally driven by the scheduler.
    pub fn decay_sweep(&self) -> DecaySummary {
        self.shared.decay_sweep()
    }

    /// Remove the counter for `message`, lifting any cooldown immediately.
    pub fn evict(&self, message: &str) -> bool {
        self.shared.evict(message)
    }

    /// Forget every counter.
    pub fn reset(&self) {
        self.shared.registry.clear();
    }

    /// Configuration in use.
    pub fn config(&self) -> &CooldownConfig {
        &self.shared.config
    }

    /// Read access to the live counters.
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    fn start_cooldown(&self, group: &TaskGroup, message: &str, count: i64) {
        let cooldown = self.shared.config.cooldown_duration();

        // `decide` may run inside a tracing dispatch, where nested events are
        // dropped, so the notice goes out from the scheduler.
        let shared = Arc::clone(&self.shared);
        let key = message.to_owned();
        let announced = self.scheduler.schedule_once(
            group,
            Duration::ZERO,
            Box::new(move || shared.announce_cooldown(&key, count)),
        );
        if announced.is_err() {
            self.shared.announce_cooldown(message, count);
        }

        let shared = Arc::clone(&self.shared);
        let key = message.to_owned();
        let scheduled = self.scheduler.schedule_once(
            group,
            cooldown,
            Box::new(move || {
                shared.evict(&key);
            }),
        );
        if let Err(err) = scheduled {
            tracing::warn!(
                target: "hush::filter",
                error = %err,
                log_message = message,
                "failed to schedule cooldown eviction"
            );
        }
    }
}

impl Drop for CooldownFilter {
    fn drop(&mut self) {
        if let Some(group) = self.group.swap(None) {
            group.cancel();
        }
    }
}

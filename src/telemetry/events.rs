use crate::registry::DecaySummary;
use std::fmt;
use std::time::Duration;

/// Events emitted by a [`CooldownFilter`](crate::CooldownFilter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownEvent {
    /// A message reached the threshold and is now denied.
    ///
    /// Emitted once per crossing, by the caller whose increment crossed.
    CooldownStarted {
        /// The suppressed message text.
        message: String,
        /// Count that triggered the cooldown (equal to the threshold).
        count: i64,
        /// How long the message stays suppressed.
        cooldown: Duration,
    },
    /// A scheduled eviction removed a message; it may be logged again.
    CooldownLifted {
        /// The released message text.
        message: String,
    },
    /// A periodic decay pass finished.
    DecaySwept(DecaySummary),
}

impl CooldownEvent {
    /// Message text this event is about, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            CooldownEvent::CooldownStarted { message, .. }
            | CooldownEvent::CooldownLifted { message } => Some(message.as_str()),
            CooldownEvent::DecaySwept(_) => None,
        }
    }
}

impl fmt::Display for CooldownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CooldownEvent::CooldownStarted { message, count, cooldown } => {
                write!(f, "CooldownStarted(count={}, cooldown={:?}, message={:?})", count, cooldown, message)
            }
            CooldownEvent::CooldownLifted { message } => {
                write!(f, "CooldownLifted(message={:?})", message)
            }
            CooldownEvent::DecaySwept(summary) => write!(
                f,
                "DecaySwept(visited={}, decayed={}, removed={})",
                summary.visited, summary.decayed, summary.removed
            ),
        }
    }
}

//! `tracing` integration: drop events whose message is in cooldown.

use crate::filter::CooldownFilter;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

// Targets of the crate's own diagnostics.
const INTERNAL_TARGETS: [&str; 3] = ["hush::filter", "hush::scheduler", "hush::telemetry"];

/// A [`Layer`] that disables events denied by a [`CooldownFilter`].
///
/// The event's `message` field, formatted, is the duplicate key; other fields
/// are ignored. Events without a message are never suppressed, and neither are
/// the filter's own diagnostics, which are not counted either. Because the
/// decision is made in `event_enabled`, a denied event is skipped by every
/// layer of the subscriber.
///
/// ```
/// use hush::{CooldownConfig, CooldownFilter, CooldownScheduler, DuplicateMessageLayer};
/// use std::sync::Arc;
/// use tracing_subscriber::layer::SubscriberExt;
///
/// let scheduler = Arc::new(CooldownScheduler::dedicated().unwrap());
/// let filter = Arc::new(CooldownFilter::new(CooldownConfig::default(), scheduler));
/// filter.activate().unwrap();
///
/// let subscriber = tracing_subscriber::registry()
///     .with(tracing_subscriber::fmt::layer())
///     .with(DuplicateMessageLayer::new(filter));
/// # drop(subscriber);
/// ```
#[derive(Debug, Clone)]
pub struct DuplicateMessageLayer {
    filter: Arc<CooldownFilter>,
}

impl DuplicateMessageLayer {
    pub fn new(filter: Arc<CooldownFilter>) -> Self {
        Self { filter }
    }

    /// The filter consulted for each event.
    pub fn filter(&self) -> &Arc<CooldownFilter> {
        &self.filter
    }
}

impl<S> Layer<S> for DuplicateMessageLayer
where
    S: Subscriber,
{
    fn event_enabled(&self, event: &Event<'_>, _ctx: Context<'_, S>) -> bool {
        if INTERNAL_TARGETS.contains(&event.metadata().target()) {
            return true;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        !self.filter.decide(visitor.message.as_deref()).is_deny()
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned());
        }
    }

    // `format_args!` messages arrive here; their Debug output is the plain text.
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        }
    }
}

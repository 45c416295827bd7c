use super::events::CooldownEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A telemetry sink that consumes cooldown events.
pub trait TelemetrySink: Send + Sync + std::fmt::Debug {
    /// Handle one event. Must not block.
    fn emit(&self, event: &CooldownEvent);
}

/// A no-op telemetry sink that discards all events.
#[derive(Clone, Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: &CooldownEvent) {}
}

/// A telemetry sink that logs events using the `tracing` crate.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl TelemetrySink for LogSink {
    fn emit(&self, event: &CooldownEvent) {
        tracing::info!(target: "hush::telemetry", event = %event, "cooldown_event");
    }
}

/// A telemetry sink that stores events in memory.
///
/// Bounded: once `capacity` events are held the oldest one is dropped and
/// counted in [`MemorySink::evicted`].
#[derive(Clone, Debug)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<CooldownEvent>>>,
    capacity: usize,
    evicted: Arc<AtomicU64>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            capacity: capacity.max(1),
            evicted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn events(&self) -> Vec<CooldownEvent> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CooldownEvent>> {
        self.events.lock().expect("memory sink poisoned")
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: &CooldownEvent) {
        let mut guard = self.lock();
        if guard.len() >= self.capacity {
            guard.remove(0);
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        guard.push(event.clone());
    }
}

/// Sends every event to both wrapped sinks, `a` first.
#[derive(Clone, Debug)]
pub struct MulticastSink<A, B> {
    sink_a: A,
    sink_b: B,
}

impl<A, B> MulticastSink<A, B> {
    pub fn new(sink_a: A, sink_b: B) -> Self {
        Self { sink_a, sink_b }
    }
}

impl<A, B> TelemetrySink for MulticastSink<A, B>
where
    A: TelemetrySink,
    B: TelemetrySink,
{
    fn emit(&self, event: &CooldownEvent) {
        self.sink_a.emit(event);
        self.sink_b.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for SharedWriter {
        type Writer = SharedGuard;
        fn make_writer(&'a self) -> Self::Writer {
            SharedGuard(self.0.clone())
        }
    }

    struct SharedGuard(Arc<Mutex<Vec<u8>>>);
    impl std::io::Write for SharedGuard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn lifted(message: &str) -> CooldownEvent {
        CooldownEvent::CooldownLifted { message: message.into() }
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.emit(&lifted("a"));
        sink.emit(&lifted("b"));
        assert_eq!(sink.events(), vec![lifted("a"), lifted("b")]);
        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn memory_sink_evicts_oldest_at_capacity() {
        let sink = MemorySink::with_capacity(2);
        for m in ["a", "b", "c"] {
            sink.emit(&lifted(m));
        }
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.evicted(), 1);
        assert_eq!(sink.events()[0], lifted("b"));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(MemorySink::with_capacity(0).capacity(), 1);
    }

    #[test]
    fn multicast_reaches_both() {
        let a = MemorySink::new();
        let b = MemorySink::new();
        let sink = MulticastSink::new(a.clone(), b.clone());
        sink.emit(&lifted("x"));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
        NullSink.emit(&lifted("ignored"));
    }

    #[test]
    fn log_sink_writes_event_at_info() {
        let writer = SharedWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .without_time()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            LogSink.emit(&CooldownEvent::CooldownStarted {
                message: "db timeout".into(),
                count: 20,
                cooldown: Duration::from_secs(30),
            });
        });

        let output = String::from_utf8(writer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(output.lines().count(), 1);
        assert!(output.contains("INFO"));
        assert!(output.contains("hush::telemetry"));
        assert!(output.contains("cooldown_event"));
        assert!(output.contains("CooldownStarted(count=20"));
        assert!(output.contains("db timeout"));
    }
}

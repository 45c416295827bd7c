//! Time-driven dispatch of decay ticks and cooldown evictions.
//!
//! A [`Scheduler`] runs callbacks off the caller's thread. Filters share one
//! scheduler per process by holding an `Arc<dyn Scheduler>`; each filter
//! activation opens a [`TaskGroup`] so its work can be cancelled without
//! touching other filters.
//!
//! [`CooldownScheduler`] is the production implementation: a single tokio task
//! owning a deadline heap, so callbacks never run concurrently with each other.
//! [`ManualScheduler`] fires callbacks only when a test advances its virtual
//! clock.

use crate::error::SchedulerError;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Callback fired once.
pub type OnceTask = Box<dyn FnOnce() + Send + 'static>;
/// Callback fired on every period.
pub type RepeatingTask = Arc<dyn Fn() + Send + Sync + 'static>;

const MIN_PERIOD: Duration = Duration::from_millis(1);
const WORKER_THREAD_NAME: &str = "hush-scheduler";

/// Cancellation scope for scheduled work.
///
/// Clones share the same flag. Once cancelled, no task scheduled under the group
/// fires again: pending one-shots are dropped and repeating tasks stop.
#[derive(Debug, Clone, Default)]
pub struct TaskGroup {
    cancelled: Arc<AtomicBool>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Abstraction over the background dispatcher so timing can be faked in tests.
pub trait Scheduler: Send + Sync + std::fmt::Debug {
    /// Run `task` once, `delay` from now.
    fn schedule_once(
        &self,
        group: &TaskGroup,
        delay: Duration,
        task: OnceTask,
    ) -> Result<(), SchedulerError>;

    /// Run `task` after `initial_delay` and then every `period`.
    ///
    /// Fixed rate: each deadline is the previous deadline plus `period`,
    /// regardless of how long the task took.
    fn schedule_at_fixed_rate(
        &self,
        group: &TaskGroup,
        initial_delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<(), SchedulerError>;
}

enum Job {
    Once(OnceTask),
    Repeating { period: Duration, task: RepeatingTask },
}

struct Scheduled<T> {
    deadline: T,
    seq: u64,
    group: TaskGroup,
    job: Job,
}

impl<T: Ord> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T: Ord> Eq for Scheduled<T> {}

impl<T: Ord> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

// Reversed so `BinaryHeap` pops the earliest deadline, FIFO among equals.
impl<T: Ord> Ord for Scheduled<T> {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.deadline.cmp(&self.deadline).then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Command {
    Schedule(Scheduled<Instant>),
    Shutdown,
}

/// Tokio-backed scheduler running every callback on one background task.
///
/// Scheduling is a non-blocking channel send, callable from any thread whether
/// or not it runs inside a runtime. Clones share the same worker, which stops
/// on [`shutdown`](Self::shutdown) or once every handle is dropped.
#[derive(Debug, Clone)]
pub struct CooldownScheduler {
    tx: mpsc::UnboundedSender<Command>,
}

impl CooldownScheduler {
    /// Start the worker on the current tokio runtime.
    pub fn spawn() -> Result<Self, SchedulerError> {
        let handle = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self::spawn_on(&handle))
    }

    /// Start the worker on the given runtime.
    pub fn spawn_on(handle: &Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(run_worker(rx));
        Self { tx }
    }

    /// Start the worker on its own OS thread with a single-threaded runtime.
    ///
    /// For applications that do not run tokio themselves.
    pub fn dedicated() -> Result<Self, SchedulerError> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.into())
            .spawn(move || runtime.block_on(run_worker(rx)))?;
        Ok(Self { tx })
    }

    /// Stop the worker. Pending tasks are dropped without running.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }

    /// True once the worker has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn submit(&self, group: &TaskGroup, delay: Duration, job: Job) -> Result<(), SchedulerError> {
        let scheduled =
            Scheduled { deadline: Instant::now() + delay, seq: 0, group: group.clone(), job };
        self.tx.send(Command::Schedule(scheduled)).map_err(|_| SchedulerError::Closed)
    }
}

impl Scheduler for CooldownScheduler {
    fn schedule_once(
        &self,
        group: &TaskGroup,
        delay: Duration,
        task: OnceTask,
    ) -> Result<(), SchedulerError> {
        self.submit(group, delay, Job::Once(task))
    }

    fn schedule_at_fixed_rate(
        &self,
        group: &TaskGroup,
        initial_delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<(), SchedulerError> {
        self.submit(group, initial_delay, Job::Repeating { period: period.max(MIN_PERIOD), task })
    }
}

async fn run_worker(mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut queue: BinaryHeap<Scheduled<Instant>> = BinaryHeap::new();
    let mut seq: u64 = 0;
    tracing::debug!(target: "hush::scheduler", "scheduler worker started");

    loop {
        let next = queue.peek().map(|s| s.deadline);
        // The sleep future is built even when the branch is disabled.
        let wake_at = next.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Schedule(mut scheduled)) => {
                    scheduled.seq = seq;
                    seq += 1;
                    queue.push(scheduled);
                }
                Some(Command::Shutdown) | None => break,
            },
            _ = tokio::time::sleep_until(wake_at), if next.is_some() => {
                run_due(&mut queue, &mut seq, Instant::now());
            }
        }
    }

    tracing::debug!(target: "hush::scheduler", pending = queue.len(), "scheduler worker stopped");
}

fn run_due<T>(queue: &mut BinaryHeap<Scheduled<T>>, seq: &mut u64, now: T)
where
    T: Ord + Copy + std::ops::Add<Duration, Output = T>,
{
    while queue.peek().is_some_and(|s| s.deadline <= now) {
        let Some(scheduled) = queue.pop() else { break };
        if scheduled.group.is_cancelled() {
            continue;
        }
        match scheduled.job {
            Job::Once(task) => task(),
            Job::Repeating { period, task } => {
                task();
                queue.push(Scheduled {
                    deadline: scheduled.deadline + period,
                    seq: *seq,
                    group: scheduled.group,
                    job: Job::Repeating { period, task },
                });
                *seq += 1;
            }
        }
    }
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    seq: u64,
    queue: BinaryHeap<Scheduled<Duration>>,
    scheduled_once: usize,
    scheduled_repeating: usize,
    closed: bool,
}

/// Test scheduler driven by an explicit virtual clock.
///
/// Nothing fires until [`advance`](Self::advance) is called; tasks then run on
/// the calling thread in deadline order.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("queued", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the virtual clock forward, firing every task that comes due.
    ///
    /// Repeating tasks fire once per elapsed period.
    pub fn advance(&self, by: Duration) {
        let target = self.lock().now + by;
        loop {
            let due = {
                let mut state = self.lock();
                match state.queue.peek() {
                    Some(s) if s.deadline <= target => {}
                    _ => break,
                }
                let Some(scheduled) = state.queue.pop() else { break };
                state.now = scheduled.deadline;
                scheduled
            };
            if due.group.is_cancelled() {
                continue;
            }
            // The lock is released so tasks may schedule more work.
            match due.job {
                Job::Once(task) => task(),
                Job::Repeating { period, task } => {
                    task();
                    let mut state = self.lock();
                    let seq = state.next_seq();
                    state.queue.push(Scheduled {
                        deadline: due.deadline + period,
                        seq,
                        group: due.group,
                        job: Job::Repeating { period, task },
                    });
                }
            }
        }
        self.lock().now = target;
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Tasks still waiting to fire, excluding cancelled groups.
    pub fn pending(&self) -> usize {
        self.lock().queue.iter().filter(|s| !s.group.is_cancelled()).count()
    }

    /// Total one-shot tasks ever accepted.
    pub fn scheduled_once(&self) -> usize {
        self.lock().scheduled_once
    }

    /// Total repeating tasks ever accepted.
    pub fn scheduled_repeating(&self) -> usize {
        self.lock().scheduled_repeating
    }

    /// Refuse all further scheduling, like a shut-down worker.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.queue.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().expect("manual scheduler poisoned")
    }

    fn push(&self, group: &TaskGroup, delay: Duration, job: Job) -> Result<(), SchedulerError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SchedulerError::Closed);
        }
        match job {
            Job::Once(_) => state.scheduled_once += 1,
            Job::Repeating { .. } => state.scheduled_repeating += 1,
        }
        let deadline = state.now + delay;
        let seq = state.next_seq();
        state.queue.push(Scheduled { deadline, seq, group: group.clone(), job });
        Ok(())
    }
}

impl ManualState {
    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(
        &self,
        group: &TaskGroup,
        delay: Duration,
        task: OnceTask,
    ) -> Result<(), SchedulerError> {
        self.push(group, delay, Job::Once(task))
    }

    fn schedule_at_fixed_rate(
        &self,
        group: &TaskGroup,
        initial_delay: Duration,
        period: Duration,
        task: RepeatingTask,
    ) -> Result<(), SchedulerError> {
        self.push(group, initial_delay, Job::Repeating { period: period.max(MIN_PERIOD), task })
    }
}

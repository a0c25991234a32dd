use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{CheckKey, CheckState, ScheduledCheck, TrackedSignal};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Work performed when a scheduled check comes due.
///
/// Implementations never fail outward: every problem is folded into the
/// terminal state they return.
#[async_trait]
pub trait CheckHandler: Send + Sync {
    async fn run(&self, signal: Arc<TrackedSignal>, check: ScheduledCheck) -> CheckState;
}

/// Registers deferred checks and cancels them. Abstracted so the tracker can be
/// tested against a recording double.
#[async_trait]
pub trait CheckScheduler: Send + Sync {
    /// Registers `check`, replacing any pending registration for the same key.
    async fn schedule(&self, signal: Arc<TrackedSignal>, check: ScheduledCheck);

    /// Drops every pending check of the signal. Returns how many were dropped.
    /// Checks that already fired are left alone.
    async fn cancel_signal(&self, signal_id: &str) -> usize;

    /// Forgets bookkeeping for finished checks.
    async fn prune_completed(&self) {}
}

#[derive(Debug)]
struct HeapEntry {
    deadline: Instant,
    seq: u64,
    key: CheckKey,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

struct PendingJob {
    seq: u64,
    signal: Arc<TrackedSignal>,
    check: ScheduledCheck,
}

#[derive(Default)]
struct Timers {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    /// The live registration per key. Heap entries whose `seq` no longer
    /// matches are stale and are dropped when they surface.
    jobs: HashMap<CheckKey, PendingJob>,
    states: HashMap<CheckKey, CheckState>,
    next_seq: u64,
}

impl Timers {
    fn pop_due(&mut self, now: Instant) -> Vec<PendingJob> {
        let mut due = Vec::new();
        while let Some(Reverse(top)) = self.heap.peek() {
            if top.deadline > now {
                break;
            }
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };
            let live = self
                .jobs
                .get(&entry.key)
                .is_some_and(|job| job.seq == entry.seq);
            if live {
                if let Some(job) = self.jobs.remove(&entry.key) {
                    self.states.insert(entry.key, CheckState::Fired);
                    due.push(job);
                }
            }
        }
        due
    }

    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse(top)) = self.heap.peek() {
            let live = self
                .jobs
                .get(&top.key)
                .is_some_and(|job| job.seq == top.seq);
            if live {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    fn compact(&mut self) {
        if self.heap.len() > 2 * self.jobs.len() + 64 {
            let jobs = &self.jobs;
            self.heap
                .retain(|Reverse(e)| jobs.get(&e.key).is_some_and(|job| job.seq == e.seq));
        }
    }
}

/// Converts a wall-clock fire time into a tokio deadline. Past times are due now.
fn deadline_for(fire_at: DateTime<Utc>) -> Instant {
    let delay = (fire_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    Instant::now() + delay
}

struct Shared {
    timers: Mutex<Timers>,
    wake: Notify,
    handler: Arc<dyn CheckHandler>,
    permits: Arc<Semaphore>,
}

/// A single-task timer wheel over a min-heap of deadlines.
///
/// Due checks are dispatched to the `CheckHandler` as independent tasks, at
/// most `max_concurrent` at a time. A check never fires before its
/// `fire_at`; overdue checks fire on the next loop turn.
#[derive(Clone)]
pub struct IntervalScheduler {
    shared: Arc<Shared>,
}

impl IntervalScheduler {
    pub fn new(handler: Arc<dyn CheckHandler>, max_concurrent: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                timers: Mutex::new(Timers::default()),
                wake: Notify::new(),
                handler,
                permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            }),
        }
    }

    /// Starts the background timer loop. Registrations made before this call are kept.
    pub fn start(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            info!("Interval scheduler started");
            shared.run().await;
        })
    }

    /// In-memory state of a check, if this process knows about it.
    pub async fn check_state(&self, key: &CheckKey) -> Option<CheckState> {
        self.shared.timers.lock().await.states.get(key).copied()
    }

    /// Number of checks waiting for their deadline.
    pub async fn pending_count(&self) -> usize {
        self.shared.timers.lock().await.jobs.len()
    }
}

impl Shared {
    async fn run(self: Arc<Self>) {
        loop {
            let (due, next) = {
                let mut timers = self.timers.lock().await;
                let due = timers.pop_due(Instant::now());
                (due, timers.next_deadline())
            };

            for job in due {
                self.clone().dispatch(job);
            }

            match next {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = self.wake.notified() => {}
                    }
                }
                None => self.wake.notified().await,
            }
        }
    }

    fn dispatch(self: Arc<Self>, job: PendingJob) {
        tokio::spawn(async move {
            let key = job.check.key();
            debug!(signal_id = %key.signal_id, interval = %key.interval, "Check due");

            let state = match self.permits.clone().acquire_owned().await {
                Ok(_permit) => {
                    let handler = self.handler.clone();
                    let task =
                        tokio::spawn(async move { handler.run(job.signal, job.check).await });
                    match task.await {
                        Ok(state) if state.is_terminal() => state,
                        Ok(state) => {
                            warn!(
                                signal_id = %key.signal_id,
                                interval = %key.interval,
                                state = %state,
                                "Handler returned a non-terminal state, recording SKIPPED"
                            );
                            CheckState::Skipped
                        }
                        Err(e) => {
                            error!(
                                signal_id = %key.signal_id,
                                interval = %key.interval,
                                error = %e,
                                "Check handler panicked, recording SKIPPED"
                            );
                            CheckState::Skipped
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Evaluation semaphore closed, recording SKIPPED");
                    CheckState::Skipped
                }
            };

            self.timers.lock().await.states.insert(key, state);
        });
    }
}

#[async_trait]
impl CheckScheduler for IntervalScheduler {
    async fn schedule(&self, signal: Arc<TrackedSignal>, check: ScheduledCheck) {
        let key = check.key();
        {
            let mut timers = self.shared.timers.lock().await;

            match timers.states.get(&key) {
                // Running or finished in this process; a reload must not fire it twice.
                Some(state) if *state != CheckState::Pending => return,
                _ => {}
            }
            if let Some(existing) = timers.jobs.get(&key) {
                if existing.check.fire_at == check.fire_at {
                    return;
                }
            }

            let seq = timers.next_seq;
            timers.next_seq += 1;
            let deadline = deadline_for(check.fire_at);
            timers.heap.push(Reverse(HeapEntry {
                deadline,
                seq,
                key: key.clone(),
            }));
            timers.jobs.insert(key.clone(), PendingJob { seq, signal, check });
            timers.states.insert(key, CheckState::Pending);
            timers.compact();
        }
        self.shared.wake.notify_one();
    }

    async fn cancel_signal(&self, signal_id: &str) -> usize {
        let mut timers = self.shared.timers.lock().await;
        let keys: Vec<CheckKey> = timers
            .jobs
            .keys()
            .filter(|key| key.signal_id == signal_id)
            .cloned()
            .collect();
        for key in &keys {
            timers.jobs.remove(key);
            timers.states.insert(key.clone(), CheckState::Cancelled);
        }
        keys.len()
    }

    async fn prune_completed(&self) {
        let mut timers = self.shared.timers.lock().await;
        timers.states.retain(|_, state| !state.is_terminal());
        timers.compact();
    }
}

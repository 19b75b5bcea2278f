//! Time-of-day scheduling for `at` triggers
//!
//! One thread owns a deadline heap fed by a command channel. It sleeps in
//! `recv_timeout` until the earliest deadline or the next command, then hands
//! due jobs to the dispatcher. Waits are capped so a wall-clock jump is
//! noticed within `MAX_WAIT`.
//!
//! The set of live registrations is shared between callers and the loop.
//! A job fires only if it is still live when popped, and firing retires it,
//! so a registration is either cancelled or fired, never both.

use crate::dispatcher::Dispatcher;
use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use hearth_dsl::evaluation::{Firing, FiringCause, RegistrationId, TriggerCallback};
use hearth_dsl::logging::codes;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const MAX_WAIT: Duration = Duration::from_secs(30);

// ============================================================================
// CLOCKS
// ============================================================================

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, to: NaiveDateTime) {
        *self.lock() = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        if let Ok(delta) = TimeDelta::from_std(by) {
            *now += delta;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NaiveDateTime> {
        self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.lock()
    }
}

/// Time from `now` until the next occurrence of `target`: later today, or
/// tomorrow when `target` is now or already past
pub fn delay_until(now: NaiveTime, target: NaiveTime) -> Duration {
    let day = TimeDelta::days(1);
    let mut delta = target.signed_duration_since(now);
    if delta <= TimeDelta::zero() {
        delta += day;
    }
    delta.to_std().unwrap_or_default()
}

// ============================================================================
// JOBS
// ============================================================================

struct Job {
    due: NaiveDateTime,
    sequence: u64,
    registration: RegistrationId,
    at: NaiveTime,
    callback: TriggerCallback,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.sequence).cmp(&(other.due, other.sequence))
    }
}

enum Command {
    Schedule(Job),
    Cancel(RegistrationId),
    Wake,
    Shutdown,
}

// ============================================================================
// SCHEDULER
// ============================================================================

type LiveSet = Arc<Mutex<HashSet<RegistrationId>>>;

fn lock_live(live: &LiveSet) -> MutexGuard<'_, HashSet<RegistrationId>> {
    live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Scheduler {
    commands: Sender<Command>,
    clock: Arc<dyn Clock>,
    live: LiveSet,
    sequence: AtomicU64,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn start(clock: Arc<dyn Clock>, dispatcher: Arc<Dispatcher>) -> std::io::Result<Self> {
        let (commands, receiver) = unbounded();
        let live: LiveSet = Arc::new(Mutex::new(HashSet::new()));

        let mut worker = SchedulerLoop {
            receiver,
            clock: Arc::clone(&clock),
            dispatcher,
            live: Arc::clone(&live),
            queue: BinaryHeap::new(),
        };

        let handle = thread::Builder::new()
            .name("hearth-scheduler".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            commands,
            clock,
            live,
            sequence: AtomicU64::new(0),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue `callback` for the next occurrence of `at`
    pub fn schedule(&self, registration: RegistrationId, at: NaiveTime, callback: TriggerCallback) {
        let now = self.clock.now();
        let due = TimeDelta::from_std(delay_until(now.time(), at))
            .map(|delta| now + delta)
            .unwrap_or(now);

        let job = Job {
            due,
            sequence: self.sequence.fetch_add(1, AtomicOrdering::SeqCst),
            registration,
            at,
            callback,
        };

        lock_live(&self.live).insert(registration);
        if self.commands.send(Command::Schedule(job)).is_err() {
            lock_live(&self.live).remove(&registration);
        }
    }

    /// Retire a registration that has not fired yet. Returns false when it
    /// already fired, was cancelled before, or was never scheduled here.
    pub fn cancel(&self, registration: RegistrationId) -> bool {
        if !lock_live(&self.live).remove(&registration) {
            return false;
        }
        let _ = self.commands.send(Command::Cancel(registration));
        true
    }

    pub fn is_live(&self, registration: RegistrationId) -> bool {
        lock_live(&self.live).contains(&registration)
    }

    /// Re-check deadlines now, e.g. after moving a manual clock
    pub fn wake(&self) {
        let _ = self.commands.send(Command::Wake);
    }

    /// Jobs accepted and not yet fired or cancelled
    pub fn pending(&self) -> usize {
        lock_live(&self.live).len()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                hearth_dsl::log_error!(codes::system::INTERNAL_ERROR, "Scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct SchedulerLoop {
    receiver: Receiver<Command>,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<Dispatcher>,
    live: LiveSet,
    queue: BinaryHeap<Reverse<Job>>,
}

impl SchedulerLoop {
    fn run(&mut self) {
        hearth_dsl::log_debug!("Scheduler started");
        loop {
            let timeout = self.next_timeout();
            let keep_running = match self.receiver.recv_timeout(timeout) {
                Ok(command) => self.apply(command) && self.drain(),
                Err(RecvTimeoutError::Timeout) => true,
                Err(RecvTimeoutError::Disconnected) => false,
            };
            if !keep_running {
                break;
            }
            self.fire_due();
        }
        hearth_dsl::log_debug!("Scheduler exiting", "pending" => self.queue.len());
    }

    /// Apply every queued command before looking at deadlines
    fn drain(&mut self) -> bool {
        while let Ok(command) = self.receiver.try_recv() {
            if !self.apply(command) {
                return false;
            }
        }
        true
    }

    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Schedule(job) => self.queue.push(Reverse(job)),
            Command::Cancel(registration) => {
                self.queue
                    .retain(|Reverse(job)| job.registration != registration);
            }
            Command::Wake => {}
            Command::Shutdown => return false,
        }
        true
    }

    fn next_timeout(&self) -> Duration {
        let Some(Reverse(next)) = self.queue.peek() else {
            return MAX_WAIT;
        };
        (next.due - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(MAX_WAIT)
    }

    fn fire_due(&mut self) {
        let now = self.clock.now();
        while self
            .queue
            .peek()
            .is_some_and(|Reverse(next)| next.due <= now)
        {
            let Some(Reverse(job)) = self.queue.pop() else {
                break;
            };
            if !lock_live(&self.live).remove(&job.registration) {
                continue;
            }

            let firing = Firing {
                registration: job.registration,
                cause: FiringCause::Scheduled { at: job.at },
            };
            self.dispatcher.dispatch(firing, job.callback);
        }
    }
}

//! Worker pool running trigger firings
//!
//! Each firing runs on its own short-lived thread; a pool worker waits for
//! it at most the firing timeout, then logs and moves on. A stuck body keeps
//! its own thread but never holds up a worker past the timeout.

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use hearth_dsl::config::runtime::DispatchPreferences;
use hearth_dsl::evaluation::{Firing, TriggerCallback};
use hearth_dsl::logging::codes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

struct Job {
    firing: Firing,
    callback: TriggerCallback,
}

/// Counters shared by every worker
#[derive(Debug, Default)]
pub struct DispatchStats {
    completed: AtomicU64,
    timed_out: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::SeqCst)
    }

    /// Firings whose thread could not start or panicked
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }
}

pub struct Dispatcher {
    jobs: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<DispatchStats>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(preferences: DispatchPreferences) -> std::io::Result<Self> {
        let (jobs, receiver) = unbounded::<Job>();
        let stats = Arc::new(DispatchStats::default());
        let timeout = Duration::from_millis(preferences.firing_timeout_ms);
        let count = preferences.worker_threads.max(1);

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let receiver = receiver.clone();
            let stats = Arc::clone(&stats);
            let handle = thread::Builder::new()
                .name(format!("hearth-dispatch-{}", index))
                .spawn(move || work(receiver, stats, timeout))?;
            workers.push(handle);
        }

        hearth_dsl::log_debug!("Dispatcher started",
            "workers" => count,
            "firing_timeout_ms" => preferences.firing_timeout_ms
        );

        Ok(Self {
            jobs: Mutex::new(Some(jobs)),
            workers: Mutex::new(workers),
            stats,
            timeout,
        })
    }

    /// Queue one firing. Dropped with an error log after shutdown.
    pub fn dispatch(&self, firing: Firing, callback: TriggerCallback) {
        let jobs = self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let sent = match jobs.as_ref() {
            Some(sender) => sender.send(Job { firing, callback }).is_ok(),
            None => false,
        };
        if !sent {
            self.stats.failed.fetch_add(1, Ordering::SeqCst);
            hearth_dsl::log_error!(
                codes::dispatch::FIRING_FAILED,
                "Dispatcher is shut down, firing dropped"
            );
        }
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn firing_timeout(&self) -> Duration {
        self.timeout
    }

    /// Stop accepting firings and wait for queued ones to be picked up
    pub fn shutdown(&self) {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();
        for worker in workers {
            if worker.join().is_err() {
                hearth_dsl::log_error!(codes::system::INTERNAL_ERROR, "Dispatch worker panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn work(receiver: Receiver<Job>, stats: Arc<DispatchStats>, timeout: Duration) {
    for job in receiver.iter() {
        let registration = job.firing.registration;
        let (done_tx, done_rx) = bounded::<()>(1);

        let spawned = thread::Builder::new()
            .name(format!("hearth-firing-{}", registration.0))
            .spawn(move || {
                (job.callback)(&job.firing);
                let _ = done_tx.send(());
            });

        if let Err(error) = spawned {
            stats.failed.fetch_add(1, Ordering::SeqCst);
            hearth_dsl::log_error!(
                codes::dispatch::FIRING_FAILED,
                "Could not start firing thread",
                "registration" => registration,
                "error" => error
            );
            continue;
        }

        match done_rx.recv_timeout(timeout) {
            Ok(()) => {
                stats.completed.fetch_add(1, Ordering::SeqCst);
            }
            Err(RecvTimeoutError::Timeout) => {
                stats.timed_out.fetch_add(1, Ordering::SeqCst);
                hearth_dsl::log_error!(
                    codes::dispatch::FIRING_TIMEOUT,
                    "Firing exceeded its timeout, worker moving on",
                    "registration" => registration,
                    "timeout_ms" => timeout.as_millis()
                );
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The callback panicked before signalling
                stats.failed.fetch_add(1, Ordering::SeqCst);
                hearth_dsl::log_error!(
                    codes::dispatch::FIRING_FAILED,
                    "Firing thread panicked",
                    "registration" => registration
                );
            }
        }
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker pool running callback jobs off the transport thread.
//!
//! Fixed pools start all workers up front. Elastic pools spawn a worker
//! whenever outstanding work exceeds the live workers (up to a ceiling);
//! an elastic worker idle for the keep-alive period retires.
//!
//! Shutdown is explicit and final: queued work is drained for the shutdown
//! grace period, then remaining queued work is cancelled and workers get the
//! force grace period to finish what they are running. Workers still busy
//! after that are abandoned and reported.

use crate::config::ExecutorConfig;
use crate::error::{LabmeshError, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolMode {
    Fixed(usize),
    Elastic { max_threads: usize, keep_alive: Duration },
}

#[derive(Default)]
struct PoolState {
    live: usize,
    /// Queued plus running jobs.
    outstanding: usize,
    cancelled: usize,
    next_worker: usize,
}

struct Shared {
    state: Mutex<PoolState>,
    changed: Condvar,
    cancelling: AtomicBool,
    rx: Receiver<Job>,
}

/// How a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReport {
    /// All queued work completed within the shutdown grace period.
    Graceful,
    /// Queued work was cancelled; running work finished within the force grace.
    Forced { cancelled: usize },
    /// Some workers were still busy after the force grace and were abandoned.
    Abandoned { cancelled: usize, stuck_workers: usize },
}

/// Callback worker pool.
pub struct CallbackExecutorManager {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Job>>>,
    mode: PoolMode,
    shutdown_grace: Duration,
    force_grace: Duration,
    report: Mutex<Option<ShutdownReport>>,
}

impl CallbackExecutorManager {
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        config.validate()?;
        let mode = match config.pool_size {
            Some(size) => PoolMode::Fixed(size),
            None => PoolMode::Elastic {
                max_threads: config.max_threads,
                keep_alive: config.keep_alive(),
            },
        };
        let (tx, rx) = channel::unbounded();
        let manager = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState::default()),
                changed: Condvar::new(),
                cancelling: AtomicBool::new(false),
                rx,
            }),
            sender: Mutex::new(Some(tx)),
            mode,
            shutdown_grace: config.shutdown_grace(),
            force_grace: config.force_grace(),
            report: Mutex::new(None),
        };

        if let PoolMode::Fixed(size) = mode {
            let mut state = manager.shared.state.lock();
            for _ in 0..size {
                manager.spawn_worker(&mut state)?;
            }
        }
        log::debug!("[executor] started ({:?})", mode);
        Ok(manager)
    }

    fn spawn_worker(&self, state: &mut PoolState) -> Result<()> {
        let id = state.next_worker;
        let shared = Arc::clone(&self.shared);
        let keep_alive = match self.mode {
            PoolMode::Fixed(_) => None,
            PoolMode::Elastic { keep_alive, .. } => Some(keep_alive),
        };
        thread::Builder::new()
            .name(format!("labmesh-worker-{}", id))
            .spawn(move || worker_loop(&shared, keep_alive))
            .map_err(LabmeshError::WorkerSpawn)?;
        state.next_worker += 1;
        state.live += 1;
        Ok(())
    }

    /// Queue a job. Fire-and-forget: the job's outcome is its own business.
    pub fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(LabmeshError::ExecutorShutdown);
        };

        let mut state = self.shared.state.lock();
        if tx.send(Box::new(job)).is_err() {
            return Err(LabmeshError::ExecutorShutdown);
        }
        state.outstanding += 1;

        if let PoolMode::Elastic { max_threads, .. } = self.mode {
            if state.outstanding > state.live && state.live < max_threads {
                if let Err(e) = self.spawn_worker(&mut state) {
                    log::warn!("[executor] cannot grow pool: {}", e);
                    if state.live == 0 {
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn live_workers(&self) -> usize {
        self.shared.state.lock().live
    }

    /// Queued plus running jobs.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().outstanding
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting work and wind the pool down. Idempotent: later calls
    /// return the first report.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut report = self.report.lock();
        if let Some(report) = *report {
            return report;
        }
        self.sender.lock().take();
        log::debug!("[executor] shutting down");

        if self.wait_idle(Instant::now() + self.shutdown_grace) {
            log::debug!("[executor] drained");
            *report = Some(ShutdownReport::Graceful);
            return ShutdownReport::Graceful;
        }

        self.shared.cancelling.store(true, Ordering::Release);
        while let Ok(job) = self.shared.rx.try_recv() {
            drop(job);
            let mut state = self.shared.state.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
            state.cancelled += 1;
        }
        let finished = self.wait_idle(Instant::now() + self.force_grace);

        let state = self.shared.state.lock();
        let outcome = if finished {
            log::warn!("[executor] cancelled {} queued job(s)", state.cancelled);
            ShutdownReport::Forced {
                cancelled: state.cancelled,
            }
        } else {
            log::error!(
                "[executor] giving up on {} stuck worker(s), {} job(s) cancelled",
                state.live,
                state.cancelled
            );
            ShutdownReport::Abandoned {
                cancelled: state.cancelled,
                stuck_workers: state.live,
            }
        };
        *report = Some(outcome);
        outcome
    }

    /// Wait until no work is outstanding and every worker has exited.
    fn wait_idle(&self, deadline: Instant) -> bool {
        let mut state = self.shared.state.lock();
        while state.outstanding > 0 || state.live > 0 {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out() {
                return state.outstanding == 0 && state.live == 0;
            }
        }
        true
    }
}

impl Drop for CallbackExecutorManager {
    fn drop(&mut self) {
        // Workers exit once the queue is drained.
        self.sender.lock().take();
    }
}

fn worker_loop(shared: &Shared, keep_alive: Option<Duration>) {
    loop {
        let job = match keep_alive {
            None => match shared.rx.recv() {
                Ok(job) => job,
                Err(_) => break,
            },
            Some(keep_alive) => match shared.rx.recv_timeout(keep_alive) {
                Ok(job) => job,
                Err(RecvTimeoutError::Timeout) => {
                    let mut state = shared.state.lock();
                    if shared.rx.is_empty() {
                        state.live -= 1;
                        shared.changed.notify_all();
                        log::trace!("[executor] idle worker retired");
                        return;
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
        };

        if shared.cancelling.load(Ordering::Acquire) {
            drop(job);
            let mut state = shared.state.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
            state.cancelled += 1;
            shared.changed.notify_all();
            continue;
        }

        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
            log::error!("[executor] job panicked");
        }

        let mut state = shared.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        shared.changed.notify_all();
    }

    let mut state = shared.state.lock();
    state.live -= 1;
    shared.changed.notify_all();
}

//! Processor thread lifecycle
//!
//! A [`WorkerHost`] owns one processor's worker state and the thread that
//! runs it. While stopped the host holds the worker directly; `start` moves
//! it onto a new thread and `stop` gets it back through the join handle, so
//! the worker is never shared and needs no locks.
//!
//! ```text
//! Unprepared -> Prepared -> Running <-> Stopped
//!      ^                                   |
//!      +------------ release --------------+
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use wfs_core::{SHUTDOWN_TIMEOUT_MS, WfsError, WfsResult};

use crate::stats::LoadMeter;

/// How long an idle worker waits before checking its input again
pub const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// No buffers allocated
    Unprepared,
    /// Buffers sized, filters reset, thread not started
    Prepared,
    /// Thread running
    Running,
    /// Thread joined, buffers kept
    Stopped,
}

impl ProcessorState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Unprepared => "Unprepared",
            Self::Prepared => "Prepared",
            Self::Running => "Running",
            Self::Stopped => "Stopped",
        }
    }
}

/// Flags and meters shared between a host and its worker thread
pub struct WorkerControl {
    running: AtomicBool,
    enabled: AtomicBool,
    load: LoadMeter,
}

impl WorkerControl {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            enabled: AtomicBool::new(true),
            load: LoadMeter::new(),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Disabled workers keep consuming input but emit silence
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    #[inline]
    pub fn load(&self) -> &LoadMeter {
        &self.load
    }
}

/// The part of a processor that runs on its thread
pub trait Worker: Send + 'static {
    /// Render every complete block currently queued. Returns the number of
    /// blocks rendered; zero means the thread may idle.
    fn process_available(&mut self, control: &WorkerControl) -> usize;

    /// Discard all transient audio: delay lines, filter history, queued input
    fn reset(&mut self);
}

pub struct WorkerHost<W: Worker> {
    name: String,
    state: ProcessorState,
    worker: Option<W>,
    thread: Option<JoinHandle<W>>,
    control: Arc<WorkerControl>,
}

impl<W: Worker> WorkerHost<W> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ProcessorState::Unprepared,
            worker: None,
            thread: None,
            control: Arc::new(WorkerControl::new()),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn state(&self) -> ProcessorState {
        self.state
    }

    #[inline]
    pub fn control(&self) -> &WorkerControl {
        &self.control
    }

    /// Replace the worker with a freshly prepared one
    pub fn install(&mut self, worker: W) -> WfsResult<()> {
        if self.state == ProcessorState::Running {
            return Err(WfsError::InvalidState {
                expected: "not running",
                actual: self.state.name(),
            });
        }
        self.worker = Some(worker);
        self.control.load.reset();
        self.state = ProcessorState::Prepared;
        log::info!("{}: prepared", self.name);
        Ok(())
    }

    /// Worker state, available only while no thread owns it
    #[inline]
    pub fn worker_mut(&mut self) -> Option<&mut W> {
        self.worker.as_mut()
    }

    /// Run one pass of the worker on the calling thread. Does nothing while
    /// the processor thread is running.
    pub fn process_pending(&mut self) -> usize {
        match self.worker.as_mut() {
            Some(worker) => worker.process_available(&self.control),
            None => 0,
        }
    }

    pub fn start(&mut self) -> WfsResult<()> {
        if self.state == ProcessorState::Running {
            return Ok(());
        }
        let Some(mut worker) = self.worker.take() else {
            return Err(WfsError::InvalidState {
                expected: "Prepared",
                actual: self.state.name(),
            });
        };

        self.control.running.store(true, Ordering::Release);
        let control = Arc::clone(&self.control);

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                while control.is_running() {
                    if worker.process_available(&control) == 0 {
                        thread::park_timeout(IDLE_WAIT);
                    }
                }
                worker
            });

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                self.state = ProcessorState::Running;
                log::info!("{}: started", self.name);
                Ok(())
            }
            Err(source) => {
                // The worker went down with the closure
                self.control.running.store(false, Ordering::Release);
                self.state = ProcessorState::Unprepared;
                Err(WfsError::ThreadSpawn {
                    name: self.name.clone(),
                    source,
                })
            }
        }
    }

    /// Ask the thread to exit and wait up to one second for it.
    ///
    /// A thread that misses the deadline is detached and its worker lost; the
    /// host drops back to `Unprepared`.
    pub fn stop(&mut self) -> WfsResult<()> {
        let Some(handle) = self.thread.take() else {
            return Ok(());
        };

        self.control.running.store(false, Ordering::Release);
        handle.thread().unpark();

        let deadline = Instant::now() + Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                log::error!(
                    "{}: thread did not exit within {} ms, leaking it",
                    self.name,
                    SHUTDOWN_TIMEOUT_MS
                );
                self.state = ProcessorState::Unprepared;
                return Err(WfsError::ShutdownTimeout {
                    name: self.name.clone(),
                    timeout_ms: SHUTDOWN_TIMEOUT_MS,
                });
            }
            thread::sleep(IDLE_WAIT);
        }

        match handle.join() {
            Ok(worker) => {
                self.worker = Some(worker);
                self.state = ProcessorState::Stopped;
                log::info!("{}: stopped", self.name);
                Ok(())
            }
            Err(_) => {
                log::error!("{}: thread panicked", self.name);
                self.state = ProcessorState::Unprepared;
                Err(WfsError::ThreadPanicked(self.name.clone()))
            }
        }
    }

    /// Reset the worker's transient state. The thread must not be running.
    pub fn reset_worker(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            worker.reset();
        }
        self.control.load.reset();
    }

    /// Stop and drop the worker
    pub fn release(&mut self) -> WfsResult<()> {
        let result = self.stop();
        self.worker = None;
        if self.state != ProcessorState::Unprepared {
            log::info!("{}: released", self.name);
        }
        self.state = ProcessorState::Unprepared;
        result
    }
}

impl<W: Worker> Drop for WorkerHost<W> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

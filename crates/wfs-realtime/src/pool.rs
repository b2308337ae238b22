//! Fork-join parallel-for pool
//!
//! A fixed set of persistent workers plus the calling thread execute
//! `func(0..count)` together. Every participant claims indices with a shared
//! `fetch_add` until they run out, counting each finished item. The caller
//! spins (then yields) until every item is done, then retracts the job so
//! the workers go back to sleep on the condition variable.
//!
//! With `count <= 1` or no workers the loop runs on the caller, with the
//! same per-item effects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_utils::Backoff;
use parking_lot::{Condvar, Mutex};
use wfs_core::{EngineConfig, WfsError, WfsResult};

type Task<'a> = dyn Fn(usize) + Sync + 'a;

/// Lifetime-erased pointer to the caller's closure
#[derive(Clone, Copy)]
struct TaskPtr(*const Task<'static>);

// The pointee is Sync and outlives every use (see `ParallelFor::run`)
unsafe impl Send for TaskPtr {}

struct Job {
    generation: u64,
    task: Option<TaskPtr>,
}

struct Shared {
    job: Mutex<Job>,
    wake: Condvar,
    next_index: AtomicUsize,
    count: AtomicUsize,
    completed: AtomicUsize,
    /// Workers currently holding the task pointer
    active: AtomicUsize,
    shutdown: AtomicBool,
}

impl Shared {
    /// Claim and run items until none are left
    fn run_items(&self, task: &Task<'_>) {
        let count = self.count.load(Ordering::Acquire);
        loop {
            let index = self.next_index.fetch_add(1, Ordering::AcqRel);
            if index >= count {
                break;
            }
            task(index);
            self.completed.fetch_add(1, Ordering::AcqRel);
        }
    }
}

pub struct ParallelFor {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl ParallelFor {
    /// Start `num_workers` threads. Zero is valid: every call then runs
    /// sequentially on the caller.
    pub fn new(num_workers: usize) -> WfsResult<Self> {
        let shared = Arc::new(Shared {
            job: Mutex::new(Job {
                generation: 0,
                task: None,
            }),
            wake: Condvar::new(),
            next_index: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(num_workers),
        };

        for i in 0..num_workers {
            let shared = Arc::clone(&pool.shared);
            let name = format!("wfs-pool-{i}");
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&shared))
                .map_err(|source| WfsError::ThreadSpawn { name, source })?;
            pool.workers.push(handle);
        }

        log::debug!("Parallel-for pool started with {num_workers} workers");
        Ok(pool)
    }

    /// Same worker count as a default [`EngineConfig`]
    pub fn with_default_workers() -> WfsResult<Self> {
        Self::new(EngineConfig::default_pool_workers())
    }

    #[inline]
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Call `func(i)` exactly once for every `i` in `0..count`, in any order
    /// and on any participating thread. Returns when all calls have finished.
    ///
    /// `func` must not panic.
    pub fn run<F>(&mut self, count: usize, func: F)
    where
        F: Fn(usize) + Sync,
    {
        if count == 0 {
            return;
        }
        if count == 1 || self.workers.is_empty() {
            (0..count).for_each(func);
            return;
        }

        let task: &Task<'_> = &func;
        // SAFETY: the pointer is only dereferenced between publishing the
        // job below and `active` returning to zero, and this function does
        // not return before that. `func` lives on this stack frame until then.
        let task_ptr = TaskPtr(unsafe { std::mem::transmute::<&Task<'_>, &Task<'static>>(task) });

        let shared = &self.shared;
        shared.next_index.store(0, Ordering::Release);
        shared.completed.store(0, Ordering::Release);
        shared.count.store(count, Ordering::Release);
        {
            let mut job = shared.job.lock();
            job.generation = job.generation.wrapping_add(1);
            job.task = Some(task_ptr);
        }
        shared.wake.notify_all();

        shared.run_items(task);

        let backoff = Backoff::new();
        while shared.completed.load(Ordering::Acquire) < count {
            backoff.snooze();
        }

        // Retract the job, then wait out workers still inside it
        shared.job.lock().task = None;
        let backoff = Backoff::new();
        while shared.active.load(Ordering::Acquire) != 0 {
            backoff.snooze();
        }
    }
}

fn worker_loop(shared: &Shared) {
    let mut seen = 0u64;
    loop {
        let task_ptr = {
            let mut job = shared.job.lock();
            loop {
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                if job.generation != seen {
                    seen = job.generation;
                    if let Some(task_ptr) = job.task {
                        shared.active.fetch_add(1, Ordering::AcqRel);
                        break task_ptr;
                    }
                }
                shared.wake.wait(&mut job);
            }
        };

        // SAFETY: `run` keeps the closure alive until `active` drops to zero
        let task = unsafe { &*task_ptr.0 };
        shared.run_items(task);
        shared.active.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for ParallelFor {
    fn drop(&mut self) {
        {
            let _job = self.shared.job.lock();
            self.shared.shutdown.store(true, Ordering::Release);
        }
        self.shared.wake.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

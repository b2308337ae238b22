//! Deferred reclamation for shared engine data
//!
//! Routing snapshots are handed to the processor threads as
//! `basedrop::Shared<T>`. When a processor drops the last reference to a
//! retired snapshot the memory is not freed on that thread: the pointer is
//! queued and a background collector thread frees it later.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use basedrop::{Collector, Handle};
use parking_lot::Mutex;
use wfs_core::{WfsError, WfsResult};

/// How often the collector thread reclaims queued drops
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

static GC_HANDLE: Mutex<Option<Handle>> = Mutex::new(None);

fn spawn_collector() -> WfsResult<Handle> {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("wfs-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it lives and dies on this thread
            let mut collector = Collector::new();
            if tx.send(collector.handle()).is_err() {
                return;
            }

            log::info!("Collector thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .map_err(|source| WfsError::ThreadSpawn {
            name: "wfs-gc".to_string(),
            source,
        })?;

    rx.recv()
        .map_err(|_| WfsError::ThreadPanicked("wfs-gc".to_string()))
}

/// Handle for allocating `Shared<T>` values, starting the collector on first use
///
/// Control-rate only: takes a lock.
pub fn gc_handle() -> WfsResult<Handle> {
    let mut slot = GC_HANDLE.lock();
    if let Some(handle) = slot.as_ref() {
        return Ok(handle.clone());
    }
    let handle = spawn_collector()?;
    *slot = Some(handle.clone());
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basedrop::Shared;

    #[test]
    fn test_handle_is_reused() {
        let a = gc_handle().unwrap();
        let b = gc_handle().unwrap();
        let x = Shared::new(&a, vec![1.0f32; 16]);
        let y = Shared::new(&b, vec![2.0f32; 16]);
        assert_eq!(x[0] + y[0], 3.0);
    }
}

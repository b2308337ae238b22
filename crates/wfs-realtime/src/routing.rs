//! Routing snapshot publication
//!
//! The control thread builds a complete [`RoutingSnapshot`] and publishes it
//! with a single atomic pointer swap. Processor threads load the current
//! snapshot once per block and keep that reference for the whole block, so a
//! block never mixes coefficients from two publications.

use std::sync::atomic::{AtomicU64, Ordering};

use basedrop::{Handle, Shared, SharedCell};
use wfs_core::{RoutingSnapshot, WfsResult};

use crate::gc::gc_handle;

/// Atomically swappable routing coefficients
pub struct RoutingTable {
    cell: SharedCell<RoutingSnapshot>,
    handle: Handle,
    version: AtomicU64,
}

impl RoutingTable {
    pub fn new(initial: RoutingSnapshot) -> WfsResult<Self> {
        let handle = gc_handle()?;
        Ok(Self {
            cell: SharedCell::new(Shared::new(&handle, initial)),
            handle,
            version: AtomicU64::new(0),
        })
    }

    /// Replace the current snapshot. Returns the new version number.
    ///
    /// The previous snapshot is freed on the collector thread once the last
    /// processor drops it.
    pub fn publish(&self, snapshot: RoutingSnapshot) -> u64 {
        let inputs = snapshot.num_inputs();
        let outputs = snapshot.num_outputs();
        self.cell.set(Shared::new(&self.handle, snapshot));
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!("Published routing v{version} ({inputs}x{outputs})");
        version
    }

    /// Current snapshot
    #[inline]
    pub fn load(&self) -> Shared<RoutingSnapshot> {
        self.cell.get()
    }

    /// Number of publications so far
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

//! RT-safe deferred reclamation for shared engine state
//!
//! The port registry publishes immutable snapshots that the real-time
//! thread may be the last to drop. Freeing memory involves the allocator
//! (and possibly the kernel), which has no place inside the cycle
//! deadline, so snapshot and port ownership goes through `basedrop`:
//! dropping a `Shared<T>` on the audio thread only enqueues a pointer,
//! and the actual deallocation happens on a background collector thread.

use basedrop::{Collector, Handle};
use std::sync::mpsc;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

/// Global handle for creating `Shared<T>` allocations
///
/// Initialized once; clones are cheap. The collector itself lives on a
/// dedicated thread.
static GC_HANDLE: OnceLock<Handle> = OnceLock::new();

/// How often the collector sweeps retired allocations
const COLLECT_INTERVAL: Duration = Duration::from_millis(100);

fn init_gc() -> Handle {
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
        .name("cadence-gc".to_string())
        .spawn(move || {
            // Collector is !Sync, so it must be created on its own thread
            let mut collector = Collector::new();

            let handle = collector.handle();
            tx.send(handle).expect("failed to send gc handle");

            log::info!("engine gc thread started");

            loop {
                collector.collect();
                thread::sleep(COLLECT_INTERVAL);
            }
        })
        .expect("failed to spawn engine gc thread");

    rx.recv().expect("failed to receive gc handle")
}

/// Get a handle for creating `Shared<T>` allocations
pub fn gc_handle() -> Handle {
    GC_HANDLE.get_or_init(init_gc).clone()
}

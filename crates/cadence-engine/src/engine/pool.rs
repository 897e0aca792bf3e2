//! Per-thread event pools
//!
//! Every thread that submits session events draws records from its own
//! lazily-created pool. Allocation from the pool and release back into it
//! are lock-free bounded-queue operations, so the real-time thread can
//! return consumed events without blocking or freeing memory. Growth past
//! the pre-sized capacity heap-allocates and is therefore reserved for
//! non-real-time threads - the real-time thread only ever *releases*.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam::queue::ArrayQueue;

use crate::engine::event::SessionEvent;

/// A bounded free list of event records for one submitting thread
pub struct EventPool {
    free: ArrayQueue<Box<SessionEvent>>,
    /// Records heap-allocated because the free list ran dry
    grown: AtomicU64,
    /// Returned records dropped because the free list was full
    ///
    /// Only possible after growth; the queue is sized past the
    /// pre-allocation so steady-state returns always fit.
    lost: AtomicU64,
}

impl EventPool {
    /// Create a pool pre-filled with `prealloc` blank records
    pub fn with_capacity(prealloc: usize) -> Arc<Self> {
        let pool = Arc::new(Self {
            free: ArrayQueue::new(prealloc.max(1) * 2),
            grown: AtomicU64::new(0),
            lost: AtomicU64::new(0),
        });
        for _ in 0..prealloc {
            let _ = pool.free.push(Box::new(SessionEvent::blank()));
        }
        pool
    }

    /// Draw a record, growing the pool if it is exhausted
    ///
    /// Must not be called from the real-time thread: exhaustion allocates.
    pub fn alloc(self: &Arc<Self>) -> Box<SessionEvent> {
        let mut ev = self.free.pop().unwrap_or_else(|| {
            self.grown.fetch_add(1, Ordering::Relaxed);
            Box::new(SessionEvent::blank())
        });
        ev.reset(Arc::downgrade(self));
        ev
    }

    /// Return a consumed record to its originating pool
    ///
    /// Safe from any thread including the real-time thread: a bounded
    /// lock-free push, no deallocation. Records whose pool is gone, or
    /// whose pool is full after growth, are dropped in place.
    pub fn release(ev: Box<SessionEvent>) {
        if let Some(pool) = ev.home().upgrade() {
            if pool.free.push(ev).is_err() {
                pool.lost.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Records allocated past the pre-sized capacity
    pub fn grown(&self) -> u64 {
        self.grown.load(Ordering::Relaxed)
    }

    /// Records available right now
    pub fn available(&self) -> usize {
        self.free.len()
    }
}

static POOLS_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// (EventPools id, pool) pairs cached for this thread
    static THREAD_POOLS: RefCell<Vec<(usize, Arc<EventPool>)>> = const { RefCell::new(Vec::new()) };
}

/// The set of per-thread pools belonging to one engine
///
/// Pools are created lazily the first time a thread submits and stay alive
/// for the life of the engine, so an in-flight event can always find its
/// way home.
pub struct EventPools {
    id: usize,
    prealloc: usize,
    pools: Mutex<Vec<Arc<EventPool>>>,
}

impl EventPools {
    pub fn new(prealloc: usize) -> Self {
        Self {
            id: POOLS_ID.fetch_add(1, Ordering::Relaxed),
            prealloc,
            pools: Mutex::new(Vec::new()),
        }
    }

    /// The calling thread's pool, created on first use
    pub fn for_current_thread(&self) -> Arc<EventPool> {
        THREAD_POOLS.with(|tls| {
            let mut tls = tls.borrow_mut();
            if let Some((_, pool)) = tls.iter().find(|(id, _)| *id == self.id) {
                return Arc::clone(pool);
            }
            let pool = EventPool::with_capacity(self.prealloc);
            self.pools
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(Arc::clone(&pool));
            tls.push((self.id, Arc::clone(&pool)));
            log::debug!("created event pool for thread {:?}", std::thread::current().id());
            pool
        })
    }

    /// Number of pools created so far
    pub fn pool_count(&self) -> usize {
        self.pools.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_release_roundtrip() {
        let pool = EventPool::with_capacity(4);
        assert_eq!(pool.available(), 4);

        let ev = pool.alloc();
        assert_eq!(pool.available(), 3);

        EventPool::release(ev);
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.grown(), 0);
    }

    #[test]
    fn test_pool_growth() {
        let pool = EventPool::with_capacity(1);
        let a = pool.alloc();
        let b = pool.alloc();
        assert_eq!(pool.grown(), 1);

        EventPool::release(a);
        EventPool::release(b);
        // Both fit: capacity is twice the pre-allocation
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_per_thread_pools() {
        let pools = Arc::new(EventPools::new(8));
        let first = pools.for_current_thread();
        let again = pools.for_current_thread();
        assert!(Arc::ptr_eq(&first, &again));

        let pools2 = Arc::clone(&pools);
        std::thread::spawn(move || {
            pools2.for_current_thread();
        })
        .join()
        .unwrap();

        assert_eq!(pools.pool_count(), 2);
    }

    #[test]
    fn test_cross_thread_release() {
        let pool = EventPool::with_capacity(2);
        let ev = pool.alloc();

        let handle = std::thread::spawn(move || {
            EventPool::release(ev);
        });
        handle.join().unwrap();
        assert_eq!(pool.available(), 2);
    }
}

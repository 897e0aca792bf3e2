//! Session events - cross-thread transport scheduling
//!
//! Non-real-time threads describe transport actions (locate, loop, punch,
//! speed) as pool-allocated records, funnel them through a ring buffer,
//! and the real-time thread merges them into a time-ordered pending list
//! consumed at the correct cycle. The submission side never blocks the
//! consumer; the consumer never allocates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::engine::pool::{EventPool, EventPools};
use crate::engine::transport::Transport;
use crate::types::FramePos;

/// Action frame meaning "apply as soon as the real-time thread sees it"
pub const IMMEDIATE: FramePos = 0;

/// What a session event asks the transport to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SetTransportSpeed,
    Locate,
    /// Locate, then start rolling
    LocateRoll,
    SetLoop,
    RangeStop,
    Overwrite,
    /// Invoke the attached closure in the real-time context
    RealTimeOperation,

    // Only one of each of these can be pending at any one time
    PunchIn,
    PunchOut,
    StopOnce,
    AutoLoop,
}

impl EventKind {
    /// Kinds with at-most-one-pending semantics: a new submission replaces
    /// the outstanding one instead of queuing alongside it.
    pub fn is_singleton(self) -> bool {
        matches!(
            self,
            EventKind::PunchIn | EventKind::PunchOut | EventKind::StopOnce | EventKind::AutoLoop
        )
    }
}

/// How the pending list should incorporate an arriving event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventAction {
    /// Insert in time order
    #[default]
    Add,
    /// Remove the pending event of the same kind and frame
    Remove,
    /// Remove any pending event of the same kind, then insert
    Replace,
    /// Remove every pending event of the same kind
    Clear,
}

/// A closure applied on the real-time thread when its event is consumed
pub type RtApply = Box<dyn FnMut(&mut Transport) + Send>;

/// A pool-allocated transport action record
pub struct SessionEvent {
    pub kind: EventKind,
    pub action: EventAction,
    /// When, in transport time, the action should take effect
    pub action_frame: FramePos,
    /// Where/what the action requests (locate target, loop start, ...)
    pub target_frame: FramePos,
    /// Second position payload (loop end, punch end)
    pub second_target: FramePos,
    pub speed: f64,
    pub yes_or_no: bool,
    /// Optional work to run in the real-time context
    pub rt_apply: Option<RtApply>,
    seq: u64,
    home: Weak<EventPool>,
}

impl SessionEvent {
    /// An inert record for pool pre-fill
    pub(crate) fn blank() -> Self {
        Self {
            kind: EventKind::Locate,
            action: EventAction::Add,
            action_frame: IMMEDIATE,
            target_frame: 0,
            second_target: 0,
            speed: 0.0,
            yes_or_no: false,
            rt_apply: None,
            seq: 0,
            home: Weak::new(),
        }
    }

    /// Reinitialize a recycled record for its next use
    ///
    /// Runs on the allocating (non-real-time) thread, so dropping a stale
    /// closure here is fine.
    pub(crate) fn reset(&mut self, home: Weak<EventPool>) {
        self.kind = EventKind::Locate;
        self.action = EventAction::Add;
        self.action_frame = IMMEDIATE;
        self.target_frame = 0;
        self.second_target = 0;
        self.speed = 0.0;
        self.yes_or_no = false;
        self.rt_apply = None;
        self.seq = 0;
        self.home = home;
    }

    pub(crate) fn home(&self) -> &Weak<EventPool> {
        &self.home
    }

    /// Submission order stamp, assigned when the event is queued
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEvent")
            .field("kind", &self.kind)
            .field("action", &self.action)
            .field("action_frame", &self.action_frame)
            .field("target_frame", &self.target_frame)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Submission side of the event queue, shared by all non-real-time threads
///
/// Producers serialize through a mutex (permitted off the real-time path);
/// the single consumer is the real-time thread and is lock-free.
pub struct EventQueue {
    tx: Mutex<rtrb::Producer<Box<SessionEvent>>>,
    pools: Arc<EventPools>,
    overflow: AtomicU64,
}

impl EventQueue {
    /// Create the queue and its real-time consumer half
    pub fn with_capacity(capacity: usize, pools: Arc<EventPools>) -> (Self, PendingEvents) {
        let (tx, rx) = rtrb::RingBuffer::new(capacity);
        (
            Self {
                tx: Mutex::new(tx),
                pools,
                overflow: AtomicU64::new(0),
            },
            PendingEvents::new(rx, capacity),
        )
    }

    /// Allocate an event from the calling thread's pool
    pub fn alloc(&self, kind: EventKind, action_frame: FramePos, target_frame: FramePos) -> Box<SessionEvent> {
        let mut ev = self.pools.for_current_thread().alloc();
        ev.kind = kind;
        ev.action_frame = action_frame;
        ev.target_frame = target_frame;
        ev
    }

    /// Queue an event for the real-time thread
    ///
    /// Returns false (recycling the record) if the ring is full - the
    /// request is lost, not deferred, and the drop is counted.
    pub fn queue_event(&self, mut ev: Box<SessionEvent>) -> bool {
        let mut tx = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        // Stamped under the lock so ring order matches stamp order and
        // equal-frame ties stay in submission order.
        ev.seq = SEQ.fetch_add(1, Ordering::Relaxed);
        match tx.push(ev) {
            Ok(()) => true,
            Err(rtrb::PushError::Full(ev)) => {
                drop(tx);
                self.overflow.fetch_add(1, Ordering::Relaxed);
                log::warn!("event ring full, dropping {:?}", ev.kind);
                EventPool::release(ev);
                false
            }
        }
    }

    /// Remove any pending event of `kind`, then schedule a fresh one
    ///
    /// The at-most-one guarantee for singleton kinds rests on this: two
    /// competing punch-in or loop requests can never both be pending.
    pub fn replace_event(&self, kind: EventKind, action_frame: FramePos, target_frame: FramePos) -> bool {
        let mut ev = self.alloc(kind, action_frame, target_frame);
        ev.action = EventAction::Replace;
        self.queue_event(ev)
    }

    /// Remove every pending event of `kind`
    pub fn clear_events(&self, kind: EventKind) -> bool {
        let mut ev = self.alloc(kind, IMMEDIATE, 0);
        ev.action = EventAction::Clear;
        self.queue_event(ev)
    }

    /// Submissions lost to a full ring
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

static SEQ: AtomicU64 = AtomicU64::new(1);

/// Real-time consumer half: the time-ordered pending list
///
/// Owned exclusively by the real-time thread (inside the engine's process
/// state). All operations are allocation-free while the pending list stays
/// within its pre-reserved capacity.
pub struct PendingEvents {
    rx: rtrb::Consumer<Box<SessionEvent>>,
    pending: Vec<Box<SessionEvent>>,
    capacity: usize,
    dropped: u64,
}

impl PendingEvents {
    fn new(rx: rtrb::Consumer<Box<SessionEvent>>, capacity: usize) -> Self {
        Self {
            rx,
            pending: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Pop every queued submission and merge it into the pending list
    pub fn merge_queued(&mut self) {
        while let Ok(ev) = self.rx.pop() {
            self.merge(ev);
        }
    }

    fn merge(&mut self, ev: Box<SessionEvent>) {
        match ev.action {
            EventAction::Clear => {
                self.remove_kind(ev.kind);
                EventPool::release(ev);
            }
            EventAction::Remove => {
                let frame = ev.action_frame;
                let kind = ev.kind;
                if let Some(idx) = self
                    .pending
                    .iter()
                    .position(|e| e.kind == kind && e.action_frame == frame)
                {
                    EventPool::release(self.pending.remove(idx));
                }
                EventPool::release(ev);
            }
            EventAction::Replace => {
                self.remove_kind(ev.kind);
                self.insert(ev);
            }
            EventAction::Add => {
                // Singleton kinds replace even on a plain add
                if ev.kind.is_singleton() {
                    self.remove_kind(ev.kind);
                }
                self.insert(ev);
            }
        }
    }

    fn remove_kind(&mut self, kind: EventKind) {
        let mut i = 0;
        while i < self.pending.len() {
            if self.pending[i].kind == kind {
                EventPool::release(self.pending.remove(i));
            } else {
                i += 1;
            }
        }
    }

    /// Insert in (action_frame, seq) order
    pub(crate) fn insert(&mut self, ev: Box<SessionEvent>) {
        if self.pending.len() >= self.capacity {
            self.dropped += 1;
            EventPool::release(ev);
            return;
        }
        let idx = self.pending.partition_point(|e| {
            e.action_frame < ev.action_frame
                || (e.action_frame == ev.action_frame && e.seq <= ev.seq)
        });
        self.pending.insert(idx, ev);
    }

    /// Merge arrivals, then move every event due by `up_to` into `out`
    ///
    /// Events come out in non-decreasing action-frame order, ties in
    /// submission order. `out` should be pre-reserved by the caller.
    pub fn drain_due(&mut self, up_to: FramePos, out: &mut Vec<Box<SessionEvent>>) {
        self.merge_queued();
        let n = self.pending.partition_point(|e| e.action_frame <= up_to);
        out.extend(self.pending.drain(..n));
    }

    /// Next pending action frame, if any
    pub fn next_due(&self) -> Option<FramePos> {
        self.pending.first().map(|e| e.action_frame)
    }

    /// Events dropped because the pending list hit capacity
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Release everything still pending (engine teardown)
    pub fn clear_all(&mut self) {
        self.merge_queued();
        for ev in self.pending.drain(..) {
            EventPool::release(ev);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> (EventQueue, PendingEvents) {
        EventQueue::with_capacity(64, Arc::new(EventPools::new(16)))
    }

    #[test]
    fn test_events_drain_in_frame_order() {
        let (q, mut pending) = queue();

        for frame in [300u64, 100, 200] {
            let ev = q.alloc(EventKind::Locate, frame, frame * 2);
            q.queue_event(ev);
        }

        let mut out = Vec::with_capacity(8);
        pending.drain_due(1000, &mut out);
        let frames: Vec<u64> = out.iter().map(|e| e.action_frame).collect();
        assert_eq!(frames, vec![100, 200, 300]);
    }

    #[test]
    fn test_equal_frames_keep_submission_order() {
        let (q, mut pending) = queue();

        for target in [1u64, 2, 3] {
            q.queue_event(q.alloc(EventKind::Locate, 500, target));
        }

        let mut out = Vec::with_capacity(8);
        pending.drain_due(500, &mut out);
        let targets: Vec<u64> = out.iter().map(|e| e.target_frame).collect();
        assert_eq!(targets, vec![1, 2, 3]);
    }

    #[test]
    fn test_multithreaded_submission_ordering() {
        let (q, mut pending) = queue();
        let q = Arc::new(q);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let q = Arc::clone(&q);
                std::thread::spawn(move || {
                    for i in 0..8u64 {
                        q.queue_event(q.alloc(EventKind::Locate, t * 10 + i, 0));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut out = Vec::with_capacity(64);
        pending.drain_due(u64::MAX, &mut out);
        assert_eq!(out.len(), 32);
        for pair in out.windows(2) {
            assert!(pair[0].action_frame <= pair[1].action_frame);
            if pair[0].action_frame == pair[1].action_frame {
                assert!(pair[0].seq() < pair[1].seq());
            }
        }
    }

    #[test]
    fn test_singleton_replacement() {
        let (q, mut pending) = queue();

        q.replace_event(EventKind::PunchIn, 1000, 42);
        q.replace_event(EventKind::PunchIn, 2000, 99);

        let mut out = Vec::with_capacity(8);
        pending.drain_due(u64::MAX, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].action_frame, 2000);
        assert_eq!(out[0].target_frame, 99);
    }

    #[test]
    fn test_singleton_add_still_replaces() {
        let (q, mut pending) = queue();

        q.queue_event(q.alloc(EventKind::AutoLoop, 800, 100));
        q.queue_event(q.alloc(EventKind::AutoLoop, 900, 200));

        let mut out = Vec::with_capacity(8);
        pending.drain_due(u64::MAX, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target_frame, 200);
    }

    #[test]
    fn test_clear_events() {
        let (q, mut pending) = queue();

        q.queue_event(q.alloc(EventKind::Locate, 100, 0));
        q.queue_event(q.alloc(EventKind::Locate, 200, 0));
        q.queue_event(q.alloc(EventKind::StopOnce, 300, 0));
        q.clear_events(EventKind::Locate);

        let mut out = Vec::with_capacity(8);
        pending.drain_due(u64::MAX, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::StopOnce);
    }

    #[test]
    fn test_immediate_comes_first_while_stopped() {
        let (q, mut pending) = queue();

        q.queue_event(q.alloc(EventKind::SetLoop, 4096, 0));
        q.queue_event(q.alloc(EventKind::Locate, IMMEDIATE, 77));

        // Whatever cycle-relative frame is queried, the immediate locate
        // is first out.
        let mut out = Vec::with_capacity(8);
        pending.drain_due(0, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, EventKind::Locate);
        assert_eq!(out[0].target_frame, 77);
    }

    #[test]
    fn test_drain_respects_upper_bound() {
        let (q, mut pending) = queue();

        q.queue_event(q.alloc(EventKind::Locate, 100, 0));
        q.queue_event(q.alloc(EventKind::Locate, 5000, 0));

        let mut out = Vec::with_capacity(8);
        pending.drain_due(1024, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.next_due(), Some(5000));
    }

    #[test]
    fn test_events_recycle_to_pool() {
        let pools = Arc::new(EventPools::new(4));
        let (q, mut pending) = EventQueue::with_capacity(16, Arc::clone(&pools));
        let pool = pools.for_current_thread();

        q.queue_event(q.alloc(EventKind::Locate, 1, 0));
        let mut out = Vec::with_capacity(4);
        pending.drain_due(10, &mut out);
        for ev in out.drain(..) {
            EventPool::release(ev);
        }
        assert_eq!(pool.available(), 4);
    }
}

//! Transport state and event dispatch
//!
//! The transport is owned by the real-time thread (inside the engine's
//! process state). Each cycle it drains the due session events in action
//! frame order, applies them, and advances the playhead. Non-real-time
//! observers read position and state through relaxed atomics, never locks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::event::{EventKind, PendingEvents, SessionEvent};
use crate::engine::pool::EventPool;
use crate::types::{Declick, FrameCount, FramePos};

/// Lock-free transport state for observer threads
///
/// The real-time thread stores after every change; readers use relaxed
/// loads since only visibility matters.
pub struct TransportAtomics {
    position: AtomicU64,
    rolling: AtomicBool,
    speed_bits: AtomicU64,
}

impl TransportAtomics {
    fn new() -> Self {
        Self {
            position: AtomicU64::new(0),
            rolling: AtomicBool::new(false),
            speed_bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn position(&self) -> FramePos {
        self.position.load(Ordering::Relaxed)
    }

    pub fn rolling(&self) -> bool {
        self.rolling.load(Ordering::Relaxed)
    }

    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }
}

/// Global transport state, mutated only on the real-time thread
pub struct Transport {
    position: FramePos,
    speed: f64,
    rolling: bool,
    loop_range: Option<(FramePos, FramePos)>,
    loop_enabled: bool,
    punch_active: bool,
    pending_declick: Declick,
    overwrite_requested: bool,
    atomics: Arc<TransportAtomics>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            position: 0,
            speed: 0.0,
            rolling: false,
            loop_range: None,
            loop_enabled: false,
            punch_active: false,
            pending_declick: Declick::None,
            overwrite_requested: false,
            atomics: Arc::new(TransportAtomics::new()),
        }
    }

    /// Handle for observer threads
    pub fn atomics(&self) -> Arc<TransportAtomics> {
        Arc::clone(&self.atomics)
    }

    pub fn position(&self) -> FramePos {
        self.position
    }

    pub fn rolling(&self) -> bool {
        self.rolling
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn loop_range(&self) -> Option<(FramePos, FramePos)> {
        self.loop_range.filter(|_| self.loop_enabled)
    }

    pub fn punch_active(&self) -> bool {
        self.punch_active
    }

    /// Upper transport bound of a cycle starting now
    ///
    /// While stopped the window is the raw cycle length, so immediate and
    /// past-due events still apply.
    pub fn cycle_end(&self, n_frames: FrameCount) -> FramePos {
        let span = if self.rolling {
            (n_frames as f64 * self.speed.abs()).round() as u64
        } else {
            n_frames as u64
        };
        self.position.saturating_add(span)
    }

    /// Drain and apply every event due within this cycle
    ///
    /// `scratch` is a pre-reserved vec reused cycle to cycle; events are
    /// applied in non-decreasing action-frame order and returned to their
    /// pools, except auto-loop which re-arms itself for the next wrap.
    pub fn dispatch(
        &mut self,
        pending: &mut PendingEvents,
        scratch: &mut Vec<Box<SessionEvent>>,
        cycle_end: FramePos,
    ) {
        pending.drain_due(cycle_end, scratch);
        for mut ev in scratch.drain(..) {
            if self.apply(&mut ev) {
                pending.insert(ev);
            } else {
                EventPool::release(ev);
            }
        }
        self.publish();
    }

    /// Apply one event; returns true if it should be re-queued
    fn apply(&mut self, ev: &mut SessionEvent) -> bool {
        match ev.kind {
            EventKind::SetTransportSpeed => {
                self.set_speed(ev.speed);
            }
            EventKind::Locate => {
                self.locate(ev.target_frame, ev.yes_or_no);
            }
            EventKind::LocateRoll => {
                self.locate(ev.target_frame, true);
            }
            EventKind::SetLoop => {
                self.loop_range = Some((ev.target_frame, ev.second_target));
                self.loop_enabled = ev.yes_or_no;
            }
            EventKind::RangeStop | EventKind::StopOnce => {
                self.set_speed(0.0);
            }
            EventKind::PunchIn => {
                self.punch_active = true;
            }
            EventKind::PunchOut => {
                self.punch_active = false;
            }
            EventKind::Overwrite => {
                self.overwrite_requested = true;
            }
            EventKind::RealTimeOperation => {
                if let Some(f) = ev.rt_apply.as_mut() {
                    f(self);
                }
            }
            EventKind::AutoLoop => {
                if self.loop_enabled && self.rolling {
                    self.position = ev.target_frame;
                    self.pending_declick = Declick::FadeIn;
                    // Position jumped behind the loop end, so the same
                    // action frame arms the next wrap.
                    return true;
                }
            }
        }
        false
    }

    fn set_speed(&mut self, speed: f64) {
        let was_rolling = self.rolling;
        self.speed = speed;
        self.rolling = speed != 0.0;
        if self.rolling && !was_rolling {
            self.pending_declick = Declick::FadeIn;
        } else if !self.rolling && was_rolling {
            self.pending_declick = Declick::FadeOut;
        }
    }

    fn locate(&mut self, target: FramePos, with_roll: bool) {
        self.position = target;
        if with_roll && !self.rolling {
            self.speed = 1.0;
            self.rolling = true;
        }
        if self.rolling {
            self.pending_declick = Declick::FadeIn;
        }
    }

    /// Advance the playhead by one cycle's worth of frames
    pub fn advance(&mut self, n_frames: FrameCount) {
        if self.rolling {
            self.position = self
                .position
                .saturating_add((n_frames as f64 * self.speed.abs()).round() as u64);
        }
        self.publish();
    }

    /// Declick for this cycle, if a transition is pending
    pub fn take_pending_declick(&mut self) -> Declick {
        std::mem::replace(&mut self.pending_declick, Declick::None)
    }

    /// Whether a disk overwrite was requested since last asked
    pub fn take_overwrite_requested(&mut self) -> bool {
        std::mem::replace(&mut self.overwrite_requested, false)
    }

    fn publish(&self) {
        self.atomics.position.store(self.position, Ordering::Relaxed);
        self.atomics.rolling.store(self.rolling, Ordering::Relaxed);
        self.atomics
            .speed_bits
            .store(self.speed.to_bits(), Ordering::Relaxed);
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::event::{EventQueue, IMMEDIATE};
    use crate::engine::pool::EventPools;

    fn setup() -> (EventQueue, PendingEvents, Transport, Vec<Box<SessionEvent>>) {
        let (q, pending) = EventQueue::with_capacity(64, Arc::new(EventPools::new(16)));
        (q, pending, Transport::new(), Vec::with_capacity(64))
    }

    #[test]
    fn test_immediate_locate_applies_while_stopped() {
        let (q, mut pending, mut transport, mut scratch) = setup();

        q.queue_event(q.alloc(EventKind::Locate, IMMEDIATE, 48000));
        transport.dispatch(&mut pending, &mut scratch, transport.cycle_end(512));

        assert_eq!(transport.position(), 48000);
        assert!(!transport.rolling());
        assert_eq!(transport.atomics().position(), 48000);
    }

    #[test]
    fn test_speed_event_starts_and_stops_roll() {
        let (q, mut pending, mut transport, mut scratch) = setup();

        let mut ev = q.alloc(EventKind::SetTransportSpeed, IMMEDIATE, 0);
        ev.speed = 1.0;
        q.queue_event(ev);
        transport.dispatch(&mut pending, &mut scratch, 512);

        assert!(transport.rolling());
        assert_eq!(transport.take_pending_declick(), Declick::FadeIn);

        transport.advance(512);
        assert_eq!(transport.position(), 512);

        let mut ev = q.alloc(EventKind::SetTransportSpeed, IMMEDIATE, 0);
        ev.speed = 0.0;
        q.queue_event(ev);
        transport.dispatch(&mut pending, &mut scratch, transport.cycle_end(512));

        assert!(!transport.rolling());
        assert_eq!(transport.take_pending_declick(), Declick::FadeOut);
        transport.advance(512);
        assert_eq!(transport.position(), 512);
    }

    #[test]
    fn test_half_speed_advance() {
        let (q, mut pending, mut transport, mut scratch) = setup();

        let mut ev = q.alloc(EventKind::SetTransportSpeed, IMMEDIATE, 0);
        ev.speed = 0.5;
        q.queue_event(ev);
        transport.dispatch(&mut pending, &mut scratch, 512);
        transport.advance(512);
        assert_eq!(transport.position(), 256);
    }

    #[test]
    fn test_auto_loop_wraps_and_rearms() {
        let (q, mut pending, mut transport, mut scratch) = setup();

        let mut ev = q.alloc(EventKind::SetLoop, IMMEDIATE, 1000);
        ev.second_target = 2000;
        ev.yes_or_no = true;
        q.queue_event(ev);
        q.queue_event(q.alloc(EventKind::LocateRoll, IMMEDIATE, 1000));
        transport.dispatch(&mut pending, &mut scratch, 512);
        assert!(transport.rolling());
        assert_eq!(transport.loop_range(), Some((1000, 2000)));

        // Arm the wrap at the loop end
        q.queue_event(q.alloc(EventKind::AutoLoop, 2000, 1000));

        // Roll until the wrap frame falls inside a cycle
        for _ in 0..2 {
            transport.dispatch(&mut pending, &mut scratch, transport.cycle_end(512));
            transport.advance(512);
        }

        // Second cycle spans 1512..2024: the wrap fires, position jumps to
        // the loop start before the cycle's advance
        assert_eq!(transport.position(), 1512);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.next_due(), Some(2000));
    }

    #[test]
    fn test_stop_once_is_consumed() {
        let (q, mut pending, mut transport, mut scratch) = setup();

        let mut ev = q.alloc(EventKind::SetTransportSpeed, IMMEDIATE, 0);
        ev.speed = 1.0;
        q.queue_event(ev);
        q.queue_event(q.alloc(EventKind::StopOnce, 1024, 0));

        transport.dispatch(&mut pending, &mut scratch, 512);
        transport.advance(512);
        assert!(transport.rolling());

        transport.dispatch(&mut pending, &mut scratch, transport.cycle_end(512));
        transport.advance(512);
        assert!(!transport.rolling());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_punch_events_toggle_state() {
        let (q, mut pending, mut transport, mut scratch) = setup();

        q.queue_event(q.alloc(EventKind::PunchIn, IMMEDIATE, 0));
        transport.dispatch(&mut pending, &mut scratch, 512);
        assert!(transport.punch_active());

        q.queue_event(q.alloc(EventKind::PunchOut, IMMEDIATE, 0));
        transport.dispatch(&mut pending, &mut scratch, 512);
        assert!(!transport.punch_active());
    }

    #[test]
    fn test_rt_operation_runs_on_dispatch() {
        let (q, mut pending, mut transport, mut scratch) = setup();

        let hit = Arc::new(AtomicBool::new(false));
        let hit2 = Arc::clone(&hit);
        let mut ev = q.alloc(EventKind::RealTimeOperation, IMMEDIATE, 0);
        ev.rt_apply = Some(Box::new(move |t: &mut Transport| {
            hit2.store(t.position() == 0, Ordering::Relaxed);
        }));
        q.queue_event(ev);

        transport.dispatch(&mut pending, &mut scratch, 512);
        assert!(hit.load(Ordering::Relaxed));
    }

    #[test]
    fn test_overwrite_raises_butler_flag() {
        let (q, mut pending, mut transport, mut scratch) = setup();

        q.queue_event(q.alloc(EventKind::Overwrite, IMMEDIATE, 0));
        transport.dispatch(&mut pending, &mut scratch, 512);
        assert!(transport.take_overwrite_requested());
        assert!(!transport.take_overwrite_requested());
    }
}

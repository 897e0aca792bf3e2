//! Effective-mute decision
//!
//! A route is silenced for exactly one of two reasons: it was muted by
//! hand, or something else in the graph is soloed and this route is not
//! part of that solo. Both contributions are tracked independently so
//! un-soloing restores the hand-set state untouched. Solo-isolated routes
//! opt out of the second contribution entirely.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Count of self-soloed routes across the whole graph
///
/// Shared by every route of one engine; the effective-mute decision needs
/// to know whether *any* solo is active anywhere.
pub struct SessionSoloState {
    count: AtomicI32,
}

impl SessionSoloState {
    pub fn new() -> Self {
        Self {
            count: AtomicI32::new(0),
        }
    }

    pub(crate) fn modify(&self, delta: i32) {
        self.count.fetch_add(delta, Ordering::Relaxed);
    }

    /// Is any route currently self-soloed?
    pub fn soloing(&self) -> bool {
        self.count.load(Ordering::Relaxed) > 0
    }
}

impl Default for SessionSoloState {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-route mute state feeding the amplifier stage
pub struct MuteMaster {
    muted_by_self: AtomicBool,
    /// This route is audible with respect to solo (self-soloed or soloed
    /// by others up/downstream); maintained by the route's solo logic.
    soloed: AtomicBool,
    /// Solo-isolated: other routes' solo state never silences this one
    solo_ignore: AtomicBool,
}

impl MuteMaster {
    pub fn new() -> Self {
        Self {
            muted_by_self: AtomicBool::new(false),
            soloed: AtomicBool::new(false),
            solo_ignore: AtomicBool::new(false),
        }
    }

    pub fn set_muted_by_self(&self, yn: bool) {
        self.muted_by_self.store(yn, Ordering::Relaxed);
    }

    pub fn muted_by_self(&self) -> bool {
        self.muted_by_self.load(Ordering::Relaxed)
    }

    pub(crate) fn set_soloed(&self, yn: bool) {
        self.soloed.store(yn, Ordering::Relaxed);
    }

    pub(crate) fn set_solo_ignore(&self, yn: bool) {
        self.solo_ignore.store(yn, Ordering::Relaxed);
    }

    /// The single effective-mute decision
    ///
    /// `others_soloing` is the graph-wide solo flag; the solo cut applies
    /// only to routes that are neither part of the solo nor isolated.
    pub fn muted(&self, others_soloing: bool) -> bool {
        if self.muted_by_self.load(Ordering::Relaxed) {
            return true;
        }
        others_soloing
            && !self.soloed.load(Ordering::Relaxed)
            && !self.solo_ignore.load(Ordering::Relaxed)
    }

    /// Gain factor implied by the mute decision
    pub fn mute_gain(&self, others_soloing: bool) -> f32 {
        if self.muted(others_soloing) {
            0.0
        } else {
            1.0
        }
    }
}

impl Default for MuteMaster {
    fn default() -> Self {
        Self::new()
    }
}

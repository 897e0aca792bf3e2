//! Amplifier stage - gain, ramps, mute application
//!
//! The amp is the route's fader. Gain changes requested from control
//! threads land in a shared target; the amp ramps the applied gain toward
//! it over the cycle so steps never click. The effective-mute decision is
//! applied here as a gain of zero, ramped the same way.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::graph::mute::{MuteMaster, SessionSoloState};
use crate::graph::processor::Processor;
use crate::types::{BufferSet, ChanCount, FrameCount, FramePos, Sample};

/// Highest settable gain factor (~ +20 dB)
pub const MAX_GAIN: f32 = 10.0;

/// Changes below this are applied flat instead of ramped
const GAIN_EPSILON: f32 = 1e-5;

/// Shared gain target, written by control threads, read by the amp
pub struct GainControl {
    target_bits: AtomicU32,
}

impl GainControl {
    pub fn new(gain: f32) -> Self {
        Self {
            target_bits: AtomicU32::new(gain.to_bits()),
        }
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.target_bits.load(Ordering::Relaxed))
    }

    pub fn set(&self, gain: f32) {
        let gain = gain.clamp(0.0, MAX_GAIN);
        self.target_bits.store(gain.to_bits(), Ordering::Relaxed);
    }

    /// Multiply the target by a factor (relative fader moves)
    pub fn scale(&self, factor: f32) {
        self.set(self.get() * factor);
    }
}

/// The fader stage, always present in a route's chain
pub struct Amp {
    gain: Arc<GainControl>,
    mute: Arc<MuteMaster>,
    session_solo: Arc<SessionSoloState>,
    /// Gain actually applied at the end of the previous cycle
    current_gain: f32,
    streams: ChanCount,
    active: bool,
}

impl Amp {
    pub fn new(
        gain: Arc<GainControl>,
        mute: Arc<MuteMaster>,
        session_solo: Arc<SessionSoloState>,
    ) -> Self {
        Self {
            gain,
            mute,
            session_solo,
            current_gain: 1.0,
            streams: ChanCount::ZERO,
            active: true,
        }
    }

    /// Apply a linear gain ramp from `from` to `to` across the buffers
    ///
    /// Also used for the global declick at transport transitions.
    pub fn apply_gain_ramp(bufs: &mut BufferSet, n_frames: FrameCount, from: f32, to: f32) {
        if n_frames == 0 {
            return;
        }
        let step = (to - from) / n_frames as f32;
        for buf in bufs.iter_mut() {
            let mut g = from;
            let limit = n_frames.min(buf.len());
            for s in buf.as_mut_slice()[..limit].iter_mut() {
                *s *= g;
                g += step;
            }
        }
    }

    /// Apply a constant gain across the buffers
    pub fn apply_gain(bufs: &mut BufferSet, gain: f32) {
        if (gain - 1.0).abs() < GAIN_EPSILON {
            return;
        }
        for buf in bufs.iter_mut() {
            buf.scale(gain as Sample);
        }
    }

    /// The gain the amp last applied (post mute decision)
    pub fn applied_gain(&self) -> f32 {
        self.current_gain
    }
}

impl Processor for Amp {
    fn name(&self) -> &str {
        "amp"
    }

    fn can_support_io_configuration(&self, input: ChanCount) -> Option<ChanCount> {
        // A fader never changes the channel layout
        Some(input)
    }

    fn configure_io(&mut self, input: ChanCount, output: ChanCount) -> bool {
        if input != output {
            return false;
        }
        self.streams = input;
        true
    }

    fn run(
        &mut self,
        bufs: &mut BufferSet,
        _start_frame: FramePos,
        _end_frame: FramePos,
        n_frames: FrameCount,
        _replace: bool,
    ) {
        if !self.active {
            return;
        }

        let target = if self.mute.muted(self.session_solo.soloing()) {
            0.0
        } else {
            self.gain.get()
        };

        if (target - self.current_gain).abs() > GAIN_EPSILON {
            Self::apply_gain_ramp(bufs, n_frames, self.current_gain, target);
            self.current_gain = target;
        } else {
            Self::apply_gain(bufs, target);
        }
    }

    fn input_streams(&self) -> ChanCount {
        self.streams
    }

    fn output_streams(&self) -> ChanCount {
        self.streams
    }

    fn active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, yn: bool) {
        self.active = yn;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amp() -> Amp {
        let mut a = Amp::new(
            Arc::new(GainControl::new(1.0)),
            Arc::new(MuteMaster::new()),
            Arc::new(SessionSoloState::new()),
        );
        assert!(a.configure_io(ChanCount::audio(2), ChanCount::audio(2)));
        a
    }

    fn ones(channels: usize, frames: usize) -> BufferSet {
        let mut bufs = BufferSet::with_capacity(channels, frames);
        bufs.set_frame_len(frames);
        for buf in bufs.iter_mut() {
            for s in buf.as_mut_slice() {
                *s = 1.0;
            }
        }
        bufs
    }

    #[test]
    fn test_unity_gain_passthrough() {
        let mut a = amp();
        let mut bufs = ones(2, 64);
        a.run(&mut bufs, 0, 64, 64, false);
        assert_eq!(bufs.get(0).unwrap()[0], 1.0);
        assert_eq!(bufs.get(1).unwrap()[63], 1.0);
    }

    #[test]
    fn test_gain_step_ramps_over_cycle() {
        let mut a = amp();
        a.gain.set(0.5);

        let mut bufs = ones(1, 64);
        a.run(&mut bufs, 0, 64, 64, false);

        let buf = bufs.get(0).unwrap();
        // Ramp starts at unity and lands near the target
        assert_eq!(buf[0], 1.0);
        assert!((buf[63] - 0.5).abs() < 0.02);
        assert_eq!(a.applied_gain(), 0.5);

        // Next cycle is flat at the new gain
        let mut bufs = ones(1, 64);
        a.run(&mut bufs, 64, 128, 64, false);
        assert_eq!(bufs.get(0).unwrap()[0], 0.5);
    }

    #[test]
    fn test_mute_ramps_to_silence() {
        let mut a = amp();
        a.mute.set_muted_by_self(true);

        let mut bufs = ones(1, 32);
        a.run(&mut bufs, 0, 32, 32, false);
        let mut bufs2 = ones(1, 32);
        a.run(&mut bufs2, 32, 64, 32, false);

        // First cycle fades out, second is fully silent
        assert!(bufs2.get(0).unwrap().as_slice().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_solo_elsewhere_cuts_unsoloed_route() {
        let mut a = amp();
        a.session_solo.modify(1);

        let mut bufs = ones(1, 16);
        a.run(&mut bufs, 0, 16, 16, false);
        let mut bufs = ones(1, 16);
        a.run(&mut bufs, 16, 32, 16, false);
        assert!(bufs.get(0).unwrap().as_slice().iter().all(|s| *s == 0.0));

        // Being part of the solo restores the signal
        a.mute.set_soloed(true);
        let mut bufs = ones(1, 16);
        a.run(&mut bufs, 32, 48, 16, false);
        let mut bufs = ones(1, 16);
        a.run(&mut bufs, 48, 64, 16, false);
        assert_eq!(bufs.get(0).unwrap()[0], 1.0);
    }

    #[test]
    fn test_declick_ramp_endpoints() {
        let mut bufs = ones(1, 4);
        Amp::apply_gain_ramp(&mut bufs, 4, 0.0, 1.0);
        let buf = bufs.get(0).unwrap();
        assert_eq!(buf[0], 0.0);
        assert_eq!(buf[3], 0.75);
    }
}

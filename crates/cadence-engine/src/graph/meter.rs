//! Metering stage
//!
//! A passive tap in the route chain: it records per-channel peak levels
//! into atomics that observer threads read without locks, and passes the
//! audio through untouched. Positioned pre- or post-fader by the route.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::graph::processor::Processor;
use crate::types::{BufferSet, ChanCount, FrameCount, FramePos};

/// Lock-free per-channel levels for observer threads
pub struct MeterLevels {
    /// Peak of the most recent cycle, per channel, as f32 bits
    cycle_peaks: Vec<AtomicU32>,
    /// Running maximum since the last reset, per channel
    max_peaks: Vec<AtomicU32>,
}

impl MeterLevels {
    fn with_channels(channels: usize) -> Self {
        Self {
            cycle_peaks: (0..channels).map(|_| AtomicU32::new(0)).collect(),
            max_peaks: (0..channels).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Peak level of the last processed cycle
    pub fn peak(&self, channel: usize) -> f32 {
        self.cycle_peaks
            .get(channel)
            .map(|p| f32::from_bits(p.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    /// Highest peak seen since the last reset
    pub fn max_peak(&self, channel: usize) -> f32 {
        self.max_peaks
            .get(channel)
            .map(|p| f32::from_bits(p.load(Ordering::Relaxed)))
            .unwrap_or(0.0)
    }

    /// Clear the running maxima (UI "reset clip" action)
    pub fn reset_max(&self) {
        for p in &self.max_peaks {
            p.store(0.0f32.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn channels(&self) -> usize {
        self.cycle_peaks.len()
    }
}

/// The metering stage, always present in a route's chain
pub struct PeakMeter {
    levels: Arc<MeterLevels>,
    streams: ChanCount,
    active: bool,
}

impl PeakMeter {
    /// `max_channels` bounds the level slots; negotiation past it still
    /// succeeds, the extra channels just go unmetered.
    pub fn new(max_channels: usize) -> Self {
        Self {
            levels: Arc::new(MeterLevels::with_channels(max_channels)),
            streams: ChanCount::ZERO,
            active: true,
        }
    }

    /// Handle for observer threads
    pub fn levels(&self) -> Arc<MeterLevels> {
        Arc::clone(&self.levels)
    }
}

impl Processor for PeakMeter {
    fn name(&self) -> &str {
        "meter"
    }

    fn can_support_io_configuration(&self, input: ChanCount) -> Option<ChanCount> {
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
        for (ch, buf) in bufs.iter().enumerate() {
            let Some(slot) = self.levels.cycle_peaks.get(ch) else {
                break;
            };
            let mut peak = 0.0f32;
            for s in &buf.as_slice()[..n_frames.min(buf.len())] {
                peak = peak.max(s.abs());
            }
            slot.store(peak.to_bits(), Ordering::Relaxed);

            // Positive f32 bit patterns order like the floats themselves
            self.levels.max_peaks[ch].fetch_max(peak.to_bits(), Ordering::Relaxed);
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

    #[test]
    fn test_meter_captures_peak() {
        let mut meter = PeakMeter::new(2);
        meter.configure_io(ChanCount::audio(2), ChanCount::audio(2));
        let levels = meter.levels();

        let mut bufs = BufferSet::with_capacity(2, 16);
        bufs.set_frame_len(16);
        bufs.get_mut(0).unwrap()[3] = -0.8;
        bufs.get_mut(1).unwrap()[7] = 0.4;

        meter.run(&mut bufs, 0, 16, 16, false);
        assert_eq!(levels.peak(0), 0.8);
        assert_eq!(levels.peak(1), 0.4);

        // Audio is untouched
        assert_eq!(bufs.get(0).unwrap()[3], -0.8);
    }

    #[test]
    fn test_max_peak_holds_and_resets() {
        let mut meter = PeakMeter::new(1);
        meter.configure_io(ChanCount::audio(1), ChanCount::audio(1));
        let levels = meter.levels();

        let mut bufs = BufferSet::with_capacity(1, 8);
        bufs.set_frame_len(8);
        bufs.get_mut(0).unwrap()[0] = 0.9;
        meter.run(&mut bufs, 0, 8, 8, false);

        bufs.get_mut(0).unwrap()[0] = 0.1;
        meter.run(&mut bufs, 8, 16, 8, false);

        assert_eq!(levels.peak(0), 0.1);
        assert_eq!(levels.max_peak(0), 0.9);

        levels.reset_max();
        assert_eq!(levels.max_peak(0), 0.0);
    }
}

//! Processor contract for the route chain
//!
//! Everything in a route's chain - the built-in amplifier, meter and
//! delivery stages as well as external units - honors this trait. The
//! graph depends only on this contract; plugin hosting lives elsewhere.

use thiserror::Error;

use crate::types::{BufferSet, ChanCount, FrameCount, FramePos};

/// Which fixed slot a chain entry occupies
///
/// The always-present stages are addressed by tag, never discovered by
/// downcasting a heterogeneous list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorKind {
    /// The fader: gain ramps, mute application
    Amp,
    /// Metering tap
    Meter,
    /// Final delivery to the route's output ports
    MainDelivery,
    /// Anything else (inserts, sends, hosted units)
    Custom,
}

/// Channel-count negotiation failure
///
/// Reconfiguration is all-or-nothing: on this error the route still runs
/// its last known-good configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("processor '{name}' (slot {index}) cannot take {input} input channels")]
pub struct ConfigurationError {
    pub name: String,
    pub index: usize,
    pub input: ChanCount,
}

/// A unit transforming one cycle's buffer set in place
///
/// Contract for `run`:
///   - the buffer set arrives holding exactly `input_streams()` channels
///     and must leave holding `output_streams()`;
///   - no allocation, no blocking, no panic - this executes inside the
///     real-time cycle;
///   - an inactive processor must pass audio through unchanged.
pub trait Processor: Send {
    fn name(&self) -> &str;

    /// Can this unit run with `input` channels? Returns the output count
    /// it would produce, or None if the configuration is unsupported.
    fn can_support_io_configuration(&self, input: ChanCount) -> Option<ChanCount>;

    /// Commit a configuration previously approved by
    /// `can_support_io_configuration`. Returns false if the pair is
    /// refused after all; callers treat that as a negotiation failure.
    fn configure_io(&mut self, input: ChanCount, output: ChanCount) -> bool;

    /// Transform the buffer set for `[start_frame, end_frame)`
    ///
    /// `replace` tells sinks to overwrite rather than mix into their
    /// destination; pure transforms ignore it.
    fn run(
        &mut self,
        bufs: &mut BufferSet,
        start_frame: FramePos,
        end_frame: FramePos,
        n_frames: FrameCount,
        replace: bool,
    );

    /// Processing delay contributed by this unit, in frames
    fn signal_latency(&self) -> u64 {
        0
    }

    fn input_streams(&self) -> ChanCount;

    fn output_streams(&self) -> ChanCount;

    fn active(&self) -> bool;

    fn set_active(&mut self, yn: bool);
}

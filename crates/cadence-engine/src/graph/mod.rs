//! Processing graph - routes and their processor chains
//!
//! A route (track or bus) transforms one cycle's audio through an ordered
//! processor chain. The amp, meter and main delivery stages are always
//! present; everything else plugs in through the Processor trait.

pub mod amp;
pub mod delivery;
pub mod meter;
pub mod mute;
pub mod processor;
pub mod route;

pub use amp::{Amp, GainControl};
pub use delivery::MainDelivery;
pub use meter::{MeterLevels, PeakMeter};
pub use mute::{MuteMaster, SessionSoloState};
pub use processor::{ConfigurationError, Processor, ProcessorKind};
pub use route::{ChainProcessor, Placement, ProcessorEditError, RollOutcome, Route};

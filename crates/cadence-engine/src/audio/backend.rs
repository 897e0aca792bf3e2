//! Audio backend contract
//!
//! The engine core is backend-agnostic: a backend owns the real thing
//! (a JACK client, an offline render thread) and drives the engine by
//! calling `EngineDriver::cycle` once per buffer. Everything
//! backend-specific - xruns, server shutdown, rate/buffer renegotiation -
//! is forwarded into the driver's notification hooks rather than handled
//! here, so the rest of the system only ever sees engine signals.
//!
//! The control surface below runs on non-real-time threads; the process
//! callback itself never goes through this trait.

use crate::audio::error::AudioResult;
use crate::types::{DataType, PortDirection};

/// Control surface of an audio backend
///
/// Implementations: the JACK adapter (`jack-backend` feature, Linux) and
/// the offline driver used for freewheel-style rendering and tests.
pub trait AudioBackend: Send {
    fn name(&self) -> &str;

    /// Sample rate imposed by the backend
    fn sample_rate(&self) -> u32;

    /// Frames per cycle the backend will deliver
    fn buffer_size(&self) -> u32;

    /// Begin invoking the engine's cycle
    fn start(&mut self) -> AudioResult<()>;

    /// Stop invoking the cycle; `forever` releases backend resources
    fn stop(&mut self, forever: bool) -> AudioResult<()>;

    /// Toggle as-fast-as-possible rendering
    fn set_freewheel(&mut self, on: bool) -> AudioResult<()>;

    /// Ask the backend for a different cycle size; takes effect through
    /// the buffer-size-changed notification
    fn request_buffer_size(&mut self, _frames: u32) -> AudioResult<()> {
        Ok(())
    }

    /// Veto point for engine port registration
    ///
    /// A backend that mirrors engine ports (JACK) refuses here when the
    /// server does; the error string surfaces as a named registration
    /// failure.
    fn register_port(
        &mut self,
        _data_type: DataType,
        _name: &str,
        _direction: PortDirection,
    ) -> Result<(), String> {
        Ok(())
    }

    fn unregister_port(&mut self, _name: &str) -> Result<(), String> {
        Ok(())
    }
}

//! Audio backend layer
//!
//! The engine core never talks to an audio API directly: a backend owns
//! the real connection and drives `EngineDriver::cycle` once per buffer.
//!
//! - **Linux**: native JACK adapter (with the `jack-backend` feature)
//! - **Everywhere**: the offline backend, self-pacing cycles for
//!   freewheel-style rendering and tests
//!
//! Backend events (xrun, shutdown, rate/buffer changes) are forwarded as
//! engine signals; nothing backend-specific crosses this boundary.

mod backend;
mod error;
mod offline;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
mod jack_backend;

pub use backend::AudioBackend;
pub use error::{AudioError, AudioResult};
pub use offline::OfflineBackend;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
pub use jack_backend::JackBackend;

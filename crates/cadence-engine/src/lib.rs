//! Cadence Engine - the real-time audio execution core
//!
//! Once per fixed-size buffer cycle the engine routes, processes and
//! emits multi-channel audio under a hard deadline: no allocation, no
//! blocking locks, no unbounded work on the real-time thread. Mutations
//! arrive from other threads through copy-on-write snapshots and a
//! lock-free event queue; notifications flow back over a bounded channel.
//!
//! The pieces:
//! - [`engine::EngineDriver`] - the real-time cycle, transport and signals
//! - [`engine::PortRegistry`] - versioned copy-on-write port snapshots
//! - [`graph::Route`] - per-track/bus processor chains with gain, mute,
//!   solo and latency accounting
//! - [`audio`] - backend adapters (JACK, offline)

pub mod audio;
pub mod config;
pub mod engine;
pub mod graph;
pub mod types;

pub use types::*;

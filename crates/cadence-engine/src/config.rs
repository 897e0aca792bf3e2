//! Engine configuration
//!
//! Defines configuration for the engine core: backend client identity,
//! preferred buffer/sample-rate settings, solo policy and the sizing of
//! the real-time queues and pools.

use serde::{Deserialize, Serialize};

/// Maximum buffer size to pre-allocate (covers typical backend configurations)
/// Common values: 64, 128, 256, 512, 1024, 2048, 4096 frames
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames)
/// 512 frames is a safe default that works on most systems
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default sample rate when the backend does not impose one (48kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Events pre-allocated per submitting thread's pool
///
/// The real-time thread is guaranteed a pre-sized pool and must never
/// trigger growth; non-real-time pools grow on demand past this.
pub const DEFAULT_EVENT_POOL_SIZE: usize = 128;

/// Capacity of the shared event submission ring and of the pending list
///
/// Large enough that a burst of control-surface traffic within one cycle
/// cannot overflow it.
pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 2048;

/// Capacity of the real-time -> observer signal channel
///
/// Signals are dropped (and counted) rather than blocking the real-time
/// side when observers fall behind.
pub const DEFAULT_SIGNAL_CAPACITY: usize = 256;

/// Configuration for the engine core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Client name announced to the audio backend
    pub client_name: String,

    /// Preferred buffer size in frames (None = accept the backend's)
    pub buffer_size: Option<u32>,

    /// Preferred sample rate (None = accept the backend's)
    pub sample_rate: Option<u32>,

    /// Exclusive solo policy: soloing a route also un-solos every other
    /// self-soloed route instead of accumulating solos
    #[serde(default)]
    pub exclusive_solo: bool,

    /// Add a tiny DC offset while processing to keep denormals out of
    /// downstream processors
    #[serde(default = "default_true")]
    pub denormal_protection: bool,

    /// Events pre-allocated per submitting thread
    #[serde(default = "default_event_pool_size")]
    pub event_pool_size: usize,

    /// Capacity of the event submission ring / pending event list
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,

    /// Capacity of the engine signal channel
    #[serde(default = "default_signal_capacity")]
    pub signal_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_event_pool_size() -> usize {
    DEFAULT_EVENT_POOL_SIZE
}

fn default_event_queue_capacity() -> usize {
    DEFAULT_EVENT_QUEUE_CAPACITY
}

fn default_signal_capacity() -> usize {
    DEFAULT_SIGNAL_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            client_name: "cadence".to_string(),
            buffer_size: None,
            sample_rate: None,
            exclusive_solo: false,
            denormal_protection: true,
            event_pool_size: DEFAULT_EVENT_POOL_SIZE,
            event_queue_capacity: DEFAULT_EVENT_QUEUE_CAPACITY,
            signal_capacity: DEFAULT_SIGNAL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Create a config with the given backend client name
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            ..Default::default()
        }
    }

    /// Set a fixed preferred buffer size in frames
    pub fn with_buffer_size(mut self, frames: u32) -> Self {
        self.buffer_size = Some(frames);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Enable or disable exclusive solo
    pub fn with_exclusive_solo(mut self, on: bool) -> Self {
        self.exclusive_solo = on;
        self
    }

    /// Enable or disable denormal protection
    pub fn with_denormal_protection(mut self, on: bool) -> Self {
        self.denormal_protection = on;
        self
    }

    /// Latency in milliseconds of one cycle at the given settings
    pub fn cycle_latency_ms(buffer_size: u32, sample_rate: u32) -> f32 {
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new("test")
            .with_buffer_size(256)
            .with_sample_rate(44100)
            .with_exclusive_solo(true);

        assert_eq!(config.client_name, "test");
        assert_eq!(config.buffer_size, Some(256));
        assert_eq!(config.sample_rate, Some(44100));
        assert!(config.exclusive_solo);
        assert!(config.denormal_protection);
    }

    #[test]
    fn test_cycle_latency() {
        let ms = EngineConfig::cycle_latency_ms(480, 48000);
        assert!((ms - 10.0).abs() < 1e-6);
    }
}

//! Audio backend error types

use thiserror::Error;

/// Errors that can occur while talking to an audio backend
#[derive(Error, Debug)]
pub enum AudioError {
    /// No backend available to connect to
    #[error("could not connect to engine backend: {0}")]
    NoBackend(String),

    /// Failed to create the backend client
    #[error("failed to create backend client: {0}")]
    ClientCreation(String),

    /// Failed to activate the backend client
    #[error("failed to activate backend client: {0}")]
    Activation(String),

    /// A control request (freewheel, buffer size) was rejected
    #[error("backend rejected request: {0}")]
    RequestRefused(String),

    /// The backend connection is gone; the engine session is over
    #[error("backend halted: {0}")]
    Halted(String),

    /// Operation requires a running engine
    #[error("engine is not running")]
    NotRunning,
}

/// Result type for audio backend operations
pub type AudioResult<T> = Result<T, AudioError>;

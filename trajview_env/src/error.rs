//! Error types reported by external collaborators.

use thiserror::Error;

/// Errors raised by scene accessors, predictors and projectors.
///
/// None of these are fatal for a run on their own: the runner converts them
/// into per-sample failures and moves on to the next scheduled sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// Requested frame, sensor or reference data does not exist
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),
    
    /// A sensor channel the predictor requires is missing from the bundle
    #[error("Missing sensor channel: {0}")]
    MissingChannel(String),
    
    /// Tensor placement or device execution failed
    #[error("Device error: {0}")]
    DeviceError(String),
    
    /// Collaborator-specific failure (model crash, decode error, ...)
    #[error("Collaborator error: {0}")]
    CollaboratorError(String),
    
    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a data-unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::DataUnavailable(msg.into())
    }
    
    /// Creates a missing-channel error.
    pub fn missing_channel(channel: impl std::fmt::Display) -> Self {
        Self::MissingChannel(channel.to_string())
    }
    
    /// Creates a device error.
    pub fn device(msg: impl Into<String>) -> Self {
        Self::DeviceError(msg.into())
    }
}

//! Error types shared by render backends
//!
//! Precondition violations and resource failures surface as [`RhiError`].
//! Recoverable GPU-state problems are logged instead and never reach here.

use thiserror::Error;
use tracing::{error, warn};

use crate::GpuProgramType;

/// Result type for backend-agnostic operations
pub type RhiResult<T> = Result<T, RhiError>;

/// Errors raised through the abstract render interface
#[derive(Error, Debug)]
pub enum RhiError {
    /// A caller supplied an argument outside the accepted range
    #[error("Invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    /// An operation is not valid for the object's current state
    #[error("Invalid state: {operation}")]
    InvalidState { operation: String },

    /// The stage cannot own the requested kind of resource
    #[error("Unsupported operation for {stage} programs: {operation}")]
    UnsupportedStage {
        stage: GpuProgramType,
        operation: String,
    },

    /// Inconsistent data reported by the driver or computed internally
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    /// The underlying graphics API reported a failure
    #[error("Rendering API error: {reason}")]
    RenderingApi { reason: String },

    /// Error coming from a concrete backend
    #[error("Backend error")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl RhiError {
    /// Create an invalid parameters error
    pub fn invalid_parameters(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!("Invalid parameters: {}", reason);
        Self::InvalidParameters { reason }
    }

    /// Create an invalid state error
    pub fn invalid_state(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        warn!("Invalid state: {}", operation);
        Self::InvalidState { operation }
    }

    /// Create an unsupported stage error
    pub fn unsupported_stage(stage: GpuProgramType, operation: impl Into<String>) -> Self {
        let operation = operation.into();
        error!("Unsupported operation for {} programs: {}", stage, operation);
        Self::UnsupportedStage { stage, operation }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!("Internal error: {}", reason);
        Self::Internal { reason }
    }

    /// Create a rendering API error
    pub fn rendering_api(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!("Rendering API error: {}", reason);
        Self::RenderingApi { reason }
    }
}

/// Conversion of backend errors into [`RhiError`]
pub trait IntoRhiError {
    fn into_rhi_error(self) -> RhiError;
}

impl<E> IntoRhiError for E
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn into_rhi_error(self) -> RhiError {
        RhiError::Backend(Box::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn error_message_carries_reason() {
        let err = RhiError::internal("combined units exceeded");
        assert!(err.to_string().contains("combined units exceeded"));
    }

    #[test]
    fn stage_error_names_stage() {
        let err = RhiError::unsupported_stage(GpuProgramType::Hull, "texture binding");
        assert!(err.to_string().contains("hull"));
    }

    #[test]
    fn backend_errors_keep_source() {
        let source_err = std::io::Error::new(std::io::ErrorKind::Other, "driver lost");
        let rhi_err = source_err.into_rhi_error();
        assert!(rhi_err.source().is_some());
    }
}

//! Shared error taxonomy used across all `mcpctl` crates.
//!
//! Mirrors the teacher's single shared-error-type-per-workspace idiom
//! (`sa_domain::error::Error`), but additionally carries a taxonomy
//! [`ErrorCode`] so upper layers can classify retries without matching on
//! source types.

use serde::{Deserialize, Serialize};

/// Taxonomy codes from the error handling design. Not source types —
/// several distinct triggers map onto the same code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    Unavailable,
    FailedPrecondition,
    PermissionDenied,
    Canceled,
    DeadlineExceeded,
    Internal,
    NotImplemented,
}

/// Route pipeline stage a failure occurred in, for `RouteError` tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteStage {
    Decode,
    Validate,
    Acquire,
    Call,
}

impl std::fmt::Display for RouteStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RouteStage::Decode => "decode",
            RouteStage::Validate => "validate",
            RouteStage::Acquire => "acquire",
            RouteStage::Call => "call",
        };
        write!(f, "{s}")
    }
}

/// Shared error type for the control plane.
#[derive(thiserror::Error, Debug)]
pub enum ControlError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("canceled")]
    Canceled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("internal: {0}")]
    Internal(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("route error at stage {stage}: {source}")]
    Route {
        stage: RouteStage,
        #[source]
        source: Box<ControlError>,
    },
}

impl ControlError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ControlError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            ControlError::NotFound(_) => ErrorCode::NotFound,
            ControlError::Unavailable(_) => ErrorCode::Unavailable,
            ControlError::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            ControlError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            ControlError::Canceled => ErrorCode::Canceled,
            ControlError::DeadlineExceeded => ErrorCode::DeadlineExceeded,
            ControlError::Internal(_) => ErrorCode::Internal,
            ControlError::NotImplemented(_) => ErrorCode::NotImplemented,
            ControlError::Route { source, .. } => source.code(),
        }
    }

    pub fn at_stage(self, stage: RouteStage) -> Self {
        match self {
            ControlError::Route { .. } => self,
            other => ControlError::Route {
                stage,
                source: Box::new(other),
            },
        }
    }

    pub fn stage(&self) -> Option<RouteStage> {
        match self {
            ControlError::Route { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ControlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_stage_tags_error() {
        let err = ControlError::Unavailable("no ready instance".into()).at_stage(RouteStage::Acquire);
        assert_eq!(err.stage(), Some(RouteStage::Acquire));
        assert_eq!(err.code(), ErrorCode::Unavailable);
    }

    #[test]
    fn at_stage_is_idempotent_on_already_tagged_error() {
        let err = ControlError::Canceled
            .at_stage(RouteStage::Call)
            .at_stage(RouteStage::Decode);
        assert_eq!(err.stage(), Some(RouteStage::Call));
    }
}

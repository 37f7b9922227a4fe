use thiserror::Error;

/// Failure of a single control-plane call
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },

    #[error("{operation} failed: {message}")]
    Failed {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} returned an unreadable response: {message}")]
    Parse {
        operation: &'static str,
        message: String,
    },
}

impl ControlPlaneError {
    pub fn failed(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Failed {
            operation,
            message: message.into(),
        }
    }

    pub fn parse(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Parse {
            operation,
            message: message.into(),
        }
    }
}

/// Errors surfaced by the renewal engine.
///
/// `Authentication` and a primary `RoleAssumption` end a run. The others are
/// logged and the run carries on.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid MFA secret: {0}")]
    InvalidSecret(String),

    #[error("MFA authentication failed: {0}")]
    Authentication(#[source] ControlPlaneError),

    #[error("role assumption failed for {role_arn}: {source}")]
    RoleAssumption {
        role_arn: String,
        #[source]
        source: ControlPlaneError,
    },

    #[error("failed to persist profile '{profile}': {message}")]
    Persistence { profile: String, message: String },

    #[error("token propagation to {target} failed: {message}")]
    Propagation { target: String, message: String },

    #[error("a renewal run is already active on this engine")]
    AlreadyRunning,
}

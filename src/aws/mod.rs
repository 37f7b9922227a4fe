use std::{future::Future, time::Duration};

use async_trait::async_trait;
use aws_smithy_types::{DateTime, date_time::Format};

use crate::error::ControlPlaneError;

pub mod cli_client;
pub mod credentials;
pub mod roles;
pub mod sdk_client;

#[cfg(test)]
pub(crate) mod fake;

/// Bound applied to every control-plane call
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// AWS temporary credentials structure
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime,
}

impl Credentials {
    pub fn expiration_display(&self) -> String {
        self.expiration
            .fmt(Format::DateTime)
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

/// MFA-authenticated session, one per engine run
pub type SessionToken = Credentials;

/// Role credentials bound to the profile they are written to
#[derive(Debug, Clone, PartialEq)]
pub struct AssumedRoleCredential {
    pub credentials: Credentials,
    pub target_profile: String,
}

/// The cloud control plane as seen by the renewal engine.
///
/// Implemented by [`cli_client::AwsCliClient`] (subprocess) and
/// [`sdk_client::SdkClient`] (native SDK). Implementations must bound every
/// call with [`CALL_TIMEOUT`].
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    async fn get_session_token(
        &self,
        mfa_serial: &str,
        duration_seconds: u32,
        code: &str,
        profile: &str,
    ) -> Result<SessionToken, ControlPlaneError>;

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        profile: &str,
    ) -> Result<Credentials, ControlPlaneError>;

    async fn set_profile_value(
        &self,
        key: &str,
        value: &str,
        profile: &str,
    ) -> Result<(), ControlPlaneError>;

    async fn get_authorization_token(
        &self,
        domain: &str,
        domain_owner: &str,
        region: &str,
        profile: &str,
    ) -> Result<String, ControlPlaneError>;
}

/// Run `future` under [`CALL_TIMEOUT`], reporting expiry as a call failure
pub(crate) async fn with_timeout<T, F>(
    operation: &'static str,
    future: F,
) -> Result<T, ControlPlaneError>
where
    F: Future<Output = Result<T, ControlPlaneError>>,
{
    tokio::time::timeout(CALL_TIMEOUT, future)
        .await
        .unwrap_or(Err(ControlPlaneError::Timeout {
            operation,
            seconds: CALL_TIMEOUT.as_secs(),
        }))
}

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_codeartifact::Client as CodeArtifactClient;
use aws_sdk_sts::{Client as StsClient, error::DisplayErrorContext};
use tracing::{debug, info};

use super::{
    ControlPlaneClient, Credentials, SessionToken, credentials::ProfileFiles, with_timeout,
};
use crate::{constants::DEFAULT_AWS_REGION, error::ControlPlaneError};

/// Control plane backed by the AWS SDK, with profile writes going straight to
/// the shared credential files
#[derive(Debug, Clone)]
pub struct SdkClient {
    files: ProfileFiles,
}

impl SdkClient {
    pub fn new(files: ProfileFiles) -> Self {
        Self { files }
    }
}

/// Load SDK config for `profile`
/// Priority: explicit region -> ENV vars -> Config file -> DEFAULT_AWS_REGION
async fn load_config(profile: &str, region: Option<&str>) -> SdkConfig {
    if let Some(region) = region {
        return aws_config::defaults(BehaviorVersion::latest())
            .profile_name(profile)
            .region(Region::new(region.to_string()))
            .load()
            .await;
    }

    let loaded = aws_config::defaults(BehaviorVersion::latest())
        .profile_name(profile)
        .load()
        .await;

    match loaded.region() {
        Some(region) => {
            debug!("Using region: {}", region);
            loaded
        }
        None => {
            debug!(
                "No region configured, using default {} for STS",
                DEFAULT_AWS_REGION
            );
            aws_config::defaults(BehaviorVersion::latest())
                .profile_name(profile)
                .region(Region::new(DEFAULT_AWS_REGION))
                .load()
                .await
        }
    }
}

fn to_credentials(
    operation: &'static str,
    sts_creds: Option<&aws_sdk_sts::types::Credentials>,
) -> Result<Credentials, ControlPlaneError> {
    let sts_creds = sts_creds
        .ok_or_else(|| ControlPlaneError::parse(operation, "AWS STS returned no credentials"))?;

    Ok(Credentials {
        access_key_id: sts_creds.access_key_id().to_string(),
        secret_access_key: sts_creds.secret_access_key().to_string(),
        session_token: sts_creds.session_token().to_string(),
        expiration: *sts_creds.expiration(),
    })
}

#[async_trait]
impl ControlPlaneClient for SdkClient {
    async fn get_session_token(
        &self,
        mfa_serial: &str,
        duration_seconds: u32,
        code: &str,
        profile: &str,
    ) -> Result<SessionToken, ControlPlaneError> {
        const OPERATION: &str = "sts get-session-token";
        info!("Calling AWS STS GetSessionToken");
        debug!("MFA device: {}", mfa_serial);
        debug!("Duration: {} seconds", duration_seconds);

        let duration = i32::try_from(duration_seconds)
            .map_err(|_| ControlPlaneError::failed(OPERATION, "duration out of range"))?;

        with_timeout(OPERATION, async {
            let client = StsClient::new(&load_config(profile, None).await);
            let response = client
                .get_session_token()
                .serial_number(mfa_serial)
                .duration_seconds(duration)
                .token_code(code)
                .send()
                .await
                .map_err(|e| {
                    ControlPlaneError::failed(OPERATION, DisplayErrorContext(&e).to_string())
                })?;

            to_credentials(OPERATION, response.credentials())
        })
        .await
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        profile: &str,
    ) -> Result<Credentials, ControlPlaneError> {
        const OPERATION: &str = "sts assume-role";
        info!("Calling AWS STS AssumeRole");
        debug!("Role ARN: {}", role_arn);

        with_timeout(OPERATION, async {
            let client = StsClient::new(&load_config(profile, None).await);
            let response = client
                .assume_role()
                .role_arn(role_arn)
                .role_session_name(session_name)
                .send()
                .await
                .map_err(|e| {
                    ControlPlaneError::failed(OPERATION, DisplayErrorContext(&e).to_string())
                })?;

            to_credentials(OPERATION, response.credentials())
        })
        .await
    }

    async fn set_profile_value(
        &self,
        key: &str,
        value: &str,
        profile: &str,
    ) -> Result<(), ControlPlaneError> {
        const OPERATION: &str = "configure set";
        with_timeout(OPERATION, async {
            self.files
                .set_value(key, value, profile)
                .await
                .map_err(|e| ControlPlaneError::failed(OPERATION, format!("{e:#}")))
        })
        .await
    }

    async fn get_authorization_token(
        &self,
        domain: &str,
        domain_owner: &str,
        region: &str,
        profile: &str,
    ) -> Result<String, ControlPlaneError> {
        const OPERATION: &str = "codeartifact get-authorization-token";
        info!("Calling AWS CodeArtifact GetAuthorizationToken");

        with_timeout(OPERATION, async {
            let client = CodeArtifactClient::new(&load_config(profile, Some(region)).await);
            let response = client
                .get_authorization_token()
                .domain(domain)
                .domain_owner(domain_owner)
                .send()
                .await
                .map_err(|e| {
                    ControlPlaneError::failed(
                        OPERATION,
                        aws_sdk_codeartifact::error::DisplayErrorContext(&e).to_string(),
                    )
                })?;

            response
                .authorization_token()
                .map(str::to_string)
                .ok_or_else(|| {
                    ControlPlaneError::parse(OPERATION, "no authorization token returned")
                })
        })
        .await
    }
}

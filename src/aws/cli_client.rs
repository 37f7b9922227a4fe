use std::process::Stdio;

use async_trait::async_trait;
use aws_smithy_types::{DateTime, date_time::Format};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{ControlPlaneClient, Credentials, SessionToken, with_timeout};
use crate::error::ControlPlaneError;

/// `Credentials` block as printed by `aws sts ... --output json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CliCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expiration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSessionTokenOutput {
    credentials: CliCredentials,
}

impl CliCredentials {
    fn into_credentials(self, operation: &'static str) -> Result<Credentials, ControlPlaneError> {
        let expiration = parse_expiration(&self.expiration).ok_or_else(|| {
            ControlPlaneError::parse(operation, format!("bad expiration '{}'", self.expiration))
        })?;

        Ok(Credentials {
            access_key_id: self.access_key_id,
            secret_access_key: self.secret_access_key,
            session_token: self.session_token,
            expiration,
        })
    }
}

/// The CLI prints either `2024-01-01T00:00:00Z` or `2024-01-01T00:00:00+00:00`
fn parse_expiration(value: &str) -> Option<DateTime> {
    DateTime::from_str(value, Format::DateTime)
        .or_else(|_| DateTime::from_str(value, Format::DateTimeWithOffset))
        .ok()
}

/// Control plane backed by the `aws` command line tool
#[derive(Debug, Clone)]
pub struct AwsCliClient {
    program: String,
}

impl AwsCliClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run the CLI with `args` and return trimmed stdout on success
    async fn run(
        &self,
        operation: &'static str,
        args: &[&str],
    ) -> Result<String, ControlPlaneError> {
        debug!("Running: {} {}", self.program, operation);

        let mut command = Command::new(&self.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        with_timeout(operation, async {
            let output = command
                .output()
                .await
                .map_err(|e| {
                    ControlPlaneError::failed(
                        operation,
                        format!("failed to run {}: {e}", self.program),
                    )
                })?;

            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                Err(ControlPlaneError::failed(operation, stderr))
            }
        })
        .await
    }
}

#[async_trait]
impl ControlPlaneClient for AwsCliClient {
    async fn get_session_token(
        &self,
        mfa_serial: &str,
        duration_seconds: u32,
        code: &str,
        profile: &str,
    ) -> Result<SessionToken, ControlPlaneError> {
        const OPERATION: &str = "sts get-session-token";
        let duration = duration_seconds.to_string();
        let stdout = self
            .run(
                OPERATION,
                &[
                    "sts",
                    "get-session-token",
                    "--serial-number",
                    mfa_serial,
                    "--duration-seconds",
                    &duration,
                    "--token-code",
                    code,
                    "--profile",
                    profile,
                    "--output",
                    "json",
                ],
            )
            .await?;

        let output: GetSessionTokenOutput = serde_json::from_str(&stdout)
            .map_err(|e| ControlPlaneError::parse(OPERATION, e.to_string()))?;
        output.credentials.into_credentials(OPERATION)
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        profile: &str,
    ) -> Result<Credentials, ControlPlaneError> {
        const OPERATION: &str = "sts assume-role";
        let stdout = self
            .run(
                OPERATION,
                &[
                    "sts",
                    "assume-role",
                    "--role-arn",
                    role_arn,
                    "--role-session-name",
                    session_name,
                    "--profile",
                    profile,
                    "--query",
                    "Credentials",
                    "--output",
                    "json",
                ],
            )
            .await?;

        let creds: CliCredentials = serde_json::from_str(&stdout)
            .map_err(|e| ControlPlaneError::parse(OPERATION, e.to_string()))?;
        creds.into_credentials(OPERATION)
    }

    async fn set_profile_value(
        &self,
        key: &str,
        value: &str,
        profile: &str,
    ) -> Result<(), ControlPlaneError> {
        self.run(
            "configure set",
            &["configure", "set", key, value, "--profile", profile],
        )
        .await
        .map(|_| ())
    }

    async fn get_authorization_token(
        &self,
        domain: &str,
        domain_owner: &str,
        region: &str,
        profile: &str,
    ) -> Result<String, ControlPlaneError> {
        const OPERATION: &str = "codeartifact get-authorization-token";
        let token = self
            .run(
                OPERATION,
                &[
                    "codeartifact",
                    "get-authorization-token",
                    "--domain",
                    domain,
                    "--domain-owner",
                    domain_owner,
                    "--query",
                    "authorizationToken",
                    "--output",
                    "text",
                    "--region",
                    region,
                    "--profile",
                    profile,
                ],
            )
            .await?;

        if token.is_empty() {
            return Err(ControlPlaneError::parse(OPERATION, "empty token"));
        }
        Ok(token)
    }
}

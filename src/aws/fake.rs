//! Scripted control plane for tests.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use aws_smithy_types::DateTime;

use super::{ControlPlaneClient, Credentials, SessionToken};
use crate::error::ControlPlaneError;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    GetSessionToken {
        mfa_serial: String,
        duration_seconds: u32,
        code: String,
        profile: String,
    },
    AssumeRole {
        role_arn: String,
        session_name: String,
        profile: String,
    },
    SetProfileValue {
        key: String,
        value: String,
        profile: String,
    },
    GetAuthorizationToken {
        domain: String,
        domain_owner: String,
        region: String,
        profile: String,
    },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    fail_session: bool,
    /// role arn -> 1-based attempt from which assume-role fails
    fail_roles_from: HashMap<String, usize>,
    attempts: HashMap<String, usize>,
    fail_profile_writes: bool,
    authorization_token: Option<String>,
}

pub struct FakeClient {
    state: Mutex<State>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                authorization_token: Some("artifact-token".to_string()),
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn fail_session(&self) {
        self.state().fail_session = true;
    }

    pub fn fail_role(&self, role_arn: &str) {
        self.fail_role_from(role_arn, 1);
    }

    pub fn fail_role_from(&self, role_arn: &str, attempt: usize) {
        self.state()
            .fail_roles_from
            .insert(role_arn.to_string(), attempt);
    }

    pub fn fail_profile_writes(&self) {
        self.state().fail_profile_writes = true;
    }

    pub fn fail_authorization_token(&self) {
        self.state().authorization_token = None;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn assume_role_count(&self, role_arn: &str) -> usize {
        self.state().attempts.get(role_arn).copied().unwrap_or(0)
    }

    /// Every value written to `profile`, in call order
    pub fn profile_values(&self, profile: &str) -> Vec<(String, String)> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::SetProfileValue {
                    key,
                    value,
                    profile: p,
                } if p == profile => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}

fn credentials(prefix: &str, n: usize) -> Credentials {
    Credentials {
        access_key_id: format!("{prefix}-KEY-{n}"),
        secret_access_key: format!("{prefix}-SECRET-{n}"),
        session_token: format!("{prefix}-TOKEN-{n}"),
        expiration: DateTime::from_secs(1_700_000_000 + n as i64 * 3600),
    }
}

#[async_trait]
impl ControlPlaneClient for FakeClient {
    async fn get_session_token(
        &self,
        mfa_serial: &str,
        duration_seconds: u32,
        code: &str,
        profile: &str,
    ) -> Result<SessionToken, ControlPlaneError> {
        let mut state = self.state();
        state.calls.push(Call::GetSessionToken {
            mfa_serial: mfa_serial.to_string(),
            duration_seconds,
            code: code.to_string(),
            profile: profile.to_string(),
        });

        if state.fail_session {
            return Err(ControlPlaneError::failed(
                "sts get-session-token",
                "MultiFactorAuthentication failed with invalid MFA one time pass code",
            ));
        }
        Ok(credentials("SESSION", 0))
    }

    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        profile: &str,
    ) -> Result<Credentials, ControlPlaneError> {
        let mut state = self.state();
        state.calls.push(Call::AssumeRole {
            role_arn: role_arn.to_string(),
            session_name: session_name.to_string(),
            profile: profile.to_string(),
        });

        let attempt = {
            let count = state.attempts.entry(role_arn.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        match state.fail_roles_from.get(role_arn) {
            Some(&from) if attempt >= from => Err(ControlPlaneError::failed(
                "sts assume-role",
                format!("AccessDenied for {role_arn}"),
            )),
            _ => Ok(credentials(role_arn, attempt)),
        }
    }

    async fn set_profile_value(
        &self,
        key: &str,
        value: &str,
        profile: &str,
    ) -> Result<(), ControlPlaneError> {
        let mut state = self.state();
        if state.fail_profile_writes {
            return Err(ControlPlaneError::failed(
                "configure set",
                "permission denied",
            ));
        }
        state.calls.push(Call::SetProfileValue {
            key: key.to_string(),
            value: value.to_string(),
            profile: profile.to_string(),
        });
        Ok(())
    }

    async fn get_authorization_token(
        &self,
        domain: &str,
        domain_owner: &str,
        region: &str,
        profile: &str,
    ) -> Result<String, ControlPlaneError> {
        let mut state = self.state();
        state.calls.push(Call::GetAuthorizationToken {
            domain: domain.to_string(),
            domain_owner: domain_owner.to_string(),
            region: region.to_string(),
            profile: profile.to_string(),
        });
        state.authorization_token.clone().ok_or_else(|| {
            ControlPlaneError::failed("codeartifact get-authorization-token", "AccessDenied")
        })
    }
}

use std::sync::Arc;

use tracing::{info, warn};

use super::{AssumedRoleCredential, ControlPlaneClient};
use crate::error::EngineError;

/// ARN of a virtual MFA device (arn:aws:iam::123456789012:mfa/user.name)
pub fn mfa_device_arn(account_id: &str, user: &str) -> String {
    format!("arn:aws:iam::{account_id}:mfa/{user}")
}

/// ARN of an IAM role (arn:aws:iam::123456789012:role/RoleName)
pub fn role_arn(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{account_id}:role/{role_name}")
}

/// How a failed assumption of a target affects the renewal cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPolicy {
    /// Failure ends the run
    Required,
    /// Failure is logged and the cycle carries on
    BestEffort,
}

/// A role to assume each cycle and the profile its credentials go to
#[derive(Debug, Clone, PartialEq)]
pub struct RoleTarget {
    pub label: String,
    pub role_arn: String,
    pub profile: String,
    pub policy: TargetPolicy,
}

/// Assumes target roles using the MFA session profile
#[derive(Clone)]
pub struct RoleAssumer {
    client: Arc<dyn ControlPlaneClient>,
    session_name: String,
    authorizing_profile: String,
}

impl RoleAssumer {
    pub fn new(
        client: Arc<dyn ControlPlaneClient>,
        session_name: impl Into<String>,
        authorizing_profile: impl Into<String>,
    ) -> Self {
        Self {
            client,
            session_name: session_name.into(),
            authorizing_profile: authorizing_profile.into(),
        }
    }

    pub async fn assume_role(
        &self,
        target: &RoleTarget,
    ) -> Result<AssumedRoleCredential, EngineError> {
        info!("Renewing {} access keys...", target.label);

        match self
            .client
            .assume_role(&target.role_arn, &self.session_name, &self.authorizing_profile)
            .await
        {
            Ok(credentials) => Ok(AssumedRoleCredential {
                credentials,
                target_profile: target.profile.clone(),
            }),
            Err(source) => {
                warn!("Failed to assume {}: {}", target.role_arn, source);
                Err(EngineError::RoleAssumption {
                    role_arn: target.role_arn.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::fake::{Call, FakeClient};

    fn target(account: &str, profile: &str, policy: TargetPolicy) -> RoleTarget {
        RoleTarget {
            label: profile.to_string(),
            role_arn: role_arn(account, "Developers"),
            profile: profile.to_string(),
            policy,
        }
    }

    #[test]
    fn test_arn_builders() {
        assert_eq!(
            mfa_device_arn("736763050260", "jane.doe"),
            "arn:aws:iam::736763050260:mfa/jane.doe"
        );
        assert_eq!(
            role_arn("123456789012", "Admin"),
            "arn:aws:iam::123456789012:role/Admin"
        );
    }

    #[tokio::test]
    async fn test_assume_role_uses_session_profile() {
        let client = Arc::new(FakeClient::new());
        let assumer = RoleAssumer::new(client.clone(), "jane.doe", "src-mfa-session");
        let primary = target("111111111111", "default", TargetPolicy::Required);

        let assumed = assumer.assume_role(&primary).await.unwrap();
        assert_eq!(assumed.target_profile, "default");
        assert_eq!(
            client.calls(),
            vec![Call::AssumeRole {
                role_arn: primary.role_arn.clone(),
                session_name: "jane.doe".to_string(),
                profile: "src-mfa-session".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_assume_role_failure_names_role() {
        let client = Arc::new(FakeClient::new());
        let primary = target("111111111111", "default", TargetPolicy::Required);
        let secondary = target("222222222222", "artifacts", TargetPolicy::BestEffort);
        client.fail_role(&primary.role_arn);

        let assumer = RoleAssumer::new(client.clone(), "jane.doe", "src-mfa-session");
        let failed = assumer.assume_role(&primary).await;
        let renewed = assumer.assume_role(&secondary).await.unwrap();

        assert!(matches!(
            &failed,
            Err(EngineError::RoleAssumption { role_arn, .. }) if *role_arn == primary.role_arn
        ));
        assert_eq!(renewed.target_profile, "artifacts");
    }
}

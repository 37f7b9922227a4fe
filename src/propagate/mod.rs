use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{aws::ControlPlaneClient, error::EngineError};

pub mod maven;
pub mod npm;

pub use maven::MavenSettingsPropagator;
pub use npm::NpmrcPropagator;

/// A tool configuration that receives the artifact repository token
#[async_trait]
pub trait TokenPropagator: Send + Sync {
    fn name(&self) -> &str;

    async fn write(&self, token: &str) -> Result<(), EngineError>;
}

/// CodeArtifact coordinates the token is issued for
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRepository {
    pub domain: String,
    pub domain_owner: String,
    pub region: String,
    pub npm_repository: String,
}

impl ArtifactRepository {
    /// https://<domain>-<owner>.d.codeartifact.<region>.amazonaws.com/npm/<repo>/
    pub fn npm_registry_url(&self) -> String {
        format!(
            "https://{}-{}.d.codeartifact.{}.amazonaws.com/npm/{}/",
            self.domain, self.domain_owner, self.region, self.npm_repository
        )
    }
}

/// What one propagation attempt achieved
#[derive(Debug, Default)]
pub struct PropagationReport {
    pub token_obtained: bool,
    pub updated: Vec<String>,
    pub failures: Vec<EngineError>,
}

/// Fetches an artifact repository token and hands it to every configured tool
pub struct ArtifactTokenPropagator {
    client: Arc<dyn ControlPlaneClient>,
    repository: ArtifactRepository,
    targets: Vec<Box<dyn TokenPropagator>>,
}

impl ArtifactTokenPropagator {
    pub fn new(
        client: Arc<dyn ControlPlaneClient>,
        repository: ArtifactRepository,
        targets: Vec<Box<dyn TokenPropagator>>,
    ) -> Self {
        Self {
            client,
            repository,
            targets,
        }
    }

    pub fn repository(&self) -> &ArtifactRepository {
        &self.repository
    }

    /// Best effort: failures are collected in the report, never returned
    pub async fn propagate(&self, profile: &str) -> PropagationReport {
        let mut report = PropagationReport::default();

        let token = match self
            .client
            .get_authorization_token(
                &self.repository.domain,
                &self.repository.domain_owner,
                &self.repository.region,
                profile,
            )
            .await
        {
            Ok(token) => token,
            Err(e) => {
                warn!("Could not obtain artifact repository token: {}", e);
                report.failures.push(EngineError::Propagation {
                    target: "artifact repository".to_string(),
                    message: e.to_string(),
                });
                return report;
            }
        };
        report.token_obtained = true;
        info!("Generated CodeArtifact token");

        for target in &self.targets {
            match target.write(&token).await {
                Ok(()) => report.updated.push(target.name().to_string()),
                Err(e) => {
                    warn!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        report
    }
}

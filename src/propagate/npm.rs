use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tracing::info;
use url::Url;

use super::TokenPropagator;
use crate::error::EngineError;

/// Points npm at the CodeArtifact registry and stores the scoped auth token
/// in a user-level .npmrc
#[derive(Debug, Clone)]
pub struct NpmrcPropagator {
    path: PathBuf,
    registry: String,
}

impl NpmrcPropagator {
    pub fn new(path: PathBuf, registry: impl Into<String>) -> Self {
        Self {
            path,
            registry: registry.into(),
        }
    }

    async fn update(&self, token: &str) -> Result<()> {
        let auth_key = auth_token_key(&self.registry)?;

        let content = if self.path.exists() {
            fs::read_to_string(&self.path)
                .await
                .with_context(|| format!("Failed to read {}", self.path.display()))?
        } else {
            String::new()
        };

        let content = set_entry(&content, "registry", &self.registry);
        let content = set_entry(&content, &auth_key, token);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

#[async_trait]
impl TokenPropagator for NpmrcPropagator {
    fn name(&self) -> &str {
        "npm registry"
    }

    async fn write(&self, token: &str) -> Result<(), EngineError> {
        self.update(token)
            .await
            .map_err(|e| EngineError::Propagation {
                target: self.name().to_string(),
                message: format!("{e:#}"),
            })?;

        info!("Updated {} with CodeArtifact token", self.path.display());
        Ok(())
    }
}

/// `//host/path/:_authToken` for a registry URL
fn auth_token_key(registry: &str) -> Result<String> {
    let url = Url::parse(registry).with_context(|| format!("Invalid registry URL: {registry}"))?;
    let host = url
        .host_str()
        .with_context(|| format!("Registry URL has no host: {registry}"))?;

    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    Ok(format!("//{authority}{}:_authToken", url.path()))
}

/// Replace the line for `key` or append one, keeping every other line as is
fn set_entry(content: &str, key: &str, value: &str) -> String {
    let entry = format!("{key}={value}");
    let mut found = false;

    let mut lines: Vec<String> = content
        .lines()
        .map(|line| match line.split_once('=') {
            Some((k, _)) if !found && k.trim() == key => {
                found = true;
                entry.clone()
            }
            _ => line.to_string(),
        })
        .collect();

    if !found {
        lines.push(entry);
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const REGISTRY: &str =
        "https://acme-devops-369498121101.d.codeartifact.us-west-2.amazonaws.com/npm/acme-npm/";

    #[test]
    fn test_auth_token_key() {
        assert_eq!(
            auth_token_key(REGISTRY).unwrap(),
            "//acme-devops-369498121101.d.codeartifact.us-west-2.amazonaws.com/npm/acme-npm/:_authToken"
        );
        assert_eq!(
            auth_token_key("http://localhost:4873/").unwrap(),
            "//localhost:4873/:_authToken"
        );
        assert!(auth_token_key("not a url").is_err());
    }

    #[test]
    fn test_set_entry_replaces_existing() {
        let content = "registry=https://registry.npmjs.org/\nsave-exact=true\n";
        assert_eq!(
            set_entry(content, "registry", "https://example.com/"),
            "registry=https://example.com/\nsave-exact=true\n"
        );
    }

    #[test]
    fn test_set_entry_appends_missing() {
        assert_eq!(set_entry("", "registry", "x"), "registry=x\n");
        assert_eq!(set_entry("a=1", "b", "2"), "a=1\nb=2\n");
    }

    #[tokio::test]
    async fn test_write_creates_npmrc() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".npmrc");
        let propagator = NpmrcPropagator::new(path.clone(), REGISTRY);

        propagator.write("tok-1").await.unwrap();
        propagator.write("tok-2").await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            format!("registry={REGISTRY}\n{}=tok-2\n", auth_token_key(REGISTRY).unwrap())
        );
    }

    #[tokio::test]
    async fn test_write_keeps_unrelated_settings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".npmrc");
        std::fs::write(&path, "# user config\nfund=false\n").unwrap();

        NpmrcPropagator::new(path.clone(), REGISTRY)
            .write("tok")
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# user config\nfund=false\nregistry="));
    }
}

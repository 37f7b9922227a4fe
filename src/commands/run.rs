use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::Args;
use dialoguer::{Input, theme::ColorfulTheme};
use tracing::{debug, info};

use crate::{
    aws::{
        ControlPlaneClient, cli_client::AwsCliClient, credentials::CredentialStore,
        credentials::ProfileFiles, sdk_client::SdkClient,
    },
    config::{self, Backend, Config},
    constants,
    engine::{RenewalEngine, RenewalObserver, RunOutcome},
    propagate::{
        ArtifactRepository, ArtifactTokenPropagator, MavenSettingsPropagator, NpmrcPropagator,
        TokenPropagator,
    },
};

#[derive(Debug, Clone, Default, Args)]
pub struct RunCommand {
    #[arg(short = 'a', long, help = "Account name or id to keep credentials for")]
    pub account: Option<String>,

    #[arg(long, help = "MFA one-time code (generated from the configured secret if omitted)")]
    pub code: Option<String>,

    #[arg(long, help = "Override the session lifetime in hours")]
    pub hours: Option<u32>,

    #[arg(long, value_enum, help = "Control plane backend")]
    pub backend: Option<Backend>,

    #[arg(long, help = "Do not write the CodeArtifact token into Maven/npm config")]
    pub no_propagate: bool,
}

/// Prints status lines and forwards log lines to tracing
struct TerminalObserver;

impl RenewalObserver for TerminalObserver {
    fn on_status(&self, text: &str) {
        println!("{text}");
    }

    fn on_busy(&self, busy: bool) {
        debug!("busy: {}", busy);
    }

    fn on_log(&self, line: &str) {
        info!(target: "stsrotate::renewal", "{}", line);
    }
}

impl RunCommand {
    pub async fn execute(self, config_path: &Path) -> Result<()> {
        let config = config::load(config_path).await?;
        let account = config.select_account(self.account.as_deref())?.clone();
        let engine_config = config.engine_config(&account, self.hours)?;

        let files = ProfileFiles::from_env()?;
        let client: Arc<dyn ControlPlaneClient> = match self.backend.unwrap_or(config.backend) {
            Backend::Sdk => Arc::new(SdkClient::new(files.clone())),
            Backend::Cli => Arc::new(AwsCliClient::new(config.aws_cli.clone())),
        };
        let store = CredentialStore::new(files, client.clone());

        let mut engine = RenewalEngine::new(engine_config, client.clone(), store);
        if !self.no_propagate {
            if let Some(repository) = config.artifact_repository() {
                engine = engine.with_propagator(build_propagator(client, repository, &config));
            }
        }

        let handle = match self.code {
            Some(code) => {
                if !is_valid_code(&code) {
                    bail!("MFA code must be 6 digits");
                }
                engine.start(code)?
            }
            None if engine.config().mfa_secret.is_some() => engine
                .start_with_secret()
                .context("Failed to generate MFA code")?,
            None => engine.start(prompt_code(&account.name)?)?,
        };

        let cancel = handle.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\nStopping after the current step...");
                cancel.cancel();
            }
        });

        let report = handle.observe(&TerminalObserver).await;
        match report.outcome {
            RunOutcome::Failed => bail!("{}", report.message),
            RunOutcome::Stopped | RunOutcome::Expired => {
                println!("{}", report.message);
                Ok(())
            }
        }
    }
}

fn build_propagator(
    client: Arc<dyn ControlPlaneClient>,
    repository: ArtifactRepository,
    config: &Config,
) -> ArtifactTokenPropagator {
    let mut targets: Vec<Box<dyn TokenPropagator>> = Vec::new();

    if let Some(path) = constants::get_maven_settings_path() {
        targets.push(Box::new(MavenSettingsPropagator::new(
            path,
            config.maven_server_ids.clone(),
        )));
    }
    if let Some(path) = constants::get_npmrc_path() {
        targets.push(Box::new(NpmrcPropagator::new(
            path,
            repository.npm_registry_url(),
        )));
    }

    ArtifactTokenPropagator::new(client, repository, targets)
}

fn prompt_code(account_name: &str) -> Result<String> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("MFA code for {account_name}"))
        .validate_with(|input: &String| {
            if is_valid_code(input) {
                Ok(())
            } else {
                Err("MFA code must be 6 digits")
            }
        })
        .interact_text()
        .context("Failed to read MFA code")
}

fn is_valid_code(code: &str) -> bool {
    code.len() == 6 && code.chars().all(|c| c.is_ascii_digit())
}

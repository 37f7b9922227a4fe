use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::config;

#[derive(Debug, Clone, Args)]
pub struct ConfigureCommand {}

impl ConfigureCommand {
    pub async fn execute(self, config_path: &Path) -> Result<()> {
        config::configure_interactive(config_path).await
    }
}

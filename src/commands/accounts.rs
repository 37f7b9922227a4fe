use std::path::Path;

use anyhow::Result;
use clap::Args;

use crate::config;

#[derive(Debug, Clone, Args)]
pub struct AccountsCommand {}

impl AccountsCommand {
    pub async fn execute(self, config_path: &Path) -> Result<()> {
        let config = config::load(config_path).await?;

        if config.accounts.is_empty() {
            println!("No accounts configured.");
            return Ok(());
        }

        let width = config
            .accounts
            .iter()
            .map(|a| a.name.len())
            .max()
            .unwrap_or(0);
        for account in &config.accounts {
            println!("{:<width$}  {}", account.name, account.id);
        }
        Ok(())
    }
}

use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result};
use clap::Args;

use crate::{config, totp};

#[derive(Debug, Clone, Args)]
pub struct CodeCommand {}

impl CodeCommand {
    pub async fn execute(self, config_path: &Path) -> Result<()> {
        let config = config::load(config_path).await?;
        let secret = config
            .mfa_secret
            .context("No MFA secret configured. Set mfa_secret or MFA_SECRET_KEY")?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("System clock is before the Unix epoch")?
            .as_secs();
        let code = totp::generate_at(&secret, now)?;

        println!("{code} (valid for {}s)", totp::seconds_remaining(now));
        Ok(())
    }
}

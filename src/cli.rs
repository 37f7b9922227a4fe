use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};

use crate::{
    commands::{AccountsCommand, CodeCommand, CompletionsCommand, ConfigureCommand, RunCommand},
    constants,
};

#[derive(Debug, Clone, Parser)]
#[command(name = "stsrotate", version, about = "Keep AWS role credentials fresh from a single MFA session", long_about = None, arg_required_else_help = false)]
pub struct Cli {
    #[arg(short = 'c', long, global = true, help = "Path to the stsrotate config file")]
    pub config: Option<PathBuf>,

    #[arg(short = 'v', long, global = true, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Authenticate with MFA and keep renewing role credentials")]
    Run(RunCommand),
    #[command(about = "Print the current MFA one-time code")]
    Code(CodeCommand),
    #[command(about = "List configured accounts")]
    Accounts(AccountsCommand),
    #[command(about = "Configure the IAM user, roles and accounts")]
    Configure(ConfigureCommand),
    #[command(about = "Generate shell completion scripts for stsrotate")]
    Completions(CompletionsCommand),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => constants::get_config_path().context("Failed to determine config path")?,
        };
        let command = self
            .command
            .unwrap_or(Commands::Run(RunCommand::default()));

        match command {
            Commands::Run(cmd) => cmd.execute(&config_path).await,
            Commands::Code(cmd) => cmd.execute(&config_path).await,
            Commands::Accounts(cmd) => cmd.execute(&config_path).await,
            Commands::Configure(cmd) => cmd.execute(&config_path).await,
            Commands::Completions(cmd) => {
                cmd.execute();
                Ok(())
            }
        }
    }
}

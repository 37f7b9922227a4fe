use std::{env, path::Path};

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use dialoguer::{Input, Password, theme::ColorfulTheme};
use ini::{Ini, Properties};
use tokio::fs;

use crate::{
    aws::roles,
    constants::{
        DEFAULT_AWS_CLI, DEFAULT_AWS_REGION, DEFAULT_LIFETIME_HOURS, DEFAULT_PRIMARY_PROFILE,
        DEFAULT_SECONDARY_PROFILE, MAX_LIFETIME_HOURS, MIN_LIFETIME_HOURS,
    },
    propagate::{ArtifactRepository, maven::DEFAULT_SERVER_IDS},
};

const SETTINGS_SECTION: &str = "settings";
const ACCOUNT_SECTION_PREFIX: &str = "account ";

/// A target AWS account the operator can pick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
}

/// How the control plane is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Native AWS SDK
    Sdk,
    /// The `aws` command line tool
    Cli,
}

impl Backend {
    fn as_str(self) -> &'static str {
        match self {
            Backend::Sdk => "sdk",
            Backend::Cli => "cli",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sdk" => Ok(Backend::Sdk),
            "cli" => Ok(Backend::Cli),
            other => bail!("Unknown backend '{other}', expected 'sdk' or 'cli'"),
        }
    }
}

/// Contents of the config file
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub user: String,
    pub source_profile: String,
    pub mfa_device_account: String,
    pub role_name: String,
    pub region: String,
    pub total_lifetime_hours: u32,
    pub primary_profile: String,
    pub secondary_target_account: String,
    pub secondary_role_name: String,
    pub secondary_profile: String,
    pub mfa_secret: Option<String>,
    pub backend: Backend,
    pub aws_cli: String,
    pub artifact_domain: Option<String>,
    pub artifact_domain_owner: Option<String>,
    pub artifact_region: Option<String>,
    pub npm_repository: Option<String>,
    pub maven_server_ids: Vec<String>,
    pub accounts: Vec<Account>,
}

/// Everything one renewal run needs, fixed for the run's lifetime
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub user: String,
    pub source_profile: String,
    pub mfa_device_account: String,
    pub role_name: String,
    pub region: String,
    pub total_lifetime_hours: u32,
    pub account: Account,
    pub primary_profile: String,
    pub secondary_target_account: String,
    pub secondary_role_name: String,
    pub secondary_profile: String,
    pub mfa_secret: Option<String>,
}

impl EngineConfig {
    /// Profile holding the MFA session credentials
    pub fn mfa_session_profile(&self) -> String {
        format!("{}-mfa-session", self.source_profile)
    }

    pub fn mfa_device_arn(&self) -> String {
        roles::mfa_device_arn(&self.mfa_device_account, &self.user)
    }

    pub fn primary_role_arn(&self) -> String {
        roles::role_arn(&self.account.id, &self.role_name)
    }

    pub fn secondary_role_arn(&self) -> String {
        roles::role_arn(&self.secondary_target_account, &self.secondary_role_name)
    }

    pub fn session_duration_seconds(&self) -> u32 {
        self.total_lifetime_hours.saturating_mul(3600)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user: String::new(),
            source_profile: String::new(),
            mfa_device_account: String::new(),
            role_name: String::new(),
            region: DEFAULT_AWS_REGION.to_string(),
            total_lifetime_hours: DEFAULT_LIFETIME_HOURS,
            primary_profile: DEFAULT_PRIMARY_PROFILE.to_string(),
            secondary_target_account: String::new(),
            secondary_role_name: String::new(),
            secondary_profile: DEFAULT_SECONDARY_PROFILE.to_string(),
            mfa_secret: None,
            backend: Backend::Sdk,
            aws_cli: DEFAULT_AWS_CLI.to_string(),
            artifact_domain: None,
            artifact_domain_owner: None,
            artifact_region: None,
            npm_repository: None,
            maven_server_ids: DEFAULT_SERVER_IDS.iter().map(|s| s.to_string()).collect(),
            accounts: Vec::new(),
        }
    }
}

fn optional(section: &Properties, key: &str) -> Option<String> {
    section
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl Config {
    fn from_ini(ini: &Ini) -> Result<Self> {
        let defaults = Config::default();
        let section = ini
            .section(Some(SETTINGS_SECTION))
            .with_context(|| format!("Section [{SETTINGS_SECTION}] not found in config"))?;

        let text = |key: &str, default: &str| {
            optional(section, key).unwrap_or_else(|| default.to_string())
        };

        let total_lifetime_hours = match optional(section, "total_lifetime_hours") {
            Some(value) => value
                .parse()
                .with_context(|| format!("Invalid total_lifetime_hours: {value}"))?,
            None => defaults.total_lifetime_hours,
        };

        let backend = match optional(section, "backend") {
            Some(value) => Backend::parse(&value)?,
            None => defaults.backend,
        };

        let maven_server_ids = optional(section, "maven_server_ids")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or(defaults.maven_server_ids);

        let accounts = ini
            .iter()
            .filter_map(|(name, props)| {
                let name = name?.strip_prefix(ACCOUNT_SECTION_PREFIX)?.trim();
                Some(Account {
                    id: props.get("id").unwrap_or("").trim().to_string(),
                    name: name.to_string(),
                })
            })
            .collect();

        Ok(Self {
            user: text("user", ""),
            source_profile: text("source_profile", ""),
            mfa_device_account: text("mfa_device_account", ""),
            role_name: text("role_name", ""),
            region: text("region", &defaults.region),
            total_lifetime_hours,
            primary_profile: text("primary_profile", &defaults.primary_profile),
            secondary_target_account: text("secondary_target_account", ""),
            secondary_role_name: optional(section, "secondary_role_name")
                .unwrap_or_else(|| text("role_name", "")),
            secondary_profile: text("secondary_profile", &defaults.secondary_profile),
            mfa_secret: optional(section, "mfa_secret"),
            backend,
            aws_cli: text("aws_cli", &defaults.aws_cli),
            artifact_domain: optional(section, "artifact_domain"),
            artifact_domain_owner: optional(section, "artifact_domain_owner"),
            artifact_region: optional(section, "artifact_region"),
            npm_repository: optional(section, "npm_repository"),
            maven_server_ids,
            accounts,
        })
    }

    fn save_to_ini(&self, ini: &mut Ini) {
        let optional_values = [
            ("mfa_secret", &self.mfa_secret),
            ("artifact_domain", &self.artifact_domain),
            ("artifact_domain_owner", &self.artifact_domain_owner),
            ("artifact_region", &self.artifact_region),
            ("npm_repository", &self.npm_repository),
        ];

        ini.with_section(Some(SETTINGS_SECTION))
            .set("user", &self.user)
            .set("source_profile", &self.source_profile)
            .set("mfa_device_account", &self.mfa_device_account)
            .set("role_name", &self.role_name)
            .set("region", &self.region)
            .set("total_lifetime_hours", self.total_lifetime_hours.to_string())
            .set("primary_profile", &self.primary_profile)
            .set("secondary_target_account", &self.secondary_target_account)
            .set("secondary_role_name", &self.secondary_role_name)
            .set("secondary_profile", &self.secondary_profile)
            .set("backend", self.backend.as_str())
            .set("aws_cli", &self.aws_cli)
            .set("maven_server_ids", self.maven_server_ids.join(","));

        for (key, value) in optional_values {
            match value {
                Some(value) => {
                    ini.with_section(Some(SETTINGS_SECTION)).set(key, value);
                }
                None => {
                    if let Some(section) = ini.section_mut(Some(SETTINGS_SECTION)) {
                        section.remove(key);
                    }
                }
            }
        }

        for account in &self.accounts {
            ini.with_section(Some(format!("{ACCOUNT_SECTION_PREFIX}{}", account.name)))
                .set("id", &account.id);
        }
    }

    /// Apply MFA_SECRET_KEY and AWS_USER_NAME overrides
    fn apply_env(&mut self) {
        if let Some(secret) = env::var("MFA_SECRET_KEY").ok().filter(|s| !s.trim().is_empty()) {
            self.mfa_secret = Some(secret);
        }
        if let Some(user) = env::var("AWS_USER_NAME").ok().filter(|s| !s.trim().is_empty()) {
            self.user = user;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("user", &self.user),
            ("source_profile", &self.source_profile),
            ("role_name", &self.role_name),
            ("primary_profile", &self.primary_profile),
            ("secondary_profile", &self.secondary_profile),
        ];
        for (key, value) in required {
            if value.is_empty() {
                bail!("'{key}' must be set in the config file");
            }
        }

        if !is_account_id(&self.mfa_device_account) {
            bail!(
                "mfa_device_account must be a 12-digit account id, got '{}'",
                self.mfa_device_account
            );
        }
        if !is_account_id(&self.secondary_target_account) {
            bail!(
                "secondary_target_account must be a 12-digit account id, got '{}'",
                self.secondary_target_account
            );
        }
        if !(MIN_LIFETIME_HOURS..=MAX_LIFETIME_HOURS).contains(&self.total_lifetime_hours) {
            bail!(
                "total_lifetime_hours must be between {MIN_LIFETIME_HOURS} and {MAX_LIFETIME_HOURS}, got {}",
                self.total_lifetime_hours
            );
        }
        for account in &self.accounts {
            if !is_account_id(&account.id) {
                bail!(
                    "Account '{}' has an invalid id '{}'",
                    account.name,
                    account.id
                );
            }
        }
        Ok(())
    }

    /// Pick an account by name or id. With a single configured account the
    /// selector may be omitted.
    pub fn select_account(&self, selector: Option<&str>) -> Result<&Account> {
        let available = || {
            self.accounts
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        match (selector, self.accounts.as_slice()) {
            (_, []) => bail!("No accounts configured. Add an [account <name>] section with an id"),
            (None, [only]) => Ok(only),
            (None, _) => bail!(
                "Multiple accounts available. Please specify one with --account: {}",
                available()
            ),
            (Some(key), accounts) => accounts
                .iter()
                .find(|a| a.name == key || a.id == key)
                .with_context(|| {
                    format!(
                        "Account '{key}' not found. Available accounts: {}",
                        available()
                    )
                }),
        }
    }

    /// Build the immutable run configuration for `account`
    pub fn engine_config(&self, account: &Account, hours: Option<u32>) -> Result<EngineConfig> {
        let total_lifetime_hours = hours.unwrap_or(self.total_lifetime_hours);
        if !(MIN_LIFETIME_HOURS..=MAX_LIFETIME_HOURS).contains(&total_lifetime_hours) {
            bail!(
                "Lifetime must be between {MIN_LIFETIME_HOURS} and {MAX_LIFETIME_HOURS} hours, got {total_lifetime_hours}"
            );
        }

        Ok(EngineConfig {
            user: self.user.clone(),
            source_profile: self.source_profile.clone(),
            mfa_device_account: self.mfa_device_account.clone(),
            role_name: self.role_name.clone(),
            region: self.region.clone(),
            total_lifetime_hours,
            account: account.clone(),
            primary_profile: self.primary_profile.clone(),
            secondary_target_account: self.secondary_target_account.clone(),
            secondary_role_name: self.secondary_role_name.clone(),
            secondary_profile: self.secondary_profile.clone(),
            mfa_secret: self.mfa_secret.clone(),
        })
    }

    /// CodeArtifact coordinates, present only when a domain is configured
    pub fn artifact_repository(&self) -> Option<ArtifactRepository> {
        let domain = self.artifact_domain.clone()?;
        Some(ArtifactRepository {
            domain,
            domain_owner: self
                .artifact_domain_owner
                .clone()
                .unwrap_or_else(|| self.secondary_target_account.clone()),
            region: self
                .artifact_region
                .clone()
                .unwrap_or_else(|| self.region.clone()),
            npm_repository: self.npm_repository.clone().unwrap_or_else(|| "npm".to_string()),
        })
    }
}

fn is_account_id(value: &str) -> bool {
    value.len() == 12 && value.chars().all(|c| c.is_ascii_digit())
}

pub async fn load(path: &Path) -> Result<Config> {
    let ini = Ini::load_from_file(path).with_context(|| {
        format!(
            "Failed to load config file {}. Please run `stsrotate configure` first",
            path.display()
        )
    })?;

    let mut config = Config::from_ini(&ini)?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

pub async fn save(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut ini = if path.exists() {
        Ini::load_from_file(path).unwrap_or_else(|_| Ini::new())
    } else {
        Ini::new()
    };

    config.save_to_ini(&mut ini);

    ini.write_to_file(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

pub async fn configure_interactive(path: &Path) -> Result<()> {
    println!("Configuring stsrotate in {}", path.display());

    let existing_config = Ini::load_from_file(path)
        .ok()
        .and_then(|ini| Config::from_ini(&ini).ok());

    if existing_config.is_some() {
        println!("Press Enter to keep current values, or type new values.");
    }
    println!();

    let theme = ColorfulTheme::default();
    let current = existing_config.unwrap_or_default();

    let prompt_text = |prompt: &str, default: &str, required: bool| -> Result<String> {
        Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .default(default.to_string())
            .allow_empty(!required || !default.is_empty())
            .validate_with(move |input: &String| {
                if required && input.trim().is_empty() {
                    Err("This value is required")
                } else {
                    Ok(())
                }
            })
            .interact_text()
            .with_context(|| format!("Failed to read {prompt}"))
    };

    let prompt_account_id = |prompt: &str, default: &str| -> Result<String> {
        Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .default(default.to_string())
            .validate_with(|input: &String| {
                if is_account_id(input.trim()) {
                    Ok(())
                } else {
                    Err("Account ids are 12 digits")
                }
            })
            .interact_text()
            .with_context(|| format!("Failed to read {prompt}"))
    };

    let user = prompt_text("IAM user name", &current.user, true)?;
    let source_profile = prompt_text(
        "Source profile (long-lived keys)",
        &current.source_profile,
        true,
    )?;
    let mfa_device_account =
        prompt_account_id("MFA device account id", &current.mfa_device_account)?;
    let role_name = prompt_text("Role name to assume", &current.role_name, true)?;
    let region = prompt_text("Default region", &current.region, true)?;

    let total_lifetime_hours = Input::<u32>::with_theme(&theme)
        .with_prompt(format!(
            "Session lifetime hours ({MIN_LIFETIME_HOURS}-{MAX_LIFETIME_HOURS})"
        ))
        .default(current.total_lifetime_hours)
        .validate_with(|input: &u32| {
            if (MIN_LIFETIME_HOURS..=MAX_LIFETIME_HOURS).contains(input) {
                Ok(())
            } else {
                Err("Please enter a value between 1 and 36")
            }
        })
        .interact_text()
        .context("Failed to read session lifetime")?;

    let secondary_target_account =
        prompt_account_id("Secondary target account id", &current.secondary_target_account)?;
    let secondary_role_name = prompt_text(
        "Secondary role name",
        if current.secondary_role_name.is_empty() {
            &role_name
        } else {
            &current.secondary_role_name
        },
        true,
    )?;
    let artifact_domain = prompt_text(
        "CodeArtifact domain (empty to disable token propagation)",
        current.artifact_domain.as_deref().unwrap_or(""),
        false,
    )?;

    let mfa_secret = Password::with_theme(&theme)
        .with_prompt("MFA secret (empty to keep current / enter codes manually)")
        .allow_empty_password(true)
        .interact()
        .context("Failed to read MFA secret")?;

    let mut accounts = current.accounts.clone();
    loop {
        let entry = prompt_text("Add account as name=id (empty to finish)", "", false)?;
        let entry = entry.trim();
        if entry.is_empty() {
            break;
        }
        match entry.split_once('=') {
            Some((name, id)) if is_account_id(id.trim()) => {
                let name = name.trim().to_string();
                accounts.retain(|a| a.name != name);
                accounts.push(Account {
                    id: id.trim().to_string(),
                    name,
                });
            }
            _ => println!("Expected name=123456789012"),
        }
    }

    let config = Config {
        user,
        source_profile,
        mfa_device_account,
        role_name,
        region,
        total_lifetime_hours,
        secondary_target_account,
        secondary_role_name,
        artifact_domain: Some(artifact_domain).filter(|d| !d.trim().is_empty()),
        mfa_secret: Some(mfa_secret)
            .filter(|s| !s.trim().is_empty())
            .or(current.mfa_secret.clone()),
        accounts,
        ..current
    };

    config.validate()?;
    save(path, &config).await?;

    println!("\nConfiguration saved successfully.");
    Ok(())
}

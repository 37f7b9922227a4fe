use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use ini::Ini;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info};

use super::{ControlPlaneClient, Credentials};
use crate::{constants, error::EngineError};

/// Keys that live in the shared credentials file rather than the config file
const CREDENTIAL_KEYS: [&str; 3] = [
    "aws_access_key_id",
    "aws_secret_access_key",
    "aws_session_token",
];

/// Locations of the AWS shared credentials and config files
#[derive(Debug, Clone)]
pub struct ProfileFiles {
    pub credentials_path: PathBuf,
    pub config_path: PathBuf,
}

impl ProfileFiles {
    /// Resolve both files, honouring AWS_SHARED_CREDENTIALS_FILE and AWS_CONFIG_FILE
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            credentials_path: constants::get_aws_credentials_path()
                .context("Failed to determine AWS credentials path")?,
            config_path: constants::get_aws_config_path()
                .context("Failed to determine AWS config path")?,
        })
    }

    /// Set a single profile value the way `aws configure set` does
    pub async fn set_value(&self, key: &str, value: &str, profile: &str) -> Result<()> {
        let (path, section) = if CREDENTIAL_KEYS.contains(&key) {
            (&self.credentials_path, profile.to_string())
        } else {
            (&self.config_path, config_section_name(profile))
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let mut ini = if path.exists() {
            Ini::load_from_file(path)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Ini::new()
        };

        ini.with_section(Some(section)).set(key, value);

        ini.write_to_file(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if path == &self.credentials_path {
                let metadata = fs::metadata(path).await?;
                let mut permissions = metadata.permissions();
                permissions.set_mode(0o600);
                fs::set_permissions(path, permissions).await?;
            }
        }

        debug!("Set {} for profile {}", key, profile);
        Ok(())
    }

    /// Make sure both files end with a newline before `profile` is first added.
    ///
    /// Returns the number of files that were corrected. Files that already
    /// contain the profile's section, end with a newline, are empty or do not
    /// exist are left alone, so repeated calls are no-ops.
    pub async fn ensure_line_terminator(&self, profile: &str) -> Result<usize> {
        let targets = [
            (&self.credentials_path, format!("[{profile}]")),
            (&self.config_path, format!("[{}]", config_section_name(profile))),
        ];

        let mut corrected = 0;
        for (path, header) in targets {
            if !path.exists() {
                continue;
            }

            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;

            if content.is_empty() || content.ends_with('\n') || content.contains(&header) {
                continue;
            }

            let mut file = fs::OpenOptions::new()
                .append(true)
                .open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            file.write_all(b"\n")
                .await
                .with_context(|| format!("Failed to append newline to {}", path.display()))?;
            file.flush().await?;

            debug!("Appended missing newline to {}", path.display());
            corrected += 1;
        }

        Ok(corrected)
    }
}

/// Section name used in the config file: `default` or `profile <name>`
pub fn config_section_name(profile: &str) -> String {
    if profile == "default" {
        profile.to_string()
    } else {
        format!("profile {profile}")
    }
}

/// Writes credential quadruplets into named profiles through the control plane
#[derive(Clone)]
pub struct CredentialStore {
    files: ProfileFiles,
    client: Arc<dyn ControlPlaneClient>,
}

impl CredentialStore {
    pub fn new(files: ProfileFiles, client: Arc<dyn ControlPlaneClient>) -> Self {
        Self { files, client }
    }

    /// Overwrite the three credential fields of `profile` and set its region
    pub async fn write_profile(
        &self,
        profile: &str,
        creds: &Credentials,
        region: &str,
    ) -> Result<(), EngineError> {
        self.files
            .ensure_line_terminator(profile)
            .await
            .map_err(|e| persistence(profile, format!("{e:#}")))?;

        let values = [
            ("aws_access_key_id", creds.access_key_id.as_str()),
            ("aws_secret_access_key", creds.secret_access_key.as_str()),
            ("aws_session_token", creds.session_token.as_str()),
            ("region", region),
        ];

        for (key, value) in values {
            self.client
                .set_profile_value(key, value, profile)
                .await
                .map_err(|e| persistence(profile, e.to_string()))?;
        }

        info!("Credentials saved to profile: {}", profile);
        Ok(())
    }

    /// Set only the region of `profile`
    pub async fn set_region(&self, profile: &str, region: &str) -> Result<(), EngineError> {
        self.client
            .set_profile_value("region", region, profile)
            .await
            .map_err(|e| persistence(profile, e.to_string()))
    }
}

fn persistence(profile: &str, message: String) -> EngineError {
    EngineError::Persistence {
        profile: profile.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::fake::{Call, FakeClient};
    use aws_smithy_types::DateTime;
    use tempfile::TempDir;

    fn files_in(dir: &TempDir) -> ProfileFiles {
        ProfileFiles {
            credentials_path: dir.path().join("credentials"),
            config_path: dir.path().join("config"),
        }
    }

    fn sample_credentials() -> Credentials {
        Credentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: DateTime::from_secs(1_700_000_000),
        }
    }

    #[test]
    fn test_config_section_name() {
        assert_eq!(config_section_name("default"), "default");
        assert_eq!(config_section_name("rec-dev"), "profile rec-dev");
    }

    #[tokio::test]
    async fn test_set_value_routes_keys_to_files() {
        let dir = TempDir::new().unwrap();
        let files = files_in(&dir);

        files
            .set_value("aws_access_key_id", "AKIA1", "rec-dev")
            .await
            .unwrap();
        files.set_value("region", "us-west-2", "rec-dev").await.unwrap();
        files.set_value("region", "eu-west-1", "default").await.unwrap();

        let creds = Ini::load_from_file(&files.credentials_path).unwrap();
        assert_eq!(
            creds.section(Some("rec-dev")).unwrap().get("aws_access_key_id"),
            Some("AKIA1")
        );
        assert!(creds.section(Some("rec-dev")).unwrap().get("region").is_none());

        let config = Ini::load_from_file(&files.config_path).unwrap();
        assert_eq!(
            config.section(Some("profile rec-dev")).unwrap().get("region"),
            Some("us-west-2")
        );
        assert_eq!(
            config.section(Some("default")).unwrap().get("region"),
            Some("eu-west-1")
        );
    }

    #[tokio::test]
    async fn test_set_value_keeps_other_profiles() {
        let dir = TempDir::new().unwrap();
        let files = files_in(&dir);
        std::fs::write(
            &files.credentials_path,
            "[work]\naws_access_key_id = KEEP\n",
        )
        .unwrap();

        files
            .set_value("aws_session_token", "fresh", "default")
            .await
            .unwrap();

        let ini = Ini::load_from_file(&files.credentials_path).unwrap();
        assert_eq!(
            ini.section(Some("work")).unwrap().get("aws_access_key_id"),
            Some("KEEP")
        );
        assert_eq!(
            ini.section(Some("default")).unwrap().get("aws_session_token"),
            Some("fresh")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_credentials_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let files = files_in(&dir);
        files
            .set_value("aws_secret_access_key", "s", "default")
            .await
            .unwrap();

        let mode = std::fs::metadata(&files.credentials_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_ensure_line_terminator_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let files = files_in(&dir);
        std::fs::write(&files.credentials_path, "[other]\nkey = value").unwrap();
        std::fs::write(&files.config_path, "[profile other]\nregion = us-west-2").unwrap();

        assert_eq!(files.ensure_line_terminator("default").await.unwrap(), 2);
        assert_eq!(files.ensure_line_terminator("default").await.unwrap(), 0);

        let content = std::fs::read_to_string(&files.credentials_path).unwrap();
        assert_eq!(content, "[other]\nkey = value\n");
    }

    #[tokio::test]
    async fn test_ensure_line_terminator_skips_existing_profile_and_missing_files() {
        let dir = TempDir::new().unwrap();
        let files = files_in(&dir);
        assert_eq!(files.ensure_line_terminator("default").await.unwrap(), 0);

        std::fs::write(&files.credentials_path, "[default]\nkey = value").unwrap();
        assert_eq!(files.ensure_line_terminator("default").await.unwrap(), 0);
        let content = std::fs::read_to_string(&files.credentials_path).unwrap();
        assert!(!content.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_write_profile_twice_corrects_once() {
        let dir = TempDir::new().unwrap();
        let files = files_in(&dir);
        std::fs::write(&files.credentials_path, "[other]\nkey = value").unwrap();

        let client = Arc::new(FakeClient::new());
        let store = CredentialStore::new(files.clone(), client.clone());

        store
            .write_profile("default", &sample_credentials(), "us-west-2")
            .await
            .unwrap();
        store
            .write_profile("default", &sample_credentials(), "us-west-2")
            .await
            .unwrap();

        let content = std::fs::read_to_string(&files.credentials_path).unwrap();
        assert_eq!(content, "[other]\nkey = value\n");

        let writes = client
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::SetProfileValue { .. }))
            .count();
        assert_eq!(writes, 8);
    }

    #[tokio::test]
    async fn test_write_profile_sends_all_fields() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::new());
        let store = CredentialStore::new(files_in(&dir), client.clone());

        store
            .write_profile("default", &sample_credentials(), "us-west-2")
            .await
            .unwrap();

        assert_eq!(
            client.profile_values("default"),
            vec![
                ("aws_access_key_id".to_string(), "ASIAEXAMPLE".to_string()),
                ("aws_secret_access_key".to_string(), "secret".to_string()),
                ("aws_session_token".to_string(), "token".to_string()),
                ("region".to_string(), "us-west-2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_write_profile_failure_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(FakeClient::new());
        client.fail_profile_writes();
        let store = CredentialStore::new(files_in(&dir), client);

        let err = store
            .write_profile("default", &sample_credentials(), "us-west-2")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Persistence { .. }));
    }
}

use std::{env, path::PathBuf};

use dirs;

/// Configuration directory name under ~/.config
pub const CONFIG_DIR_NAME: &str = "stsrotate";

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "config";

/// Log file written inside the configuration directory
pub const LOG_FILE_NAME: &str = "stsrotate.log";

/// AWS configuration directory name
pub const AWS_CONFIG_DIR_NAME: &str = ".aws";

/// AWS configuration file name
pub const AWS_CONFIG_FILE_NAME: &str = "config";

/// AWS shared credentials file name
pub const AWS_CREDENTIALS_FILE_NAME: &str = "credentials";

/// Default AWS region for profiles and for STS when nothing is configured
pub const DEFAULT_AWS_REGION: &str = "us-west-2";

/// Minimum MFA session lifetime in hours
pub const MIN_LIFETIME_HOURS: u32 = 1;

/// Maximum MFA session lifetime in hours (GetSessionToken ceiling for IAM users)
pub const MAX_LIFETIME_HOURS: u32 = 36;

/// Default MFA session lifetime in hours
pub const DEFAULT_LIFETIME_HOURS: u32 = 36;

/// Profile that receives the primary role credentials
pub const DEFAULT_PRIMARY_PROFILE: &str = "default";

/// Profile that receives the secondary role credentials
pub const DEFAULT_SECONDARY_PROFILE: &str = "default-codeartifact";

/// Default binary for the process-backed control plane
pub const DEFAULT_AWS_CLI: &str = "aws";

fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().or_else(|| {
        env::var("HOME")
            .or_else(|_| env::var("USERPROFILE"))
            .ok()
            .map(PathBuf::from)
    })
}

/// Directory holding the config and log files: ~/.config/stsrotate
pub fn app_dir() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".config").join(CONFIG_DIR_NAME))
}

/// Get the tool's config file path
/// Respects STSROTATE_CONFIG environment variable if set
pub fn get_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("STSROTATE_CONFIG") {
        return Some(PathBuf::from(path));
    }

    app_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Get the AWS config file path
/// Respects AWS_CONFIG_FILE environment variable if set
pub fn get_aws_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }

    home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join(AWS_CONFIG_FILE_NAME))
}

/// Get the AWS credentials file path
/// Respects AWS_SHARED_CREDENTIALS_FILE environment variable if set
pub fn get_aws_credentials_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("AWS_SHARED_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }

    home_dir().map(|home| home.join(AWS_CONFIG_DIR_NAME).join(AWS_CREDENTIALS_FILE_NAME))
}

/// Maven user settings: ~/.m2/settings.xml
pub fn get_maven_settings_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".m2").join("settings.xml"))
}

/// npm user config
/// Respects NPM_CONFIG_USERCONFIG environment variable if set
pub fn get_npmrc_path() -> Option<PathBuf> {
    if let Ok(path) = env::var("NPM_CONFIG_USERCONFIG") {
        return Some(PathBuf::from(path));
    }

    home_dir().map(|home| home.join(".npmrc"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_get_config_path_with_env() {
        let original = env::var("STSROTATE_CONFIG").ok();

        unsafe {
            env::set_var("STSROTATE_CONFIG", "/custom/stsrotate.ini");
        }
        assert_eq!(
            get_config_path(),
            Some(PathBuf::from("/custom/stsrotate.ini"))
        );

        unsafe {
            match original {
                Some(val) => env::set_var("STSROTATE_CONFIG", val),
                None => env::remove_var("STSROTATE_CONFIG"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_get_config_path_default() {
        let original = env::var("STSROTATE_CONFIG").ok();

        unsafe {
            env::remove_var("STSROTATE_CONFIG");
        }
        if let Some(p) = get_config_path() {
            let path_str = p.to_string_lossy();
            assert!(path_str.contains(CONFIG_DIR_NAME));
            assert!(path_str.ends_with(CONFIG_FILE_NAME));
        }

        unsafe {
            if let Some(val) = original {
                env::set_var("STSROTATE_CONFIG", val);
            }
        }
    }

    #[test]
    #[serial]
    fn test_get_aws_config_path_with_env() {
        let original = env::var("AWS_CONFIG_FILE").ok();

        unsafe {
            env::set_var("AWS_CONFIG_FILE", "/custom/aws/config");
        }
        let path = get_aws_config_path();
        assert_eq!(path, Some(PathBuf::from("/custom/aws/config")));

        unsafe {
            match original {
                Some(val) => env::set_var("AWS_CONFIG_FILE", val),
                None => env::remove_var("AWS_CONFIG_FILE"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_get_aws_credentials_path_with_env() {
        let original = env::var("AWS_SHARED_CREDENTIALS_FILE").ok();

        unsafe {
            env::set_var("AWS_SHARED_CREDENTIALS_FILE", "/custom/path/credentials");
        }
        let path = get_aws_credentials_path();
        assert_eq!(path, Some(PathBuf::from("/custom/path/credentials")));

        unsafe {
            match original {
                Some(val) => env::set_var("AWS_SHARED_CREDENTIALS_FILE", val),
                None => env::remove_var("AWS_SHARED_CREDENTIALS_FILE"),
            }
        }
    }

    #[test]
    #[serial]
    fn test_get_aws_credentials_path_default() {
        let original = env::var("AWS_SHARED_CREDENTIALS_FILE").ok();

        unsafe {
            env::remove_var("AWS_SHARED_CREDENTIALS_FILE");
        }
        if let Some(p) = get_aws_credentials_path() {
            let path_str = p.to_string_lossy();
            assert!(path_str.contains(AWS_CONFIG_DIR_NAME));
            assert!(path_str.contains(AWS_CREDENTIALS_FILE_NAME));
        }

        unsafe {
            if let Some(val) = original {
                env::set_var("AWS_SHARED_CREDENTIALS_FILE", val);
            }
        }
    }

    #[test]
    #[serial]
    fn test_get_npmrc_path_with_env() {
        let original = env::var("NPM_CONFIG_USERCONFIG").ok();

        unsafe {
            env::set_var("NPM_CONFIG_USERCONFIG", "/tmp/project.npmrc");
        }
        assert_eq!(get_npmrc_path(), Some(PathBuf::from("/tmp/project.npmrc")));

        unsafe {
            match original {
                Some(val) => env::set_var("NPM_CONFIG_USERCONFIG", val),
                None => env::remove_var("NPM_CONFIG_USERCONFIG"),
            }
        }
    }
}

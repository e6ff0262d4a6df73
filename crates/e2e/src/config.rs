//! Harness configuration
//!
//! Everything a run needs (URLs, credentials, database container) lives in
//! [`E2eConfig`]. It is read once by the entry point from a TOML file and the
//! environment, then passed down explicitly.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::playwright::PlaywrightConfig;
use crate::spec::App;

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct E2eConfig {
    pub deployment: DeploymentConfig,
    pub credentials: Credentials,
    pub database: DatabaseConfig,
    pub playwright: PlaywrightConfig,

    /// Directory with declarative YAML specs, relative to the crate when run via `cargo test`
    pub specs_dir: PathBuf,

    /// Output directory for results and failure screenshots
    pub output_dir: PathBuf,

    /// Where saved login sessions (storage state) are kept
    pub auth_dir: PathBuf,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            deployment: DeploymentConfig::default(),
            credentials: Credentials::default(),
            database: DatabaseConfig::default(),
            playwright: PlaywrightConfig::default(),
            specs_dir: PathBuf::from("specs"),
            output_dir: PathBuf::from("test-results"),
            auth_dir: PathBuf::from(".auth"),
        }
    }
}

/// The running deployment under test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Base URL of the admin console
    pub admin_url: String,

    /// Base URL of the user application
    pub user_url: String,

    /// How long to wait for both apps to answer
    pub startup_timeout_secs: u64,

    /// Skip readiness polling (e.g. when the apps sit behind auth-only health endpoints)
    pub skip_readiness_check: bool,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            admin_url: "http://localhost:8000/admin/".to_string(),
            user_url: "http://localhost:8000/".to_string(),
            startup_timeout_secs: 30,
            skip_readiness_check: false,
        }
    }
}

impl DeploymentConfig {
    pub fn base_url(&self, app: App) -> &str {
        match app {
            App::Admin => &self.admin_url,
            App::User => &self.user_url,
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

/// Accounts that already exist on the deployment
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub admin_email: String,
    pub admin_password: String,

    /// Base32 secret when the admin account has 2FA enabled
    pub admin_otp_secret: Option<String>,

    pub user_email: String,
    pub user_password: String,

    /// Password given to users registered during a run
    pub new_user_password: String,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            admin_email: String::new(),
            admin_password: String::new(),
            admin_otp_secret: None,
            user_email: String::new(),
            user_password: String::new(),
            new_user_password: "TestPass123!".to_string(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("admin_email", &self.admin_email)
            .field("admin_otp_secret", &self.admin_otp_secret.as_ref().map(|_| "<redacted>"))
            .field("user_email", &self.user_email)
            .finish_non_exhaustive()
    }
}

/// PostgreSQL container used for test fixtures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub container: String,
    pub user: String,
    pub name: String,

    /// `assets_on_network` id of ETH on Sepolia
    pub eth_asset_id: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            container: "custody-postgres".to_string(),
            user: "user".to_string(),
            name: "custody".to_string(),
            eth_asset_id: "2745a97c-2201-52f5-b41e-dfb933bea3b5".to_string(),
        }
    }
}

/// Values taken from the environment (or `.env`) by the entry point.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub admin_url: Option<String>,
    pub user_url: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_otp_secret: Option<String>,
    pub user_email: Option<String>,
    pub user_password: Option<String>,
    pub db_container: Option<String>,
}

impl E2eConfig {
    /// Load configuration from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> E2eResult<Self> {
        let mut config: Self = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            Self::default()
        };
        config.normalize();
        Ok(config)
    }

    /// Apply environment overrides; empty values are ignored
    pub fn apply_env(&mut self, env: &EnvOverrides) {
        fn set(target: &mut String, value: &Option<String>) {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *target = v.to_string();
            }
        }

        set(&mut self.deployment.admin_url, &env.admin_url);
        set(&mut self.deployment.user_url, &env.user_url);
        set(&mut self.credentials.admin_email, &env.admin_email);
        set(&mut self.credentials.admin_password, &env.admin_password);
        set(&mut self.credentials.user_email, &env.user_email);
        set(&mut self.credentials.user_password, &env.user_password);
        set(&mut self.database.container, &env.db_container);

        if let Some(secret) = env.admin_otp_secret.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            self.credentials.admin_otp_secret = Some(secret.to_string());
        }

        self.normalize();
    }

    /// Check that a run can start
    pub fn validate(&self) -> E2eResult<()> {
        for (name, url) in [
            ("admin_url", &self.deployment.admin_url),
            ("user_url", &self.deployment.user_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(E2eError::Config(format!("{} must be an http(s) URL, got '{}'", name, url)));
            }
        }

        if let Some(secret) = &self.credentials.admin_otp_secret {
            custody_otp::SharedSecret::parse(secret)
                .map_err(|e| E2eError::Config(format!("admin_otp_secret: {}", e)))?;
        }

        Ok(())
    }

    /// Storage state file for a saved login
    pub fn auth_file(&self, app: App) -> PathBuf {
        match app {
            App::Admin => self.auth_dir.join("admin.json"),
            App::User => self.auth_dir.join("user.json"),
        }
    }

    fn normalize(&mut self) {
        self.deployment.admin_url = with_trailing_slash(&self.deployment.admin_url);
        self.deployment.user_url = with_trailing_slash(&self.deployment.user_url);
    }
}

/// Relative navigation (`goto('login')`) resolves against the base URL only
/// when it ends with a slash.
fn with_trailing_slash(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() || url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = E2eConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.database.container, "custody-postgres");
        assert_eq!(config.credentials.new_user_password, "TestPass123!");
        assert!(config.deployment.user_url.ends_with('/'));
    }

    #[test]
    fn test_default_config_has_registration_password() {
        let config = E2eConfig::default();
        assert_eq!(config.credentials.new_user_password, "TestPass123!");

        let credentials: Credentials = toml::from_str("user_email = \"user@custody.test\"").unwrap();
        assert_eq!(credentials.new_user_password, "TestPass123!");
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("e2e.toml");
        std::fs::write(
            &path,
            r#"
[deployment]
admin_url = "https://admin.custody.test"
user_url = "https://app.custody.test/"

[credentials]
admin_email = "admin@custody.test"
admin_otp_secret = "JBSWY3DPEHPK3PXP"

[playwright]
browser = "firefox"
"#,
        )
        .unwrap();

        let config = E2eConfig::load(&path).unwrap();
        assert_eq!(config.deployment.admin_url, "https://admin.custody.test/");
        assert_eq!(config.deployment.user_url, "https://app.custody.test/");
        assert_eq!(config.deployment.startup_timeout_secs, 30);
        assert_eq!(config.credentials.admin_email, "admin@custody.test");
        assert_eq!(config.database.name, "custody");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_win_and_blank_values_are_ignored() {
        let mut config = E2eConfig::default();
        config.apply_env(&EnvOverrides {
            admin_url: Some("http://10.0.0.5:9000/admin".to_string()),
            user_email: Some("   ".to_string()),
            admin_otp_secret: Some("GEZDGNBVGY3TQOJQ".to_string()),
            ..Default::default()
        });

        assert_eq!(config.deployment.admin_url, "http://10.0.0.5:9000/admin/");
        assert_eq!(config.credentials.user_email, "");
        assert_eq!(config.credentials.admin_otp_secret.as_deref(), Some("GEZDGNBVGY3TQOJQ"));
    }

    #[test]
    fn test_validate_rejects_bad_inputs() {
        let mut config = E2eConfig::default();
        config.deployment.user_url = "localhost:8000/".to_string();
        assert!(matches!(config.validate(), Err(E2eError::Config(_))));

        let mut config = E2eConfig::default();
        config.credentials.admin_otp_secret = Some("not-base32!".to_string());
        assert!(matches!(config.validate(), Err(E2eError::Config(_))));
    }

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let credentials = Credentials {
            admin_password: "hunter2".to_string(),
            admin_otp_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("JBSWY3DPEHPK3PXP"));
    }
}

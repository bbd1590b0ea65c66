use anyhow::{Context, Result};
use lpm_native::{TransferConfig, TrustStore};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "lpm.toml";

/// The lpm configuration file structure (lpm.toml)
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LpmConfig {
    /// Transfer settings for package downloads
    pub http: HttpConfig,

    /// Certificate trust store
    pub trust: TrustConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// User agent sent with every request
    pub user_agent: Option<String>,

    /// Whole-transfer timeout in seconds; 0 disables it
    pub timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrustConfig {
    /// Directory of PEM bundles
    pub dir: Option<PathBuf>,

    /// Single PEM bundle
    pub file: Option<PathBuf>,
}

impl LpmConfig {
    /// Load configuration from lpm.toml, searching upward from the given directory
    pub fn load(start_dir: &Path) -> Result<Option<Self>> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE);

            if config_path.is_file() {
                let content = std::fs::read_to_string(&config_path)
                    .with_context(|| format!("can't read {}", config_path.display()))?;
                let config: LpmConfig = toml::from_str(&content)
                    .with_context(|| format!("can't parse {}", config_path.display()))?;
                log::debug!("loaded configuration from {}", config_path.display());
                return Ok(Some(config));
            }

            if !current.pop() {
                return Ok(None);
            }
        }
    }

    pub fn load_from_cwd() -> Result<Option<Self>> {
        let cwd = std::env::current_dir()?;
        Self::load(&cwd)
    }

    pub fn trust_store(&self) -> Option<TrustStore> {
        match (&self.trust.dir, &self.trust.file) {
            (Some(dir), _) => Some(TrustStore::dir(dir)),
            (None, Some(file)) => Some(TrustStore::file(file)),
            (None, None) => None,
        }
    }
}

/// Command-line values that win over the configuration file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub user_agent: Option<String>,
    pub ca_dir: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
}

/// Merge the configuration file and command-line flags into a transfer
/// configuration. Flags take precedence.
pub fn transfer_config(config: Option<&LpmConfig>, overrides: Overrides) -> TransferConfig {
    let mut transfer = TransferConfig::new();

    if let Some(cfg) = config {
        if let Some(user_agent) = &cfg.http.user_agent {
            transfer = transfer.with_user_agent(user_agent.clone());
        }
        match cfg.http.timeout {
            Some(0) | None => {}
            Some(seconds) => transfer = transfer.with_timeout(Duration::from_secs(seconds)),
        }
        if let Some(store) = cfg.trust_store() {
            transfer = transfer.with_trust_store(store);
        }
    }

    if let Some(user_agent) = overrides.user_agent {
        transfer = transfer.with_user_agent(user_agent);
    }
    if let Some(dir) = overrides.ca_dir {
        transfer = transfer.with_trust_store(TrustStore::dir(dir));
    } else if let Some(file) = overrides.ca_file {
        transfer = transfer.with_trust_store(TrustStore::file(file));
    }

    transfer
}

#[cfg(test)]
mod tests {
    use super::*;
    use lpm_native::TrustStoreKind;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_config() {
        let config: LpmConfig = toml::from_str("").unwrap();
        assert!(config.http.user_agent.is_none());
        assert!(config.http.timeout.is_none());
        assert!(config.trust_store().is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[http]
user_agent = "lpm-ci"
timeout = 30

[trust]
file = "/etc/ssl/cert.pem"
"#;
        let config: LpmConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.http.user_agent.as_deref(), Some("lpm-ci"));
        assert_eq!(config.http.timeout, Some(30));

        let store = config.trust_store().unwrap();
        assert_eq!(store.kind, TrustStoreKind::File);
        assert_eq!(store.path, PathBuf::from("/etc/ssl/cert.pem"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result: std::result::Result<LpmConfig, _> = toml::from_str("[http]\nretries = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_searches_upward() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[http]\nuser_agent = \"found\"\n").unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let config = LpmConfig::load(&nested).unwrap().unwrap();
        assert_eq!(config.http.user_agent.as_deref(), Some("found"));
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[http\n").unwrap();

        let error = LpmConfig::load(dir.path()).unwrap_err();
        assert!(error.to_string().contains("can't parse"));
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let config: LpmConfig = toml::from_str("[http]\ntimeout = 0\n").unwrap();
        let transfer = transfer_config(Some(&config), Overrides::default());
        assert!(transfer.timeout.is_none());

        let config: LpmConfig = toml::from_str("[http]\ntimeout = 12\n").unwrap();
        let transfer = transfer_config(Some(&config), Overrides::default());
        assert_eq!(transfer.timeout, Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_flags_override_file() {
        let config: LpmConfig = toml::from_str(
            "[http]\nuser_agent = \"from-file\"\n[trust]\nfile = \"/file.pem\"\n",
        )
        .unwrap();
        let overrides = Overrides {
            user_agent: Some("from-flag".to_string()),
            ca_dir: Some(PathBuf::from("/certs")),
            ca_file: None,
        };

        let transfer = transfer_config(Some(&config), overrides);
        assert_eq!(transfer.user_agent, "from-flag");
        let store = transfer.trust_store.unwrap();
        assert_eq!(store.kind, TrustStoreKind::Dir);
        assert_eq!(store.path, PathBuf::from("/certs"));
    }

    #[test]
    fn test_no_config_keeps_defaults() {
        let transfer = transfer_config(None, Overrides::default());
        assert_eq!(transfer.user_agent, TransferConfig::default().user_agent);
        assert!(transfer.trust_store.is_none());
    }
}

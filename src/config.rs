//! Configuration Management
//!
//! Handles persistent configuration storage for ghl. Settings live in
//! `config.json`; the API token is kept apart in `credentials.json` so the
//! settings file can be shared without leaking it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// API version sent in the `Version` header unless configured otherwise
pub const DEFAULT_API_VERSION: &str = "2021-07-28";

pub const DEFAULT_BASE_URL: &str = "https://services.leadconnectorhq.com";

/// Overrides the configuration directory (mostly useful for tests and CI)
pub const CONFIG_DIR_ENV: &str = "GHL_CONFIG_DIR";

const CONFIG_FILE: &str = "config.json";
const CREDENTIALS_FILE: &str = "credentials.json";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Default location (sub-account) ID
    #[serde(default)]
    pub location_id: Option<String>,
    /// Value of the `Version` header
    #[serde(default)]
    pub api_version: Option<String>,
    /// Default output format (table, json, csv, quiet)
    #[serde(default)]
    pub output_format: Option<String>,
    /// API base URL
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct StoredCredentials {
    #[serde(default)]
    api_token: Option<String>,
}

/// Get the config directory (`$GHL_CONFIG_DIR`, else `<config_dir>/ghl`)
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(custom) = std::env::var(CONFIG_DIR_ENV) {
        if !custom.is_empty() {
            return Some(PathBuf::from(custom));
        }
    }
    dirs::config_dir().map(|p| p.join("ghl"))
}

impl Config {
    /// Load configuration from the default directory
    pub fn load() -> Self {
        let Some(dir) = config_dir() else {
            return Self::default();
        };
        Self::load_from(&dir)
    }

    /// Load configuration from `dir`, falling back to defaults when the
    /// file is missing or unreadable
    pub fn load_from(dir: &Path) -> Self {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config {:?}: {}", path, e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Could not read config {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Save configuration to the default directory
    pub fn save(&self) -> Result<PathBuf> {
        let dir = config_dir().context("could not locate a config directory for the current user")?;
        self.save_to(&dir)
    }

    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self).context("serializing config")?;
        write_private(&path, &content)?;
        Ok(path)
    }

    pub fn effective_api_version(&self) -> String {
        self.api_version
            .clone()
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string())
    }

    pub fn effective_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }
}

/// Read the stored API token, if any
pub fn load_token(dir: &Path) -> Result<Option<String>> {
    let path = dir.join(CREDENTIALS_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
    let stored: StoredCredentials =
        serde_json::from_str(&content).with_context(|| format!("parsing {:?}", path))?;
    Ok(stored
        .api_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty()))
}

/// Persist the API token with owner-only permissions
pub fn save_token(dir: &Path, token: &str) -> Result<PathBuf> {
    let token = token.trim();
    if token.is_empty() {
        anyhow::bail!("token cannot be empty");
    }
    let path = dir.join(CREDENTIALS_FILE);
    let stored = StoredCredentials {
        api_token: Some(token.to_string()),
    };
    let content = serde_json::to_string_pretty(&stored).context("serializing credentials")?;
    write_private(&path, &content)?;
    Ok(path)
}

/// Remove the stored API token. Returns whether a token file existed.
pub fn clear_token(dir: &Path) -> Result<bool> {
    let path = dir.join(CREDENTIALS_FILE);
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(&path).with_context(|| format!("removing {:?}", path))?;
    Ok(true)
}

fn write_private(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    // Owner-only from the moment the file exists
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("opening {:?}", path))?;

    // `mode` only applies on creation; tighten a file left by an older run
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .with_context(|| format!("securing {:?}", path))?;
    }

    file.write_all(content.as_bytes())
        .with_context(|| format!("writing {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_is_default() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(dir.path());
        assert_eq!(config, Config::default());
        assert_eq!(config.effective_api_version(), DEFAULT_API_VERSION);
        assert_eq!(config.effective_base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_save_and_reload_config() {
        let dir = tempdir().unwrap();
        let config = Config {
            location_id: Some("LOC1".into()),
            output_format: Some("json".into()),
            ..Config::default()
        };
        config.save_to(dir.path()).unwrap();
        assert_eq!(Config::load_from(dir.path()), config);
    }

    #[test]
    fn test_malformed_config_falls_back_to_default() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        assert_eq!(Config::load_from(dir.path()), Config::default());
    }

    #[test]
    fn test_token_roundtrip_and_clear() {
        let dir = tempdir().unwrap();
        assert_eq!(load_token(dir.path()).unwrap(), None);

        save_token(dir.path(), "  secret-token \n").unwrap();
        assert_eq!(load_token(dir.path()).unwrap().as_deref(), Some("secret-token"));

        assert!(clear_token(dir.path()).unwrap());
        assert!(!clear_token(dir.path()).unwrap());
        assert_eq!(load_token(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_empty_token_rejected() {
        let dir = tempdir().unwrap();
        assert!(save_token(dir.path(), "   ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_credentials_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = save_token(dir.path(), "tok").unwrap();
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_credentials_file_is_tightened() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = save_token(dir.path(), "first-token").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        save_token(dir.path(), "second").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(load_token(dir.path()).unwrap().as_deref(), Some("second"));
    }
}

//! Credential resolution
//!
//! Environment variables always win over persisted configuration. The
//! token is mandatory; the location id may still be supplied per command,
//! so its absence is only reported when a request needs it.

use std::fmt;
use std::path::Path;

use super::error::{GhlError, Result};
use crate::config::{self, Config};

pub const TOKEN_ENV: &str = "GHL_API_TOKEN";
pub const LOCATION_ENV: &str = "GHL_LOCATION_ID";

/// Token and default location for one invocation
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    location_id: Option<String>,
}

impl Credential {
    pub fn new(token: impl Into<String>, location_id: Option<String>) -> Self {
        Self {
            token: token.into(),
            location_id,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }

    /// Location id, or a `Config` error explaining how to set one
    pub fn require_location(&self) -> Result<&str> {
        self.location_id().ok_or_else(|| {
            GhlError::config(format!(
                "No location ID configured. Run 'ghl config set-location <location_id>', \
                 set {LOCATION_ENV}, or pass --location."
            ))
        })
    }
}

// Never print the token itself
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &mask_token(&self.token))
            .field("location_id", &self.location_id)
            .finish()
    }
}

/// Show only the last four characters of a token
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}

/// Resolve credentials from the process environment and the default config directory
pub fn resolve(location_override: Option<String>) -> Result<Credential> {
    let dir = config::config_dir();
    resolve_with(|key| std::env::var(key).ok(), dir.as_deref(), location_override)
}

/// Resolve credentials using `env` for variable lookup and `dir` for persisted state
pub fn resolve_with<F>(
    env: F,
    dir: Option<&Path>,
    location_override: Option<String>,
) -> Result<Credential>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |v: Option<String>| {
        v.map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    let token = match non_empty(env(TOKEN_ENV)) {
        Some(token) => Some(token),
        None => match dir {
            Some(dir) => config::load_token(dir)?,
            None => None,
        },
    };

    let Some(token) = token else {
        return Err(GhlError::config(format!(
            "No API token configured. Run 'ghl config set-token' or set {TOKEN_ENV}."
        )));
    };

    let location_id = non_empty(location_override)
        .or_else(|| non_empty(env(LOCATION_ENV)))
        .or_else(|| dir.and_then(|d| non_empty(Config::load_from(d).location_id)));

    tracing::debug!(
        "Resolved credentials (location: {})",
        location_id.as_deref().unwrap_or("<none>")
    );

    Ok(Credential { token, location_id })
}

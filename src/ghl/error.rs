//! Error taxonomy
//!
//! Every failure a command can surface maps onto one [`ErrorKind`], and
//! each kind has a stable process exit code for scripting.

use std::fmt;
use thiserror::Error;

/// Coarse classification of a [`GhlError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    Validation,
    RateLimitExceeded,
    Network,
    Api,
    Cancelled,
}

impl ErrorKind {
    /// Process exit code for this kind
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Config => 2,
            ErrorKind::Validation => 3,
            ErrorKind::RateLimitExceeded => 4,
            ErrorKind::Network => 5,
            ErrorKind::Api => 6,
            ErrorKind::Cancelled => 130,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Config => "config",
            ErrorKind::Validation => "validation",
            ErrorKind::RateLimitExceeded => "rate-limit",
            ErrorKind::Network => "network",
            ErrorKind::Api => "api",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum GhlError {
    #[error("{0}")]
    Config(String),

    #[error("{message}")]
    Validation {
        message: String,
        /// Fields the action requires but the caller did not supply
        missing: Vec<String>,
    },

    #[error("rate limit still exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("{message}")]
    Network { message: String, attempts: u32 },

    #[error("HTTP {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("command cancelled")]
    Cancelled,
}

impl GhlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GhlError::Config(_) => ErrorKind::Config,
            GhlError::Validation { .. } => ErrorKind::Validation,
            GhlError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            GhlError::Network { .. } => ErrorKind::Network,
            GhlError::Api { .. } => ErrorKind::Api,
            GhlError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    pub fn config(message: impl Into<String>) -> Self {
        GhlError::Config(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        GhlError::Validation {
            message: message.into(),
            missing: Vec::new(),
        }
    }

    pub fn missing_fields(missing: Vec<String>) -> Self {
        GhlError::Validation {
            message: format!("missing required field(s): {}", missing.join(", ")),
            missing,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        GhlError::Network {
            message: message.into(),
            attempts: 0,
        }
    }
}

impl From<anyhow::Error> for GhlError {
    fn from(err: anyhow::Error) -> Self {
        GhlError::Config(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, GhlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let kinds = [
            ErrorKind::Config,
            ErrorKind::Validation,
            ErrorKind::RateLimitExceeded,
            ErrorKind::Network,
            ErrorKind::Api,
            ErrorKind::Cancelled,
        ];
        let mut codes: Vec<i32> = kinds.iter().map(|k| k.exit_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn test_missing_fields_message_lists_fields() {
        let err = GhlError::missing_fields(vec!["email".into(), "phone".into()]);
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "missing required field(s): email, phone");
    }

    #[test]
    fn test_api_error_display() {
        let err = GhlError::Api {
            status: 422,
            code: Some("INVALID".into()),
            message: "email is invalid".into(),
        };
        assert_eq!(err.to_string(), "HTTP 422: email is invalid");
        assert_eq!(err.exit_code(), 6);
    }
}

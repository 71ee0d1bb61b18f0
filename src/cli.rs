//! Command-line surface
//!
//! Resource commands are not enumerated here: anything that is not a
//! built-in subcommand is parsed as `<resource> <action> [ID] ...` and
//! checked against the resource registry.

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use tracing::Level;

use crate::ghl::error::{GhlError, Result};
use crate::output::OutputFormat;
use crate::resource::Params;

/// Records fetched by list actions unless `--limit` or `--all` is given
pub const DEFAULT_LIMIT: usize = 20;

/// Overall command timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Command-line client for the GoHighLevel API
#[derive(Parser, Debug)]
#[command(
    name = "ghl",
    version = crate::VERSION,
    about,
    long_about = None,
    after_help = "Run 'ghl resources' to list resources and their actions.\n\
                  Quick start:\n  ghl config set-token\n  ghl config set-location <LOCATION_ID>\n  ghl contacts list"
)]
pub struct Cli {
    #[command(flatten)]
    pub output: OutputFlags,

    /// Location (sub-account) ID for this command
    #[arg(long, global = true)]
    pub location: Option<String>,

    /// Give up after this many seconds (0 disables the timeout)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Log level for debugging (written to the log file)
    #[arg(long, value_enum, default_value = "off")]
    pub log_level: LogLevel,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Copy, Default)]
#[group(multiple = false)]
pub struct OutputFlags {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Output as CSV
    #[arg(long)]
    pub csv: bool,

    /// Output only IDs
    #[arg(short, long)]
    pub quiet: bool,
}

impl OutputFlags {
    pub fn format(&self) -> Option<OutputFormat> {
        if self.json {
            Some(OutputFormat::Json)
        } else if self.csv {
            Some(OutputFormat::Csv)
        } else if self.quiet {
            Some(OutputFormat::Quiet)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage CLI configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// List resources and their actions
    Resources,
    /// <resource> <action> [ID] [-p key=value]...
    #[command(external_subcommand)]
    Resource(Vec<String>),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Store the API token (read from stdin when omitted)
    SetToken { token: Option<String> },
    /// Set the default location (sub-account) ID
    SetLocation { location_id: String },
    /// Set the default output format
    SetFormat {
        #[arg(value_enum)]
        format: OutputFormat,
    },
    /// Show current configuration
    Show,
    /// Remove the stored API token
    Clear,
}

/// Arguments after the resource name
#[derive(Parser, Debug)]
pub struct ResourceArgs {
    /// Action to run (see 'ghl resources')
    pub action: String,

    /// Record ID, or the parent ID for nested resources
    pub id: Option<String>,

    /// Parameter as key=value, or key:=json for raw JSON values
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Maximum number of records for list actions
    #[arg(short, long, conflicts_with = "all")]
    pub limit: Option<usize>,

    /// Fetch every page
    #[arg(long)]
    pub all: bool,

    #[command(flatten)]
    pub output: OutputFlags,

    /// Location (sub-account) ID for this command
    #[arg(long)]
    pub location: Option<String>,
}

impl ResourceArgs {
    /// `None` means no limit
    pub fn effective_limit(&self) -> Option<usize> {
        if self.all {
            None
        } else {
            Some(self.limit.unwrap_or(DEFAULT_LIMIT))
        }
    }
}

/// Turn a clap parse failure into command output: help and version text
/// is printed as a success, anything else is a usage (validation) error
pub fn usage_outcome(err: clap::Error) -> Result<String> {
    if err.use_stderr() {
        let text = err.to_string();
        let message = text.trim().trim_start_matches("error: ");
        Err(GhlError::validation(message.to_string()))
    } else {
        Ok(err.to_string().trim_end().to_string())
    }
}

/// Parse one `-p` argument
pub fn parse_param(raw: &str) -> std::result::Result<(String, Value), String> {
    let Some(eq) = raw.find('=') else {
        return Err(format!("invalid parameter '{raw}': expected key=value or key:=json"));
    };

    let (key, value) = (&raw[..eq], &raw[eq + 1..]);
    let (key, value) = match key.strip_suffix(':') {
        Some(key) => {
            let parsed = serde_json::from_str(value)
                .map_err(|e| format!("invalid JSON for parameter '{key}': {e}"))?;
            (key, parsed)
        }
        None => (key, Value::String(value.to_string())),
    };

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid parameter '{raw}': empty key"));
    }
    Ok((key.to_string(), value))
}

/// Collect `-p` arguments; repeated keys accumulate into an array
pub fn collect_params<S: AsRef<str>>(raw: &[S]) -> Result<Params> {
    let mut params = Params::new();
    for item in raw {
        let (key, value) = parse_param(item.as_ref()).map_err(GhlError::validation)?;
        match params.get_mut(&key) {
            None => {
                params.insert(key, value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
        ResourceArgs::command().debug_assert();
    }

    #[test]
    fn test_resource_commands_are_external() {
        let cli = Cli::try_parse_from(["ghl", "--json", "contacts", "get", "C1"]).unwrap();
        assert_eq!(cli.output.format(), Some(OutputFormat::Json));
        match cli.command {
            Commands::Resource(args) => assert_eq!(args, vec!["contacts", "get", "C1"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_resource_args() {
        let args = ResourceArgs::try_parse_from([
            "opportunities",
            "move",
            "OPP1",
            "-p",
            "stage=STAGE2",
            "--csv",
        ])
        .unwrap();
        assert_eq!(args.action, "move");
        assert_eq!(args.id.as_deref(), Some("OPP1"));
        assert_eq!(args.params, vec!["stage=STAGE2"]);
        assert_eq!(args.output.format(), Some(OutputFormat::Csv));
        assert_eq!(args.effective_limit(), Some(DEFAULT_LIMIT));

        let all = ResourceArgs::try_parse_from(["contacts", "list", "--all"]).unwrap();
        assert_eq!(all.effective_limit(), None);
        assert!(ResourceArgs::try_parse_from(["contacts", "list", "--all", "--limit", "5"]).is_err());
    }

    #[test]
    fn test_usage_errors_are_validation_errors() {
        let err = ResourceArgs::try_parse_from(["contacts"]).unwrap_err();
        let err = usage_outcome(err).unwrap_err();
        assert!(matches!(err, GhlError::Validation { .. }));
        assert_eq!(err.exit_code(), 3);

        let err = ResourceArgs::try_parse_from(["contacts", "list", "--limit", "abc"]).unwrap_err();
        let err = usage_outcome(err).unwrap_err();
        assert!(err.to_string().contains("abc"));
        assert!(!err.to_string().starts_with("error:"));
    }

    #[test]
    fn test_help_is_output_not_error() {
        let err = Cli::try_parse_from(["ghl", "--help"]).unwrap_err();
        let text = usage_outcome(err).unwrap();
        assert!(text.contains("Usage"));

        let err = Cli::try_parse_from(["ghl", "--version"]).unwrap_err();
        assert!(usage_outcome(err).unwrap().contains(crate::VERSION));
    }

    #[test]
    fn test_output_flags_conflict() {
        assert!(Cli::try_parse_from(["ghl", "--json", "--csv", "resources"]).is_err());
    }

    #[test]
    fn test_parse_param_forms() {
        assert_eq!(parse_param("name=Ada").unwrap(), ("name".to_string(), json!("Ada")));
        assert_eq!(parse_param("note=a=b").unwrap(), ("note".to_string(), json!("a=b")));
        assert_eq!(parse_param("value:=1500").unwrap(), ("value".to_string(), json!(1500)));
        assert_eq!(parse_param("dnd:=true").unwrap(), ("dnd".to_string(), json!(true)));
        assert_eq!(parse_param("empty=").unwrap(), ("empty".to_string(), json!("")));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
        assert!(parse_param("n:={oops").is_err());
    }

    #[test]
    fn test_repeated_keys_accumulate() {
        let params = collect_params(&["tags=a", "tags=b", "tags=c", "name=x"]).unwrap();
        assert_eq!(params.get("tags"), Some(&json!(["a", "b", "c"])));
        assert_eq!(params.get("name"), Some(&json!("x")));
    }

    proptest! {
        #[test]
        fn prop_plain_params_roundtrip(key in "[a-zA-Z][a-zA-Z0-9_-]{0,15}", value in "[^\\x00]{0,40}") {
            let (k, v) = parse_param(&format!("{key}={value}")).unwrap();
            prop_assert_eq!(k, key);
            prop_assert_eq!(v, Value::String(value));
        }

        #[test]
        fn prop_number_params_are_raw_json(key in "[a-z]{1,10}", n in any::<i64>()) {
            let (_, v) = parse_param(&format!("{key}:={n}")).unwrap();
            prop_assert_eq!(v, json!(n));
        }
    }
}

//! Application
//!
//! Runs one parsed command line: configuration commands touch only the
//! config directory, resource commands go through the dispatcher.

use clap::Parser;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::cli::{collect_params, usage_outcome, Cli, Commands, ConfigCommand, ResourceArgs};
use crate::config::{self, Config};
use crate::ghl::auth::{self, mask_token, LOCATION_ENV, TOKEN_ENV};
use crate::ghl::client::GhlClient;
use crate::ghl::error::{GhlError, Result};
use crate::output::{render, OutputFormat, View};
use crate::resource::{
    build_request, get_all_resource_keys, get_resource, ColumnDef, CommandOutput, DispatchOptions,
    Dispatcher, ResourceDef,
};

/// Central application state for one invocation
pub struct App {
    config_dir: Option<PathBuf>,
    config: Config,
    cancel: CancellationToken,
    env: fn(&str) -> Option<String>,
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl App {
    /// Application using the default config directory and the process environment
    pub fn new(cancel: CancellationToken) -> Self {
        let config_dir = config::config_dir();
        let config = config_dir
            .as_deref()
            .map(Config::load_from)
            .unwrap_or_default();
        Self {
            config_dir,
            config,
            cancel,
            env: process_env,
        }
    }

    /// Application bound to an explicit config directory and environment
    pub fn with_dir(dir: &Path, env: fn(&str) -> Option<String>, cancel: CancellationToken) -> Self {
        Self {
            config_dir: Some(dir.to_path_buf()),
            config: Config::load_from(dir),
            cancel,
            env,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a command and return the text for stdout
    pub async fn run(&mut self, cli: &Cli) -> Result<String> {
        match &cli.command {
            Commands::Config { action } => self.run_config(action, cli),
            Commands::Resources => self.list_resources(cli),
            Commands::Resource(raw) => self.run_resource(raw, cli).await,
        }
    }

    fn default_format(&self) -> OutputFormat {
        match self.config.output_format.as_deref() {
            None => OutputFormat::Table,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("Ignoring configured output format: {}", e);
                OutputFormat::Table
            }),
        }
    }

    fn require_dir(&self) -> Result<&Path> {
        self.config_dir
            .as_deref()
            .ok_or_else(|| GhlError::config("could not locate a config directory for the current user"))
    }

    fn run_config(&mut self, action: &ConfigCommand, cli: &Cli) -> Result<String> {
        let dir = self.require_dir()?.to_path_buf();
        match action {
            ConfigCommand::SetToken { token } => {
                let token = match token {
                    Some(token) => token.clone(),
                    None => read_token()?,
                };
                config::save_token(&dir, &token)?;
                tracing::info!("API token stored in {:?}", dir);
                Ok("API token saved successfully".to_string())
            }
            ConfigCommand::SetLocation { location_id } => {
                let location_id = location_id.trim();
                if location_id.is_empty() {
                    return Err(GhlError::validation("location ID cannot be empty"));
                }
                self.config.location_id = Some(location_id.to_string());
                self.config.save_to(&dir)?;
                Ok(format!("Default location set to: {location_id}"))
            }
            ConfigCommand::SetFormat { format } => {
                self.config.output_format = Some(format.to_string());
                self.config.save_to(&dir)?;
                Ok(format!("Default output format set to: {format}"))
            }
            ConfigCommand::Show => self.show_config(&dir, cli),
            ConfigCommand::Clear => {
                if config::clear_token(&dir)? {
                    Ok("Stored API token removed".to_string())
                } else {
                    Ok("No stored API token".to_string())
                }
            }
        }
    }

    fn show_config(&self, dir: &Path, cli: &Cli) -> Result<String> {
        let env = self.env;
        let (token, token_source) = match env(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            Some(token) => (Some(token), TOKEN_ENV),
            None => (config::load_token(dir)?, "credentials file"),
        };
        let (location, location_source) = match env(LOCATION_ENV).filter(|l| !l.trim().is_empty()) {
            Some(location) => (Some(location), LOCATION_ENV),
            None => (self.config.location_id.clone(), "config file"),
        };

        let summary = json!({
            "config_dir": dir.display().to_string(),
            "api_token": token.as_deref().map(mask_token),
            "api_token_source": token.as_ref().map(|_| token_source),
            "location_id": location,
            "location_id_source": location.as_ref().map(|_| location_source),
            "output_format": self.default_format().as_str(),
            "api_version": self.config.effective_api_version(),
            "base_url": self.config.effective_base_url(),
        });

        let format = cli.output.format().unwrap_or(OutputFormat::Table);
        if format == OutputFormat::Json {
            return Ok(render(&CommandOutput::Record(summary), format, &View::raw())?);
        }

        let fields = [
            ("Config directory", "config_dir"),
            ("API token", "api_token"),
            ("Token source", "api_token_source"),
            ("Location ID", "location_id"),
            ("Location source", "location_id_source"),
            ("Output format", "output_format"),
            ("API version", "api_version"),
            ("Base URL", "base_url"),
        ]
        .map(|(header, path)| ColumnDef {
            header: header.to_string(),
            json_path: path.to_string(),
        });
        let view = View {
            columns: &fields,
            fields: &fields,
            id_field: "config_dir",
        };
        Ok(render(&CommandOutput::Record(summary), OutputFormat::Table, &view)?)
    }

    fn list_resources(&self, cli: &Cli) -> Result<String> {
        let records: Vec<Value> = get_all_resource_keys()
            .into_iter()
            .filter_map(get_resource)
            .map(|r| {
                json!({
                    "resource": r.name,
                    "name": r.display_name,
                    "aliases": r.aliases.join(", "),
                    "actions": r.action_names().join(", "),
                })
            })
            .collect();

        let columns = [
            ("Resource", "resource"),
            ("Name", "name"),
            ("Aliases", "aliases"),
            ("Actions", "actions"),
        ]
        .map(|(header, path)| ColumnDef {
            header: header.to_string(),
            json_path: path.to_string(),
        });
        let view = View {
            columns: &columns,
            fields: &columns,
            id_field: "resource",
        };
        let format = cli.output.format().unwrap_or_else(|| self.default_format());
        Ok(render(&CommandOutput::Records(records), format, &view)?)
    }

    async fn run_resource(&self, raw: &[String], cli: &Cli) -> Result<String> {
        let args = match ResourceArgs::try_parse_from(raw) {
            Ok(args) => args,
            Err(err) => return usage_outcome(err),
        };
        let name = raw.first().map(String::as_str).unwrap_or_default();
        let resource = get_resource(name).ok_or_else(|| {
            GhlError::validation(format!(
                "unknown resource '{}' (available: {})",
                name,
                get_all_resource_keys().join(", ")
            ))
        })?;

        let action = resource.action(&args.action).ok_or_else(|| {
            GhlError::validation(format!(
                "'{}' does not support '{}' (available: {})",
                resource.name,
                args.action,
                resource.action_names().join(", ")
            ))
        })?;

        let mut params = collect_params(&args.params)?;
        if let Some(id) = &args.id {
            let Some(field) = resource.positional_param(action) else {
                return Err(GhlError::validation(format!(
                    "'{} {}' does not take an ID; pass parameters with -p key=value",
                    resource.name, args.action
                )));
            };
            params.insert(field.to_string(), Value::String(id.clone()));
        }

        // Reject bad input before credentials are even looked up
        build_request(resource, &args.action, params.clone())?;

        let location = args.location.clone().or_else(|| cli.location.clone());
        let credential = auth::resolve_with(self.env, self.config_dir.as_deref(), location)?;
        let client = GhlClient::builder(credential)
            .base_url(self.config.effective_base_url())
            .api_version(self.config.effective_api_version())
            .cancellation(self.cancel.clone())
            .build()?;

        let options = DispatchOptions {
            limit: args.effective_limit(),
            ..DispatchOptions::default()
        };
        let output = Dispatcher::new(client)
            .dispatch(&resource.name, &args.action, params, &options)
            .await?;

        let format = args
            .output
            .format()
            .or_else(|| cli.output.format())
            .unwrap_or_else(|| self.default_format());
        Ok(render(&output, format, &view_of(resource, &args.action))?)
    }
}

fn view_of<'r>(resource: &'r ResourceDef, action_name: &str) -> View<'r> {
    match resource.action(action_name) {
        Some(action) => View {
            columns: resource.columns_of(action),
            fields: resource.fields_of(action),
            id_field: &resource.id_field,
        },
        None => View {
            columns: &resource.columns,
            fields: &resource.columns,
            id_field: &resource.id_field,
        },
    }
}

fn read_token() -> Result<String> {
    let stdin = io::stdin();
    eprint!("Enter your GoHighLevel API token: ");
    io::stderr().flush().ok();
    let mut line = String::new();
    stdin
        .lock()
        .read_line(&mut line)
        .map_err(|e| GhlError::config(format!("failed to read token from stdin: {e}")))?;
    Ok(line.trim().to_string())
}

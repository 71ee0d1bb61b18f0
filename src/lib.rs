//! Command-line client for the GoHighLevel REST API.
//!
//! The crate is split the same way a command flows through it:
//! [`cli`] parses, [`app`] resolves configuration and credentials,
//! [`resource`] turns the command into API requests, [`ghl`] sends them
//! under the provider's rate limits, and [`output`] renders the result.

pub mod app;
pub mod cli;
pub mod config;
pub mod ghl;
pub mod output;
pub mod resource;

/// Version injected at compile time via GHL_VERSION env var (set by CI/CD),
/// or the package version for local builds.
pub const VERSION: &str = match option_env!("GHL_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

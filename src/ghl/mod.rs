//! GoHighLevel API interaction module
//!
//! This module provides the transport for the GoHighLevel REST API:
//! credentials, client-side rate limiting, retries and error
//! classification.
//!
//! # Module Structure
//!
//! - [`auth`] - Credential resolution (environment over persisted config)
//! - [`client`] - Main client; retry state machine and location injection
//! - [`error`] - Error taxonomy and exit codes
//! - [`http`] - Single HTTP exchange and response classification
//! - [`rate_limit`] - Short and daily request windows
//!
//! # Example
//!
//! ```ignore
//! use ghl::ghl::{auth, client::{ApiRequest, GhlClient}};
//!
//! async fn example() -> ghl::ghl::error::Result<()> {
//!     let client = GhlClient::new(auth::resolve(None)?)?;
//!     let me = client.send(&ApiRequest::get("/users/me")).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod rate_limit;

pub use client::{ApiRequest, GhlClient, LocationPlacement, RetryPolicy};
pub use error::{ErrorKind, GhlError};

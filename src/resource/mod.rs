//! Resource abstraction layer
//!
//! This module provides a data-driven approach to the GoHighLevel API.
//! Resource definitions are loaded from JSON files at compile time, so a
//! new resource or action is a descriptor change rather than new code.
//!
//! # Architecture
//!
//! - [`registry`] - Loads and caches resource definitions from embedded JSON
//! - [`dispatch`] - Validates parameters and turns commands into API requests
//! - [`fetcher`] - Streams list results page by page
//!
//! # Resource Definitions
//!
//! Resources are defined in JSON files under `src/resources/`:
//! - `contacts.json` - contacts and their notes and tasks
//! - `calendars.json` - calendars and appointments
//! - `opportunities.json` - opportunities and pipelines
//! - `conversations.json` - conversations and messages
//! - `account.json` - workflows, locations, users and tags
//!
//! # Example
//!
//! ```ignore
//! use ghl::resource::{DispatchOptions, Dispatcher, Params};
//!
//! async fn first_contacts(dispatcher: &Dispatcher) -> ghl::ghl::error::Result<()> {
//!     let options = DispatchOptions { limit: Some(10), ..Default::default() };
//!     let output = dispatcher.dispatch("contacts", "list", Params::new(), &options).await?;
//!     println!("{:?}", output);
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod fetcher;
mod registry;

pub use dispatch::{build_request, CommandOutput, CommandResult, DispatchOptions, Dispatcher, Params};
pub use fetcher::{lookup_path, PageCursor, Paginator, MAX_PAGES};
pub use registry::*;

//! # Wired Client
//!
//! Client side of the wired protocol: a local mirror of each server
//! component that turns writes and method calls into requests and reconciles
//! every response back into local state.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use serde_json::json;
//! use wired_client::{ClientConfig, HttpTransport, Registry};
//!
//! let registry = Registry::new(ClientConfig::default(), HttpTransport::new("http://localhost:3000"))
//!     .install();
//!
//! let signup = registry.component("signup", json!({ "name": "" }).as_object().cloned().unwrap_or_default());
//!
//! // Optimistic write, then a request targeting `name`
//! signup.update("name", json!("sam"))?.unwrap().await?;
//!
//! // Several writes and a call in a single request
//! signup.defer(|s| {
//!     s.update("email", json!("sam@example.com")).ok();
//!     s.call("save", []);
//! });
//! signup.refresh().await?;
//!
//! if !signup.errors().is_empty() {
//!     // show validation messages
//! }
//! ```
//!
//! ## Reconciliation
//!
//! - Every response's `data` is merged into the proxy's state.
//! - Keys the server lists in `metadata.readonly` move to the readonly
//!   mirror, leave the writable state, and can no longer be updated locally.
//! - `metadata.errors` replaces the proxy's error mirror.
//! - Overlapping requests are not ordered: the last response to arrive wins.
//!   Batch related writes with [`ComponentProxy::defer`] when that matters.

mod config;
mod error;
mod proxy;
mod reactive;
mod registry;
pub mod transport;
mod watchers;

pub use config::ClientConfig;
pub use error::ClientError;
pub use proxy::{Batch, ComponentProxy, Pending};
pub use reactive::{identity, Reactive};
pub use registry::Registry;
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{FnTransport, Transport};
pub use watchers::{ErrorWatcher, ResponseWatcher, Watchers};

pub use wired_common::{ErrorBag, ExceptionReport, WireMap, WireRequest, WireResponse, MOUNT, REFRESH};

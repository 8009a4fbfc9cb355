//! wired_sync
//!
//! Server side of the wired protocol. A request carries the client's prior
//! state, the changes and method calls it wants applied, and a target. This
//! crate turns that into the new state plus response metadata:
//!
//! - [`Component`] / [`ComponentSchema`]: a component declares its shared
//!   properties, methods and validation rules once, at registration.
//! - [`Wired`]: the per-request instance that runs
//!   construct → (mount | hydrate → changes → calls) → dehydrate → serialize.
//! - [`TypeRegistry`]: pluggable decode/encode transformers per type.
//! - [`WireRegistry`]: alias → component lookup, plus [`controller::respond`]
//!   which rejects malformed requests before any component is built.
//! - `http` (feature): an axum router exposing `POST {route}/:component/:target`.

mod component;
pub mod config;
pub mod controller;
mod error;
#[cfg(feature = "http")]
pub mod http;
mod instance;
mod registry;
pub mod schema;
pub mod testing;
pub mod transform;
pub mod validation;

pub use component::{Component, HookResult};
pub use config::{Environment, RuntimeConfig};
pub use error::{ConfigError, Exception, MethodError, RegistryError, TransformError, ValidationFailure};
pub use instance::{ActionDispatcher, StateManager, Wired};
pub use registry::{ComponentRegistration, WireRegistry};
pub use schema::{ComponentSchema, Method, Property, SchemaBuilder, WireArgs};
pub use transform::{TypeRegistry, WireType};
pub use validation::{Rule, RuleSet, Validator};

pub use wired_common::{
    ErrorBag, ExceptionReport, ResponseMetadata, TraceFrame, WireMap, WireRequest, WireResponse, MOUNT, REFRESH,
};

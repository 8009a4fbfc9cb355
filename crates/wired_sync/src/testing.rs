//! Helpers for exercising components without a transport.
//!
//! ```ignore
//! let response = registry.test("counter")?
//!     .state(json!({ "count": 1 }))
//!     .call("increment", [])
//!     .send();
//!
//! assert_eq!(response.data("count"), json!(2));
//! ```

use std::collections::BTreeMap;
use std::ops::Deref;

use serde_json::Value;
use wired_common::{ExceptionReport, WireMap, WireRequest, WireResponse};

use crate::component::Component;
use crate::controller::respond;
use crate::error::RegistryError;
use crate::instance::Wired;
use crate::registry::WireRegistry;

/// Builds a request for one registered component.
#[derive(Debug, Clone)]
pub struct RequestBuilder<'a> {
    registry: &'a WireRegistry,
    alias: String,
    target: String,
    state: WireMap,
    changes: WireMap,
    calls: BTreeMap<String, Vec<Value>>,
    readonly: Vec<String>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(registry: &'a WireRegistry, alias: impl Into<String>) -> Self {
        Self {
            registry,
            alias: alias.into(),
            target: "test".to_string(),
            state: WireMap::new(),
            changes: WireMap::new(),
            calls: BTreeMap::new(),
            readonly: Vec::new(),
        }
    }

    /// Replace the prior state. Non-object values are ignored.
    pub fn state(mut self, state: Value) -> Self {
        if let Value::Object(state) = state {
            self.state = state;
        }
        self
    }

    /// Replace all changes. Non-object values are ignored.
    pub fn changes(mut self, changes: Value) -> Self {
        if let Value::Object(changes) = changes {
            self.changes = changes;
        }
        self
    }

    /// Add one change and make its property the target.
    pub fn change(mut self, property: impl Into<String>, value: Value) -> Self {
        let property = property.into();
        self.changes.insert(property.clone(), value);
        self.target = property;
        self
    }

    /// Add one call and make its method the target.
    pub fn call(mut self, method: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        let method = method.into();
        self.calls.insert(method.clone(), args.into_iter().collect());
        self.target = method;
        self
    }

    /// Keys the client holds as readonly.
    pub fn readonly<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readonly = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn request(&self) -> WireRequest {
        WireRequest {
            state: self.state.clone(),
            changes: self.changes.clone(),
            calls: self.calls.clone(),
            readonly: self.readonly.clone(),
        }
    }

    /// Send the request through the same path the HTTP endpoint uses.
    pub fn send(self) -> TestResponse {
        let body = serde_json::to_value(self.request()).unwrap_or(Value::Null);
        TestResponse(respond(self.registry, &self.alias, &self.target, body))
    }

    /// Build the instance from the prior state without running the lifecycle.
    pub fn hydrate<C: Component>(self) -> Wired<C> {
        self.registry.make::<C>(self.state)
    }
}

/// Response wrapper with lookup helpers.
#[derive(Debug, Clone, PartialEq)]
pub struct TestResponse(pub WireResponse);

impl TestResponse {
    /// Value of `property` in `data`, `null` when absent.
    pub fn data(&self, property: &str) -> Value {
        self.0.data.get(property).cloned().unwrap_or(Value::Null)
    }

    /// Return value of `method`, `null` when it did not complete.
    pub fn call(&self, method: &str) -> Value {
        self.0.call(method).cloned().unwrap_or(Value::Null)
    }

    pub fn exceptions(&self) -> &BTreeMap<String, ExceptionReport> {
        &self.0.metadata.exceptions
    }

    pub fn readonly(&self) -> &[String] {
        &self.0.metadata.readonly
    }

    pub fn into_inner(self) -> WireResponse {
        self.0
    }
}

impl Deref for TestResponse {
    type Target = WireResponse;

    fn deref(&self) -> &WireResponse {
        &self.0
    }
}

impl WireRegistry {
    /// Start a test request for `alias`.
    pub fn test(&self, alias: &str) -> Result<RequestBuilder<'_>, RegistryError> {
        self.resolve(alias)?;
        Ok(RequestBuilder::new(self, alias))
    }

    /// Start a test request for the alias `C` was registered under.
    pub fn test_component<C: Component>(&self) -> Result<RequestBuilder<'_>, RegistryError> {
        let alias = self
            .alias_of::<C>()
            .ok_or_else(|| RegistryError::UnknownComponent(crate::transform::short_type_name::<C>().to_string()))?;
        Ok(RequestBuilder::new(self, alias))
    }
}

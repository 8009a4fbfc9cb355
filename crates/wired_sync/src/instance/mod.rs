//! Per-request component instance.
//!
//! [`Wired`] wraps the user's component for exactly one request. It is built
//! from the client's prior state, runs the lifecycle in [`Wired::handle`] and
//! is serialized with [`Wired::response`]. The behaviour is split over three
//! collaborators it owns:
//!
//! - [`StateManager`]: request state, pending changes and calls, readonly
//!   promotions and the reset flag;
//! - [`Validator`]: accumulated validation messages;
//! - [`ActionDispatcher`]: the response metadata bag.

mod actions;
mod lifecycle;
mod state;

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use wired_common::{ErrorBag, WireMap};

use crate::component::{Component, HookResult};
use crate::config::Environment;
use crate::error::ValidationFailure;
use crate::schema::{ComponentSchema, Property};
use crate::transform::TypeRegistry;
use crate::validation::Validator;

pub use actions::ActionDispatcher;
pub use state::StateManager;

/// A component instance bound to one request.
pub struct Wired<C: Component> {
    component: C,
    schema: Arc<ComponentSchema<C>>,
    types: Arc<TypeRegistry>,
    environment: Environment,
    state: StateManager,
    validator: Validator,
    actions: ActionDispatcher,
}

impl<C: Component> Wired<C> {
    /// Build an instance from prior state with a freshly built schema and no
    /// custom type transformers.
    pub fn new(state: WireMap) -> Self {
        Self::with_context(
            Arc::new(C::schema()),
            Arc::new(TypeRegistry::default()),
            Environment::default(),
            state,
        )
    }

    /// Build an instance from prior state.
    ///
    /// Every shared, non-readonly property present in `state` is decoded into
    /// the component. Readonly properties in `state` are dropped. Whatever is
    /// left (including unshared keys) stays available as the request state.
    pub fn with_context(
        schema: Arc<ComponentSchema<C>>,
        types: Arc<TypeRegistry>,
        environment: Environment,
        mut state: WireMap,
    ) -> Self {
        let mut wire = Self {
            component: C::default(),
            schema: Arc::clone(&schema),
            types,
            environment,
            state: StateManager::default(),
            validator: Validator::default(),
            actions: ActionDispatcher::default(),
        };

        for property in schema.properties() {
            let name = property.name();
            let value = match state.get(name) {
                Some(value) if !value.is_null() && !property.is_readonly() => value.clone(),
                _ => {
                    state.remove(name);
                    continue;
                }
            };

            if let Err(err) = wire.assign(name, value) {
                tracing::warn!("Could not decode {} for {}: {}", name, wire.component_name(), err);
                wire.reject(name);
                state.remove(name);
            }
        }

        tracing::debug!(
            "Constructed {} with {} request state keys",
            wire.component_name(),
            state.len()
        );

        wire.state.set_request_state(state);
        wire
    }

    /// Keep `keys` readonly for this request. The client sends the keys it
    /// already holds as readonly; any value the request carries for them is
    /// dropped, changes to them are discarded and they stay out of `data`.
    /// Declared readonly properties are unaffected and still serialize.
    pub fn keep_readonly(&mut self, keys: impl IntoIterator<Item = String>) -> &mut Self {
        let schema = Arc::clone(&self.schema);
        let keys: Vec<String> = keys
            .into_iter()
            .filter(|key| !schema.property(key).is_some_and(Property::is_readonly))
            .collect();

        for key in &keys {
            let Some(property) = schema.property(key) else {
                continue;
            };
            if let Err(err) = property.write(&mut self.component, serde_json::Value::Null) {
                tracing::warn!("Could not unset readonly {}: {}", key, err);
            }
        }

        self.state.forget(&keys);
        self.state.promote(keys);
        self
    }

    pub fn schema(&self) -> &ComponentSchema<C> {
        &self.schema
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn component(&self) -> &C {
        &self.component
    }

    pub fn into_inner(self) -> C {
        self.component
    }

    /// Raw prior state sent by the client, minus readonly properties.
    pub fn request_state(&self) -> &WireMap {
        self.state.request_state()
    }

    /// Changes requested in this cycle, as sent.
    pub fn changes(&self) -> &WireMap {
        self.state.changes()
    }

    /// Target of this request (property, method, `mount` or `refresh`).
    pub fn target(&self) -> Option<&str> {
        self.state.target()
    }

    /// Messages accumulated so far.
    pub fn errors(&self) -> &ErrorBag {
        self.validator.errors()
    }

    /// Validate every shared property; on failure the messages are recorded
    /// and the failure is returned for `?` propagation.
    pub fn validate(&mut self) -> HookResult {
        self.run_validation(None)
    }

    /// Validate the given properties only.
    pub fn validate_only(&mut self, properties: &[&str]) -> HookResult {
        self.run_validation(Some(properties))
    }

    /// Non-throwing validation: records failures and reports whether the
    /// state is valid.
    pub fn check(&mut self, properties: Option<&[&str]>) -> bool {
        self.run_validation(properties).is_ok()
    }

    /// Validate and return the validated values (properties that have rules).
    pub fn validated(&mut self, properties: Option<&[&str]>) -> HookResult<WireMap> {
        let data = self.validation_data(properties);
        let failures = self.schema.rules().check(&data, properties);
        if !failures.is_empty() {
            return Err(ValidationFailure::new(failures));
        }

        Ok(data
            .into_iter()
            .filter(|(key, _)| self.schema.rules().has_rules(key))
            .collect())
    }

    fn run_validation(&mut self, properties: Option<&[&str]>) -> HookResult {
        let data = self.validation_data(properties);
        let failures = self.schema.rules().check(&data, properties);
        if failures.is_empty() {
            return Ok(());
        }

        tracing::debug!("{} failed validation: {:?}", self.component_name(), failures);
        self.validator.record(&failures);
        Err(ValidationFailure::new(failures))
    }

    /// Encoded state merged with this cycle's changes, restricted to shared
    /// properties (or `properties` when given).
    fn validation_data(&self, properties: Option<&[&str]>) -> WireMap {
        let mut data = self.encoded_state();
        for (key, value) in self.state.changes() {
            data.insert(key.clone(), value.clone());
        }

        data.into_iter()
            .filter(|(key, _)| match properties {
                Some(only) => only.contains(&key.as_str()),
                None => self.schema.is_shared(key),
            })
            .collect()
    }

    /// Record a swallowed failure so its messages still reach the response.
    pub(crate) fn absorb(&mut self, failure: &ValidationFailure) {
        self.validator.record(&failure.errors);
    }

    pub(crate) fn reject(&mut self, property: &str) {
        let attribute = property.replace('_', " ");
        let mut bag = ErrorBag::new();
        bag.insert(property.to_string(), vec![format!("The {attribute} has an invalid value.")]);
        self.validator.record(&bag);
    }

    pub(crate) fn component_name(&self) -> &'static str {
        crate::transform::short_type_name::<C>()
    }

    pub(crate) fn is_reset(&self) -> bool {
        self.state.is_reset()
    }
}

impl<C: Component> Deref for Wired<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.component
    }
}

impl<C: Component> DerefMut for Wired<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.component
    }
}

impl<C: Component + std::fmt::Debug> std::fmt::Debug for Wired<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wired")
            .field("component", &self.component)
            .field("state", &self.state)
            .field("errors", self.validator.errors())
            .finish_non_exhaustive()
    }
}

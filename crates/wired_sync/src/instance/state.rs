use serde_json::Value;
use wired_common::WireMap;

use super::Wired;
use crate::component::Component;
use crate::error::TransformError;
use crate::schema::Property;

/// Request-scoped state bookkeeping.
#[derive(Debug, Default)]
pub struct StateManager {
    request_state: WireMap,
    changes: WireMap,
    target: Option<String>,
    /// Keys readonly for this cycle beyond the declared ones: carried over
    /// by the client or promoted by a mount result.
    promoted: Vec<String>,
    reset: bool,
}

impl StateManager {
    pub fn request_state(&self) -> &WireMap {
        &self.request_state
    }

    pub fn changes(&self) -> &WireMap {
        &self.changes
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn promoted(&self) -> &[String] {
        &self.promoted
    }

    pub fn is_promoted(&self, property: &str) -> bool {
        self.promoted.iter().any(|p| p == property)
    }

    pub fn is_reset(&self) -> bool {
        self.reset
    }

    pub(crate) fn set_request_state(&mut self, state: WireMap) {
        self.request_state = state;
    }

    pub(crate) fn begin(&mut self, changes: WireMap, target: Option<&str>) {
        self.changes = changes;
        self.target = target.map(str::to_string);
    }

    pub(crate) fn forget(&mut self, keys: &[String]) {
        for key in keys {
            self.request_state.remove(key);
        }
    }

    pub(crate) fn promote(&mut self, keys: impl IntoIterator<Item = String>) {
        for key in keys {
            if !self.promoted.contains(&key) {
                self.promoted.push(key);
            }
        }
    }

    pub(crate) fn mark_reset(&mut self) {
        self.reset = true;
    }
}

impl<C: Component> Wired<C> {
    /// Current value of a shared property in serde form, falling back to its
    /// decoded default. `None` for unknown properties.
    pub fn get(&self, property: &str) -> Option<Value> {
        let property = self.schema.property(property)?;
        Some(self.current_value(property))
    }

    /// Decode `value` from its wire form and store it in `property`.
    pub fn set(&mut self, property: &str, value: Value) -> Result<(), TransformError> {
        self.assign(property, value)
    }

    /// Whether `property` is declared readonly or readonly for this cycle.
    pub fn is_readonly(&self, property: &str) -> bool {
        self.state.is_promoted(property) || self.schema.property(property).is_some_and(Property::is_readonly)
    }

    /// Every shared property in serde form (defaults applied, `null` when
    /// neither a value nor a default exists).
    pub fn state(&self) -> WireMap {
        self.schema
            .properties()
            .iter()
            .map(|p| (p.name().to_string(), self.current_value(p)))
            .collect()
    }

    /// Every shared property in wire form.
    pub fn encoded_state(&self) -> WireMap {
        self.schema
            .properties()
            .iter()
            .map(|p| (p.name().to_string(), self.encode_property(p, self.current_value(p))))
            .collect()
    }

    /// Unset all shared properties (or only `properties`) so they fall back to
    /// their defaults, and drop validation errors from the response.
    pub fn reset(&mut self, properties: Option<&[&str]>) {
        let schema = std::sync::Arc::clone(&self.schema);
        for property in schema.properties() {
            if properties.is_some_and(|only| !only.contains(&property.name())) {
                continue;
            }
            if let Err(err) = property.write(&mut self.component, Value::Null) {
                tracing::warn!("Could not reset {}: {}", property.name(), err);
            }
        }
        self.state.mark_reset();
    }

    pub(crate) fn assign(&mut self, property: &str, value: Value) -> Result<(), TransformError> {
        let schema = std::sync::Arc::clone(&self.schema);
        let property = schema
            .property(property)
            .ok_or_else(|| TransformError::custom(format!("{property} is not a shared property")))?;

        let decoded = self.types.decode(property.wire_type(), value)?;
        property.write(&mut self.component, decoded)
    }

    pub(crate) fn current_value(&self, property: &Property<C>) -> Value {
        match property.read(&self.component) {
            Ok(Some(value)) => return value,
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("Could not read {}: {}", property.name(), err);
                return Value::Null;
            }
        }

        let Some(default) = property.default_value() else {
            return Value::Null;
        };
        self.types
            .decode(property.wire_type(), default.clone())
            .unwrap_or_else(|err| {
                tracing::warn!("Invalid default for {}: {}", property.name(), err);
                Value::Null
            })
    }

    pub(crate) fn encode_property(&self, property: &Property<C>, value: Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        if let Some(encoder) = property.encoder() {
            return encoder(&value);
        }

        match self.types.encode(property.wire_type(), value.clone()) {
            Ok(encoded) => encoded,
            Err(err) => {
                tracing::warn!("Could not encode {}: {}", property.name(), err);
                value
            }
        }
    }
}

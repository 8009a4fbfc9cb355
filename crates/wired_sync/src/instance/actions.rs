use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use wired_common::{ResponseMetadata, WireMap, MOUNT};

use super::Wired;
use crate::component::Component;
use crate::error::{Exception, MethodError};
use crate::schema::{Method, Property};

const RESERVED_META: [&str; 4] = ["calls", "errors", "exceptions", "readonly"];

/// Collects the response metadata for one request.
#[derive(Debug, Default)]
pub struct ActionDispatcher {
    metadata: ResponseMetadata,
}

impl ActionDispatcher {
    pub fn metadata(&self) -> &ResponseMetadata {
        &self.metadata
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut ResponseMetadata {
        &mut self.metadata
    }
}

impl<C: Component> Wired<C> {
    /// Add a custom key to the response metadata.
    pub fn meta(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if RESERVED_META.contains(&key.as_str()) {
            tracing::warn!("Ignoring reserved metadata key {}", key);
            return;
        }
        self.actions.metadata.extra.insert(key, value);
    }

    pub fn metadata(&self) -> &ResponseMetadata {
        self.actions.metadata()
    }

    /// Apply the requested changes in declaration order.
    pub(crate) fn make_changes(&mut self, changes: &WireMap) {
        let schema = Arc::clone(&self.schema);
        let mut applied = WireMap::new();

        for property in schema.properties() {
            let Some(new) = changes.get(property.name()) else {
                continue;
            };
            if self.is_readonly(property.name()) {
                tracing::warn!("Discarded change to readonly property {}", property.name());
                continue;
            }

            if self.make_change(property, new) {
                applied.insert(property.name().to_string(), new.clone());
            }
        }

        for key in changes.keys().filter(|key| !schema.is_shared(key)) {
            tracing::warn!("Discarded change to unshared property {} on {}", key, self.component_name());
        }

        if !applied.is_empty() {
            if let Err(failure) = C::changed(self, &applied) {
                self.absorb(&failure);
            }
        }
    }

    fn make_change(&mut self, property: &Property<C>, new: &Value) -> bool {
        let name = property.name();
        let old = self.encode_property(property, self.current_value(property));

        let allowed = C::updating(self, name, new, &old).and_then(|allowed| match property.updating_hook() {
            Some(hook) if allowed => hook(self, new, &old),
            _ => Ok(allowed),
        });
        match allowed {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("Change to {} rejected by updating hook", name);
                return false;
            }
            Err(failure) => {
                tracing::debug!("Change to {} failed validation", name);
                self.absorb(&failure);
                return false;
            }
        }

        if let Err(err) = self.assign(name, new.clone()) {
            tracing::warn!("Could not decode change to {}: {}", name, err);
            self.reject(name);
            return false;
        }

        if let Err(failure) = C::updated(self, name, new) {
            self.absorb(&failure);
        }
        if let Some(hook) = property.updated_hook() {
            if let Err(failure) = hook(self, new, &old) {
                self.absorb(&failure);
            }
        }

        true
    }

    /// Invoke the requested methods in declaration order. Undeclared methods
    /// are ignored; one failing method never stops its siblings.
    pub(crate) fn make_calls(&mut self, calls: &BTreeMap<String, Vec<Value>>) {
        let schema = Arc::clone(&self.schema);

        for method in schema.methods() {
            let Some(args) = calls.get(method.name()) else {
                continue;
            };

            match self.call_method(method, args.clone()) {
                Ok(result) => {
                    let result = if method.name() == MOUNT {
                        self.promote_mount_readonly(result)
                    } else {
                        result
                    };
                    self.actions.metadata.calls.insert(method.name().to_string(), result);
                }
                Err(MethodError::Validation(failure)) => {
                    tracing::debug!("{} stopped by validation", method.name());
                    self.absorb(&failure);
                }
                Err(MethodError::Exception(exception)) => {
                    tracing::error!(
                        "{}::{} failed: {} ({}:{})",
                        self.component_name(),
                        method.name(),
                        exception.message,
                        exception.file,
                        exception.line
                    );
                    if !self.environment.is_production() {
                        self.actions
                            .metadata
                            .exceptions
                            .insert(method.name().to_string(), exception.report());
                    }
                }
            }
        }

        for name in calls.keys().filter(|name| schema.method(name).is_none()) {
            tracing::debug!("Ignored call to undeclared method {} on {}", name, self.component_name());
        }
    }

    fn call_method(&mut self, method: &Method<C>, mut args: Vec<Value>) -> Result<Value, MethodError> {
        for (arg, ty) in args.iter_mut().zip(method.params()) {
            *arg = self.types.decode(ty, std::mem::take(arg))?;
        }

        let handler = method.handler();
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler(self, args)))
            .unwrap_or_else(|payload| Err(Exception::from_panic(method.name(), payload).into()))?;

        Ok(self.types.encode(method.return_type(), result)?)
    }

    /// Lift a `readonly` object out of a mount result: its entries become
    /// top-level result values (explicit result keys win) and its keys become
    /// readonly for the rest of this cycle.
    fn promote_mount_readonly(&mut self, result: Value) -> Value {
        let Value::Object(mut result) = result else {
            return result;
        };
        let readonly = match result.remove("readonly") {
            Some(Value::Object(readonly)) => readonly,
            Some(other) => {
                result.insert("readonly".to_string(), other);
                return Value::Object(result);
            }
            None => return Value::Object(result),
        };

        tracing::debug!("Mount promoted {:?} to readonly", readonly.keys().collect::<Vec<_>>());
        self.state.promote(readonly.keys().cloned());

        let mut merged = readonly;
        merged.extend(result);
        Value::Object(merged)
    }
}

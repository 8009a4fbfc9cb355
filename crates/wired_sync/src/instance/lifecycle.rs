use std::collections::BTreeMap;

use serde_json::Value;
use wired_common::{ErrorBag, WireMap, WireRequest, WireResponse, MOUNT};

use super::Wired;
use crate::component::Component;

impl<C: Component> Wired<C> {
    /// Run one request cycle: mount short-circuit or hydrate gate, then
    /// changes and calls, then dehydrate (always).
    pub fn handle(
        &mut self,
        changes: WireMap,
        calls: BTreeMap<String, Vec<Value>>,
        target: Option<&str>,
    ) -> &mut Self {
        self.state.begin(changes.clone(), target);

        if target == Some(MOUNT) && self.schema.has_mount() {
            if let Some(args) = calls.get(MOUNT) {
                tracing::debug!("Mounting {}", self.component_name());
                let mount = BTreeMap::from([(MOUNT.to_string(), args.clone())]);
                self.make_calls(&mount);
                // Initial state: no user interaction happened, so no errors are reported.
                self.state.mark_reset();
                self.dehydrate_component();
                return self;
            }
        }

        if self.hydrate_component() {
            self.make_changes(&changes);
            self.make_calls(&calls);
        } else {
            tracing::debug!("Hydration of {} failed, skipping changes and calls", self.component_name());
        }

        self.dehydrate_component();
        self
    }

    /// Convenience wrapper around [`handle`](Self::handle) for a decoded request body.
    pub fn handle_request(&mut self, request: WireRequest, target: Option<&str>) -> &mut Self {
        let WireRequest { changes, calls, readonly, .. } = request;
        self.keep_readonly(readonly);
        self.handle(changes, calls, target)
    }

    /// Strict validation of the incoming state, then the hydrate hook.
    pub(crate) fn hydrate_component(&mut self) -> bool {
        if self.schema.strict_validation() && !self.check(None) {
            return false;
        }

        match C::hydrate(self) {
            Ok(proceed) => proceed,
            Err(failure) => {
                self.absorb(&failure);
                false
            }
        }
    }

    pub(crate) fn dehydrate_component(&mut self) {
        let result = self.validate().and_then(|()| C::dehydrate(self));
        if let Err(failure) = result {
            self.absorb(&failure);
        }

        let errors = if self.is_reset() {
            ErrorBag::new()
        } else {
            self.validator.errors().clone()
        };

        let mut readonly: Vec<String> = self.state.promoted().to_vec();
        for property in self.schema.readonly_properties() {
            if !readonly.iter().any(|p| p == property) {
                readonly.push(property.to_string());
            }
        }

        let metadata = self.actions.metadata_mut();
        metadata.errors = errors;
        metadata.readonly = readonly;
    }

    /// Serialize the state and metadata.
    ///
    /// Keys readonly for this cycle are left out of `data` (a mount result
    /// carries their values, the client keeps them afterwards), as are
    /// declared readonly properties the server never gave a value.
    pub fn response(&self) -> WireResponse {
        let mut data = WireMap::new();

        for property in self.schema.properties() {
            let name = property.name();
            if self.state.is_promoted(name) {
                continue;
            }

            let value = self.current_value(property);
            if property.is_readonly() && value.is_null() {
                continue;
            }
            data.insert(name.to_string(), self.encode_property(property, value));
        }

        WireResponse {
            data,
            metadata: self.actions.metadata().clone(),
        }
    }
}

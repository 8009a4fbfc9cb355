use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use wired_common::WireMap;

/// Client-side settings shared by every proxy of a [`Registry`](crate::Registry).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base route the server mounted its endpoint on.
    pub route: String,
    /// Initial state per alias, merged under the state passed at construction.
    pub component_defaults: HashMap<String, WireMap>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            route: "/wired".to_string(),
            component_defaults: HashMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            ..Self::default()
        }
    }

    /// Set the default state for `alias`.
    pub fn with_defaults(mut self, alias: impl Into<String>, defaults: WireMap) -> Self {
        self.component_defaults.insert(alias.into(), defaults);
        self
    }

    /// `defaults[alias]` with `state` layered on top.
    pub(crate) fn initial_state(&self, alias: &str, state: WireMap) -> WireMap {
        let mut merged = self.component_defaults.get(alias).cloned().unwrap_or_default();
        merged.extend(state);
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_are_overridden_by_state() {
        let defaults = json!({ "count": 0, "label": "counter" });
        let config = ClientConfig::default().with_defaults("counter", defaults.as_object().cloned().unwrap());

        let state = json!({ "count": 5 }).as_object().cloned().unwrap();
        let merged = config.initial_state("counter", state);

        assert_eq!(merged["count"], json!(5));
        assert_eq!(merged["label"], json!("counter"));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_value(json!({ "route": "/api/wired" })).unwrap();

        assert_eq!(config.route, "/api/wired");
        assert!(config.component_defaults.is_empty());
    }
}

//! Request entry point shared by every transport.
//!
//! [`respond`] checks the shape of a raw request body before any component is
//! built. A request naming an unknown component, or whose `state`, `changes`
//! or `calls` are not keyed objects, gets a response with the messages in
//! `metadata.errors` and the submitted state echoed back as `data`.

use std::collections::BTreeMap;

use serde_json::Value;
use wired_common::{ErrorBag, ResponseMetadata, WireMap, WireRequest, WireResponse};

use crate::registry::WireRegistry;

/// Handle a raw JSON request body for `{route}/{alias}/{target}`.
pub fn respond(registry: &WireRegistry, alias: &str, target: &str, input: Value) -> WireResponse {
    match parse_request(registry, alias, input) {
        Ok(request) => match registry.handle(alias, target, request) {
            Ok(response) => response,
            // Checked above; only reachable if the registry changed underneath.
            Err(err) => rejected(WireMap::new(), ErrorBag::from([("component".to_string(), vec![err.to_string()])])),
        },
        Err((state, errors)) => {
            tracing::warn!("Rejected request for {}/{}: {:?}", alias, target, errors);
            rejected(state, errors)
        }
    }
}

/// A response carrying only `errors` metadata.
pub fn rejected(state: WireMap, errors: ErrorBag) -> WireResponse {
    WireResponse {
        data: state,
        metadata: ResponseMetadata {
            errors,
            ..ResponseMetadata::default()
        },
    }
}

fn parse_request(registry: &WireRegistry, alias: &str, input: Value) -> Result<WireRequest, (WireMap, ErrorBag)> {
    let mut errors = ErrorBag::new();
    let mut fail = |key: &str, message: String| errors.entry(key.to_string()).or_default().push(message);

    if !registry.exists(alias) {
        fail("component", format!("Component {alias} not found."));
    }

    let mut input = match input {
        Value::Object(input) => input,
        Value::Null => WireMap::new(),
        _ => {
            fail("request", "The request body must be an object.".to_string());
            WireMap::new()
        }
    };

    let state = keyed(input.remove("state"), "State", "Property", &mut fail);
    let changes = keyed(input.remove("changes"), "Changes", "Property", &mut fail);
    let calls = keyed(input.remove("calls"), "Calls", "Method", &mut fail);

    let mut arguments = BTreeMap::new();
    for (method, args) in calls {
        match args {
            Value::Array(args) => {
                arguments.insert(method, args);
            }
            Value::Null => {
                arguments.insert(method, Vec::new());
            }
            _ => fail("calls", format!("[Calls] Arguments for {method} must be an array.")),
        }
    }

    let mut readonly = Vec::new();
    match input.remove("readonly") {
        None | Some(Value::Null) => {}
        Some(Value::Array(keys)) => {
            for key in keys {
                match key {
                    Value::String(key) => readonly.push(key),
                    other => fail("readonly", format!("[Readonly] Property name must be a string, {other} given.")),
                }
            }
        }
        Some(_) => fail("readonly", "Readonly must be an array.".to_string()),
    }

    if errors.is_empty() {
        Ok(WireRequest { state, changes, calls: arguments, readonly })
    } else {
        Err((state, errors))
    }
}

/// Accepts `null`, an object, or an empty array (an empty keyed collection in
/// some client serializers). Anything else is reported under `section`.
fn keyed(value: Option<Value>, section: &str, member: &str, fail: &mut impl FnMut(&str, String)) -> WireMap {
    let key = section.to_ascii_lowercase();
    match value {
        None | Some(Value::Null) => WireMap::new(),
        Some(Value::Object(map)) => map,
        Some(Value::Array(items)) => {
            for index in 0..items.len() {
                fail(&key, format!("[{section}] {member} name must be a string, {index} given."));
            }
            WireMap::new()
        }
        Some(_) => {
            fail(&key, format!("{section} must be an object."));
            WireMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::instance::Wired;
    use crate::schema::{ComponentSchema, Method, Property};
    use serde_json::json;

    #[derive(Default)]
    struct Echo {
        text: Option<String>,
    }

    impl Component for Echo {
        fn schema() -> ComponentSchema<Self> {
            ComponentSchema::builder()
                .property(Property::new("text", |c: &Echo| &c.text, |c: &mut Echo| &mut c.text))
                .method(Method::with_args("shout", |wire: &mut Wired<Echo>, (text,): (String,)| {
                    let loud = text.to_uppercase();
                    wire.text = Some(loud.clone());
                    Ok(loud)
                }))
                .build()
        }
    }

    fn registry() -> WireRegistry {
        let mut registry = WireRegistry::default();
        registry.register::<Echo>("echo").unwrap();
        registry
    }

    #[test]
    fn test_unknown_component_echoes_state() {
        let response = respond(&registry(), "nope", "refresh", json!({ "state": { "text": "hi" } }));

        assert_eq!(response.data["text"], json!("hi"));
        assert_eq!(response.errors("component"), ["Component nope not found.".to_string()]);
        assert!(response.metadata.calls.is_empty());
    }

    #[test]
    fn test_malformed_sections() {
        let response = respond(
            &registry(),
            "echo",
            "shout",
            json!({ "state": ["a"], "changes": "oops", "calls": { "shout": "loud" } }),
        );

        assert!(response.data.is_empty());
        assert_eq!(response.errors("state"), ["[State] Property name must be a string, 0 given.".to_string()]);
        assert_eq!(response.errors("changes"), ["Changes must be an object.".to_string()]);
        assert_eq!(response.errors("calls"), ["[Calls] Arguments for shout must be an array.".to_string()]);
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let response = respond(&registry(), "echo", "refresh", json!({ "state": [], "calls": null }));

        assert!(response.metadata.errors.is_empty());
        assert_eq!(response.data["text"], Value::Null);
    }

    #[test]
    fn test_well_formed_request_runs_component() {
        let response = respond(&registry(), "echo", "shout", json!({ "calls": { "shout": ["hey"] } }));

        assert_eq!(response.call("shout"), Some(&json!("HEY")));
        assert_eq!(response.data["text"], json!("HEY"));
    }

    #[test]
    fn test_client_readonly_keys() {
        let response = respond(
            &registry(),
            "echo",
            "text",
            json!({ "state": { "text": "hi" }, "changes": { "text": "bye" }, "readonly": ["text"] }),
        );

        assert!(!response.data.contains_key("text"));
        assert!(response.is_readonly("text"));

        let response = respond(&registry(), "echo", "refresh", json!({ "readonly": [1] }));
        assert_eq!(
            response.errors("readonly"),
            ["[Readonly] Property name must be a string, 1 given.".to_string()]
        );
    }
}

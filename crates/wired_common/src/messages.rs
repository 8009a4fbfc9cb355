use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Property name -> wire value.
pub type WireMap = serde_json::Map<String, Value>;

/// Property name -> ordered list of validation messages.
pub type ErrorBag = BTreeMap<String, Vec<String>>;

/// Reserved target used to (re)mount a component.
pub const MOUNT: &str = "mount";

/// Reserved target used to re-fetch derived state without any mutation.
pub const REFRESH: &str = "refresh";

/// Builds `{route}/{alias}/{target}`, tolerating a trailing slash on `route`.
pub fn route_path(route: &str, alias: &str, target: &str) -> String {
    format!("{}/{}/{}", route.trim_end_matches('/'), alias, target)
}

/// Body of a component request.
///
/// `state` is the client's full mirror of the shared, non-readonly
/// properties; `changes` and `calls` are what this request asks the server to
/// apply. Method arguments are positional. `readonly` names the keys the
/// client already holds as readonly, so the server keeps them out of `data`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WireRequest {
    #[serde(default)]
    pub state: WireMap,
    #[serde(default)]
    pub changes: WireMap,
    #[serde(default)]
    pub calls: BTreeMap<String, Vec<Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readonly: Vec<String>,
}

/// One frame of a captured call trace.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceFrame {
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Structured description of a method that failed unexpectedly.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionReport {
    pub message: String,
    /// Type name of the originating error.
    pub exception: String,
    pub file: String,
    pub line: u32,
    #[serde(default)]
    pub trace: Vec<TraceFrame>,
}

impl std::fmt::Display for ExceptionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} ({}:{})", self.exception, self.message, self.file, self.line)
    }
}

/// Response-only metadata bag.
///
/// `exceptions` is omitted from the payload when empty, so a client can treat
/// its mere presence as a failure signal. Keys added through the server's
/// `meta()` helper end up in `extra` and are flattened into the same object.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub calls: BTreeMap<String, Value>,
    #[serde(default)]
    pub errors: ErrorBag,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub exceptions: BTreeMap<String, ExceptionReport>,
    #[serde(default)]
    pub readonly: Vec<String>,
    #[serde(flatten)]
    pub extra: WireMap,
}

/// Body of a component response.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct WireResponse {
    #[serde(default)]
    pub data: WireMap,
    #[serde(default)]
    pub metadata: ResponseMetadata,
}

impl WireResponse {
    /// Return value recorded for `method`, if it ran successfully.
    pub fn call(&self, method: &str) -> Option<&Value> {
        self.metadata.calls.get(method)
    }

    /// Validation messages recorded for `property`.
    pub fn errors(&self, property: &str) -> &[String] {
        self.metadata
            .errors
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn exception(&self, method: &str) -> Option<&ExceptionReport> {
        self.metadata.exceptions.get(method)
    }

    pub fn has_exceptions(&self) -> bool {
        !self.metadata.exceptions.is_empty()
    }

    pub fn is_readonly(&self, property: &str) -> bool {
        self.metadata.readonly.iter().any(|p| p == property)
    }
}

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::Location;

use wired_common::{ErrorBag, ExceptionReport, TraceFrame};

/// Errors produced while converting between wire values and typed values.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("no member of {0} accepted the value")]
    UnionExhausted(String),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Custom(String),
}

impl TransformError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Errors raised by the component registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Component {0} not found.")]
    UnknownComponent(String),
    #[error("Component alias {0} is already registered.")]
    DuplicateAlias(String),
}

/// Invalid runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid route: {0}")]
    InvalidRoute(String),
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
}

/// A "throwing" validation call failed.
///
/// This is expected control flow: hooks and wired methods propagate it with
/// `?`, and the runtime swallows it at the apply and dehydrate boundaries. The
/// messages have already been recorded on the instance when this is returned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("the given data was invalid")]
pub struct ValidationFailure {
    pub errors: ErrorBag,
}

impl ValidationFailure {
    pub fn new(errors: ErrorBag) -> Self {
        Self { errors }
    }

    /// Failure with a single message for `property`.
    pub fn with_message(property: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = ErrorBag::new();
        errors.insert(property.into(), vec![message.into()]);
        Self { errors }
    }
}

/// An unexpected failure inside a wired method.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Exception {
    pub message: String,
    pub exception: String,
    pub file: String,
    pub line: u32,
    pub trace: Vec<TraceFrame>,
}

impl Exception {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self::located(message.into(), "Exception".to_string(), Location::caller())
    }

    /// Wraps any error, keeping its type name as the exception kind.
    #[track_caller]
    pub fn from_error<E: std::error::Error>(err: E) -> Self {
        let kind = std::any::type_name::<E>();
        let kind = kind.rsplit("::").next().unwrap_or(kind).to_string();
        Self::located(err.to_string(), kind, Location::caller())
    }

    pub(crate) fn from_panic(method: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            format!("method {method} panicked")
        };

        Self {
            message,
            exception: "Panic".to_string(),
            file: String::new(),
            line: 0,
            trace: vec![TraceFrame {
                function: method.to_string(),
                file: None,
                line: None,
            }],
        }
    }

    fn located(message: String, exception: String, location: &Location<'_>) -> Self {
        Self {
            message,
            exception,
            file: location.file().to_string(),
            line: location.line(),
            trace: capture_trace(),
        }
    }

    pub fn report(&self) -> ExceptionReport {
        ExceptionReport {
            message: self.message.clone(),
            exception: self.exception.clone(),
            file: self.file.clone(),
            line: self.line,
            trace: self.trace.clone(),
        }
    }
}

/// Outcome of a wired method that did not return a value.
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error(transparent)]
    Exception(#[from] Exception),
}

impl MethodError {
    #[track_caller]
    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception(Exception::new(message))
    }
}

impl From<TransformError> for MethodError {
    #[track_caller]
    fn from(err: TransformError) -> Self {
        Self::Exception(Exception::from_error(err))
    }
}

// Only populated when RUST_BACKTRACE / RUST_LIB_BACKTRACE enable capture.
fn capture_trace() -> Vec<TraceFrame> {
    let backtrace = Backtrace::capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }

    let rendered = backtrace.to_string();
    let mut frames: Vec<TraceFrame> = Vec::new();
    for line in rendered.lines().map(str::trim) {
        if let Some(location) = line.strip_prefix("at ") {
            if let Some(frame) = frames.last_mut() {
                let (file, line_no) = split_location(location);
                frame.file = Some(file);
                frame.line = line_no;
            }
        } else if let Some((_, function)) = line.split_once(": ") {
            frames.push(TraceFrame {
                function: function.to_string(),
                file: None,
                line: None,
            });
        }
    }
    frames
}

fn split_location(location: &str) -> (String, Option<u32>) {
    let mut parts = location.rsplitn(3, ':');
    let _column = parts.next();
    let line = parts.next().and_then(|l| l.parse().ok());
    match (line, parts.next()) {
        (Some(line), Some(file)) => (file.to_string(), Some(line)),
        _ => (location.to_string(), None),
    }
}

//! Type transformer registry.
//!
//! Every shared property and method parameter declares a [`WireType`]. The
//! [`TypeRegistry`] turns incoming wire values into the canonical serde form
//! of that type (`decode`) and turns serialized typed values back into wire
//! values (`encode`).
//!
//! Resolution order for a named type:
//! 1. a transformer registered for the name, or for its nearest registered
//!    ancestor (see [`TypeRegistry::extends`]);
//! 2. the generic fallback: the value is handed to serde unchanged, which
//!    constructs the type from its array/object form and flattens it back.
//!
//! Primitive types (`int`, `float`, `string`, `bool`) are coerced the same
//! way loosely-typed form input usually is, so `"5"` decodes to `5` for an
//! `int` property.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Number, Value};

use crate::error::TransformError;

/// Declared type of a shared property, method parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WireType {
    /// No declared type; values pass through untouched.
    Any,
    Int,
    Float,
    String,
    Bool,
    /// A list or map with no further structure.
    Array,
    /// A custom type, identified by its short name.
    Named(String),
    /// Members are tried in declaration order.
    Union(Vec<WireType>),
}

/// Runtime kind of a JSON value, used to pick union members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Int,
    Float,
    String,
    Bool,
    Array,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Number(n) if n.is_f64() => ValueKind::Float,
            Value::Number(_) => ValueKind::Int,
            Value::String(_) => ValueKind::String,
            Value::Array(_) | Value::Object(_) => ValueKind::Array,
        }
    }

    fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Bool => "bool",
            ValueKind::Array => "array",
        }
    }
}

impl WireType {
    /// Infers the wire type of a Rust type.
    ///
    /// Integers, floats, `String`/`&str` and `bool` map to their primitive
    /// kinds, `Vec<Value>`/`Map` to [`WireType::Array`], `Value` to
    /// [`WireType::Any`]; everything else becomes a [`WireType::Named`] keyed
    /// by the short type name (struct name only, no module path).
    pub fn of<T: ?Sized + 'static>() -> Self {
        let id = TypeId::of::<T>();
        let ints = [
            TypeId::of::<i8>(),
            TypeId::of::<i16>(),
            TypeId::of::<i32>(),
            TypeId::of::<i64>(),
            TypeId::of::<isize>(),
            TypeId::of::<u8>(),
            TypeId::of::<u16>(),
            TypeId::of::<u32>(),
            TypeId::of::<u64>(),
            TypeId::of::<usize>(),
        ];

        if ints.contains(&id) {
            WireType::Int
        } else if id == TypeId::of::<f32>() || id == TypeId::of::<f64>() {
            WireType::Float
        } else if id == TypeId::of::<String>() || id == TypeId::of::<str>() {
            WireType::String
        } else if id == TypeId::of::<bool>() {
            WireType::Bool
        } else if id == TypeId::of::<Value>() {
            WireType::Any
        } else if id == TypeId::of::<Vec<Value>>() || id == TypeId::of::<serde_json::Map<String, Value>>() {
            WireType::Array
        } else {
            WireType::Named(short_type_name::<T>().to_string())
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        WireType::Named(name.into())
    }

    pub fn union(members: impl IntoIterator<Item = WireType>) -> Self {
        WireType::Union(members.into_iter().collect())
    }

    fn primitive_kind(&self) -> Option<ValueKind> {
        match self {
            WireType::Int => Some(ValueKind::Int),
            WireType::Float => Some(ValueKind::Float),
            WireType::String => Some(ValueKind::String),
            WireType::Bool => Some(ValueKind::Bool),
            WireType::Array => Some(ValueKind::Array),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            WireType::Any => "mixed".to_string(),
            WireType::Int => "int".to_string(),
            WireType::Float => "float".to_string(),
            WireType::String => "string".to_string(),
            WireType::Bool => "bool".to_string(),
            WireType::Array => "array".to_string(),
            WireType::Named(name) => name.clone(),
            WireType::Union(members) => members
                .iter()
                .map(WireType::describe)
                .collect::<Vec<_>>()
                .join("|"),
        }
    }
}

/// Short type name (struct name only, no module path or generics prefix).
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

pub type DecodeFn = Arc<dyn Fn(Value) -> Result<Value, TransformError> + Send + Sync>;
pub type EncodeFn = Arc<dyn Fn(Value) -> Result<Value, TransformError> + Send + Sync>;

#[derive(Clone)]
struct Transformer {
    decode: DecodeFn,
    encode: EncodeFn,
}

/// Registry mapping type names to decode/encode transformers.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    transformers: HashMap<String, Transformer>,
    /// child type name -> parent type name
    parents: HashMap<String, String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformer for the type called `name`.
    ///
    /// `decode` receives the raw wire value and must return the value serde
    /// expects for the type; `encode` receives the serialized value and
    /// returns what goes on the wire. A later registration for the same name
    /// replaces the earlier one.
    pub fn register<D, E>(&mut self, name: impl Into<String>, decode: D, encode: E)
    where
        D: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
        E: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!("Registered type transformer: {}", name);
        self.transformers.insert(
            name,
            Transformer {
                decode: Arc::new(decode),
                encode: Arc::new(encode),
            },
        );
    }

    /// Register a transformer keyed by the short name of `T`.
    pub fn register_type<T, D, E>(&mut self, decode: D, encode: E)
    where
        T: ?Sized + 'static,
        D: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
        E: Fn(Value) -> Result<Value, TransformError> + Send + Sync + 'static,
    {
        self.register(short_type_name::<T>(), decode, encode);
    }

    /// Declare that `child` inherits transformers registered for `parent`.
    pub fn extends(&mut self, child: impl Into<String>, parent: impl Into<String>) {
        self.parents.insert(child.into(), parent.into());
    }

    pub fn has_transformer(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Nearest registered transformer for `name`, walking up declared parents.
    fn find(&self, name: &str) -> Option<&Transformer> {
        let mut current = name;
        // Bounded walk so a cyclic `extends` declaration cannot hang a request.
        for _ in 0..=self.parents.len() {
            if let Some(transformer) = self.transformers.get(current) {
                return Some(transformer);
            }
            current = self.parents.get(current)?;
        }
        None
    }

    /// Turn a wire value into the canonical serde value of `ty`.
    pub fn decode(&self, ty: &WireType, value: Value) -> Result<Value, TransformError> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match ty {
            WireType::Any => Ok(value),
            WireType::Int => coerce_int(value),
            WireType::Float => coerce_float(value),
            WireType::String => coerce_string(value),
            WireType::Bool => coerce_bool(value),
            WireType::Array => match value {
                Value::Array(_) | Value::Object(_) => Ok(value),
                other => Err(mismatch(ty, &other)),
            },
            WireType::Named(name) => match self.find(name) {
                Some(transformer) => (transformer.decode)(value),
                None => Ok(value),
            },
            WireType::Union(members) => {
                let kind = ValueKind::of(&value);
                for member in prefer_kind(members, kind) {
                    if let Ok(decoded) = self.decode(member, value.clone()) {
                        return Ok(decoded);
                    }
                }
                Err(TransformError::UnionExhausted(ty.describe()))
            }
        }
    }

    /// Turn a serialized typed value into its wire form for `ty`.
    pub fn encode(&self, ty: &WireType, value: Value) -> Result<Value, TransformError> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match ty {
            WireType::Named(name) => match self.find(name) {
                Some(transformer) => (transformer.encode)(value),
                None => Ok(value),
            },
            WireType::Union(members) => {
                let kind = ValueKind::of(&value);
                if members.iter().any(|m| m.primitive_kind() == Some(kind)) {
                    return Ok(value);
                }
                for member in members {
                    if let WireType::Named(name) = member {
                        if let Some(transformer) = self.find(name) {
                            if let Ok(encoded) = (transformer.encode)(value.clone()) {
                                return Ok(encoded);
                            }
                        }
                    }
                }
                Ok(value)
            }
            _ => Ok(value),
        }
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.transformers.keys().collect();
        names.sort();
        f.debug_struct("TypeRegistry")
            .field("transformers", &names)
            .field("parents", &self.parents)
            .finish()
    }
}

/// Members whose primitive kind matches `kind` first, then the rest, each
/// group in declaration order.
fn prefer_kind(members: &[WireType], kind: ValueKind) -> impl Iterator<Item = &WireType> {
    let matching = members.iter().filter(move |m| m.primitive_kind() == Some(kind));
    let rest = members.iter().filter(move |m| m.primitive_kind() != Some(kind));
    matching.chain(rest)
}

fn mismatch(ty: &WireType, value: &Value) -> TransformError {
    TransformError::TypeMismatch {
        expected: ty.describe(),
        found: ValueKind::of(value).name().to_string(),
    }
}

fn coerce_int(value: Value) -> Result<Value, TransformError> {
    match &value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value),
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.is_finite())
            .map(|f| Value::from(f.trunc() as i64))
            .ok_or_else(|| mismatch(&WireType::Int, &value)),
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(Value::from(i))
            } else if let Ok(f) = trimmed.parse::<f64>() {
                coerce_int(Value::from(f))
            } else {
                Err(mismatch(&WireType::Int, &value))
            }
        }
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        _ => Err(mismatch(&WireType::Int, &value)),
    }
}

fn coerce_float(value: Value) -> Result<Value, TransformError> {
    let float = match &value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };

    float
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| mismatch(&WireType::Float, &value))
}

fn coerce_string(value: Value) -> Result<Value, TransformError> {
    match value {
        Value::String(_) => Ok(value),
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        other => Err(mismatch(&WireType::String, &other)),
    }
}

fn coerce_bool(value: Value) -> Result<Value, TransformError> {
    match &value {
        Value::Bool(_) => Ok(value),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(s) => Ok(Value::Bool(!(s.is_empty() || s == "0" || s == "false"))),
        _ => Err(mismatch(&WireType::Bool, &value)),
    }
}

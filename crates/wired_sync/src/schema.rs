//! Declarative component schema.
//!
//! A [`ComponentSchema`] lists everything a component exposes across the
//! wire: shared properties (name, type, default, readonly flag, optional
//! encoder and hooks), shared methods (name, parameter and return types,
//! handler) and validation rules. It is built once, when the component is
//! registered, and shared by every request for that component.
//!
//! Shared properties are plain `Option<T>` fields on the component struct.
//! `None` means "unset": the property falls back to its declared default when
//! the state is serialized.

use std::fmt;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use wired_common::MOUNT;

use crate::component::{Component, HookResult};
use crate::error::{MethodError, TransformError};
use crate::instance::Wired;
use crate::transform::WireType;
use crate::validation::{Rule, RuleSet};

type ReadFn<C> = Arc<dyn Fn(&C) -> Result<Option<Value>, TransformError> + Send + Sync>;
type WriteFn<C> = Arc<dyn Fn(&mut C, Value) -> Result<(), TransformError> + Send + Sync>;

/// Property-specific guard run before a change is committed: `(wire, new, old)`.
pub type UpdatingHook<C> = fn(&mut Wired<C>, &Value, &Value) -> HookResult<bool>;

/// Property-specific hook run after a change is committed: `(wire, new, old)`.
pub type UpdatedHook<C> = fn(&mut Wired<C>, &Value, &Value) -> HookResult;

/// Handler of a shared method, receiving positionally decoded arguments.
pub type MethodHandler<C> = Arc<dyn Fn(&mut Wired<C>, Vec<Value>) -> Result<Value, MethodError> + Send + Sync>;

/// A shared property declaration.
pub struct Property<C: Component> {
    name: &'static str,
    ty: WireType,
    readonly: bool,
    default: Option<Value>,
    encode_with: Option<fn(&Value) -> Value>,
    updating: Option<UpdatingHook<C>>,
    updated: Option<UpdatedHook<C>>,
    read: ReadFn<C>,
    write: WriteFn<C>,
}

impl<C: Component> Property<C> {
    /// Declare `name` as shared, bound to an `Option<T>` field through the
    /// given accessors. The wire type is inferred from `T`.
    pub fn new<T>(
        name: &'static str,
        get: fn(&C) -> &Option<T>,
        get_mut: fn(&mut C) -> &mut Option<T>,
    ) -> Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        Self {
            name,
            ty: WireType::of::<T>(),
            readonly: false,
            default: None,
            encode_with: None,
            updating: None,
            updated: None,
            read: Arc::new(move |component: &C| -> Result<Option<Value>, TransformError> {
                match get(component) {
                    Some(value) => Ok(Some(serde_json::to_value(value)?)),
                    None => Ok(None),
                }
            }),
            write: Arc::new(move |component: &mut C, value: Value| -> Result<(), TransformError> {
                *get_mut(component) = serde_json::from_value(value)?;
                Ok(())
            }),
        }
    }

    /// The client may observe but never change this property.
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Wire value used (after decoding) while the property is unset.
    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Override the inferred wire type, e.g. to declare a union.
    pub fn ty(mut self, ty: WireType) -> Self {
        self.ty = ty;
        self
    }

    /// Encode with `encoder` instead of the type transformer.
    pub fn encode_with(mut self, encoder: fn(&Value) -> Value) -> Self {
        self.encode_with = Some(encoder);
        self
    }

    pub fn updating(mut self, hook: UpdatingHook<C>) -> Self {
        self.updating = Some(hook);
        self
    }

    pub fn updated(mut self, hook: UpdatedHook<C>) -> Self {
        self.updated = Some(hook);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn wire_type(&self) -> &WireType {
        &self.ty
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub(crate) fn encoder(&self) -> Option<fn(&Value) -> Value> {
        self.encode_with
    }

    pub(crate) fn updating_hook(&self) -> Option<UpdatingHook<C>> {
        self.updating
    }

    pub(crate) fn updated_hook(&self) -> Option<UpdatedHook<C>> {
        self.updated
    }

    /// Current serde value of the field, `None` when unset.
    pub(crate) fn read(&self, component: &C) -> Result<Option<Value>, TransformError> {
        (self.read)(component)
    }

    /// Store a decoded value; `null` unsets the field.
    pub(crate) fn write(&self, component: &mut C, value: Value) -> Result<(), TransformError> {
        (self.write)(component, value)
    }
}

impl<C: Component> fmt::Debug for Property<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("readonly", &self.readonly)
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

/// Positional argument list of a typed method, usually a tuple.
pub trait WireArgs: DeserializeOwned + 'static {
    /// Wire type of each position, in order.
    fn wire_types() -> Vec<WireType>;
}

macro_rules! impl_wire_args {
    ($($arg:ident),+) => {
        impl<$($arg: DeserializeOwned + 'static),+> WireArgs for ($($arg,)+) {
            fn wire_types() -> Vec<WireType> {
                vec![$(WireType::of::<$arg>()),+]
            }
        }
    };
}

impl_wire_args!(A);
impl_wire_args!(A, B);
impl_wire_args!(A, B, D);
impl_wire_args!(A, B, D, E);
impl_wire_args!(A, B, D, E, G);
impl_wire_args!(A, B, D, E, G, H);

/// A shared method declaration.
pub struct Method<C: Component> {
    name: &'static str,
    params: Vec<WireType>,
    /// Parameters declared through [`Method::param`] so far.
    overridden: usize,
    returns: WireType,
    handler: MethodHandler<C>,
}

impl<C: Component> Method<C> {
    /// Untyped method: receives the positional arguments as wire values
    /// (decoded against any declared [`param`](Self::param) types) and returns
    /// a wire value.
    pub fn new<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn(&mut Wired<C>, Vec<Value>) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        Self {
            name,
            params: Vec::new(),
            overridden: 0,
            returns: WireType::Any,
            handler: Arc::new(handler),
        }
    }

    /// Method without arguments returning a serializable value.
    pub fn action<R, F>(name: &'static str, handler: F) -> Self
    where
        R: Serialize + 'static,
        F: Fn(&mut Wired<C>) -> Result<R, MethodError> + Send + Sync + 'static,
    {
        Self {
            name,
            params: Vec::new(),
            overridden: 0,
            returns: WireType::of::<R>(),
            handler: Arc::new(move |wire: &mut Wired<C>, _args: Vec<Value>| -> Result<Value, MethodError> {
                let result = handler(wire)?;
                Ok(serde_json::to_value(result).map_err(TransformError::from)?)
            }),
        }
    }

    /// Method whose positional arguments deserialize into the tuple `A`, e.g.
    /// `(i64, String)`. Each argument is decoded against the wire type of its
    /// tuple element first.
    pub fn with_args<A, R, F>(name: &'static str, handler: F) -> Self
    where
        A: WireArgs,
        R: Serialize + 'static,
        F: Fn(&mut Wired<C>, A) -> Result<R, MethodError> + Send + Sync + 'static,
    {
        Self {
            name,
            params: A::wire_types(),
            overridden: 0,
            returns: WireType::of::<R>(),
            handler: Arc::new(move |wire: &mut Wired<C>, args: Vec<Value>| -> Result<Value, MethodError> {
                let args: A = serde_json::from_value(Value::Array(args)).map_err(TransformError::from)?;
                let result = handler(wire, args)?;
                Ok(serde_json::to_value(result).map_err(TransformError::from)?)
            }),
        }
    }

    /// Declare the type of the next positional parameter, replacing the
    /// type inferred for that position if there is one.
    pub fn param(mut self, ty: WireType) -> Self {
        match self.params.get_mut(self.overridden) {
            Some(slot) => *slot = ty,
            None => self.params.push(ty),
        }
        self.overridden += 1;
        self
    }

    /// Override the declared return type.
    pub fn returns(mut self, ty: WireType) -> Self {
        self.returns = ty;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &[WireType] {
        &self.params
    }

    pub fn return_type(&self) -> &WireType {
        &self.returns
    }

    pub(crate) fn handler(&self) -> MethodHandler<C> {
        Arc::clone(&self.handler)
    }
}

impl<C: Component> fmt::Debug for Method<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// Everything a component exposes across the wire.
#[derive(Debug)]
pub struct ComponentSchema<C: Component> {
    properties: Vec<Property<C>>,
    methods: Vec<Method<C>>,
    rules: RuleSet,
    strict_validation: bool,
}

impl<C: Component> ComponentSchema<C> {
    pub fn builder() -> SchemaBuilder<C> {
        SchemaBuilder {
            schema: ComponentSchema {
                properties: Vec::new(),
                methods: Vec::new(),
                rules: RuleSet::new(),
                strict_validation: true,
            },
        }
    }

    pub fn properties(&self) -> &[Property<C>] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Property<C>> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn methods(&self) -> &[Method<C>] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&Method<C>> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn is_shared(&self, property: &str) -> bool {
        self.property(property).is_some()
    }

    pub fn has_mount(&self) -> bool {
        self.method(MOUNT).is_some()
    }

    /// Names of properties declared readonly.
    pub fn readonly_properties(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.properties.iter().filter(|p| p.readonly).map(|p| p.name)
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// When on, an invalid incoming state aborts all changes and calls.
    pub fn strict_validation(&self) -> bool {
        self.strict_validation
    }
}

/// Builder for [`ComponentSchema`].
pub struct SchemaBuilder<C: Component> {
    schema: ComponentSchema<C>,
}

impl<C: Component> SchemaBuilder<C> {
    /// Add a shared property. A later declaration with the same name
    /// replaces the earlier one.
    pub fn property(mut self, property: Property<C>) -> Self {
        self.schema.properties.retain(|p| p.name != property.name);
        self.schema.properties.push(property);
        self
    }

    /// Add a shared method. A later declaration with the same name replaces
    /// the earlier one.
    pub fn method(mut self, method: Method<C>) -> Self {
        self.schema.methods.retain(|m| m.name != method.name);
        self.schema.methods.push(method);
        self
    }

    /// Register the mount handler. Its arguments come from the client's
    /// `remount(...)`; a `readonly` object in its result promotes those keys.
    pub fn mount<F>(self, handler: F) -> Self
    where
        F: Fn(&mut Wired<C>, Vec<Value>) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        self.method(Method::new(MOUNT, handler))
    }

    pub fn rules(mut self, property: impl Into<String>, rules: impl IntoIterator<Item = Rule>) -> Self {
        self.schema.rules.add(property, rules);
        self
    }

    /// Custom message for `key` in the form `property.rule`.
    pub fn message(mut self, key: impl Into<String>, message: impl Into<String>) -> Self {
        self.schema.rules.message(key, message);
        self
    }

    pub fn attribute(mut self, property: impl Into<String>, name: impl Into<String>) -> Self {
        self.schema.rules.attribute(property, name);
        self
    }

    pub fn strict_validation(mut self, strict: bool) -> Self {
        self.schema.strict_validation = strict;
        self
    }

    pub fn build(self) -> ComponentSchema<C> {
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Profile {
        name: Option<String>,
        tags: Option<Vec<String>>,
    }

    impl Component for Profile {
        fn schema() -> ComponentSchema<Self> {
            ComponentSchema::builder()
                .property(Property::new("name", |c: &Profile| &c.name, |c: &mut Profile| &mut c.name))
                .property(
                    Property::new("tags", |c: &Profile| &c.tags, |c: &mut Profile| &mut c.tags)
                        .readonly()
                        .default(json!([])),
                )
                .method(Method::action("greet", |wire: &mut Wired<Profile>| {
                    Ok(format!("hi {}", wire.name.clone().unwrap_or_default()))
                }))
                .rules("name", [Rule::Required])
                .build()
        }
    }

    #[test]
    fn test_schema_declarations() {
        let schema = Profile::schema();

        assert!(schema.is_shared("name"));
        assert!(!schema.is_shared("greet"));
        assert_eq!(schema.property("name").unwrap().wire_type(), &WireType::String);
        assert_eq!(schema.property("tags").unwrap().wire_type(), &WireType::named("Vec"));
        assert_eq!(schema.readonly_properties().collect::<Vec<_>>(), ["tags"]);
        assert_eq!(schema.method("greet").unwrap().return_type(), &WireType::String);
        assert!(!schema.has_mount());
        assert!(schema.strict_validation());
        assert!(schema.rules().has_rules("name"));
    }

    #[test]
    fn test_property_read_write() {
        let schema = Profile::schema();
        let name = schema.property("name").unwrap();
        let mut profile = Profile::default();

        assert_eq!(name.read(&profile).unwrap(), None);

        name.write(&mut profile, json!("sam")).unwrap();
        assert_eq!(profile.name.as_deref(), Some("sam"));
        assert_eq!(name.read(&profile).unwrap(), Some(json!("sam")));

        name.write(&mut profile, Value::Null).unwrap();
        assert_eq!(profile.name, None);

        assert!(name.write(&mut profile, json!([1, 2])).is_err());
    }

    #[test]
    fn test_later_declaration_replaces_earlier() {
        let schema = ComponentSchema::<Profile>::builder()
            .property(Property::new("name", |c: &Profile| &c.name, |c: &mut Profile| &mut c.name))
            .property(Property::new("name", |c: &Profile| &c.name, |c: &mut Profile| &mut c.name).readonly())
            .build();

        assert_eq!(schema.properties().len(), 1);
        assert!(schema.property("name").unwrap().is_readonly());
    }

    #[test]
    fn test_method_params_follow_argument_tuple() {
        let method = Method::<Profile>::with_args("rename", |_wire: &mut Wired<Profile>, (_name, _times): (String, u8)| {
            Ok(true)
        });
        assert_eq!(method.params(), [WireType::String, WireType::Int]);
        assert_eq!(method.return_type(), &WireType::Bool);

        // Explicit declarations replace inferred positions in order
        let method = method.param(WireType::named("Name"));
        assert_eq!(method.params(), [WireType::named("Name"), WireType::Int]);
    }
}

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use wired_common::{WireMap, WireRequest, WireResponse};

use crate::component::Component;
use crate::config::{Environment, RuntimeConfig};
use crate::error::RegistryError;
use crate::instance::Wired;
use crate::schema::ComponentSchema;
use crate::transform::{short_type_name, TypeRegistry};

type HandleFn = Arc<dyn Fn(&Arc<TypeRegistry>, Environment, &str, WireRequest) -> WireResponse + Send + Sync>;

/// Per-alias registration data stored in the [`WireRegistry`].
pub struct ComponentRegistration {
    pub alias: String,
    pub type_id: TypeId,
    pub type_name: &'static str,
    schema: Arc<dyn Any + Send + Sync>,
    /// Type-specific function that builds an instance from the request state,
    /// runs the lifecycle and serializes the response.
    handle: HandleFn,
}

impl std::fmt::Debug for ComponentRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistration")
            .field("alias", &self.alias)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Process-scoped registry of components and type transformers.
///
/// Build one at startup, register every component under an alias and hand it
/// to the HTTP layer (or call [`WireRegistry::handle`] directly).
#[derive(Default)]
pub struct WireRegistry {
    components: HashMap<String, ComponentRegistration>,
    types: Arc<TypeRegistry>,
    config: RuntimeConfig,
}

impl WireRegistry {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            components: HashMap::new(),
            types: Arc::new(TypeRegistry::default()),
            config,
        }
    }

    /// Register component `C` under `alias`. Its schema is built once, here.
    pub fn register<C: Component>(&mut self, alias: impl Into<String>) -> Result<&mut Self, RegistryError> {
        let alias = alias.into();
        if self.components.contains_key(&alias) {
            return Err(RegistryError::DuplicateAlias(alias));
        }

        let schema = Arc::new(C::schema());
        tracing::debug!(
            "Registered component {} as {} ({} properties, {} methods)",
            short_type_name::<C>(),
            alias,
            schema.properties().len(),
            schema.methods().len()
        );

        let typed = Arc::clone(&schema);
        let handle: HandleFn = Arc::new(
            move |types: &Arc<TypeRegistry>, environment: Environment, target: &str, request: WireRequest| -> WireResponse {
                let WireRequest { state, changes, calls, readonly } = request;
                let mut wire = Wired::with_context(Arc::clone(&typed), Arc::clone(types), environment, state);
                wire.keep_readonly(readonly).handle(changes, calls, Some(target)).response()
            },
        );

        self.components.insert(
            alias.clone(),
            ComponentRegistration {
                alias,
                type_id: TypeId::of::<C>(),
                type_name: short_type_name::<C>(),
                schema,
                handle,
            },
        );
        Ok(self)
    }

    pub fn exists(&self, alias: &str) -> bool {
        self.components.contains_key(alias)
    }

    pub fn resolve(&self, alias: &str) -> Result<&ComponentRegistration, RegistryError> {
        self.components
            .get(alias)
            .ok_or_else(|| RegistryError::UnknownComponent(alias.to_string()))
    }

    /// Alias under which `C` was registered.
    pub fn alias_of<C: Component>(&self) -> Option<&str> {
        let type_id = TypeId::of::<C>();
        self.components
            .values()
            .find(|c| c.type_id == type_id)
            .map(|c| c.alias.as_str())
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn schema_of<C: Component>(&self) -> Option<Arc<ComponentSchema<C>>> {
        let alias = self.alias_of::<C>()?;
        let schema = Arc::clone(&self.components.get(alias)?.schema);
        schema.downcast::<ComponentSchema<C>>().ok()
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Mutable access to the type transformers. Requests already in flight
    /// keep the transformers they started with.
    pub fn types_mut(&mut self) -> &mut TypeRegistry {
        Arc::make_mut(&mut self.types)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.config.environment = environment;
    }

    /// Run a request against the component registered as `alias`.
    pub fn handle(&self, alias: &str, target: &str, request: WireRequest) -> Result<WireResponse, RegistryError> {
        let registration = self.resolve(alias)?;
        Ok((registration.handle)(&self.types, self.config.environment, target, request))
    }

    /// Build an instance of `C` from `state` with this registry's
    /// transformers and environment, without running the lifecycle.
    pub fn make<C: Component>(&self, state: WireMap) -> Wired<C> {
        let schema = self.schema_of::<C>().unwrap_or_else(|| Arc::new(C::schema()));
        Wired::with_context(schema, Arc::clone(&self.types), self.config.environment, state)
    }
}

impl std::fmt::Debug for WireRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut aliases: Vec<&str> = self.aliases().collect();
        aliases.sort_unstable();
        f.debug_struct("WireRegistry")
            .field("components", &aliases)
            .field("types", &self.types)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Method, Property};
    use serde_json::json;

    #[derive(Default)]
    struct Counter {
        count: Option<i64>,
    }

    impl Component for Counter {
        fn schema() -> ComponentSchema<Self> {
            ComponentSchema::builder()
                .property(Property::new("count", |c: &Counter| &c.count, |c: &mut Counter| &mut c.count).default(json!(0)))
                .method(Method::action("increment", |wire: &mut Wired<Counter>| {
                    let next = wire.count.unwrap_or_default() + 1;
                    wire.count = Some(next);
                    Ok(next)
                }))
                .build()
        }
    }

    #[derive(Default)]
    struct Other;

    impl Component for Other {
        fn schema() -> ComponentSchema<Self> {
            ComponentSchema::builder().build()
        }
    }

    #[test]
    fn test_register_and_resolve() {
        let mut registry = WireRegistry::default();
        registry.register::<Counter>("counter").unwrap();

        assert!(registry.exists("counter"));
        assert!(!registry.exists("other"));
        assert_eq!(registry.resolve("counter").unwrap().type_name, "Counter");
        assert_eq!(registry.alias_of::<Counter>(), Some("counter"));
        assert_eq!(registry.alias_of::<Other>(), None);
        assert!(registry.schema_of::<Counter>().is_some());
    }

    #[test]
    fn test_duplicate_alias() {
        let mut registry = WireRegistry::default();
        registry.register::<Counter>("counter").unwrap();

        let err = registry.register::<Other>("counter").unwrap_err();
        assert_eq!(err, RegistryError::DuplicateAlias("counter".into()));
    }

    #[test]
    fn test_unknown_component() {
        let registry = WireRegistry::default();
        let err = registry.handle("nope", "refresh", WireRequest::default()).unwrap_err();

        assert_eq!(err.to_string(), "Component nope not found.");
    }

    #[test]
    fn test_handle_dispatches_to_component() {
        let mut registry = WireRegistry::default();
        registry.register::<Counter>("counter").unwrap();

        let mut request = WireRequest::default();
        request.state.insert("count".into(), json!(41));
        request.calls.insert("increment".into(), vec![]);

        let response = registry.handle("counter", "increment", request).unwrap();
        assert_eq!(response.data["count"], json!(42));
        assert_eq!(response.call("increment"), Some(&json!(42)));
    }
}

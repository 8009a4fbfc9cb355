use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use wired_common::{WireMap, WireResponse};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::proxy::{ComponentProxy, ProxyInner};
use crate::reactive::{identity, Reactive};
use crate::transport::Transport;
use crate::watchers::Watchers;

static GLOBAL: RwLock<Option<Arc<Registry>>> = parking_lot::const_rwlock(None);

/// Coordinator for every live component proxy.
///
/// Tracks proxies by alias, holds the watchers that run for every response
/// and supplies the [`Reactive`] wrapper applied to new proxies.
///
/// # Example
///
/// ```rust,ignore
/// let registry = Registry::new(ClientConfig::default(), HttpTransport::new("http://localhost:3000"))
///     .install();
///
/// let counter = registry.component("counter", state);
/// counter.call("increment", [])?.await?;
/// ```
pub struct Registry {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    watchers: Arc<RwLock<Watchers>>,
    components: DashMap<String, Vec<Weak<ProxyInner>>>,
    reactive: Box<dyn Reactive>,
}

impl Registry {
    pub fn new(config: ClientConfig, transport: impl Transport) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            watchers: Arc::new(RwLock::new(Watchers::default())),
            components: DashMap::new(),
            reactive: Box::new(identity),
        }
    }

    /// Replace the wrapper applied to every new proxy.
    pub fn with_reactive(mut self, reactive: impl Reactive + 'static) -> Self {
        self.reactive = Box::new(reactive);
        self
    }

    /// Make this the process-wide registry, replacing any previous one.
    pub fn install(self) -> Arc<Registry> {
        let registry = Arc::new(self);
        *GLOBAL.write() = Some(Arc::clone(&registry));
        log::debug!("Installed wired registry for {}", registry.config.route);
        registry
    }

    /// The installed registry, if any.
    pub fn global() -> Option<Arc<Registry>> {
        GLOBAL.read().clone()
    }

    /// Remove the installed registry.
    pub fn teardown() {
        GLOBAL.write().take();
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create a proxy for `alias`. `state` is layered over the configured
    /// defaults for the alias and may carry a `readonly` object.
    pub fn component(&self, alias: &str, state: WireMap) -> ComponentProxy {
        self.build(alias, state, None)
    }

    /// Like [`component`](Self::component) with a one-off reactive wrapper.
    pub fn component_with(&self, alias: &str, state: WireMap, reactive: &dyn Reactive) -> ComponentProxy {
        self.build(alias, state, Some(reactive))
    }

    fn build(&self, alias: &str, state: WireMap, reactive: Option<&dyn Reactive>) -> ComponentProxy {
        let proxy = ComponentProxy::new(
            alias,
            self.config.initial_state(alias, state),
            self.config.route.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.watchers),
        );

        let proxy = match reactive {
            Some(reactive) => reactive.wrap(proxy),
            None => self.reactive.wrap(proxy),
        };

        let mut entry = self.components.entry(alias.to_string()).or_default();
        entry.retain(|weak| weak.strong_count() > 0);
        entry.push(proxy.downgrade());

        proxy
    }

    /// Live proxies for `alias`, in creation order.
    pub fn components(&self, alias: &str) -> Vec<ComponentProxy> {
        self.components
            .get(alias)
            .map(|entry| entry.iter().filter_map(ComponentProxy::upgrade).collect())
            .unwrap_or_default()
    }

    /// Aliases with at least one proxy created.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.components.iter().map(|entry| entry.key().clone()).collect();
        aliases.sort();
        aliases
    }

    /// Run `on_response` after every response of every proxy, before the
    /// proxy's own watchers.
    pub fn watch(&self, on_response: impl Fn(&WireResponse) + Send + Sync + 'static) -> &Self {
        self.watchers.write().on_response(on_response);
        self
    }

    pub fn watch_errors(&self, on_error: impl Fn(&ClientError) + Send + Sync + 'static) -> &Self {
        self.watchers.write().on_error(on_error);
        self
    }

    /// Refresh every live proxy of `aliases` (all aliases when `None`).
    pub async fn refresh(&self, aliases: Option<&[&str]>) -> Vec<Result<WireResponse, ClientError>> {
        let mut results = Vec::new();
        for proxy in self.select(aliases) {
            results.push(proxy.refresh().await);
        }
        results
    }

    /// Remount every live proxy of `aliases` (all aliases when `None`).
    pub async fn remount(&self, aliases: Option<&[&str]>) -> Vec<Result<WireResponse, ClientError>> {
        let mut results = Vec::new();
        for proxy in self.select(aliases) {
            results.push(proxy.remount(Vec::<Value>::new()).await);
        }
        results
    }

    fn select(&self, aliases: Option<&[&str]>) -> Vec<ComponentProxy> {
        let aliases = match aliases {
            Some(aliases) => aliases.iter().map(|a| a.to_string()).collect(),
            None => self.aliases(),
        };
        aliases.iter().flat_map(|alias| self.components(alias)).collect()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("aliases", &self.aliases())
            .field("watchers", &*self.watchers.read())
            .finish()
    }
}

use crate::proxy::ComponentProxy;

/// Hook for UI bindings: receives every newly built proxy and returns the
/// handle the registry tracks and hands out.
///
/// Implementations must return a proxy for the same component (usually the
/// input itself, after subscribing to it). Any `Fn(ComponentProxy) ->
/// ComponentProxy` qualifies.
pub trait Reactive: Send + Sync {
    fn wrap(&self, proxy: ComponentProxy) -> ComponentProxy;
}

impl<F> Reactive for F
where
    F: Fn(ComponentProxy) -> ComponentProxy + Send + Sync,
{
    fn wrap(&self, proxy: ComponentProxy) -> ComponentProxy {
        self(proxy)
    }
}

/// Returns the proxy unchanged.
pub fn identity(proxy: ComponentProxy) -> ComponentProxy {
    proxy
}

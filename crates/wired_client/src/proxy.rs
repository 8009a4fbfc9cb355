//! Client-side mirror of one server component.
//!
//! A [`ComponentProxy`] holds the last known shared state of a component and
//! turns writes and method calls into requests. Every response is reconciled
//! back into the mirror: values listed as readonly move to the readonly
//! mirror and never return to the writable state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures_lite::future::{Boxed, FutureExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use wired_common::{route_path, ErrorBag, WireMap, WireRequest, WireResponse, MOUNT, REFRESH};

use crate::error::ClientError;
use crate::transport::Transport;
use crate::watchers::Watchers;

/// An in-flight request.
pub type Pending<T> = Boxed<Result<T, ClientError>>;

/// Changes and calls to send along with the current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub changes: WireMap,
    pub calls: BTreeMap<String, Vec<Value>>,
}

impl Batch {
    pub fn change(mut self, property: impl Into<String>, value: Value) -> Self {
        self.changes.insert(property.into(), value);
        self
    }

    pub fn call(mut self, method: impl Into<String>, args: impl IntoIterator<Item = Value>) -> Self {
        self.calls.insert(method.into(), args.into_iter().collect());
        self
    }
}

#[derive(Debug, Default)]
struct LocalState {
    state: WireMap,
    readonly: WireMap,
    errors: ErrorBag,
    pending_changes: WireMap,
    pending_calls: BTreeMap<String, Vec<Value>>,
    paused: bool,
}

pub(crate) struct ProxyInner {
    alias: String,
    route: String,
    transport: Arc<dyn Transport>,
    global: Arc<RwLock<Watchers>>,
    watchers: RwLock<Watchers>,
    local: Mutex<LocalState>,
    in_flight: AtomicUsize,
}

/// Handle to a client-side component. Clones share the same mirror.
#[derive(Clone)]
pub struct ComponentProxy {
    inner: Arc<ProxyInner>,
}

impl ComponentProxy {
    /// Build a proxy from its initial state.
    ///
    /// A `readonly` object inside `state` seeds the readonly mirror and is
    /// removed from the writable state.
    pub(crate) fn new(
        alias: impl Into<String>,
        mut state: WireMap,
        route: impl Into<String>,
        transport: Arc<dyn Transport>,
        global: Arc<RwLock<Watchers>>,
    ) -> Self {
        let readonly = match state.remove("readonly") {
            Some(Value::Object(readonly)) => readonly,
            _ => WireMap::new(),
        };
        for key in readonly.keys() {
            state.remove(key);
        }

        let proxy = Self {
            inner: Arc::new(ProxyInner {
                alias: alias.into(),
                route: route.into(),
                transport,
                global,
                watchers: RwLock::new(Watchers::default()),
                local: Mutex::new(LocalState {
                    state,
                    readonly,
                    ..LocalState::default()
                }),
                in_flight: AtomicUsize::new(0),
            }),
        };

        // Mount results carry the values of keys promoted to readonly.
        let weak = Arc::downgrade(&proxy.inner);
        proxy.watch(move |response| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Some(Value::Object(mount)) = response.metadata.calls.get(MOUNT) {
                ComponentProxy { inner }.replace_state(mount, &response.metadata.readonly);
            }
        });

        proxy
    }

    pub fn alias(&self) -> &str {
        &self.inner.alias
    }

    /// Current value of `property`, from the writable or the readonly mirror.
    pub fn get(&self, property: &str) -> Option<Value> {
        let local = self.inner.local.lock();
        local
            .state
            .get(property)
            .or_else(|| local.readonly.get(property))
            .cloned()
    }

    pub fn state(&self) -> WireMap {
        self.inner.local.lock().state.clone()
    }

    pub fn readonly(&self) -> WireMap {
        self.inner.local.lock().readonly.clone()
    }

    pub fn is_readonly(&self, property: &str) -> bool {
        self.inner.local.lock().readonly.contains_key(property)
    }

    /// Validation messages from the last response.
    pub fn errors(&self) -> ErrorBag {
        self.inner.local.lock().errors.clone()
    }

    /// True while at least one request is in flight.
    pub fn loading(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn is_deferred(&self) -> bool {
        self.inner.local.lock().paused
    }

    /// Changes and calls buffered for the next request.
    pub fn pending(&self) -> Batch {
        let local = self.inner.local.lock();
        Batch {
            changes: local.pending_changes.clone(),
            calls: local.pending_calls.clone(),
        }
    }

    /// Write `value` locally and send it as a change.
    ///
    /// Inside [`defer`](Self::defer) the change is only buffered and `None`
    /// is returned. The request fails with [`ClientError::Exceptions`] when
    /// the response reports any exception.
    pub fn update(&self, property: &str, value: Value) -> Result<Option<Pending<WireResponse>>, ClientError> {
        {
            let mut local = self.inner.local.lock();
            if local.readonly.contains_key(property) {
                return Err(ClientError::Readonly(property.to_string()));
            }

            local.state.insert(property.to_string(), value.clone());
            if local.paused {
                local.pending_changes.insert(property.to_string(), value);
                return Ok(None);
            }
        }

        let batch = Batch::default().change(property, value);
        Ok(Some(self.request_with(property, batch, |response| {
            if response.has_exceptions() {
                return Err(ClientError::Exceptions(response.metadata.exceptions));
            }
            Ok(response)
        })))
    }

    /// Buffer a change for the next request without touching local state.
    pub fn queue(&self, property: &str, value: Value) -> Result<(), ClientError> {
        let mut local = self.inner.local.lock();
        if local.readonly.contains_key(property) {
            return Err(ClientError::Readonly(property.to_string()));
        }
        local.pending_changes.insert(property.to_string(), value);
        Ok(())
    }

    /// Call a server method and resolve to its return value (`null` when the
    /// server did not run it).
    ///
    /// Inside [`defer`](Self::defer) the call is only buffered and `None` is
    /// returned.
    pub fn call(&self, method: &str, args: impl IntoIterator<Item = Value>) -> Option<Pending<Value>> {
        let args: Vec<Value> = args.into_iter().collect();
        {
            let mut local = self.inner.local.lock();
            if local.paused {
                local.pending_calls.insert(method.to_string(), args);
                return None;
            }
        }

        let name = method.to_string();
        let batch = Batch::default().call(method, args);
        Some(self.request_with(method, batch, move |mut response| {
            if response.has_exceptions() {
                return Err(match response.metadata.exceptions.remove(&name) {
                    Some(exception) => ClientError::Exception(exception),
                    None => ClientError::Exceptions(response.metadata.exceptions),
                });
            }
            Ok(response.metadata.calls.remove(&name).unwrap_or(Value::Null))
        }))
    }

    /// Send buffered and given changes and calls to `target`.
    pub fn request(&self, target: &str, batch: Batch) -> Pending<WireResponse> {
        self.request_with(target, batch, Ok)
    }

    /// Like [`request`](Self::request), passing the reconciled response
    /// through `map`. An `Err` from `map` is reported to the error watchers.
    ///
    /// Buffers are drained and the state snapshot taken immediately; only the
    /// transport round trip happens when the returned future is polled.
    pub fn request_with<T, M>(&self, target: &str, batch: Batch, map: M) -> Pending<T>
    where
        T: Send + 'static,
        M: FnOnce(WireResponse) -> Result<T, ClientError> + Send + 'static,
    {
        let request = {
            let mut local = self.inner.local.lock();

            let mut changes = std::mem::take(&mut local.pending_changes);
            changes.extend(batch.changes);
            let mut calls = std::mem::take(&mut local.pending_calls);
            calls.extend(batch.calls);

            WireRequest {
                state: local.state.clone(),
                changes,
                calls,
                readonly: local.readonly.keys().cloned().collect(),
            }
        };

        let path = route_path(&self.inner.route, &self.inner.alias, target);
        let in_flight = InFlight::enter(&self.inner);
        let proxy = self.clone();

        async move {
            log::debug!(
                "Sending {} ({} changes, {} calls)",
                path,
                request.changes.len(),
                request.calls.len()
            );

            let result = proxy.inner.transport.send(&path, &request).await;
            drop(in_flight);

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    log::warn!("Request to {} failed: {}", path, err);
                    proxy.notify_error(&err);
                    return Err(err);
                }
            };

            proxy.settle(&response);
            map(response).inspect_err(|err| proxy.notify_error(err))
        }
        .boxed()
    }

    /// Merge `new_state` into the mirror. Keys listed in `readonly` go to the
    /// readonly mirror and leave the state. A key that is already readonly
    /// only takes a new value when it is listed again.
    pub fn replace_state(&self, new_state: &WireMap, readonly: &[String]) {
        let mut local = self.inner.local.lock();

        for (key, value) in new_state {
            if readonly.iter().any(|r| r == key) {
                if local.state.remove(key).is_some() {
                    log::debug!("{}: {} is now readonly", self.inner.alias, key);
                }
                local.readonly.insert(key.clone(), value.clone());
            } else if local.readonly.contains_key(key) {
                log::debug!("{}: ignored unlisted value for readonly {}", self.inner.alias, key);
            } else {
                local.state.insert(key.clone(), value.clone());
            }
        }
    }

    /// Run `on_response` after every successful round trip, after the
    /// registry-wide watchers.
    pub fn watch(&self, on_response: impl Fn(&WireResponse) + Send + Sync + 'static) -> &Self {
        self.inner.watchers.write().on_response(on_response);
        self
    }

    /// Run `on_error` whenever a request fails.
    pub fn watch_errors(&self, on_error: impl Fn(&ClientError) + Send + Sync + 'static) -> &Self {
        self.inner.watchers.write().on_error(on_error);
        self
    }

    /// Run `f` with requests paused: updates and calls made inside are
    /// buffered and go out with the next request. The pause ends when `f`
    /// returns or unwinds.
    pub fn defer<T>(&self, f: impl FnOnce(&ComponentProxy) -> T) -> T {
        self.inner.local.lock().paused = true;
        let _resume = Resume(&self.inner);
        f(self)
    }

    /// Re-fetch the state without changes.
    pub fn refresh(&self) -> Pending<WireResponse> {
        self.request(REFRESH, Batch::default())
    }

    /// Run the component's mount handler again.
    pub fn remount(&self, args: impl IntoIterator<Item = Value>) -> Pending<WireResponse> {
        self.request(MOUNT, Batch::default().call(MOUNT, args))
    }

    pub fn ptr_eq(&self, other: &ComponentProxy) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<ProxyInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ProxyInner>) -> Option<ComponentProxy> {
        weak.upgrade().map(|inner| ComponentProxy { inner })
    }

    fn settle(&self, response: &WireResponse) {
        let global = self.inner.global.read().clone();
        global.notify_response(response);
        let watchers = self.inner.watchers.read().clone();
        watchers.notify_response(response);

        self.inner.local.lock().errors = response.metadata.errors.clone();
        self.replace_state(&response.data, &response.metadata.readonly);
    }

    fn notify_error(&self, err: &ClientError) {
        let global = self.inner.global.read().clone();
        global.notify_error(err);
        let watchers = self.inner.watchers.read().clone();
        watchers.notify_error(err);
    }
}

impl fmt::Debug for ComponentProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.inner.local.lock();
        f.debug_struct("ComponentProxy")
            .field("alias", &self.inner.alias)
            .field("state", &local.state)
            .field("readonly", &local.readonly)
            .field("loading", &(self.inner.in_flight.load(Ordering::SeqCst) > 0))
            .finish()
    }
}

struct InFlight(Arc<ProxyInner>);

impl InFlight {
    fn enter(inner: &Arc<ProxyInner>) -> Self {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(inner))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Resume<'a>(&'a ProxyInner);

impl Drop for Resume<'_> {
    fn drop(&mut self) {
        self.0.local.lock().paused = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FnTransport;
    use futures_lite::future::block_on;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use wired_common::ExceptionReport;

    fn map(value: Value) -> WireMap {
        value.as_object().cloned().unwrap()
    }

    fn proxy_with<F>(state: Value, handler: F) -> ComponentProxy
    where
        F: Fn(&str, &WireRequest) -> Result<WireResponse, ClientError> + Send + Sync + 'static,
    {
        ComponentProxy::new(
            "counter",
            map(state),
            "/wired",
            Arc::new(FnTransport::new(handler)),
            Arc::new(RwLock::new(Watchers::default())),
        )
    }

    /// Echoes state with changes applied.
    fn echo(_path: &str, request: &WireRequest) -> Result<WireResponse, ClientError> {
        let mut data = request.state.clone();
        data.extend(request.changes.clone());
        Ok(WireResponse {
            data,
            ..WireResponse::default()
        })
    }

    #[test]
    fn test_readonly_bootstrap() {
        let proxy = proxy_with(json!({ "count": 1, "readonly": { "owner": "sam" } }), echo);

        assert_eq!(proxy.state(), map(json!({ "count": 1 })));
        assert_eq!(proxy.readonly(), map(json!({ "owner": "sam" })));
        assert_eq!(proxy.get("owner"), Some(json!("sam")));
    }

    #[test]
    fn test_update_is_optimistic() {
        let proxy = proxy_with(json!({ "count": 1 }), |_: &str, _: &WireRequest| {
            Err(ClientError::Transport("offline".into()))
        });

        let pending = proxy.update("count", json!(2)).unwrap().unwrap();
        assert_eq!(proxy.get("count"), Some(json!(2)));
        assert!(proxy.loading());

        assert_eq!(block_on(pending), Err(ClientError::Transport("offline".into())));
        assert!(!proxy.loading());
        // Transport failures leave the mirror alone
        assert_eq!(proxy.get("count"), Some(json!(2)));
    }

    #[test]
    fn test_request_targets_route() {
        let proxy = proxy_with(json!({}), |path: &str, _: &WireRequest| {
            assert_eq!(path, "/wired/counter/increment");
            Ok(WireResponse::default())
        });

        block_on(proxy.call("increment", []).unwrap()).unwrap();
    }

    #[test]
    fn test_readonly_properties_cannot_be_updated() {
        let proxy = proxy_with(json!({ "readonly": { "owner": "sam" } }), echo);

        assert!(matches!(proxy.update("owner", json!("max")), Err(ClientError::Readonly(_))));
        assert!(matches!(proxy.queue("owner", json!("max")), Err(ClientError::Readonly(_))));
    }

    #[test]
    fn test_requests_carry_readonly_keys() {
        let proxy = proxy_with(
            json!({ "count": 1, "readonly": { "owner": "sam" } }),
            |_: &str, request: &WireRequest| {
                assert_eq!(request.readonly, ["owner".to_string()]);
                assert!(!request.state.contains_key("owner"));
                echo("", request)
            },
        );

        block_on(proxy.refresh()).unwrap();
        assert_eq!(proxy.get("owner"), Some(json!("sam")));
    }

    #[test]
    fn test_replace_state_moves_promoted_keys() {
        let proxy = proxy_with(json!({ "a": 1, "b": 2 }), echo);

        proxy.replace_state(&map(json!({ "a": 10, "b": 20, "c": 30 })), &["b".to_string()]);

        assert_eq!(proxy.state(), map(json!({ "a": 10, "c": 30 })));
        assert_eq!(proxy.readonly(), map(json!({ "b": 20 })));

        // Unlisted values never overwrite a readonly key
        proxy.replace_state(&map(json!({ "b": null })), &[]);
        assert_eq!(proxy.readonly(), map(json!({ "b": 20 })));
        assert!(!proxy.state().contains_key("b"));

        // Listed again, it takes the new value
        proxy.replace_state(&map(json!({ "b": 21 })), &["b".to_string()]);
        assert_eq!(proxy.readonly(), map(json!({ "b": 21 })));
    }

    #[test]
    fn test_defer_buffers_until_next_request() {
        let proxy = proxy_with(json!({ "a": 0 }), |_: &str, request: &WireRequest| {
            assert_eq!(request.changes, map(json!({ "a": 1, "b": 3 })));
            assert_eq!(request.calls.get("save"), Some(&vec![json!(true)]));
            echo("", request)
        });

        proxy.defer(|p| {
            assert!(p.update("a", json!(1)).unwrap().is_none());
            assert!(p.update("b", json!(2)).unwrap().is_none());
            assert!(p.call("save", [json!(true)]).is_none());
        });
        assert!(!proxy.is_deferred());
        assert_eq!(proxy.pending().changes.len(), 2);

        // Explicit data wins over buffered values for the same key
        block_on(proxy.update("b", json!(3)).unwrap().unwrap()).unwrap();
        assert_eq!(proxy.pending(), Batch::default());
        assert_eq!(proxy.state(), map(json!({ "a": 1, "b": 3 })));
    }

    #[test]
    fn test_defer_resumes_after_panic() {
        let proxy = proxy_with(json!({}), echo);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            proxy.defer(|p| {
                p.update("a", json!(1)).unwrap();
                panic!("boom");
            })
        }));

        assert!(result.is_err());
        assert!(!proxy.is_deferred());
        assert_eq!(proxy.pending().changes, map(json!({ "a": 1 })));
    }

    #[test]
    fn test_call_rejects_with_method_exception() {
        let proxy = proxy_with(json!({}), |_: &str, _: &WireRequest| {
            let mut response = WireResponse::default();
            response.metadata.exceptions.insert(
                "explode".into(),
                ExceptionReport {
                    message: "boom".into(),
                    exception: "Exception".into(),
                    ..ExceptionReport::default()
                },
            );
            Ok(response)
        });

        let errors = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&errors);
        proxy.watch_errors(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        match block_on(proxy.call("explode", []).unwrap()) {
            Err(ClientError::Exception(report)) => assert_eq!(report.message, "boom"),
            other => panic!("unexpected {other:?}"),
        }

        // Another method's exception rejects with the whole bag
        assert!(matches!(
            block_on(proxy.call("other", []).unwrap()),
            Err(ClientError::Exceptions(_))
        ));
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_call_resolves_to_null_when_absent() {
        let proxy = proxy_with(json!({}), echo);
        assert_eq!(block_on(proxy.call("missing", []).unwrap()), Ok(Value::Null));
    }

    #[test]
    fn test_mount_watcher_promotes_readonly() {
        let proxy = proxy_with(json!({ "name": "" }), |_: &str, _: &WireRequest| {
            let mut response = WireResponse::default();
            response.data.insert("name".into(), json!("sam"));
            response
                .metadata
                .calls
                .insert(MOUNT.into(), json!({ "user": { "id": 1 }, "name": "sam" }));
            response.metadata.readonly = vec!["user".into()];
            Ok(response)
        });

        let observed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&observed);
        let handle = proxy.clone();
        proxy.watch(move |_| {
            // Built-in mount watcher runs first
            flag.store(handle.is_readonly("user"), Ordering::SeqCst);
        });

        block_on(proxy.remount([])).unwrap();

        assert!(observed.load(Ordering::SeqCst));
        assert_eq!(proxy.readonly(), map(json!({ "user": { "id": 1 } })));
        assert_eq!(proxy.state(), map(json!({ "name": "sam" })));
    }

    #[test]
    fn test_errors_are_mirrored() {
        let proxy = proxy_with(json!({}), |_: &str, _: &WireRequest| {
            let mut response = WireResponse::default();
            response
                .metadata
                .errors
                .insert("name".into(), vec!["The name field is required.".into()]);
            Ok(response)
        });

        block_on(proxy.refresh()).unwrap();
        assert_eq!(proxy.errors()["name"], vec!["The name field is required.".to_string()]);
    }
}

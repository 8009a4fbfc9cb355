use serde_json::Value;
use wired_common::WireMap;

use crate::error::ValidationFailure;
use crate::instance::Wired;
use crate::schema::ComponentSchema;

/// Result of a lifecycle hook. `Err` is a validation failure, which the
/// runtime records and swallows at the hook boundary.
pub type HookResult<T = ()> = Result<T, ValidationFailure>;

/// A server-side component.
///
/// The struct holds the shared properties as `Option<T>` fields plus any
/// private state. A fresh instance is built from `Default` for every request,
/// so nothing survives between requests unless the client sends it back.
///
/// ```ignore
/// #[derive(Default)]
/// struct Counter {
///     count: Option<i64>,
/// }
///
/// impl Component for Counter {
///     fn schema() -> ComponentSchema<Self> {
///         ComponentSchema::builder()
///             .property(Property::new("count", |c: &Counter| &c.count, |c: &mut Counter| &mut c.count).default(json!(0)))
///             .method(Method::action("increment", |wire: &mut Wired<Counter>| {
///                 let next = wire.count.unwrap_or_default() + 1;
///                 wire.count = Some(next);
///                 Ok(next)
///             }))
///             .build()
///     }
/// }
/// ```
pub trait Component: Default + Send + 'static {
    /// Declare the shared surface. Called once at registration.
    fn schema() -> ComponentSchema<Self>;

    /// Runs before changes and calls are applied. Returning `false` (or a
    /// validation failure) skips both.
    fn hydrate(_wire: &mut Wired<Self>) -> HookResult<bool> {
        Ok(true)
    }

    /// Runs after everything else, once the state passed validation.
    fn dehydrate(_wire: &mut Wired<Self>) -> HookResult {
        Ok(())
    }

    /// Guard for every incoming change; `false` discards it.
    fn updating(_wire: &mut Wired<Self>, _property: &str, _new: &Value, _old: &Value) -> HookResult<bool> {
        Ok(true)
    }

    fn updated(_wire: &mut Wired<Self>, _property: &str, _value: &Value) -> HookResult {
        Ok(())
    }

    /// Runs once after the per-property changes, with those that survived.
    fn changed(_wire: &mut Wired<Self>, _changes: &WireMap) -> HookResult {
        Ok(())
    }
}

//! Wire-level types shared by `wired_sync` (server runtime) and
//! `wired_client` (client proxy).
//!
//! A request carries the client's last known `state`, the pending `changes`
//! and the pending `calls`; the response carries the new `data` plus a
//! [`ResponseMetadata`] bag. Both sides agree on the reserved targets
//! [`MOUNT`] and [`REFRESH`] and on the route layout produced by
//! [`route_path`].

pub mod codec;
pub mod messages;

pub use codec::{CodecError, WireJsonCodec};
pub use messages::*;

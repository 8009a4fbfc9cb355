mod json;

pub use json::{CodecError, WireJsonCodec};

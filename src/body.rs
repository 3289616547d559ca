//! Body constructors for responses of inner request listeners.

use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Bytes;

/// The response body type inner request listeners return.
pub type ResponseBody = BoxBody<Bytes, hyper::Error>;

/// Returns an empty response body.
pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// Returns a response body with contents of `chunk` which can be some type convertible into Bytes, e.g. &str.
pub fn full<T: Into<Bytes>>(chunk: T) -> ResponseBody {
    Full::new(chunk.into()).map_err(|never| match never {}).boxed()
}

//! Best-effort rewrites of the inbound event before it reaches the inner server.
//!
//! A transform never fails. If there is nothing to normalize, or the input looks wrong,
//! the event is returned as-is.

use crate::event::Event;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, warn};

/// A pure rewrite of an event. Takes the event by value and returns the new one.
pub type EventTransform = fn(Event) -> Event;

/// An ordered list of transforms applied once, first to last.
#[derive(Clone, Debug)]
pub struct Pipeline {
    transforms: Vec<EventTransform>,
}

impl Pipeline {
    pub fn new(transforms: Vec<EventTransform>) -> Self {
        Self { transforms }
    }

    /// The transforms every invocation goes through:
    /// base64 body decoding followed by the stage path rewrite.
    pub fn standard() -> Self {
        Self::new(vec![decode_base64_body, rewrite_stage_path])
    }

    /// Runs the event through all transforms in order.
    pub fn apply(&self, event: Event) -> Event {
        self.transforms.iter().fold(event, |event, transform| transform(event))
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// Replaces a base64-encoded body with its plain text and clears the flag.
///
/// Inner handlers parse the body as text/JSON and fail on an encoded one.
/// Bodies that are not valid base64 or do not decode to UTF-8 are left untouched.
/// The latter keep the flag set so the bytes survive, unlike a plain text conversion
/// which would clear it for every valid base64 body.
pub fn decode_base64_body(event: Event) -> Event {
    if !event.is_base64_encoded {
        return event;
    }

    let decoded = event
        .body
        .as_deref()
        .filter(|body| !body.is_empty())
        .map(|body| BASE64.decode(body));

    let decoded = match decoded {
        None => return event,
        Some(Ok(v)) => v,
        Some(Err(e)) => {
            warn!("Body is flagged as base64, but cannot be decoded: {:?}", e);
            return event;
        }
    };

    match String::from_utf8(decoded) {
        Ok(body) => Event {
            body: Some(body),
            is_base64_encoded: false,
            ..event
        },
        Err(e) => {
            // binary payloads stay encoded and are decoded into raw bytes by the proxy
            debug!("Decoded body is not UTF-8, leaving it encoded: {}", e);
            event
        }
    }
}

/// For GET requests, replaces `path` with `requestContext.path` if the latter is present.
///
/// When the API is reached via a stage, e.g. `/stage/graphql`, the event path and the
/// path the inner server expects differ. The request context path is authoritative.
pub fn rewrite_stage_path(event: Event) -> Event {
    if event.http_method != "GET" {
        return event;
    }

    debug!(
        "Stage path rewrite: path: {}, requestContext: {:?}",
        event.path, event.request_context
    );

    match event.request_context_path().map(str::to_owned) {
        Some(path) => Event { path, ..event },
        None => event,
    }
}

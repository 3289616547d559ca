//! Drives one request/response cycle of a socket-based HTTP handler without a listening socket.
//!
//! The event is turned into an HTTP/1.1 request and written into one end of an in-memory
//! duplex stream. The inner server is served by hyper on the other end, exactly as if the
//! request had come over TCP. The response is read back and converted into the API Gateway shape.

use crate::body::ResponseBody;
use crate::completion::{CompletionBridge, Outcome};
use crate::config::Config;
use crate::error::{BoxError, BridgeError, Result};
use crate::event::{Event, InvocationContext};
use crate::response::ProxyResponse;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{Method, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Size of the in-memory buffer between the synthetic client and the inner server.
const DUPLEX_BUFFER_SIZE: usize = 64 * 1024;

/// Name of the header carrying the percent-encoded JSON of the original event.
pub const EVENT_HEADER: &str = "x-apigateway-event";
/// Name of the header carrying the percent-encoded JSON of the invocation context.
pub const CONTEXT_HEADER: &str = "x-apigateway-context";

/// Encoded JSON headers longer than this are not forwarded.
/// hyper rejects the whole request head with 431 well before API Gateway limits are reached.
const MAX_JSON_HEADER_LEN: usize = 64 * 1024;

/// Returned to hyper in place of the listener's error, which is captured separately.
#[derive(Debug, Error)]
#[error("inner request listener failed")]
struct HandlerFailed;

type ServiceFuture = Pin<Box<dyn Future<Output = std::result::Result<Response<ResponseBody>, HandlerFailed>> + Send>>;

pub type ListenerFuture = Pin<Box<dyn Future<Output = std::result::Result<Response<ResponseBody>, BoxError>> + Send>>;

/// The request handler of the inner application, e.g. its router.
/// Returning an error is the equivalent of the handler throwing.
pub type RequestListener = Arc<dyn Fn(Request<Incoming>) -> ListenerFuture + Send + Sync>;

/// Converts an async function or closure into a [RequestListener].
pub fn listener_fn<F, Fut>(f: F) -> RequestListener
where
    F: Fn(Request<Incoming>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<Response<ResponseBody>, BoxError>> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)) as ListenerFuture)
}

/// A handle to the inner server. Cheap to clone and safe to share between concurrent invocations.
#[derive(Clone)]
pub struct InnerServer {
    listener: RequestListener,
    config: Arc<Config>,
}

impl InnerServer {
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for InnerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InnerServer").field("config", &self.config).finish()
    }
}

/// Wraps the request listener into a server the proxy can drive.
pub fn create_server(listener: RequestListener, config: Config) -> InnerServer {
    InnerServer {
        listener,
        config: Arc::new(config),
    }
}

/// How the proxy reports its outcome.
#[derive(Debug)]
pub enum Resolution {
    /// The outcome is passed to the completion bridge by the proxy itself and is also returned.
    Callback(CompletionBridge),
    /// The outcome is only returned.
    Promise,
}

/// Runs one request/response cycle of the inner server for the event.
///
/// Produces exactly one outcome: the inner server's response or the error that ended the cycle.
/// There is no timeout. The invocation environment is expected to enforce one.
pub async fn proxy(server: &InnerServer, event: Event, context: &InvocationContext, resolution: Resolution) -> Outcome {
    info!("Proxying {} {}", event.http_method, event.path);

    let outcome = forward(server, &event, context).await;

    match &outcome {
        Ok(v) => info!("Inner server responded with {}", v.status_code),
        Err(e) => warn!("Inner server failed: {}", e),
    }

    if let Resolution::Callback(bridge) = resolution {
        bridge.complete(outcome.clone());
    }

    outcome
}

async fn forward(server: &InnerServer, event: &Event, context: &InvocationContext) -> Outcome {
    let request = build_request(event, context, &server.config)?;
    debug!("Synthetic request: {:?}", request);

    let (client_io, server_io) = tokio::io::duplex(DUPLEX_BUFFER_SIZE);

    // the error returned by the listener, if any
    // hyper only reports that the connection was closed, so it has to be captured here
    let handler_error: Arc<Mutex<Option<Arc<dyn std::error::Error + Send + Sync>>>> = Arc::new(Mutex::new(None));

    let listener = server.listener.clone();
    let captured = handler_error.clone();
    let service = service_fn(move |req: Request<Incoming>| -> ServiceFuture {
        let listener = listener.clone();
        let captured = captured.clone();
        Box::pin(async move {
            listener(req).await.map_err(|e| {
                let e: Arc<dyn std::error::Error + Send + Sync> = Arc::from(e);
                match captured.lock() {
                    Ok(mut slot) => *slot = Some(e),
                    Err(poisoned) => *poisoned.into_inner() = Some(e),
                }
                HandlerFailed
            })
        })
    });

    let server_conn = tokio::spawn(async move {
        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(server_io), service)
            .await
        {
            debug!("Inner server connection error: {:?}", e);
        }
    });

    let (mut sender, client_conn) = hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(client_io)).await?;
    tokio::spawn(async move {
        if let Err(e) = client_conn.await {
            debug!("Synthetic client connection error: {:?}", e);
        }
    });

    let response = match sender.send_request(request).await {
        Ok(resp) => {
            let (parts, body) = resp.into_parts();
            body.collect().await.map(|body| (parts, body.to_bytes()))
        }
        Err(e) => Err(e),
    };

    // closing the client side lets the inner server connection finish
    drop(sender);

    match response {
        Ok((parts, body)) => Ok(ProxyResponse::from_parts(
            parts.status.as_u16(),
            &parts.headers,
            &body,
            &server.config,
        )),
        Err(e) => {
            // wait for the server side to wind down to be sure the handler error was recorded
            if let Err(join_err) = server_conn.await {
                warn!("Inner server task failed: {:?}", join_err);
            }
            let handler_error = match handler_error.lock() {
                Ok(mut slot) => slot.take(),
                Err(poisoned) => poisoned.into_inner().take(),
            };
            match handler_error {
                Some(handler_error) => Err(BridgeError::Handler(handler_error)),
                None => Err(BridgeError::from(e)),
            }
        }
    }
}

/// Converts the event into an HTTP request for the inner server.
pub(crate) fn build_request(event: &Event, context: &InvocationContext, config: &Config) -> Result<Request<Full<Bytes>>> {
    let method = Method::from_bytes(event.http_method.as_bytes())
        .map_err(|e| BridgeError::InvalidRequest(format!("invalid method {:?}: {}", event.http_method, e)))?;

    let uri = request_uri(event);
    let uri = uri
        .parse::<Uri>()
        .map_err(|e| BridgeError::InvalidRequest(format!("invalid URI {}: {}", uri, e)))?;

    let body = Bytes::from(event.body_bytes());
    let body_len = body.len();

    let mut request = Request::new(Full::new(body));
    *request.method_mut() = method;
    *request.uri_mut() = uri;

    let headers = request.headers_mut();
    for (name, value) in event_headers(event) {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Skipping invalid request header {}: {}", name, value),
        }
    }

    // the body is sent in full, so any framing from the original request does not apply
    headers.remove(TRANSFER_ENCODING);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body_len));

    if !headers.contains_key(HOST) {
        let host = HeaderValue::from_str(&config.default_host)
            .map_err(|e| BridgeError::InvalidRequest(format!("invalid host {}: {}", config.default_host, e)))?;
        headers.insert(HOST, host);
    }

    if config.forward_event_headers {
        // the body is already the body of the request
        if let Some(value) = encoded_json_header(EVENT_HEADER, &without_body(event))? {
            headers.insert(EVENT_HEADER, value);
        }
        if let Some(value) = encoded_json_header(CONTEXT_HEADER, context)? {
            headers.insert(CONTEXT_HEADER, value);
        }
    }

    Ok(request)
}

/// Path plus the query string. Multi-value query parameters take precedence over single-value ones.
fn request_uri(event: &Event) -> String {
    let path = if event.path.is_empty() { "/" } else { event.path.as_str() };
    let path = encode_path(path);

    let params: BTreeMap<&str, Vec<&str>> = match (
        &event.multi_value_query_string_parameters,
        &event.query_string_parameters,
    ) {
        (Some(multi), _) => multi
            .iter()
            .map(|(k, v)| (k.as_str(), v.iter().map(String::as_str).collect::<Vec<&str>>()))
            .collect(),
        (None, Some(single)) => single.iter().map(|(k, v)| (k.as_str(), vec![v.as_str()])).collect(),
        (None, None) => BTreeMap::new(),
    };

    let query = params
        .iter()
        .flat_map(|(k, values)| {
            values
                .iter()
                .map(move |v| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        })
        .collect::<Vec<String>>()
        .join("&");

    if query.is_empty() {
        path
    } else {
        [path, query].join("?")
    }
}

/// Percent-encodes the characters that are not allowed in a URI path.
/// Sub-delimiters, `:` and `@` are kept as-is, and so are existing `%XX` escapes.
fn encode_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut encoded = String::with_capacity(path.len());

    for (i, c) in path.char_indices() {
        let keep = match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~' | '/' | ':' | '@' => true,
            '!' | '$' | '&' | '\'' | '(' | ')' | '*' | '+' | ',' | ';' | '=' => true,
            '%' => bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)),
            _ => false,
        };

        if keep {
            encoded.push(c);
        } else {
            encoded.push_str(&urlencoding::encode(c.encode_utf8(&mut [0; 4])));
        }
    }

    encoded
}

/// Multi-value headers take precedence over single-value ones.
fn event_headers(event: &Event) -> Vec<(String, String)> {
    match (&event.multi_value_headers, &event.headers) {
        (Some(multi), _) => multi
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (k.clone(), v.clone())))
            .collect(),
        (None, Some(single)) => single.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        (None, None) => Vec::new(),
    }
}

/// A copy of the event for [EVENT_HEADER], without the body.
fn without_body(event: &Event) -> Event {
    Event {
        http_method: event.http_method.clone(),
        path: event.path.clone(),
        headers: event.headers.clone(),
        multi_value_headers: event.multi_value_headers.clone(),
        query_string_parameters: event.query_string_parameters.clone(),
        multi_value_query_string_parameters: event.multi_value_query_string_parameters.clone(),
        body: None,
        is_base64_encoded: event.is_base64_encoded,
        request_context: event.request_context.clone(),
        other: event.other.clone(),
    }
}

/// Returns `None` if the encoded value is too long to be sent as a header.
fn encoded_json_header<T: serde::Serialize>(name: &str, value: &T) -> Result<Option<HeaderValue>> {
    let json = serde_json::to_string(value)?;
    let encoded = urlencoding::encode(&json);

    if encoded.len() > MAX_JSON_HEADER_LEN {
        warn!("{} is {} bytes long and is not forwarded", name, encoded.len());
        return Ok(None);
    }

    HeaderValue::from_str(&encoded)
        .map(Some)
        .map_err(|e| BridgeError::InvalidRequest(format!("cannot encode {} header: {}", name, e)))
}

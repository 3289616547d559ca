use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use lambda_http_bridge::body::{full, ResponseBody};
use lambda_http_bridge::proxy::listener_fn;
use lambda_http_bridge::{create_server, BoxError, CompletionCallback, Config, Event, LambdaBridge, ProxyResponse};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::json;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, info};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

/// Built once per container and reused by all invocations.
static BRIDGE: OnceLock<LambdaBridge> = OnceLock::new();

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    let config = Config::from_env();
    info!("Binary MIME types: {:?}", config.binary_mime_types);

    let bridge = BRIDGE.get_or_init(|| LambdaBridge::new(create_server(listener_fn(sample_app), config)));

    if let Err(e) = lambda_runtime::run(service_fn(|event: LambdaEvent<Event>| my_handler(bridge, event))).await {
        debug!("Runtime error: {:?}", e);
        return Err(e);
    }

    Ok(())
}

/// Turns the callback contract of the bridge into the returned value lambda_runtime expects.
async fn my_handler(bridge: &LambdaBridge, event: LambdaEvent<Event>) -> Result<ProxyResponse, Error> {
    let (event, ctx) = event.into_parts();

    let (callback, outcome) = CompletionCallback::channel();
    let state = bridge.handle(event, ctx.into(), callback).await;
    debug!("Invocation completed: {:?}", state);

    Ok(outcome.await??)
}

/// A stand-in for the inner application: echoes the request back as JSON.
async fn sample_app(req: Request<Incoming>) -> Result<Response<ResponseBody>, BoxError> {
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().unwrap_or_default().to_owned();

    let body = req.into_body().collect().await?.to_bytes();
    let body = serde_json::from_slice::<serde_json::Value>(&body)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&body).into_owned()));

    let payload = json!({
        "method": method,
        "path": path,
        "query": query,
        "body": body,
    });

    let resp = Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "application/json")
        .body(full(payload.to_string()))?;

    Ok(resp)
}

/// Initializes the tracing from RUST_LOG env var if present or sets minimal logging:
/// - INFO for the bridge
/// - ERROR for everything else
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(
                    Directive::from_str("lambda_http_bridge=info").expect("Invalid logging filter. It's a bug."),
                )
                .from_env_lossy(),
        )
        .with_ansi(false)
        .without_time()
        .compact()
        .init();
}

use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use lambda_http_bridge::body::{empty, full, ResponseBody};
use lambda_http_bridge::proxy::{listener_fn, CONTEXT_HEADER, EVENT_HEADER};
use lambda_http_bridge::{
    create_server, proxy, BoxError, BridgeError, CompletionBridge, CompletionCallback, CompletionState, Config, Event,
    InnerServer, InvocationContext, LambdaBridge, Outcome, Resolution,
};
use serde_json::{json, Value};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replies with the method, path, query and body it received as JSON.
async fn echo(req: Request<Incoming>) -> Result<Response<ResponseBody>, BoxError> {
    let method = req.method().to_string();
    let path = req.uri().path().to_owned();
    let query = req.uri().query().map(str::to_owned);
    let has_event_header = req.headers().contains_key(EVENT_HEADER);
    let context = req
        .headers()
        .get(CONTEXT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| urlencoding::decode(v).ok())
        .and_then(|v| serde_json::from_str::<Value>(&v).ok());

    let body = req.into_body().collect().await?.to_bytes();

    let payload = json!({
        "method": method,
        "path": path,
        "query": query,
        "body": String::from_utf8_lossy(&body),
        "hasEventHeader": has_event_header,
        "context": context,
    });

    Ok(Response::builder()
        .status(200)
        .header("content-type", "application/json")
        .body(full(payload.to_string()))?)
}

fn echo_server() -> InnerServer {
    create_server(listener_fn(echo), Config::default())
}

/// A callback that records every outcome it receives.
fn recording_callback() -> (CompletionCallback, Arc<AtomicUsize>, Arc<Mutex<Vec<Outcome>>>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let (c, o) = (calls.clone(), outcomes.clone());
    let callback = CompletionCallback::new(move |outcome| {
        c.fetch_add(1, Ordering::SeqCst);
        o.lock().unwrap().push(outcome);
    });
    (callback, calls, outcomes)
}

fn event(value: Value) -> Event {
    serde_json::from_value(value).unwrap()
}

async fn handle(bridge: &LambdaBridge, event: Event) -> (CompletionState, usize, Outcome) {
    let (callback, calls, outcomes) = recording_callback();
    let state = bridge.handle(event, InvocationContext::default(), callback).await;
    let outcome = outcomes.lock().unwrap().pop().expect("callback was not invoked");
    (state, calls.load(Ordering::SeqCst), outcome)
}

fn body_json(outcome: &Outcome) -> Value {
    let resp = outcome.as_ref().expect("expected a response");
    serde_json::from_str(&resp.body).unwrap()
}

#[tokio::test]
async fn get_through_stage_uses_request_context_path() {
    let bridge = LambdaBridge::new(echo_server());
    let (state, calls, outcome) = handle(
        &bridge,
        event(json!({
            "httpMethod": "GET",
            "path": "/stage/graphql",
            "isBase64Encoded": false,
            "requestContext": { "path": "/graphql" }
        })),
    )
    .await;

    assert_eq!(state, CompletionState::Resolved);
    assert_eq!(calls, 1);
    let body = body_json(&outcome);
    assert_eq!(body["method"], "GET");
    assert_eq!(body["path"], "/graphql");
}

#[tokio::test]
async fn encoded_post_body_reaches_handler_decoded() {
    let bridge = LambdaBridge::new(echo_server());
    let (_, calls, outcome) = handle(
        &bridge,
        event(json!({
            "httpMethod": "POST",
            "path": "/graphql",
            "body": "eyJhIjoxfQ==",
            "isBase64Encoded": true,
            "requestContext": { "path": "/other" }
        })),
    )
    .await;

    assert_eq!(calls, 1);
    let body = body_json(&outcome);
    assert_eq!(body["body"], r#"{"a":1}"#);
    // POST paths are never rewritten
    assert_eq!(body["path"], "/graphql");
}

#[tokio::test]
async fn successful_response_is_passed_verbatim() {
    let server = create_server(
        listener_fn(|_req| async {
            Ok::<_, BoxError>(
                Response::builder()
                    .status(200)
                    .header("content-type", "application/json")
                    .body(full(r#"{"data":{}}"#))?,
            )
        }),
        Config::default(),
    );
    let bridge = LambdaBridge::new(server);
    let (state, calls, outcome) = handle(&bridge, event(json!({ "httpMethod": "POST", "path": "/graphql" }))).await;

    assert_eq!(state, CompletionState::Resolved);
    assert_eq!(calls, 1);
    let resp = outcome.unwrap();
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body, r#"{"data":{}}"#);
    assert!(!resp.is_base64_encoded);
    assert_eq!(resp.headers.get("content-type").map(String::as_str), Some("application/json"));
}

#[tokio::test]
async fn handler_error_is_passed_verbatim() {
    let server = create_server(
        listener_fn(|_req| async {
            Err::<Response<ResponseBody>, BoxError>(Box::new(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
        }),
        Config::default(),
    );
    let bridge = LambdaBridge::new(server);
    let (state, calls, outcome) = handle(&bridge, event(json!({ "httpMethod": "GET", "path": "/" }))).await;

    assert_eq!(state, CompletionState::Rejected);
    assert_eq!(calls, 1);
    match outcome {
        Err(BridgeError::Handler(e)) => {
            let io_err = e.downcast_ref::<io::Error>().expect("not an io::Error");
            assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn panicking_handler_is_a_transport_error() {
    let server = create_server(
        listener_fn(|_req| async {
            if true {
                panic!("inner handler panicked");
            }
            Ok::<_, BoxError>(Response::new(empty()))
        }),
        Config::default(),
    );
    let bridge = LambdaBridge::new(server);
    let (state, calls, outcome) = handle(&bridge, event(json!({ "httpMethod": "GET", "path": "/" }))).await;

    assert_eq!(state, CompletionState::Rejected);
    assert_eq!(calls, 1);
    assert!(matches!(outcome, Err(BridgeError::Transport(_))));
}

#[tokio::test]
async fn malformed_event_is_rejected_once() {
    let bridge = LambdaBridge::new(echo_server());
    let (state, calls, outcome) = handle(&bridge, event(json!({ "path": "/graphql" }))).await;

    assert_eq!(state, CompletionState::Rejected);
    assert_eq!(calls, 1);
    assert!(matches!(outcome, Err(BridgeError::InvalidRequest(_))));
}

#[tokio::test]
async fn query_string_and_context_reach_handler() {
    let bridge = LambdaBridge::new(echo_server());
    let (callback, _, outcomes) = recording_callback();
    let context = InvocationContext {
        aws_request_id: "req-1".to_owned(),
        function_name: "graphql".to_owned(),
        ..Default::default()
    };

    bridge
        .handle(
            event(json!({
                "httpMethod": "GET",
                "path": "/search",
                "multiValueQueryStringParameters": { "tag": ["a", "b c"] }
            })),
            context,
            callback,
        )
        .await;

    let outcome = outcomes.lock().unwrap().pop().unwrap();
    let body = body_json(&outcome);
    assert_eq!(body["query"], "tag=a&tag=b%20c");
    assert_eq!(body["hasEventHeader"], true);
    assert_eq!(body["context"]["awsRequestId"], "req-1");
    assert_eq!(body["context"]["functionName"], "graphql");
}

#[tokio::test]
async fn binary_responses_are_base64_encoded() {
    let config = Config {
        binary_mime_types: vec!["image/*".to_owned()],
        ..Default::default()
    };
    let server = create_server(
        listener_fn(|_req| async {
            Ok::<_, BoxError>(
                Response::builder()
                    .status(200)
                    .header("content-type", "image/png")
                    .body(full(vec![0x89_u8, b'P', b'N', b'G', 0xff]))?,
            )
        }),
        config,
    );
    let bridge = LambdaBridge::new(server);
    let (_, _, outcome) = handle(&bridge, event(json!({ "httpMethod": "GET", "path": "/logo.png" }))).await;

    let resp = outcome.unwrap();
    assert!(resp.is_base64_encoded);
    assert_eq!(resp.body, "iVBOR/8=");
}

#[tokio::test]
async fn promise_resolution_does_not_touch_any_callback() {
    let server = echo_server();
    let outcome = proxy(
        &server,
        event(json!({ "httpMethod": "DELETE", "path": "/items/1" })),
        &InvocationContext::default(),
        Resolution::Promise,
    )
    .await;

    let body = body_json(&outcome);
    assert_eq!(body["method"], "DELETE");
    assert_eq!(body["path"], "/items/1");
}

#[tokio::test]
async fn callback_resolution_completes_once_when_both_paths_fire() {
    let server = echo_server();
    let (callback, calls, _) = recording_callback();
    let completion = CompletionBridge::new(callback);

    let outcome = proxy(
        &server,
        event(json!({ "httpMethod": "GET", "path": "/" })),
        &InvocationContext::default(),
        Resolution::Callback(completion.clone()),
    )
    .await;

    // the proxy already completed through the callback path
    assert_eq!(completion.state(), CompletionState::Resolved);
    assert!(!completion.complete(outcome));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_invocations_are_isolated() {
    let bridge = Arc::new(LambdaBridge::new(echo_server()));

    let tasks = (0..16)
        .map(|i| {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                let path = format!("/items/{}", i);
                let (_, calls, outcome) = handle(&bridge, event(json!({ "httpMethod": "GET", "path": path }))).await;
                (path, calls, outcome)
            })
        })
        .collect::<Vec<_>>();

    for task in tasks {
        let (path, calls, outcome) = task.await.unwrap();
        assert_eq!(calls, 1);
        assert_eq!(body_json(&outcome)["path"], path.as_str());
    }
}

#[tokio::test]
async fn channel_callback_returns_the_outcome() {
    let bridge = LambdaBridge::new(echo_server());
    let (callback, rx) = CompletionCallback::channel();

    let state = bridge
        .handle(event(json!({ "httpMethod": "GET", "path": "/" })), InvocationContext::default(), callback)
        .await;

    assert_eq!(state, CompletionState::Resolved);
    let resp = rx.await.unwrap().unwrap();
    assert_eq!(resp.status_code, 200);
}

#[tokio::test]
async fn large_post_body_reaches_handler() {
    let server = create_server(
        listener_fn(|req: Request<Incoming>| async move {
            let has_event_header = req.headers().contains_key(EVENT_HEADER);
            let body = req.into_body().collect().await?.to_bytes();
            Ok::<_, BoxError>(Response::new(full(format!("len={} event={}", body.len(), has_event_header))))
        }),
        Config::default(),
    );
    let bridge = LambdaBridge::new(server);
    let body = "{ a b } ".repeat(160_000);

    let (state, calls, outcome) = handle(
        &bridge,
        event(json!({ "httpMethod": "POST", "path": "/graphql", "body": body })),
    )
    .await;

    assert_eq!(state, CompletionState::Resolved);
    assert_eq!(calls, 1);
    let resp = outcome.unwrap();
    assert_eq!(resp.status_code, 200);
    assert_eq!(resp.body, "len=1280000 event=true");
}

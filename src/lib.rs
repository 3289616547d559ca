//! Runs a socket-based HTTP handler inside AWS Lambda.
//!
//! An API Gateway proxy event is normalized by a [Pipeline] of transforms, replayed against the
//! inner server as an HTTP/1.1 request over an in-memory stream, and the response is reported
//! exactly once through a [CompletionCallback].

pub mod body;
pub mod bridge;
pub mod completion;
pub mod config;
pub mod error;
pub mod event;
pub mod proxy;
pub mod response;
pub mod transforms;

pub use bridge::LambdaBridge;
pub use completion::{CompletionBridge, CompletionCallback, CompletionState, Outcome};
pub use config::Config;
pub use error::{BoxError, BridgeError};
pub use event::{Event, InvocationContext};
pub use proxy::{create_server, proxy, InnerServer, RequestListener, Resolution};
pub use response::ProxyResponse;
pub use transforms::{decode_base64_body, rewrite_stage_path, EventTransform, Pipeline};

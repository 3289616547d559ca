use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// An API Gateway REST proxy event, i.e. one inbound HTTP request delivered to the lambda.
///
/// Only the fields the bridge works with are typed. Everything else is kept in `other`
/// so that it survives the transforms and can be forwarded to the inner server unchanged.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub http_method: String,
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_value_headers: Option<HashMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_value_query_string_parameters: Option<HashMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    /// Opaque. May contain an alternate `path`, see [Event::request_context_path].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_context: Option<Map<String, Value>>,
    /// Any other fields of the event, e.g. `resource` or `stageVariables`.
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl Event {
    /// Returns `requestContext.path` if it is present and is a non-empty string.
    pub fn request_context_path(&self) -> Option<&str> {
        self.request_context
            .as_ref()?
            .get("path")?
            .as_str()
            .filter(|path| !path.is_empty())
    }

    /// Returns the body as raw bytes, decoding it from base64 if the event says it is encoded.
    /// A body that fails to decode is passed through as text.
    pub fn body_bytes(&self) -> Vec<u8> {
        let body = match &self.body {
            Some(v) => v,
            None => return Vec::new(),
        };

        if self.is_base64_encoded {
            if let Ok(decoded) = BASE64.decode(body) {
                return decoded;
            }
        }

        body.as_bytes().to_vec()
    }
}

/// Invocation metadata passed through to the inner server.
/// A serializable subset of `lambda_runtime::Context`.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvocationContext {
    pub aws_request_id: String,
    /// Execution deadline in ms since epoch
    pub deadline: u64,
    pub invoked_function_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xray_trace_id: Option<String>,
    pub function_name: String,
    pub function_version: String,
    pub memory_limit_in_mb: i32,
    pub log_group_name: String,
    pub log_stream_name: String,
}

impl From<lambda_runtime::Context> for InvocationContext {
    fn from(ctx: lambda_runtime::Context) -> Self {
        Self {
            aws_request_id: ctx.request_id,
            deadline: ctx.deadline,
            invoked_function_arn: ctx.invoked_function_arn,
            xray_trace_id: ctx.xray_trace_id,
            function_name: ctx.env_config.function_name.clone(),
            function_version: ctx.env_config.version.clone(),
            memory_limit_in_mb: ctx.env_config.memory,
            log_group_name: ctx.env_config.log_group.clone(),
            log_stream_name: ctx.env_config.log_stream.clone(),
        }
    }
}

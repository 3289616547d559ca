use crate::config::Config;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::header::{CONTENT_TYPE, TRANSFER_ENCODING};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// The response returned to API Gateway as the result of the invocation.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub multi_value_headers: HashMap<String, Vec<String>>,
    pub body: String,
    pub is_base64_encoded: bool,
}

impl ProxyResponse {
    /// Converts the response of the inner server into the API Gateway shape.
    ///
    /// The body is base64-encoded if its content type is listed as binary in the config.
    pub fn from_parts(status: u16, headers: &HeaderMap, body: &[u8], config: &Config) -> Self {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let is_base64_encoded = config.is_binary_mime_type(content_type);

        let body = if is_base64_encoded {
            BASE64.encode(body)
        } else {
            match std::str::from_utf8(body) {
                Ok(v) => v.to_owned(),
                Err(e) => {
                    warn!(
                        "Non-UTF-8 response body from the inner server. Add its content type to BRIDGE_BINARY_MIME_TYPES. {:?}\n{}",
                        e,
                        hex::encode(body)
                    );
                    String::from_utf8_lossy(body).into_owned()
                }
            }
        };

        let (headers, multi_value_headers) = convert_headers(headers);

        Self {
            status_code: status,
            headers,
            multi_value_headers,
            body,
            is_base64_encoded,
        }
    }
}

/// Splits the headers into single- and multi-value maps.
/// Repeated headers are joined with `,` in the single-value map.
/// `transfer-encoding: chunked` is dropped because API Gateway returns the body in one piece.
fn convert_headers(headers: &HeaderMap) -> (HashMap<String, String>, HashMap<String, Vec<String>>) {
    let mut single = HashMap::new();
    let mut multi: HashMap<String, Vec<String>> = HashMap::new();

    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .filter_map(|v| match v.to_str() {
                Ok(v) => Some(v.to_owned()),
                Err(_) => {
                    warn!("Dropping non-ASCII value of response header {}", name);
                    None
                }
            })
            .collect::<Vec<String>>();

        if *name == TRANSFER_ENCODING && values.iter().any(|v| v.eq_ignore_ascii_case("chunked")) {
            continue;
        }
        if values.is_empty() {
            continue;
        }

        single.insert(name.as_str().to_owned(), values.join(","));
        multi.insert(name.as_str().to_owned(), values);
    }

    (single, multi)
}

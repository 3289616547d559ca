use std::env::var;
use tracing::{debug, warn};

/// Default value for the `host` header of synthetic requests
pub const DEFAULT_HOST: &str = "localhost";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Response content types that are returned to API Gateway base64-encoded,
    /// e.g. `image/png`, `image/*` or `*/*`.
    /// Set via BRIDGE_BINARY_MIME_TYPES as a comma-separated list.
    pub binary_mime_types: Vec<String>,
    /// Adds `x-apigateway-event` and `x-apigateway-context` headers to the synthetic request
    /// so the inner server can look at the raw event and the invocation context.
    /// Set via BRIDGE_FORWARD_EVENT_HEADERS, defaults to true.
    pub forward_event_headers: bool,
    /// The `host` header of synthetic requests if the event has none.
    /// Set via BRIDGE_DEFAULT_HOST.
    pub default_host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binary_mime_types: Vec::new(),
            forward_event_headers: true,
            default_host: DEFAULT_HOST.to_owned(),
        }
    }
}

impl Config {
    /// Creates a new Config instance from environment variables.
    /// Uses default values for missing or invalid variables. Does not panic.
    pub fn from_env() -> Self {
        let config = Self::from_vars(
            var("BRIDGE_BINARY_MIME_TYPES").ok(),
            var("BRIDGE_FORWARD_EVENT_HEADERS").ok(),
            var("BRIDGE_DEFAULT_HOST").ok(),
        );
        debug!("Config: {:?}", config);
        config
    }

    /// Builds the config out of raw values, as if they were read from env vars.
    fn from_vars(
        binary_mime_types: Option<String>,
        forward_event_headers: Option<String>,
        default_host: Option<String>,
    ) -> Self {
        let defaults = Self::default();

        let binary_mime_types = match binary_mime_types {
            Some(v) => parse_mime_list(&v),
            None => defaults.binary_mime_types,
        };

        let forward_event_headers = match forward_event_headers.as_deref().map(str::trim) {
            None => defaults.forward_event_headers,
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
            Some(v) => {
                warn!(
                    "Invalid BRIDGE_FORWARD_EVENT_HEADERS value: {}. Using the default: {}",
                    v, defaults.forward_event_headers
                );
                defaults.forward_event_headers
            }
        };

        let default_host = match default_host.map(|v| v.trim().to_owned()) {
            Some(v) if !v.is_empty() => v,
            _ => defaults.default_host,
        };

        Self {
            binary_mime_types,
            forward_event_headers,
            default_host,
        }
    }

    /// Returns true if a response with this `content-type` should be base64-encoded.
    /// Parameters such as `; charset=utf-8` are ignored.
    pub fn is_binary_mime_type(&self, content_type: &str) -> bool {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime.is_empty() {
            return false;
        }

        self.binary_mime_types.iter().any(|pattern| {
            if pattern == "*/*" || *pattern == mime {
                return true;
            }
            // e.g. image/* matches image/png
            match pattern.strip_suffix("/*") {
                Some(prefix) => mime.split_once('/').map_or(false, |(kind, _)| kind == prefix),
                None => false,
            }
        })
    }
}

fn parse_mime_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|v| v.trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

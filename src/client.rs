use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::protocol::CONNECT_HEADERS;
use crate::utils::parse_headers_with_escapes;

/// Configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    /// Idle connections kept per host; sized to the VU ceiling so each VU can
    /// reuse a connection.
    pub max_idle_per_host: usize,
    pub custom_headers: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_idle_per_host: 200,
            custom_headers: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid header format in CUSTOM_HEADERS: '{0}'. Expected 'Name:Value'.")]
    HeaderFormat(String),

    #[error("Invalid header name '{name}': {message}")]
    HeaderName { name: String, message: String },

    #[error("Invalid header value for '{name}': {message}")]
    HeaderValue { name: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Result of building the client, includes the default headers for logging.
pub struct ClientBuildResult {
    pub client: reqwest::Client,
    pub default_headers: HeaderMap,
}

/// Builds a reqwest client that sends the Connect headers on every request.
pub fn build_client(config: &ClientConfig) -> Result<ClientBuildResult, ClientError> {
    let mut default_headers = HeaderMap::new();
    for (name, value) in CONNECT_HEADERS {
        default_headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }

    let custom = configure_custom_headers(config.custom_headers.as_deref())?;
    if !custom.is_empty() {
        info!(count = custom.len(), "Configured custom default headers");
    }
    for (name, value) in custom.iter() {
        if default_headers.contains_key(name) {
            warn!(header = %name, "Custom header overrides a Connect protocol header");
        }
        default_headers.insert(name.clone(), value.clone());
    }

    let client = reqwest::Client::builder()
        .default_headers(default_headers.clone())
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(config.max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_nodelay(true)
        .build()?;

    info!(
        timeout = ?config.request_timeout,
        max_idle_per_host = config.max_idle_per_host,
        "HTTP client configured"
    );

    Ok(ClientBuildResult {
        client,
        default_headers,
    })
}

fn configure_custom_headers(custom_headers_str: Option<&str>) -> Result<HeaderMap, ClientError> {
    let mut parsed_headers = HeaderMap::new();

    let headers_str = match custom_headers_str {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Ok(parsed_headers),
    };

    for header_pair_str in parse_headers_with_escapes(headers_str) {
        let trimmed = header_pair_str.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (name_str, value_str) = match trimmed.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => (name.trim(), value.trim()),
            _ => return Err(ClientError::HeaderFormat(trimmed.to_string())),
        };

        let header_name = HeaderName::from_str(name_str).map_err(|e| ClientError::HeaderName {
            name: name_str.to_string(),
            message: e.to_string(),
        })?;
        let header_value =
            HeaderValue::from_str(value_str).map_err(|e| ClientError::HeaderValue {
                name: name_str.to_string(),
                message: e.to_string(),
            })?;

        parsed_headers.insert(header_name, header_value);
    }

    Ok(parsed_headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_headers_include_connect_protocol() {
        let result = build_client(&ClientConfig::default()).unwrap();
        let headers = result.default_headers;

        assert_eq!(headers.get("content-type").unwrap(), "application/json");
        assert_eq!(headers.get("connect-protocol-version").unwrap(), "1");
        assert_eq!(headers.get("accept").unwrap(), "application/json");
    }

    #[test]
    fn test_custom_headers_are_added() {
        let config = ClientConfig {
            custom_headers: Some("Authorization:Bearer abc,X-Tags:a\\,b".to_string()),
            ..ClientConfig::default()
        };
        let headers = build_client(&config).unwrap().default_headers;

        assert_eq!(headers.get("authorization").unwrap(), "Bearer abc");
        assert_eq!(headers.get("x-tags").unwrap(), "a,b");
        assert_eq!(headers.len(), 5);
    }

    #[test]
    fn test_malformed_custom_header_is_rejected() {
        let config = ClientConfig {
            custom_headers: Some("NoColonHere".to_string()),
            ..ClientConfig::default()
        };
        assert!(matches!(
            build_client(&config),
            Err(ClientError::HeaderFormat(_))
        ));

        let config = ClientConfig {
            custom_headers: Some("Bad Name:value".to_string()),
            ..ClientConfig::default()
        };
        assert!(matches!(
            build_client(&config),
            Err(ClientError::HeaderName { .. })
        ));
    }
}

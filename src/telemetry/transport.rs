//! Transport for telemetry endpoints
//!
//! Uses reqwest on native targets. Tests substitute their own
//! [`TelemetryTransport`] to count calls and script responses.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;

#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    /// GET `path` (relative to the transport's base URL) and parse the body as JSON
    async fn get_json(&self, path: &str) -> Result<Value, TelemetryError>;
}

#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TelemetryError::Network(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TelemetryTransport for HttpTransport {
    async fn get_json(&self, path: &str) -> Result<Value, TelemetryError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TelemetryError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TelemetryError::Status(response.status().as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| TelemetryError::Malformed(e.to_string()))
    }
}

/// Reject bodies that parsed but carry no usable telemetry
pub(crate) fn check_body(body: Value) -> Result<Value, TelemetryError> {
    match &body {
        Value::Null => Err(TelemetryError::Malformed("empty payload".to_string())),
        Value::Object(map) => match map.get("error") {
            None | Some(Value::Null) => Ok(body),
            Some(Value::String(msg)) => Err(TelemetryError::Upstream(msg.clone())),
            Some(other) => Err(TelemetryError::Upstream(other.to_string())),
        },
        _ => Ok(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_body_accepts_object() {
        let body = json!({ "devices": [] });
        assert_eq!(check_body(body.clone()), Ok(body));
    }

    #[test]
    fn test_check_body_rejects_null() {
        assert!(matches!(
            check_body(Value::Null),
            Err(TelemetryError::Malformed(_))
        ));
    }

    #[test]
    fn test_check_body_surfaces_error_field() {
        let err = check_body(json!({ "error": "bpf not loaded" })).unwrap_err();
        assert_eq!(err, TelemetryError::Upstream("bpf not loaded".to_string()));
    }

    #[test]
    fn test_check_body_ignores_null_error_field() {
        assert!(check_body(json!({ "error": null, "matrix": [] })).is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = TelemetryConfig {
            base_url: "http://localhost:5001/".to_string(),
            ..TelemetryConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:5001");
    }
}

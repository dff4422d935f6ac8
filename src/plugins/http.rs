//! HTTP request/response plugin on `reqwest`.
//!
//! Each server becomes a base URL; a publish joins the topic onto it and
//! issues one request with the bound method. A `2xx` response is returned as
//! `{"data", "status", "headers"}`; any other status is a transport error.

use crate::adapter::{value_to_string, AdapterFactory, Connection, Envelope, ProtocolAdapter};
use crate::error::PublishError;
use crate::spec::Server;
use async_trait::async_trait;
use http::Method;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;

pub const PROTOCOL: &str = "http";
pub const SECURE_PROTOCOL: &str = "https";

/// Connection type handed out by [`HttpFactory`]
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    pub client: reqwest::Client,
    pub base_url: Url,
}

impl HttpEndpoint {
    /// `base_url` joined with `topic`, keeping any base path
    pub fn url_for(&self, topic: &str) -> Result<Url, PublishError> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            topic.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| PublishError::transport(PROTOCOL, e))
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpFactory {
    client: reqwest::Client,
}

impl HttpFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AdapterFactory for HttpFactory {
    fn protocol(&self) -> &str {
        PROTOCOL
    }

    async fn get_connection(&self, server: &Server) -> Result<Connection, PublishError> {
        if server.protocol != PROTOCOL && server.protocol != SECURE_PROTOCOL {
            return Err(PublishError::protocol_mismatch(
                &server.name,
                "Protocol should be http",
            ));
        }
        let base_url = Url::parse(&server.url).map_err(|e| {
            PublishError::protocol_mismatch(&server.name, format!("invalid base URL '{}': {e}", server.url))
        })?;
        debug!(server = %server.name, base_url = %base_url, "HTTP endpoint created");
        Ok(Connection::new(HttpEndpoint {
            client: self.client.clone(),
            base_url,
        }))
    }

    fn create_adapter(
        &self,
        connection: Connection,
    ) -> Result<Box<dyn ProtocolAdapter>, PublishError> {
        let endpoint = connection
            .downcast_ref::<HttpEndpoint>()
            .cloned()
            .ok_or_else(|| PublishError::transport(PROTOCOL, "connection is not an HTTP endpoint"))?;
        Ok(Box::new(HttpAdapter {
            endpoint,
            method: Method::GET,
        }))
    }
}

pub struct HttpAdapter {
    endpoint: HttpEndpoint,
    method: Method,
}

fn response_headers(headers: &reqwest::header::HeaderMap) -> Map<String, Value> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), Value::String(v.to_string())))
        })
        .collect()
}

#[async_trait]
impl ProtocolAdapter for HttpAdapter {
    async fn bind(&mut self, _channel: &Value, operation: &Value) -> Result<(), PublishError> {
        if operation.get("type").and_then(Value::as_str) != Some("request") {
            return Err(PublishError::binding(
                "Protocol only support request operation",
            ));
        }
        if let Some(method) = operation.get("method").and_then(Value::as_str) {
            self.method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| PublishError::binding(format!("unsupported HTTP method '{method}'")))?;
        }
        Ok(())
    }

    async fn publish(
        &self,
        envelope: &Envelope,
        _bindings: &Map<String, Value>,
    ) -> Result<Value, PublishError> {
        let url = self.endpoint.url_for(&envelope.topic)?;
        let mut request = self.endpoint.client.request(self.method.clone(), url.clone());

        for (name, value) in &envelope.headers {
            request = request.header(name.as_str(), value_to_string(value));
        }
        if !envelope.message.is_null() {
            if !envelope.message.is_string()
                && !envelope.headers.keys().any(|k| k.eq_ignore_ascii_case("content-type"))
            {
                request = request.header(reqwest::header::CONTENT_TYPE, "application/json");
            }
            request = request.body(envelope.payload()?);
        }

        debug!(method = %self.method, url = %url, "Sending request");
        let response = request
            .send()
            .await
            .map_err(|e| PublishError::transport(PROTOCOL, e))?;

        let status = response.status();
        let headers = response_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| PublishError::transport(PROTOCOL, e))?;
        if !status.is_success() {
            warn!(method = %self.method, url = %url, status = status.as_u16(), "Non-success response");
            return Err(PublishError::transport(
                PROTOCOL,
                format!(
                    "{} {url} returned status {}: {}",
                    self.method,
                    status.as_u16(),
                    String::from_utf8_lossy(&body)
                ),
            ));
        }
        let data = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
        };

        Ok(json!({
            "data": data,
            "status": status.as_u16(),
            "headers": headers,
        }))
    }
}

//! Direct calls to a descriptor's own HTTP endpoint.
//!
//! Outside the agent path a [`ToolDescriptor`] can be invoked as a plain REST
//! call: `{base_url}{api_endpoint}` with the arguments as query parameters
//! (GET, DELETE) or as a JSON body (POST, PUT).

use std::time::Duration;

use conductor_core::config::McpConfig;
use conductor_core::ToolDescriptor;
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::error::EndpointError;

/// Executes descriptors against their HTTP endpoints.
#[derive(Debug, Clone)]
pub struct EndpointExecutor {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl EndpointExecutor {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn from_config(config: &McpConfig) -> Self {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for `descriptor`.
    pub fn url_for(&self, descriptor: &ToolDescriptor) -> String {
        let endpoint = descriptor.api_endpoint.trim();
        if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        }
    }

    /// Call the endpoint and return its JSON body.
    ///
    /// Missing required parameters are rejected before any request is made.
    #[instrument(skip(self, descriptor, arguments), fields(tool = %descriptor.name))]
    pub async fn execute(
        &self,
        descriptor: &ToolDescriptor,
        arguments: &Map<String, Value>,
    ) -> Result<Value, EndpointError> {
        let missing = descriptor.missing_required(arguments);
        if !missing.is_empty() {
            return Err(EndpointError::MissingParameters(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }

        let method = descriptor.method.trim().to_ascii_uppercase();
        let url = self.url_for(descriptor);
        let request = match method.as_str() {
            "GET" | "DELETE" => {
                let query: Vec<(&str, String)> = arguments
                    .iter()
                    .map(|(key, value)| (key.as_str(), query_value(value)))
                    .collect();
                let method = if method == "GET" { Method::GET } else { Method::DELETE };
                self.client.request(method, &url).query(&query)
            }
            "POST" | "PUT" => {
                let method = if method == "POST" { Method::POST } else { Method::PUT };
                self.client.request(method, &url).json(arguments)
            }
            _ => return Err(EndpointError::UnsupportedMethod(descriptor.method.clone())),
        };

        debug!(method = %method, url = %url, "Calling descriptor endpoint");

        let response = request.timeout(self.timeout).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EndpointError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

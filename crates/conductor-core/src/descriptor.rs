//! Registry data model.
//!
//! The registry is a directory tree of JSON files. A file is one of:
//! - a [`ToolDescriptor`] describing a single callable capability,
//! - a [`ServerConfigSet`] (`{"mcpServers": {...}}`) naming tool servers,
//! - any other JSON document, or plain text.
//!
//! [`RegistryContent::classify`] decides which, using the same rules for
//! files read from disk and for snapshots carried between pipeline stages.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while building registry types from raw JSON.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// Neither `type`, `command` nor `url` was given.
    #[error("cannot infer transport: one of 'type', 'command' or 'url' is required")]
    MissingTransport,

    /// A transport config was not a JSON object.
    #[error("transport config must be a JSON object")]
    NotAnObject,

    /// The document has the right shape but invalid fields.
    #[error("invalid registry document: {0}")]
    Invalid(String),
}

fn default_true() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

/// A single parameter of a [`ToolDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Declared type, e.g. `string` or `array[string]`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A single externally callable capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: String,
    pub api_endpoint: String,
    /// HTTP method for the endpoint.
    #[serde(default = "default_method", alias = "http_method")]
    pub method: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub response_format: Map<String, Value>,
    /// Transport used to reach this tool through an MCP server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_config: Option<TransportConfig>,
}

impl ToolDescriptor {
    /// Keys whose joint presence marks a JSON object as a descriptor.
    pub const REQUIRED_KEYS: [&'static str; 4] = ["name", "description", "category", "api_endpoint"];

    /// Whether a JSON object looks like a descriptor.
    pub fn matches_shape(object: &Map<String, Value>) -> bool {
        Self::REQUIRED_KEYS.iter().all(|key| object.contains_key(*key))
    }

    /// Names of required parameters absent from `arguments`.
    pub fn missing_required<'a>(&'a self, arguments: &Map<String, Value>) -> Vec<&'a str> {
        self.parameters
            .iter()
            .filter(|p| p.required && !arguments.contains_key(&p.name))
            .map(|p| p.name.as_str())
            .collect()
    }

    /// The server config, or a streamable HTTP endpoint under `base_url`.
    pub fn transport_or_default(&self, base_url: &str) -> TransportConfig {
        self.server_config.clone().unwrap_or_else(|| {
            TransportConfig::http(format!("{}/{}", base_url.trim_end_matches('/'), self.name))
        })
    }
}

/// How a tool server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Stdio,
    StreamableHttp,
    Websocket,
    GenericHttp,
    Grpc,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::StreamableHttp => "streamable_http",
            Self::Websocket => "websocket",
            Self::GenericHttp => "generic_http",
            Self::Grpc => "grpc",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection details for one tool server.
///
/// Deserialization accepts either `type` or `transport` for the kind and
/// infers it when both are missing: `command` means stdio, `url` means
/// streamable HTTP. Serialization always writes `transport` and omits
/// unset fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTransportConfig")]
pub struct TransportConfig {
    pub transport: TransportKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Per-request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
}

#[derive(Deserialize)]
struct RawTransportConfig {
    #[serde(default, rename = "type", alias = "transport")]
    kind: Option<TransportKind>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    timeout: Option<f64>,
}

impl TryFrom<RawTransportConfig> for TransportConfig {
    type Error = DescriptorError;

    fn try_from(raw: RawTransportConfig) -> Result<Self, Self::Error> {
        let transport = match (raw.kind, &raw.command, &raw.url) {
            (Some(kind), _, _) => kind,
            (None, Some(_), _) => TransportKind::Stdio,
            (None, None, Some(_)) => TransportKind::StreamableHttp,
            (None, None, None) => return Err(DescriptorError::MissingTransport),
        };

        Ok(Self {
            transport,
            url: raw.url,
            command: raw.command,
            args: raw.args,
            env: raw.env,
            cwd: raw.cwd,
            headers: raw.headers,
            timeout: raw.timeout,
        })
    }
}

impl TransportConfig {
    /// A stdio server launched with `command`.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: TransportKind::Stdio,
            url: None,
            command: Some(command.into()),
            args: Some(args),
            env: None,
            cwd: None,
            headers: None,
            timeout: None,
        }
    }

    /// A streamable HTTP server at `url`.
    pub fn http(url: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::StreamableHttp,
            url: Some(url.into()),
            command: None,
            args: None,
            env: None,
            cwd: None,
            headers: None,
            timeout: None,
        }
    }

    /// Build from a loosely-typed JSON object, dropping null fields first.
    pub fn from_value(value: &Value) -> Result<Self, DescriptorError> {
        let object = value.as_object().ok_or(DescriptorError::NotAnObject)?;
        let stripped: Map<String, Value> = object
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::from_value(Value::Object(stripped))
            .map_err(|e| DescriptorError::Invalid(e.to_string()))
    }

    /// The normalized JSON form (`transport` key, no nulls).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// The configured timeout, if any. Values a `Duration` cannot hold
    /// count as unset.
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

/// A named collection of tool-server transports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConfigSet {
    #[serde(rename = "mcpServers", default)]
    pub servers: BTreeMap<String, TransportConfig>,
}

impl ServerConfigSet {
    /// JSON key holding the server map.
    pub const KEY: &'static str = "mcpServers";
}

/// Immediate children of one registry directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStructure {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

/// Typed content of a registry file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RegistryContent {
    Descriptor(ToolDescriptor),
    ServerSet(ServerConfigSet),
    Json(Value),
    Text(String),
}

impl RegistryContent {
    /// Classify parsed JSON: descriptor, then server set, then generic JSON.
    pub fn classify(value: Value) -> Result<Self, DescriptorError> {
        let (is_descriptor, is_server_set) = match &value {
            Value::Object(object) => (
                ToolDescriptor::matches_shape(object),
                object.contains_key(ServerConfigSet::KEY),
            ),
            _ => (false, false),
        };

        if is_descriptor {
            return serde_json::from_value(value)
                .map(Self::Descriptor)
                .map_err(|e| DescriptorError::Invalid(e.to_string()));
        }
        if is_server_set {
            return serde_json::from_value(value)
                .map(Self::ServerSet)
                .map_err(|e| DescriptorError::Invalid(e.to_string()));
        }
        Ok(Self::Json(value))
    }

    /// JSON view, with text as a JSON string.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// Compact rendering for prompts; text is returned as is.
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            other => other.to_json().to_string(),
        }
    }

    /// Indented rendering for tool output; text is returned as is.
    pub fn render_pretty(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            other => serde_json::to_string_pretty(&other.to_json()).unwrap_or_else(|_| other.render()),
        }
    }

    /// The `name` field of a descriptor or of a generic JSON object.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Descriptor(descriptor) => Some(descriptor.name.as_str()),
            Self::Json(Value::Object(object)) => object.get("name").and_then(Value::as_str),
            _ => None,
        }
    }
}

//! Mintlify node - drive the Mintlify documentation agent.
//!
//! Three operations share one authenticated call per input item:
//! - `update_docs`: start an agent job on a branch with free-text instructions
//! - `get_job`: fetch the status of an agent job
//! - `custom_request`: any method/endpoint/query/body under the API base
//!
//! Per-item failures are classified (aborted connection, timeout, API error,
//! unknown) and either recorded in that item's output when
//! `continue_on_fail` is set, or raised to stop the run.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex_lite::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use super::template::render_value;
use super::types::{Node, NodeContext, NodeResult};
use crate::client::{job_body, ApiRequest, HttpMethod, MintlifyClient, SESSION_ID_HEADER};
use crate::config::{Config, MintlifyConfig};
use crate::credentials::MintlifyCredentials;
use crate::error::{Error, Result, TransportKind};

const DEFAULT_CREDENTIAL: &str = "mintlify";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_ENDPOINT: &str = "/agent/{{ credentials.project_id }}/jobs";

const ABORTED_MESSAGE: &str = "Request was aborted. This may be due to timeout or network issues. \
Try: 1) Increasing timeout settings, 2) Checking network connection, \
3) Verifying Mintlify API status";
const ABORTED_SUGGESTION: &str = "Consider increasing timeout or retrying";
const TIMEOUT_MESSAGE: &str = "Request timed out. Consider increasing the timeout setting.";

/// Operation performed by the node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create or update documentation using the Mintlify AI agent
    #[default]
    #[serde(alias = "updateDocs")]
    UpdateDocs,
    /// Get the status and details of an agent job
    #[serde(alias = "getJob")]
    GetJob,
    /// Make a custom API request to any Mintlify endpoint
    #[serde(alias = "customRequest")]
    CustomRequest,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::UpdateDocs => "update_docs",
            Operation::GetJob => "get_job",
            Operation::CustomRequest => "custom_request",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One query parameter of a custom request.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct QueryParameter {
    #[serde(default)]
    pub name: String,
    /// Non-string values are sent in their JSON form
    #[serde(default)]
    pub value: Value,
}

/// Per-item node configuration, after templates have been rendered.
///
/// `operation` and `continue_on_fail` apply to the whole run and live in
/// [`RunSettings`].
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MintlifyNodeConfig {
    /// Name of the stored credential to authenticate with
    #[serde(default = "default_credential")]
    pub credential: String,

    /// Git branch the agent works on (update_docs)
    #[serde(default, deserialize_with = "string_like")]
    #[schemars(with = "Option<String>")]
    pub branch: Option<String>,

    /// Instructions for the agent (update_docs)
    #[serde(default, alias = "instructions", deserialize_with = "string_like")]
    #[schemars(with = "Option<String>")]
    pub prompt: Option<String>,

    /// Job id returned by update_docs (get_job)
    #[serde(default, alias = "jobId", deserialize_with = "string_like")]
    #[schemars(with = "Option<String>")]
    pub job_id: Option<String>,

    /// HTTP method (custom_request)
    #[serde(default)]
    pub method: HttpMethod,

    /// Path below the API base; `{{ credentials.project_id }}` is replaced
    /// with the project id (custom_request)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Whether to send `body` (custom_request, POST/PUT/PATCH only)
    #[serde(default, alias = "sendBody")]
    pub send_body: bool,

    /// JSON body, as a value or as JSON text (custom_request)
    #[serde(default)]
    pub body: Option<Value>,

    /// Query parameters (custom_request)
    #[serde(default, alias = "queryParameters")]
    pub query_parameters: Vec<QueryParameter>,

    /// Per-request timeout override (seconds)
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_credential() -> String {
    DEFAULT_CREDENTIAL.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

/// Accept strings, numbers and booleans for free-text parameters.
fn string_like<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string, got {}",
            other
        ))),
    }
}

/// Settings that apply to the whole run rather than to one item.
///
/// Read once from the raw config; these are not templated.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct RunSettings {
    /// Operation to perform
    #[serde(default)]
    pub operation: Operation,

    /// Record failures in the item output instead of stopping the run
    #[serde(default, alias = "continueOnFail")]
    pub continue_on_fail: bool,
}

/// Full node config as published by the schema.
#[derive(JsonSchema)]
#[allow(dead_code)]
struct NodeConfigSchema {
    #[serde(flatten)]
    run: RunSettings,
    #[serde(flatten)]
    item: MintlifyNodeConfig,
}

fn project_id_regex() -> &'static Regex {
    static PROJECT_ID_REGEX: OnceLock<Regex> = OnceLock::new();
    PROJECT_ID_REGEX.get_or_init(|| {
        Regex::new(r"\{\{\s*\$?credentials\.(?:project_id|projectId)\s*\}\}").expect("valid regex")
    })
}

/// Replace every project-id placeholder in an endpoint.
pub fn substitute_project_id(endpoint: &str, project_id: &str) -> String {
    project_id_regex()
        .replace_all(endpoint, regex_lite::NoExpand(project_id))
        .to_string()
}

/// Query pairs with empty names dropped; a repeated name keeps its last value.
fn query_pairs(parameters: &[QueryParameter]) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for param in parameters.iter().filter(|p| !p.name.is_empty()) {
        let value = match &param.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        match pairs.iter_mut().find(|(name, _)| *name == param.name) {
            Some(existing) => existing.1 = value,
            None => pairs.push((param.name.clone(), value)),
        }
    }
    pairs
}

/// A required parameter, returned as given; blank values are rejected.
fn required<'a>(value: &'a Option<String>, name: &str, operation: Operation) -> Result<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Validation(format!(
            "Parameter '{}' is required for {}",
            name, operation
        ))),
    }
}

/// Branch and prompt of an update_docs item; the branch defaults to `main`.
fn job_fields(config: &MintlifyNodeConfig) -> Result<(&str, &str)> {
    let branch = match config.branch {
        None => DEFAULT_BRANCH,
        Some(_) => required(&config.branch, "branch", Operation::UpdateDocs)?,
    };
    let prompt = required(&config.prompt, "prompt", Operation::UpdateDocs)?;
    Ok((branch, prompt))
}

/// Build the API request for one item.
pub fn build_request(
    operation: Operation,
    config: &MintlifyNodeConfig,
    credentials: &MintlifyCredentials,
) -> Result<ApiRequest> {
    let timeout = config.timeout_seconds.map(Duration::from_secs);

    let request = match operation {
        Operation::UpdateDocs => {
            let (branch, prompt) = job_fields(config)?;
            ApiRequest::new(
                HttpMethod::Post,
                format!("{}/job", credentials.agent_path()),
            )
            .with_body(job_body(branch, prompt))
        }
        Operation::GetJob => {
            let job_id = required(&config.job_id, "job_id", operation)?;
            ApiRequest::new(
                HttpMethod::Get,
                format!("{}/job/{}", credentials.agent_path(), job_id),
            )
        }
        Operation::CustomRequest => {
            let endpoint = substitute_project_id(&config.endpoint, credentials.project_id());
            let mut request = ApiRequest::new(config.method, endpoint)
                .with_query(query_pairs(&config.query_parameters));

            if config.send_body && config.method.allows_body() {
                let body = match &config.body {
                    Some(Value::String(text)) => serde_json::from_str(text).map_err(|_| {
                        Error::Validation("Invalid JSON in body parameter".to_string())
                    })?,
                    Some(value) => value.clone(),
                    None => json!({}),
                };
                request = request.with_body(body);
            }
            request
        }
    };

    Ok(request.with_timeout(timeout))
}

/// Failure categories, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    StreamAborted,
    Timeout,
    Api,
    Unknown,
}

impl FailureKind {
    /// Classify an item error.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Transport { kind, message } => {
                let message = message.to_lowercase();
                if matches!(
                    kind,
                    TransportKind::ConnectionReset | TransportKind::ConnectionAborted
                ) || message.contains("aborted")
                {
                    FailureKind::StreamAborted
                } else if *kind == TransportKind::TimedOut
                    || message.contains("timed out")
                    || message.contains("timeout")
                {
                    FailureKind::Timeout
                } else {
                    FailureKind::Unknown
                }
            }
            Error::Api { .. } => FailureKind::Api,
            _ => FailureKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::StreamAborted => "STREAM_ABORTED",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::Api => "API_ERROR",
            FailureKind::Unknown => "UNKNOWN",
        }
    }
}

/// Upstream error body as display text.
fn api_body_text(err: &Error, body: &Value) -> String {
    match body {
        Value::Null => err.to_string(),
        Value::String(s) if s.is_empty() => err.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Output record for a failed item when continuing.
pub fn failure_record(err: &Error, kind: FailureKind, item_index: usize) -> Value {
    match (kind, err) {
        (FailureKind::StreamAborted, _) => json!({
            "error": err.to_string(),
            "error_type": kind.as_str(),
            "code": err.code(),
            "item_index": item_index,
            "suggestion": ABORTED_SUGGESTION,
        }),
        (FailureKind::Timeout, _) => json!({
            "error": "Request timed out",
            "error_type": kind.as_str(),
            "item_index": item_index,
        }),
        (FailureKind::Api, Error::Api { status, body }) => json!({
            "error": err.to_string(),
            "error_type": kind.as_str(),
            "status_code": status,
            "response": body,
            "item_index": item_index,
        }),
        _ => json!({
            "error": err.to_string(),
            "error_type": FailureKind::Unknown.as_str(),
            "code": err.code(),
            "item_index": item_index,
        }),
    }
}

/// Error raised for a failed item when not continuing.
pub fn failure_error(err: Error, kind: FailureKind, item_index: usize) -> Error {
    let (message, description) = match (kind, &err) {
        (FailureKind::StreamAborted, _) => {
            (ABORTED_MESSAGE.to_string(), Some("Stream aborted".to_string()))
        }
        (FailureKind::Timeout, _) => (TIMEOUT_MESSAGE.to_string(), None),
        (FailureKind::Api, Error::Api { status, body }) => (
            format!(
                "Mintlify API error ({}): {}",
                status,
                api_body_text(&err, body)
            ),
            Some(format!("HTTP {}", status)),
        ),
        _ => (err.to_string(), None),
    };

    Error::Operation {
        message,
        item_index,
        description,
    }
}

/// Split node input into items.
fn input_items(input: &Value) -> Vec<Value> {
    match input {
        Value::Array(items) => items.clone(),
        Value::Null => vec![json!({})],
        other => vec![other.clone()],
    }
}

/// Mintlify documentation agent node.
pub struct MintlifyNode {
    client: MintlifyClient,
}

impl MintlifyNode {
    /// Create a node from the loaded configuration.
    pub fn new() -> Self {
        let config = Config::load();
        let client = MintlifyClient::new(&config.mintlify).unwrap_or_else(|e| {
            warn!("Invalid Mintlify configuration, using defaults: {}", e);
            MintlifyClient::fallback()
        });
        Self { client }
    }

    /// Create a node from explicit settings.
    pub fn with_config(config: &MintlifyConfig) -> Result<Self> {
        Ok(Self {
            client: MintlifyClient::new(config)?,
        })
    }

    async fn execute_item(
        &self,
        operation: Operation,
        raw_config: &Value,
        ctx: &NodeContext,
    ) -> Result<Value> {
        let config: MintlifyNodeConfig = serde_json::from_value(render_value(raw_config, ctx))
            .map_err(|e| Error::Validation(format!("Invalid mintlify config: {}", e)))?;

        debug!(
            item_index = ?ctx.item_index,
            credential = %config.credential,
            "Processing Mintlify item"
        );

        let credentials = ctx.get_credential(&config.credential).ok_or_else(|| {
            Error::Credential(format!(
                "Credential '{}' not found. Add it with: r8r-mintlify credentials set {}",
                config.credential, config.credential
            ))
        })?;

        let request = build_request(operation, &config, credentials)?;
        let response = self.client.send(credentials, &request).await?;

        let output = match operation {
            Operation::UpdateDocs => {
                let (branch, prompt) = job_fields(&config)?;
                let job_id = response.header(SESSION_ID_HEADER);
                if job_id.is_none() {
                    warn!("Mintlify response did not include an {} header", SESSION_ID_HEADER);
                }
                json!({
                    "success": true,
                    "job_id": job_id,
                    "branch": branch,
                    "prompt": prompt,
                    "status": "created",
                })
            }
            Operation::GetJob => response.body,
            Operation::CustomRequest => json!({
                "status_code": response.status,
                "headers": response.headers,
                "body": response.body,
            }),
        };

        Ok(output)
    }
}

impl Default for MintlifyNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for MintlifyNode {
    fn node_type(&self) -> &str {
        "mintlify"
    }

    fn description(&self) -> &str {
        "Update documentation with the Mintlify AI agent"
    }

    fn config_schema(&self) -> Option<Value> {
        serde_json::to_value(schemars::schema_for!(NodeConfigSchema)).ok()
    }

    async fn execute(&self, config: &Value, ctx: &NodeContext) -> Result<NodeResult> {
        let settings: RunSettings = serde_json::from_value(config.clone())
            .map_err(|e| Error::Node(format!("Invalid mintlify config: {}", e)))?;
        let operation = settings.operation;

        let items = input_items(&ctx.input);
        debug!(
            execution_id = %ctx.execution_id,
            workflow = %ctx.workflow_name,
            operation = %operation,
            base_url = %self.client.base_url(),
            items = items.len(),
            continue_on_fail = settings.continue_on_fail,
            "Running Mintlify node"
        );

        let start = Instant::now();
        let mut outputs = Vec::with_capacity(items.len());
        let mut failed = 0usize;

        for (index, item) in items.into_iter().enumerate() {
            let item_ctx = ctx.for_item(item, index);
            match self.execute_item(operation, config, &item_ctx).await {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    let kind = FailureKind::classify(&err);
                    let response = match &err {
                        Error::Api { body, .. } => body.clone(),
                        _ => Value::Null,
                    };
                    error!(
                        message = %err,
                        code = err.code(),
                        status = ?err.status(),
                        error_type = kind.as_str(),
                        item_index = index,
                        response = %response,
                        "Mintlify node error"
                    );

                    if !settings.continue_on_fail {
                        return Err(failure_error(err, kind, index));
                    }
                    failed += 1;
                    outputs.push(failure_record(&err, kind, index));
                }
            }
        }

        let duration = start.elapsed();
        info!(
            "Mintlify {} processed {} item(s), {} failed ({}ms)",
            operation,
            outputs.len(),
            failed,
            duration.as_millis()
        );

        let count = outputs.len();
        Ok(NodeResult::with_metadata(
            Value::Array(outputs),
            json!({
                "operation": operation.as_str(),
                "items": count,
                "failed": failed,
                "duration_ms": duration.as_millis() as u64,
            }),
        ))
    }
}

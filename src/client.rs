//! Authenticated HTTP client for the Mintlify API.

use std::time::{Duration, Instant};

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Url};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{MintlifyConfig, DEFAULT_BASE_URL};
use crate::credentials::MintlifyCredentials;
use crate::error::{Error, Result};

/// Response header carrying the id of a newly created agent job.
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// HTTP methods accepted by the Mintlify API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[serde(alias = "delete")]
    Delete,
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
}

impl HttpMethod {
    /// Whether requests with this method may carry a body.
    pub fn allows_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Delete => "DELETE",
            HttpMethod::Get => "GET",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "DELETE" => Ok(HttpMethod::Delete),
            "GET" => Ok(HttpMethod::Get),
            "PATCH" => Ok(HttpMethod::Patch),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            _ => Err(Error::Validation(format!(
                "Unknown HTTP method '{}'. Use: DELETE, GET, PATCH, POST, or PUT",
                s
            ))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

/// One request against the API, relative to the base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Path below the base URL, e.g. `/agent/proj/job`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Overrides the client's default timeout
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Full response of a successful request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Response headers as a JSON object (lowercase names)
    pub headers: Value,
    /// JSON body, or a string when the body is not JSON, or null when empty
    pub body: Value,
}

impl ApiResponse {
    /// Get a response header as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name.to_lowercase()).and_then(Value::as_str)
    }
}

/// Body of a new agent job: a branch and a single user message.
pub fn job_body(branch: &str, prompt: &str) -> Value {
    json!({
        "branch": branch,
        "messages": [
            { "role": "user", "content": prompt },
        ],
    })
}

/// Mintlify API client.
#[derive(Debug, Clone)]
pub struct MintlifyClient {
    client: Client,
    base_url: String,
}

impl MintlifyClient {
    /// Build a client with the configured base URL and timeouts.
    pub fn new(config: &MintlifyConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.trimmed_base_url().to_string(),
        })
    }

    /// Client with reqwest defaults against the public API.
    ///
    /// Used when the configured client cannot be built.
    pub fn fallback() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve an API path against the base URL, adding a missing leading `/`.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        let raw = format!("{}{}", self.base_url, path);
        Url::parse(&raw)
            .map_err(|e| Error::Validation(format!("Invalid endpoint '{}': {}", path, e)))
    }

    /// Perform one authenticated request.
    ///
    /// Statuses of 400 and above come back as [`Error::Api`] with the parsed body.
    pub async fn send(
        &self,
        credentials: &MintlifyCredentials,
        request: &ApiRequest,
    ) -> Result<ApiResponse> {
        let url = self.url_for(&request.path)?;

        debug!(method = %request.method, url = %url, "Mintlify request");

        let mut builder = self
            .client
            .request(request.method.into(), url.clone())
            .header(AUTHORIZATION, credentials.authorization_header());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let start = Instant::now();
        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers: Value = {
            let mut map = serde_json::Map::new();
            for (k, v) in response.headers().iter() {
                map.insert(
                    k.to_string(),
                    Value::String(v.to_str().unwrap_or("").to_string()),
                );
            }
            Value::Object(map)
        };

        let body_text = response.text().await?;
        let body = parse_body(body_text);
        let duration = start.elapsed();

        if status >= 400 {
            warn!(
                method = %request.method,
                url = %url,
                status,
                "Mintlify API returned an error status"
            );
            return Err(Error::Api { status, body });
        }

        info!(
            "Mintlify {} {} -> {} ({}ms)",
            request.method,
            url,
            status,
            duration.as_millis()
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    /// Verify credentials by creating a trivial job on the configured project.
    pub async fn test_credentials(&self, credentials: &MintlifyCredentials) -> Result<()> {
        let request = ApiRequest::new(
            HttpMethod::Post,
            format!("{}/job", credentials.agent_path()),
        )
        .with_body(job_body("test", "test"));

        self.send(credentials, &request).await?;
        Ok(())
    }
}

fn parse_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn test_client(server: &MockServer) -> MintlifyClient {
        MintlifyClient::new(&MintlifyConfig {
            base_url: server.url("/v1"),
            timeout_seconds: 5,
            connect_timeout_seconds: 1,
        })
        .unwrap()
    }

    fn creds() -> MintlifyCredentials {
        MintlifyCredentials::new("mint_key", "proj_1").unwrap()
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert!("TRACE".parse::<HttpMethod>().is_err());
        assert!(HttpMethod::Put.allows_body());
        assert!(!HttpMethod::Delete.allows_body());
        assert_eq!(HttpMethod::default(), HttpMethod::Get);
    }

    #[test]
    fn test_url_for_adds_leading_slash() {
        let client = MintlifyClient::new(&MintlifyConfig::default()).unwrap();
        let url = client.url_for("agent/proj_1/jobs").unwrap();
        assert_eq!(url.as_str(), "https://api.mintlify.com/v1/agent/proj_1/jobs");
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(String::new()), Value::Null);
        assert_eq!(parse_body("{\"a\":1}".to_string()), json!({"a": 1}));
        assert_eq!(parse_body("plain".to_string()), json!("plain"));
    }

    #[tokio::test]
    async fn test_send_sets_bearer_and_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/agent/proj_1/jobs")
                .header("authorization", "Bearer mint_key")
                .query_param("limit", "5");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"jobs": []}));
        });

        let request = ApiRequest::new(HttpMethod::Get, "/agent/proj_1/jobs")
            .with_query(vec![("limit".to_string(), "5".to_string())]);
        let response = test_client(&server).send(&creds(), &request).await.unwrap();

        mock.assert();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, json!({"jobs": []}));
        assert_eq!(response.header("Content-Type"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_send_maps_error_status() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(GET).path("/v1/agent/proj_1/job/missing");
            then.status(404).json_body(json!({"error": "Job not found"}));
        });

        let request = ApiRequest::new(HttpMethod::Get, "/agent/proj_1/job/missing");
        let err = test_client(&server)
            .send(&creds(), &request)
            .await
            .unwrap_err();

        match err {
            Error::Api { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body["error"], "Job not found");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_credentials_check_posts_canned_job() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/agent/proj_1/job")
                .header("authorization", "Bearer mint_key")
                .json_body(json!({
                    "branch": "test",
                    "messages": [{"role": "user", "content": "test"}]
                }));
            then.status(200).header(SESSION_ID_HEADER, "sess_test");
        });

        test_client(&server).test_credentials(&creds()).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn test_credentials_check_fails_on_unauthorized() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(POST).path("/v1/agent/proj_1/job");
            then.status(401).body("Unauthorized");
        });

        let err = test_client(&server)
            .test_credentials(&creds())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
    }
}

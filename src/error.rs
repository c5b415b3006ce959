//! Error types for r8r-mintlify.
//!
//! Errors carry a stable code that agents can parse, and transport failures
//! keep enough structure for the node's failure classification.

use serde_json::Value;
use thiserror::Error;

/// Result type alias for r8r-mintlify operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Low-level reason an HTTP request never produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Peer reset the connection mid-request
    ConnectionReset,
    /// Connection aborted locally or by the peer (includes broken pipes)
    ConnectionAborted,
    /// Request or connect deadline elapsed
    TimedOut,
    /// Could not establish a connection
    Connect,
    /// Anything else reported by the HTTP stack
    Other,
}

impl TransportKind {
    /// Machine code reported in failure records.
    pub fn code(&self) -> &'static str {
        match self {
            TransportKind::ConnectionReset => "CONNECTION_RESET",
            TransportKind::ConnectionAborted => "CONNECTION_ABORTED",
            TransportKind::TimedOut => "TIMED_OUT",
            TransportKind::Connect => "CONNECT_FAILED",
            TransportKind::Other => "TRANSPORT_ERROR",
        }
    }
}

/// r8r-mintlify error types.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Node error: {0}")]
    Node(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Request failed: {message}")]
    Transport { kind: TransportKind, message: String },

    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: Value },

    /// Per-item failure that halts a node run.
    #[error("{message} (item {item_index})")]
    Operation {
        message: String,
        item_index: usize,
        description: Option<String>,
    },
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportKind::TimedOut
        } else if connection_closed_early(&err) {
            TransportKind::ConnectionAborted
        } else {
            match io_error_kind(&err) {
                Some(std::io::ErrorKind::ConnectionReset) => TransportKind::ConnectionReset,
                Some(
                    std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof,
                ) => TransportKind::ConnectionAborted,
                Some(std::io::ErrorKind::TimedOut) => TransportKind::TimedOut,
                _ if err.is_connect() => TransportKind::Connect,
                _ => TransportKind::Other,
            }
        };

        // Messages never include the request URL
        let err = err.without_url();
        Error::Transport {
            kind,
            message: error_chain_message(&err),
        }
    }
}

/// Find the first I/O error in the source chain of a reqwest error.
fn io_error_kind(err: &reqwest::Error) -> Option<std::io::ErrorKind> {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = inner.source();
    }
    None
}

/// Whether the peer closed the connection before a full response arrived.
fn connection_closed_early(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(hyper_err) = inner.downcast_ref::<hyper::Error>() {
            if hyper_err.is_incomplete_message() {
                return true;
            }
        }
        source = inner.source();
    }
    false
}

/// Flatten an error and its sources into one line.
fn error_chain_message(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}

impl Error {
    /// Get the error code for agent parsing.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Node(_) => "NODE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Credential(_) => "CREDENTIAL_ERROR",
            Error::Transport { kind, .. } => kind.code(),
            Error::Api { .. } => "API_ERROR",
            Error::Operation { .. } => "OPERATION_ERROR",
        }
    }

    /// HTTP status of an upstream error response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get a sanitized error message safe for external consumers.
    ///
    /// Storage details may contain local paths, so they are hidden.
    pub fn external_message(&self) -> String {
        match self {
            Error::Node(msg) => format!("Node error: {}", msg),
            Error::Config(msg) => format!("Configuration error: {}", msg),
            Error::Validation(msg) => format!("Validation error: {}", msg),
            Error::Credential(msg) => format!("Credential error: {}", msg),
            Error::Operation { message, .. } => message.clone(),

            Error::Storage(_) => "A storage error occurred".to_string(),

            Error::Transport { kind, .. } => match kind {
                TransportKind::TimedOut => "HTTP request timed out".to_string(),
                TransportKind::Connect => "Failed to connect to remote server".to_string(),
                TransportKind::ConnectionReset | TransportKind::ConnectionAborted => {
                    "Connection to remote server was interrupted".to_string()
                }
                TransportKind::Other => "HTTP request failed".to_string(),
            },
            Error::Api { status, .. } => format!("HTTP request failed with status {}", status),
        }
    }

    /// Convert to agent-friendly JSON response (includes full error details).
    pub fn to_json(&self) -> Value {
        let mut error = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Error::Operation {
            item_index,
            description,
            ..
        } = self
        {
            error["item_index"] = serde_json::json!(item_index);
            if let Some(description) = description {
                error["description"] = serde_json::json!(description);
            }
        }
        serde_json::json!({
            "success": false,
            "error": error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_codes() {
        let err = Error::Transport {
            kind: TransportKind::ConnectionReset,
            message: "connection reset by peer".to_string(),
        };
        assert_eq!(err.code(), "CONNECTION_RESET");

        let err = Error::Transport {
            kind: TransportKind::TimedOut,
            message: "operation timed out".to_string(),
        };
        assert_eq!(err.code(), "TIMED_OUT");
        assert_eq!(err.external_message(), "HTTP request timed out");
    }

    #[test]
    fn test_api_error_status() {
        let err = Error::Api {
            status: 404,
            body: json!({"error": "not found"}),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.code(), "API_ERROR");
        assert!(err.to_string().starts_with("HTTP 404"));
        assert_eq!(Error::Node("x".into()).status(), None);
    }

    #[test]
    fn test_storage_message_is_sanitized() {
        let err = Error::Storage("Failed to read /home/me/.local/share/x".to_string());
        assert!(!err.external_message().contains("/home"));
    }

    #[test]
    fn test_operation_error_json() {
        let err = Error::Operation {
            message: "Request timed out".to_string(),
            item_index: 2,
            description: Some("HTTP 500".to_string()),
        };
        let value = err.to_json();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "OPERATION_ERROR");
        assert_eq!(value["error"]["item_index"], 2);
        assert_eq!(value["error"]["description"], "HTTP 500");
    }

    async fn send_to_closing_server() -> reqwest::Error {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            // Dropping the socket closes it without writing a response
        });

        reqwest::Client::new()
            .post(format!("http://{}/agent/proj_1/job", addr))
            .json(&json!({"branch": "main"}))
            .send()
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_connection_closed_before_response_is_aborted() {
        let err: Error = send_to_closing_server().await.into();
        match err {
            Error::Transport { kind, .. } => assert!(
                matches!(
                    kind,
                    TransportKind::ConnectionAborted | TransportKind::ConnectionReset
                ),
                "unexpected kind {kind:?}"
            ),
            other => panic!("expected Transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_message_omits_url() {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:1/agent/proj_1/job/aborted-timeout-run")
            .send()
            .await
            .unwrap_err();
        let err: Error = err.into();
        let message = err.to_string();
        assert!(!message.contains("aborted-timeout-run"), "{message}");
    }

    #[tokio::test]
    async fn test_reqwest_connect_error_maps_to_connect() {
        // Port 1 is reserved and closed on any sane test host.
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:1/")
            .send()
            .await
            .unwrap_err();
        let err: Error = err.into();
        assert!(matches!(
            err,
            Error::Transport {
                kind: TransportKind::Connect,
                ..
            }
        ));
    }
}

//! JSON-RPC 2.0 over line-delimited stdio.
//!
//! One request per line in, one response per line out. Notifications (no
//! `id`) are processed but never answered. Application failures become
//! JSON-RPC errors whose `data.kind` carries the [`ErrorKind`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info};

use super::{handle_method, SharedState, SESSION_METHODS};
use crate::error::{AppError, ErrorKind, RpcError};

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod rpc_tests;

/// Parse error code.
pub const PARSE_ERROR: i32 = -32700;
/// Invalid request code.
pub const INVALID_REQUEST: i32 = -32600;
/// Unknown method code.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// Message returned for internal failures.
pub const INTERNAL_MESSAGE: &str = "Something went wrong!";

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier, null when it could not be read.
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server identification returned by `initialize`.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// Result of the `initialize` handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// Methods this server answers.
    pub methods: Vec<&'static str>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Map an application failure onto a JSON-RPC error.
    ///
    /// Internal failures are logged and replaced by [`INTERNAL_MESSAGE`].
    pub fn from_app_error(id: Option<Value>, err: &AppError) -> Self {
        if let AppError::Rpc(RpcError::UnknownMethod { method }) = err {
            return Self::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method));
        }

        let kind = err.kind();
        let message = if kind == ErrorKind::Internal {
            error!(error = %err, "Internal error");
            INTERNAL_MESSAGE.to_string()
        } else {
            err.to_string()
        };

        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code: kind.rpc_code(),
                message,
                data: Some(json!({ "kind": kind.as_str() })),
            }),
        }
    }
}

/// JSON-RPC server over stdio.
pub struct RpcServer {
    state: SharedState,
}

impl RpcServer {
    /// Create a new server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Serve stdin/stdout until EOF.
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Guided diagnosis server starting...");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve requests read from `reader`, writing responses to `writer`.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    Some(JsonRpcResponse::error(
                        None,
                        PARSE_ERROR,
                        format!("Parse error: {}", e),
                    ))
                }
            };

            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!(bytes = response_json.len(), "Sending response");

                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a single request; `None` for notifications.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let is_notification = request.id.is_none();
        debug!(method = %request.method, notification = is_notification, "Received request");

        if request.jsonrpc != "2.0" {
            return (!is_notification).then(|| {
                JsonRpcResponse::error(
                    request.id,
                    INVALID_REQUEST,
                    format!("Unsupported jsonrpc version: {}", request.jsonrpc),
                )
            });
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id),
            "ping" => JsonRpcResponse::success(request.id, json!({})),
            method => match handle_method(&self.state, method, request.params).await {
                Ok(result) => JsonRpcResponse::success(request.id, result),
                Err(err) => JsonRpcResponse::from_app_error(request.id, &err),
            },
        };

        if is_notification {
            debug!(method = %request.method, "Notification processed, no response");
            return None;
        }
        Some(response)
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        info!("Handling initialize request");

        let result = InitializeResult {
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            methods: SESSION_METHODS.to_vec(),
        };

        match serde_json::to_value(result) {
            Ok(val) => JsonRpcResponse::success(id, val),
            Err(e) => JsonRpcResponse::from_app_error(id, &AppError::from(RpcError::Json(e))),
        }
    }
}

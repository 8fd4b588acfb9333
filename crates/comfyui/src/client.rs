//! WebSocket client for a ComfyUI server.
//!
//! [`ComfyClient`] holds the connection configuration for one ComfyUI
//! server. Call [`ComfyClient::connect`] to establish a live
//! [`ComfyConnection`] before submitting a workflow, so that no early
//! execution event can be missed.

use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Configuration handle for a ComfyUI server.
pub struct ComfyClient {
    api_url: String,
    ws_url: String,
}

/// A live WebSocket connection to a ComfyUI server.
pub struct ComfyConnection {
    /// Unique client ID sent during the WebSocket handshake. Submitting
    /// a workflow with the same ID makes ComfyUI address execution
    /// events to this connection.
    pub client_id: String,
    /// The raw WebSocket stream for reading frames.
    pub ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl ComfyClient {
    /// Create a new client from the HTTP base URL, e.g.
    /// `http://127.0.0.1:8188`. The WebSocket URL is derived by
    /// upgrading the scheme (`http` -> `ws`, `https` -> `wss`).
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into();
        let ws_url = api_url.replacen("http", "ws", 1);
        Self { api_url, ws_url }
    }

    /// HTTP API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// WebSocket base URL.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Connect to the ComfyUI WebSocket endpoint.
    ///
    /// Generates a unique `client_id` (UUID v4) and appends it as a
    /// query parameter so that ComfyUI can address messages back to
    /// this specific client.
    pub async fn connect(&self) -> Result<ComfyConnection, ComfyClientError> {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %client_id,
            "Connected to ComfyUI at {}",
            self.ws_url,
        );

        Ok(ComfyConnection {
            client_id,
            ws_stream,
        })
    }
}

/// Errors from the WebSocket client layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}

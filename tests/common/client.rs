//! Test WebSocket client.
//!
//! Sends JSON frames and asserts on received ones.

#![allow(dead_code)]

use anyhow::anyhow;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A test client speaking the JSON frame protocol.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    /// Connect to a test server.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let (ws, _) = connect_async(format!("ws://{addr}")).await?;
        Ok(Self { ws })
    }

    /// Send one JSON frame.
    pub async fn send_json(&mut self, frame: &Value) -> anyhow::Result<()> {
        self.ws.send(Message::Text(frame.to_string())).await?;
        Ok(())
    }

    /// Send raw text (for malformed-frame tests).
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a chat line to a room (defaults to `main` when `room` is None).
    pub async fn send_chat(&mut self, content: &str, room: Option<&str>) -> anyhow::Result<()> {
        let mut frame = json!({ "content": content });
        if let Some(room) = room {
            frame["room"] = room.into();
        }
        self.send_json(&frame).await
    }

    /// Receive the next JSON frame, skipping transport-level frames.
    pub async fn recv(&mut self) -> anyhow::Result<Value> {
        loop {
            let msg = timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .map_err(|_| anyhow!("timed out waiting for a frame"))?
                .ok_or_else(|| anyhow!("connection closed"))??;
            match msg {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(_) => return Err(anyhow!("connection closed")),
                _ => continue,
            }
        }
    }

    /// Receive frames until one matches, returning it.
    pub async fn recv_until(
        &mut self,
        mut predicate: impl FnMut(&Value) -> bool,
    ) -> anyhow::Result<Value> {
        loop {
            let frame = self.recv().await?;
            if predicate(&frame) {
                return Ok(frame);
            }
        }
    }

    /// Receive frames until one has the given `type`.
    pub async fn recv_type(&mut self, frame_type: &str) -> anyhow::Result<Value> {
        self.recv_until(|v| v["type"] == frame_type).await
    }

    /// Register, returning the `welcome` (or `error`) frame.
    pub async fn register(&mut self, username: Option<&str>) -> anyhow::Result<Value> {
        let mut frame = json!({ "message_type": "register" });
        if let Some(username) = username {
            frame["username"] = username.into();
        }
        self.send_json(&frame).await?;
        self.recv_until(|v| v["type"] == "welcome" || v["type"] == "error")
            .await
    }

    /// Register and fail the test on anything but a welcome.
    pub async fn register_ok(&mut self, username: Option<&str>) -> anyhow::Result<Value> {
        let frame = self.register(username).await?;
        if frame["type"] != "welcome" {
            return Err(anyhow!("registration rejected: {frame}"));
        }
        Ok(frame)
    }

    /// Elevate this session with the given secret.
    pub async fn elevate(&mut self, secret: &str) -> anyhow::Result<()> {
        self.send_chat(&format!("/admin {secret}"), None).await?;
        self.recv_type("admin_success").await?;
        Ok(())
    }

    /// Drain frames until the server closes the connection.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        loop {
            match timeout(RECV_TIMEOUT, self.ws.next()).await {
                Err(_) => return Err(anyhow!("timed out waiting for close")),
                Ok(None) => return Ok(()),
                Ok(Some(Err(_))) => return Ok(()),
                Ok(Some(Ok(Message::Close(_)))) => return Ok(()),
                Ok(Some(Ok(_))) => continue,
            }
        }
    }
}

//! Connection - drives one client from WebSocket handshake to teardown.
//!
//! Each connection runs in its own tokio task around a single
//! `tokio::select!` loop: inbound frames are dispatched strictly in
//! arrival order, outbound frames drain from the session's queue, and a
//! keepalive timer pings the peer and enforces the pong deadline. Any
//! exit path funnels into one idempotent `unregister`.

use crate::error::DispatchError;
use crate::handlers::{dispatch_frame, Registry};
use crate::proto::{ClientFrame, ServerFrame};
use crate::state::{Hub, Outbound, SessionId};
use anyhow::anyhow;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Depth of the per-session outbound queue. Fan-out blocks on a full
/// queue, which is the transport-provided backpressure the design leans
/// on; only the liveness sweep refuses to wait.
const OUTBOUND_QUEUE: usize = 256;

const BANNED_MESSAGE: &str = "You are banned from this server";

/// A client connection handler.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    /// Peer address was in the ban store at accept time.
    banned: bool,
    hub: Arc<Hub>,
    registry: Arc<Registry>,
    shutdown: broadcast::Receiver<()>,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        banned: bool,
        hub: Arc<Hub>,
        registry: Arc<Registry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            stream,
            peer,
            banned,
            hub,
            registry,
            shutdown,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            stream,
            peer,
            banned,
            hub,
            registry,
            mut shutdown,
        } = self;

        let max_frame = hub.config.server.max_frame_bytes;
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(max_frame);
        ws_config.max_frame_size = Some(max_frame);
        let ws = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config)).await?;
        let (mut sink, mut stream) = ws.split();

        // Banned peers get exactly one error frame before the close.
        if banned {
            let _ = sink
                .send(Message::Text(ServerFrame::error(BANNED_MESSAGE).to_json()))
                .await;
            let _ = sink.send(Message::Close(None)).await;
            return Ok(());
        }

        let ip = peer.ip().to_string();
        let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_QUEUE);
        let mut session: Option<SessionId> = None;

        let ping_every = Duration::from_secs(hub.config.server.ping_interval_secs);
        let pong_grace = ping_every + Duration::from_secs(hub.config.server.pong_timeout_secs);
        let mut keepalive = tokio::time::interval(ping_every);
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        keepalive.tick().await;
        let mut last_seen = Instant::now();

        let result: anyhow::Result<()> = loop {
            tokio::select! {
                inbound = stream.next() => match inbound {
                    None => break Ok(()),
                    Some(Err(e)) => break Err(e.into()),
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        Self::on_frame(&hub, &registry, &tx, &mut session, &ip, &text).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        last_seen = Instant::now();
                        match String::from_utf8(bytes) {
                            Ok(text) => {
                                Self::on_frame(&hub, &registry, &tx, &mut session, &ip, &text)
                                    .await;
                            }
                            Err(_) => {
                                let frame = DispatchError::Parse.to_frame();
                                let _ = tx.send(Outbound::Frame(frame.to_json())).await;
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                        if let Some(sid) = session {
                            hub.touch_liveness(sid);
                        }
                    }
                    // tungstenite answers pings on the next write.
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Close(_))) => break Ok(()),
                    Some(Ok(_)) => {}
                },
                outbound = rx.recv() => match outbound {
                    Some(Outbound::Frame(json)) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            break Err(e.into());
                        }
                    }
                    Some(Outbound::Ping) => {
                        if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                            break Err(e.into());
                        }
                    }
                    Some(Outbound::Close) => {
                        let _ = sink.send(Message::Close(None)).await;
                        break Ok(());
                    }
                    None => break Ok(()),
                },
                _ = keepalive.tick() => {
                    if last_seen.elapsed() > pong_grace {
                        break Err(anyhow!("keepalive timeout"));
                    }
                    if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                        break Err(e.into());
                    }
                },
                _ = shutdown.recv() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break Ok(());
                }
            }
        };

        if let Some(sid) = session {
            hub.unregister(sid).await;
        }
        result
    }

    /// Process one inbound text frame through the registration state
    /// machine and the dispatcher.
    async fn on_frame(
        hub: &Arc<Hub>,
        registry: &Arc<Registry>,
        tx: &mpsc::Sender<Outbound>,
        session: &mut Option<SessionId>,
        ip: &str,
        text: &str,
    ) {
        match *session {
            Some(sid) => {
                let result = match ClientFrame::parse(text) {
                    Ok(frame) => dispatch_frame(hub, registry.as_ref(), sid, frame).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    debug!(%sid, code = e.error_code(), "Rejected client frame");
                    hub.send_frame(sid, &e.to_frame()).await;
                }
            }
            None => match ClientFrame::parse(text) {
                Ok(ClientFrame::Register { username }) => {
                    // Re-check at register time; a ban may have landed
                    // after the accept check.
                    if hub.bans().contains(ip) {
                        let frame = ServerFrame::error(BANNED_MESSAGE);
                        let _ = tx.send(Outbound::Frame(frame.to_json())).await;
                        let _ = tx.send(Outbound::Close).await;
                        return;
                    }
                    match hub
                        .register(tx.clone(), ip.to_string(), username.as_deref())
                        .await
                    {
                        Ok(sid) => *session = Some(sid),
                        Err(e) => {
                            debug!(ip = %ip, code = e.error_code(), "Registration rejected");
                            let _ = tx.send(Outbound::Frame(e.to_frame().to_json())).await;
                            let _ = tx.send(Outbound::Close).await;
                        }
                    }
                }
                Ok(_) => {
                    let frame = ServerFrame::error("Must register first");
                    let _ = tx.send(Outbound::Frame(frame.to_json())).await;
                }
                Err(e) => {
                    let _ = tx.send(Outbound::Frame(e.to_frame().to_json())).await;
                }
            },
        }
    }
}

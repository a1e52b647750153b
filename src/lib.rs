//! chatterd - a real-time multi-user chat server.
//!
//! Clients speak framed JSON over WebSocket. The server routes room-scoped
//! chat, direct (opaque-ciphertext) messages, and broadcasts, on top of a
//! session/identity registry, a persistent room catalog, an IP ban store,
//! flood suppression, and a rotating admin credential.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod network;
pub mod proto;
pub mod security;
pub mod server;
pub mod state;

pub use config::Config;
pub use server::Server;

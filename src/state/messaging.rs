//! Message routing: room-scoped chat, private delivery, key registration.

use crate::error::{DispatchError, DispatchResult};
use crate::proto::{now_iso, ServerFrame};
use crate::state::{Delivery, Hub, SessionId, World};
use std::time::{Duration, Instant};
use tracing::info;

pub const FLOOD_MESSAGE: &str =
    "Flood protection: You are sending messages too quickly. Please wait before sending more.";

impl World {
    /// Admit one user-originated message against the sender's window.
    fn admit_message(&mut self, username: &str, window: Duration, limit: usize) -> bool {
        self.rate
            .entry(username.to_string())
            .or_default()
            .try_admit(Instant::now(), window, limit)
    }
}

impl Hub {
    fn flood_params(&self) -> (Duration, usize) {
        (
            Duration::from_secs(self.config.security.flood_window_secs),
            self.config.security.flood_max_messages,
        )
    }

    /// Route a chat line to every member of `room`, sender included.
    pub async fn chat(&self, sid: SessionId, room: &str, content: &str) -> DispatchResult {
        let (window, limit) = self.flood_params();
        let deliveries = {
            let mut w = self.world().write();
            let Some(session) = w.sessions.get(&sid) else {
                return Ok(());
            };
            let username = session.username.clone();
            let is_admin = session.is_admin;
            if !w.memberships.is_member(&username, room) {
                return Err(DispatchError::Policy(format!(
                    "You are not in room {room}"
                )));
            }
            if !is_admin && !w.admit_message(&username, window, limit) {
                return Err(DispatchError::Policy(FLOOD_MESSAGE.to_string()));
            }
            let frame = ServerFrame::Message {
                username,
                content: content.to_string(),
                timestamp: now_iso(),
                is_admin,
            };
            w.to_room(room, &frame, None)
        };
        self.deliver(deliveries).await;
        Ok(())
    }

    /// Deliver an opaque ciphertext to exactly one live session. Room
    /// membership is irrelevant here.
    pub async fn private(
        &self,
        sid: SessionId,
        recipient: &str,
        encrypted_content: &str,
    ) -> DispatchResult {
        let (window, limit) = self.flood_params();
        let deliveries = {
            let mut w = self.world().write();
            let Some(session) = w.sessions.get(&sid) else {
                return Ok(());
            };
            let from_username = session.username.clone();
            let is_admin = session.is_admin;
            if !is_admin && !w.admit_message(&from_username, window, limit) {
                return Err(DispatchError::Policy(FLOOD_MESSAGE.to_string()));
            }
            let Some(target) = w.find_by_username(recipient) else {
                return Err(DispatchError::NotFound(
                    "User not found or offline".to_string(),
                ));
            };
            let frame = ServerFrame::PrivateMessage {
                from_username,
                encrypted_content: encrypted_content.to_string(),
                timestamp: now_iso(),
                is_admin,
            };
            vec![Delivery {
                sid: target.id,
                tx: target.tx.clone(),
                item: crate::state::Outbound::Frame(frame.to_json()),
            }]
        };
        self.deliver(deliveries).await;
        Ok(())
    }

    /// Store or overwrite the session's public key and refresh rosters.
    pub async fn register_key(&self, sid: SessionId, public_key: String) -> DispatchResult {
        let (username, deliveries) = {
            let mut w = self.world().write();
            let Some(session) = w.sessions.get(&sid) else {
                return Ok(());
            };
            let username = session.username.clone();
            w.public_keys.insert(username.clone(), public_key);

            let mut deliveries = w.to_session(
                sid,
                &ServerFrame::KeyRegistered {
                    message: "Public key registered successfully".to_string(),
                },
            );
            let users = w.users_list_frame();
            deliveries.extend(w.to_all(&users));
            for room in w.memberships.rooms_of(&username) {
                let roster = w.room_users_frame(&room);
                deliveries.extend(w.to_room(&room, &roster, None));
            }
            (username, deliveries)
        };
        self.deliver(deliveries).await;
        info!(username = %username, "Public key registered");
        Ok(())
    }
}

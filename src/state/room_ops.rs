//! Room membership operations and their catalog interplay.
//!
//! The catalog is the source of truth for room existence; the in-memory
//! indexes mirror it for live routing. Membership writes are best-effort
//! (memory wins on storage failure), while room creation and deletion
//! must reach the catalog or fail.

use crate::error::{DispatchError, DispatchResult};
use crate::proto::{now_iso, ServerFrame};
use crate::state::{Delivery, Hub, Outbound, SessionId, MAIN_ROOM};
use tracing::{info, warn};

impl Hub {
    fn username_of(&self, sid: SessionId) -> Option<String> {
        self.world()
            .read()
            .sessions
            .get(&sid)
            .map(|s| s.username.clone())
    }

    /// Join a room. Idempotent; the join is announced either way.
    pub async fn join_room(&self, sid: SessionId, room: &str) -> DispatchResult {
        let Some(username) = self.username_of(sid) else {
            return Ok(());
        };
        let exists = self.world().read().active_rooms.contains(room);
        if !exists {
            return Err(DispatchError::NotFound(format!(
                "Room '{room}' does not exist"
            )));
        }
        if let Err(e) = self.db.rooms().join(&username, room).await {
            warn!(username = %username, room = %room, error = %e, "Failed to persist membership");
        }

        let deliveries = {
            let mut w = self.world().write();
            w.memberships.join(&username, room);
            let mut deliveries = w.to_session(
                sid,
                &ServerFrame::RoomJoined {
                    room_name: room.to_string(),
                    message: format!("Joined room '{room}'"),
                },
            );
            deliveries.extend(w.to_room(
                room,
                &ServerFrame::UserJoinedRoom {
                    username: username.clone(),
                    message: format!("{username} joined the room"),
                    timestamp: now_iso(),
                },
                Some(sid),
            ));
            let roster = w.room_users_frame(room);
            deliveries.extend(w.to_room(room, &roster, None));
            deliveries
        };
        self.deliver(deliveries).await;
        info!(username = %username, room = %room, "Joined room");
        Ok(())
    }

    /// Leave a room. `main` is permanent; leaving a room one is not in
    /// succeeds idempotently.
    pub async fn leave_room(&self, sid: SessionId, room: &str) -> DispatchResult {
        if room == MAIN_ROOM {
            return Err(DispatchError::Policy("Cannot leave the main room".to_string()));
        }
        let Some(username) = self.username_of(sid) else {
            return Ok(());
        };
        if let Err(e) = self.db.rooms().leave(&username, room).await {
            warn!(username = %username, room = %room, error = %e, "Failed to remove persisted membership");
        }

        let deliveries = {
            let mut w = self.world().write();
            w.memberships.leave(&username, room);
            let mut deliveries = w.to_session(
                sid,
                &ServerFrame::RoomLeft {
                    room_name: room.to_string(),
                    message: format!("Left room '{room}'"),
                },
            );
            // The leaver is already out of the index, so the announcement
            // naturally reaches only the remaining members.
            deliveries.extend(w.to_room(
                room,
                &ServerFrame::UserLeftRoom {
                    username: username.clone(),
                    message: format!("{username} left the room"),
                    timestamp: now_iso(),
                },
                None,
            ));
            let roster = w.room_users_frame(room);
            deliveries.extend(w.to_room(room, &roster, None));
            deliveries
        };
        self.deliver(deliveries).await;
        info!(username = %username, room = %room, "Left room");
        Ok(())
    }

    /// `/left`: leave the most recently joined room other than `main`.
    pub async fn leave_last_room(&self, sid: SessionId) -> DispatchResult {
        let Some(username) = self.username_of(sid) else {
            return Ok(());
        };
        let last = self.world().read().memberships.last_joined_non_main(&username);
        match last {
            Some(room) => self.leave_room(sid, &room).await,
            None => Err(DispatchError::Policy(
                "You are only in the main room and cannot leave it".to_string(),
            )),
        }
    }

    /// Create a room. The catalog write must succeed; a name clash is a
    /// conflict even when the existing row is soft-deleted.
    pub async fn create_room(&self, sid: SessionId, room: &str) -> DispatchResult {
        let Some(username) = self.username_of(sid) else {
            return Ok(());
        };
        self.db
            .rooms()
            .create(room, &username)
            .await
            .map_err(|e| match e {
                crate::db::DbError::RoomExists(_) => {
                    DispatchError::Conflict(format!("Room '{room}' already exists"))
                }
                other => DispatchError::Storage(format!("Error creating room: {other}")),
            })?;
        self.world().write().active_rooms.insert(room.to_string());

        let rooms_list = self.rooms_list_frame().await;
        let deliveries = {
            let w = self.world().read();
            let mut deliveries = w.to_session(
                sid,
                &ServerFrame::RoomCreated {
                    message: format!("Room '{room}' created successfully"),
                },
            );
            deliveries.extend(w.to_all(&rooms_list));
            deliveries
        };
        self.deliver(deliveries).await;
        info!(room = %room, created_by = %username, "Room created");
        Ok(())
    }

    /// Delete a room: soft-delete in the catalog, detach every live
    /// member, and notify them before the indexes forget the room.
    pub async fn delete_room(&self, sid: SessionId, room: &str) -> DispatchResult {
        if room == MAIN_ROOM {
            return Err(DispatchError::Policy("Cannot delete the main room".to_string()));
        }
        let Some(actor) = self.username_of(sid) else {
            return Ok(());
        };
        let deleted = self
            .db
            .rooms()
            .delete(room)
            .await
            .map_err(|e| DispatchError::Storage(format!("Error deleting room: {e}")))?;
        if !deleted {
            return Err(DispatchError::NotFound(format!(
                "Room '{room}' does not exist"
            )));
        }

        let member_deliveries = {
            let mut w = self.world().write();
            w.active_rooms.remove(room);
            let members = w.memberships.drop_room(room);

            let mut deliveries = w.to_session(
                sid,
                &ServerFrame::RoomDeleted {
                    room_name: None,
                    message: format!("Room '{room}' deleted successfully"),
                    timestamp: None,
                },
            );
            let notice = ServerFrame::RoomDeleted {
                room_name: Some(room.to_string()),
                message: format!("Room {room} has been deleted by {actor}"),
                timestamp: Some(now_iso()),
            };
            let json = notice.to_json_in(room);
            for member in &members {
                if let Some(target) = w.find_by_username(member) {
                    deliveries.push(Delivery {
                        sid: target.id,
                        tx: target.tx.clone(),
                        item: Outbound::Frame(json.clone()),
                    });
                }
            }
            deliveries
        };
        self.deliver(member_deliveries).await;

        let rooms_list = self.rooms_list_frame().await;
        let deliveries = self.world().read().to_all(&rooms_list);
        self.deliver(deliveries).await;
        info!(room = %room, deleted_by = %actor, "Room deleted");
        Ok(())
    }

    /// Direct `rooms_list` reply.
    pub async fn get_rooms(&self, sid: SessionId) -> DispatchResult {
        let frame = self.rooms_list_frame().await;
        self.send_frame(sid, &frame).await;
        Ok(())
    }

    /// Direct `room_users_list` reply for one room.
    pub async fn get_room_users(&self, sid: SessionId, room: &str) -> DispatchResult {
        let frame = self.world().read().room_users_frame(room);
        self.send_frame(sid, &frame).await;
        Ok(())
    }
}

//! Privileged mutations and identity changes: elevation, rename, kick,
//! ban, user inspection.

use crate::error::{DispatchError, DispatchResult};
use crate::proto::{now_iso, ServerFrame, UserInfoBody};
use crate::state::identity::IdentityError;
use crate::state::{Hub, SessionId};
use tracing::{info, warn};

impl Hub {
    /// `/admin`: constant-time check against the rotating secret. Success
    /// is sticky for the session's lifetime.
    pub async fn elevate(&self, sid: SessionId, password: &str) -> DispatchResult {
        if !self.secret().verify(password) {
            return Err(DispatchError::Authorization(
                "Invalid admin password".to_string(),
            ));
        }
        let (username, deliveries) = {
            let mut w = self.world().write();
            let Some(session) = w.sessions.get_mut(&sid) else {
                return Ok(());
            };
            session.is_admin = true;
            let username = session.username.clone();

            let mut deliveries = w.to_session(
                sid,
                &ServerFrame::AdminSuccess {
                    message: "Admin privileges granted".to_string(),
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
        info!(username = %username, "Session elevated to admin");
        Ok(())
    }

    /// `/changeuname`: atomically swap the identity everywhere — session
    /// record, reservation, key map, rate window, and both membership
    /// views mutate under one guard, so no fan-out observes a half-renamed
    /// identity.
    pub async fn rename(&self, sid: SessionId, new_name: &str) -> DispatchResult {
        let (old, deliveries) = {
            let mut w = self.world().write();
            let Some(session) = w.sessions.get(&sid) else {
                return Ok(());
            };
            let old = session.username.clone();
            w.identities.rename(&old, new_name).map_err(|e| match e {
                IdentityError::Taken => {
                    DispatchError::Conflict(format!("Cannot change username: {e}"))
                }
                other => DispatchError::Validation(format!("Cannot change username: {other}")),
            })?;
            let new = new_name.to_string();
            if let Some(session) = w.sessions.get_mut(&sid) {
                session.username = new.clone();
            }
            if let Some(key) = w.public_keys.remove(&old) {
                w.public_keys.insert(new.clone(), key);
            }
            if let Some(window) = w.rate.remove(&old) {
                w.rate.insert(new.clone(), window);
            }
            w.memberships.rename_user(&old, &new);

            let mut deliveries = w.to_session(
                sid,
                &ServerFrame::UsernameChanged {
                    old_username: old.clone(),
                    new_username: new.clone(),
                    message: format!("Username changed to {new}"),
                },
            );
            for room in w.memberships.rooms_of(&new) {
                deliveries.extend(w.to_room(
                    &room,
                    &ServerFrame::UserRenamed {
                        old_username: old.clone(),
                        new_username: new.clone(),
                        message: format!("{old} changed username to {new}"),
                        timestamp: now_iso(),
                    },
                    Some(sid),
                ));
                let roster = w.room_users_frame(&room);
                deliveries.extend(w.to_room(&room, &roster, None));
            }
            let users = w.users_list_frame();
            deliveries.extend(w.to_all(&users));
            (old, deliveries)
        };

        if let Err(e) = self.db.rooms().rename_user(&old, new_name).await {
            warn!(old = %old, new = %new_name, error = %e, "Failed to rewrite memberships in catalog");
        }
        self.deliver(deliveries).await;
        info!(old = %old, new = %new_name, "Username changed");
        Ok(())
    }

    /// `/kick`: notify the target and its rooms, then close the target's
    /// connection. The teardown path performs the actual unregistration.
    pub async fn kick(&self, actor_sid: SessionId, target_name: &str) -> DispatchResult {
        let (actor, deliveries) = {
            let w = self.world().read();
            let Some(actor) = w.sessions.get(&actor_sid) else {
                return Ok(());
            };
            let actor = actor.username.clone();
            let Some(target) = w.find_by_username(target_name) else {
                return Err(DispatchError::NotFound(format!(
                    "User {target_name} not found"
                )));
            };

            let target_sid = target.id;
            let mut deliveries = w.to_session(
                target_sid,
                &ServerFrame::Kicked {
                    message: format!("You have been kicked by {actor}"),
                },
            );
            for room in w.memberships.rooms_of(target_name) {
                deliveries.extend(w.to_room(
                    &room,
                    &ServerFrame::UserKicked {
                        message: format!("{target_name} was kicked by {actor}"),
                        timestamp: now_iso(),
                    },
                    Some(target_sid),
                ));
            }
            deliveries.extend(w.close_session(target_sid));
            (actor, deliveries)
        };
        self.deliver(deliveries).await;
        info!(target = %target_name, by = %actor, "User kicked");
        Ok(())
    }

    /// `/ban`: record the target's address durably, then kick it off.
    pub async fn ban(&self, actor_sid: SessionId, target_name: &str) -> DispatchResult {
        let (actor, target_ip, deliveries) = {
            let w = self.world().read();
            let Some(actor) = w.sessions.get(&actor_sid) else {
                return Ok(());
            };
            let actor = actor.username.clone();
            let Some(target) = w.find_by_username(target_name) else {
                return Err(DispatchError::NotFound(format!(
                    "User {target_name} not found"
                )));
            };

            let target_sid = target.id;
            let target_ip = target.ip.clone();
            let mut deliveries = w.to_session(
                target_sid,
                &ServerFrame::Banned {
                    message: format!("You have been banned by {actor}"),
                },
            );
            for room in w.memberships.rooms_of(target_name) {
                deliveries.extend(w.to_room(
                    &room,
                    &ServerFrame::UserBanned {
                        message: format!("{target_name} was banned by {actor}"),
                        timestamp: now_iso(),
                    },
                    Some(target_sid),
                ));
            }
            deliveries.extend(w.to_session(
                actor_sid,
                &ServerFrame::BanSuccess {
                    message: format!("{target_name} has been banned"),
                },
            ));
            deliveries.extend(w.close_session(target_sid));
            (actor, target_ip, deliveries)
        };

        self.bans().add(target_ip.clone()).await;
        self.deliver(deliveries).await;
        info!(target = %target_name, ip = %target_ip, by = %actor, "User banned");
        Ok(())
    }

    /// `/userinfo`: admin inspection of one live session.
    pub async fn user_info(&self, actor_sid: SessionId, target_name: &str) -> DispatchResult {
        let deliveries = {
            let w = self.world().read();
            let Some(target) = w.find_by_username(target_name) else {
                return Err(DispatchError::NotFound(format!(
                    "User {target_name} not found"
                )));
            };
            let frame = ServerFrame::UserInfo {
                target: target_name.to_string(),
                info: UserInfoBody {
                    username: target.username.clone(),
                    ip: target.ip.clone(),
                    is_admin: target.is_admin,
                    joined_at: target.joined_at.clone(),
                    rooms: w.memberships.rooms_of(&target.username),
                },
            };
            w.to_session(actor_sid, &frame)
        };
        self.deliver(deliveries).await;
        Ok(())
    }
}

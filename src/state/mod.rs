//! Shared server state.
//!
//! The [`Hub`] supervises every piece of cross-session mutable state:
//! the session table, identity reservations, room membership indexes,
//! public keys, and rate windows all live in one [`World`] behind a
//! single lock, so compound mutations (rename above all) are atomic with
//! respect to fan-out. Outbound I/O never happens under the lock: each
//! operation snapshots its recipient set as [`Delivery`] items and the
//! sends run after release.

mod admin_ops;
pub mod identity;
mod messaging;
pub mod rate;
mod room_ops;
pub mod rooms;
pub mod session;

pub use messaging::FLOOD_MESSAGE;
pub use rooms::MAIN_ROOM;
pub use session::{Outbound, Session, SessionId, SessionIdGenerator};

use crate::config::Config;
use crate::db::Database;
use crate::error::DispatchError;
use crate::proto::{now_iso, ServerFrame, UserEntry};
use crate::security::{AdminSecret, BanStore};
use identity::{IdentityError, IdentityRegistry};
use parking_lot::RwLock;
use rate::RateWindow;
use rooms::RoomIndex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Capacity of the disconnect worker's queue.
const DISCONNECT_CHANNEL_SIZE: usize = 1024;

/// One queued send, snapshotted under the world lock.
pub(crate) struct Delivery {
    pub sid: SessionId,
    pub tx: mpsc::Sender<Outbound>,
    pub item: Outbound,
}

/// All cross-session mutable state, mutated only under the hub's lock.
pub(crate) struct World {
    pub sessions: HashMap<SessionId, Session>,
    pub identities: IdentityRegistry,
    pub memberships: RoomIndex,
    /// Names of active rooms, mirroring the persisted catalog.
    pub active_rooms: HashSet<String>,
    pub public_keys: HashMap<String, String>,
    pub rate: HashMap<String, RateWindow>,
}

impl World {
    fn user_entry(&self, session: &Session) -> UserEntry {
        UserEntry {
            username: session.username.clone(),
            ip: session.ip.clone(),
            is_admin: session.is_admin,
            joined_at: session.joined_at.clone(),
            public_key: self.public_keys.get(&session.username).cloned(),
        }
    }

    /// Exact-match lookup by display name.
    pub fn find_by_username(&self, name: &str) -> Option<&Session> {
        self.sessions.values().find(|s| s.username == name)
    }

    pub fn users_list_frame(&self) -> ServerFrame {
        let mut users: Vec<UserEntry> =
            self.sessions.values().map(|s| self.user_entry(s)).collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        ServerFrame::UsersList { users }
    }

    pub fn room_users_frame(&self, room: &str) -> ServerFrame {
        let mut users: Vec<UserEntry> = self
            .sessions
            .values()
            .filter(|s| self.memberships.is_member(&s.username, room))
            .map(|s| self.user_entry(s))
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        ServerFrame::RoomUsersList {
            room_name: room.to_string(),
            users,
        }
    }

    /// Queue a direct frame to one session.
    pub fn to_session(&self, sid: SessionId, frame: &ServerFrame) -> Vec<Delivery> {
        self.sessions
            .get(&sid)
            .map(|s| Delivery {
                sid,
                tx: s.tx.clone(),
                item: Outbound::Frame(frame.to_json()),
            })
            .into_iter()
            .collect()
    }

    /// Queue a frame to every live session.
    pub fn to_all(&self, frame: &ServerFrame) -> Vec<Delivery> {
        let json = frame.to_json();
        self.sessions
            .values()
            .map(|s| Delivery {
                sid: s.id,
                tx: s.tx.clone(),
                item: Outbound::Frame(json.clone()),
            })
            .collect()
    }

    /// Queue a frame to every member of a room, with the room envelope.
    pub fn to_room(
        &self,
        room: &str,
        frame: &ServerFrame,
        exclude: Option<SessionId>,
    ) -> Vec<Delivery> {
        let json = frame.to_json_in(room);
        self.sessions
            .values()
            .filter(|s| exclude != Some(s.id))
            .filter(|s| self.memberships.is_member(&s.username, room))
            .map(|s| Delivery {
                sid: s.id,
                tx: s.tx.clone(),
                item: Outbound::Frame(json.clone()),
            })
            .collect()
    }

    /// Queue a connection close.
    pub fn close_session(&self, sid: SessionId) -> Vec<Delivery> {
        self.sessions
            .get(&sid)
            .map(|s| Delivery {
                sid,
                tx: s.tx.clone(),
                item: Outbound::Close,
            })
            .into_iter()
            .collect()
    }
}

/// Supervisor owning all shared state. Never exposes its containers; every
/// mutation and dependent read goes through a guarded operation.
pub struct Hub {
    world: RwLock<World>,
    pub(crate) db: Database,
    bans: BanStore,
    secret: Arc<AdminSecret>,
    pub(crate) config: Arc<Config>,
    ids: SessionIdGenerator,
    disconnect_tx: mpsc::Sender<SessionId>,
}

impl Hub {
    /// Build the hub. The returned receiver feeds the disconnect worker,
    /// which unregisters peers whose outbound channel broke.
    pub fn new(
        config: Arc<Config>,
        db: Database,
        bans: BanStore,
        secret: Arc<AdminSecret>,
        active_rooms: Vec<String>,
    ) -> (Arc<Self>, mpsc::Receiver<SessionId>) {
        let (disconnect_tx, disconnect_rx) = mpsc::channel(DISCONNECT_CHANNEL_SIZE);
        let world = World {
            sessions: HashMap::new(),
            identities: IdentityRegistry::new(config.security.auto_name_prefix.clone()),
            memberships: RoomIndex::default(),
            active_rooms: active_rooms.into_iter().collect(),
            public_keys: HashMap::new(),
            rate: HashMap::new(),
        };
        let hub = Arc::new(Self {
            world: RwLock::new(world),
            db,
            bans,
            secret,
            config,
            ids: SessionIdGenerator::default(),
            disconnect_tx,
        });
        (hub, disconnect_rx)
    }

    pub(crate) fn world(&self) -> &RwLock<World> {
        &self.world
    }

    pub(crate) fn secret(&self) -> &AdminSecret {
        &self.secret
    }

    pub fn bans(&self) -> &BanStore {
        &self.bans
    }

    pub fn is_admin(&self, sid: SessionId) -> bool {
        self.world
            .read()
            .sessions
            .get(&sid)
            .is_some_and(|s| s.is_admin)
    }

    /// Perform the queued sends. A failed send means the peer's writer is
    /// gone; it is handed to the disconnect worker rather than unregistered
    /// inline, so fan-out from one operation never recurses into another.
    pub(crate) async fn deliver(&self, deliveries: Vec<Delivery>) {
        for d in deliveries {
            if d.tx.send(d.item).await.is_err() {
                let _ = self.disconnect_tx.send(d.sid).await;
            }
        }
    }

    /// Send one frame directly to a session.
    pub async fn send_frame(&self, sid: SessionId, frame: &ServerFrame) {
        let deliveries = self.world.read().to_session(sid, frame);
        self.deliver(deliveries).await;
    }

    /// Active rooms from the catalog, as a `rooms_list` frame. Catalog
    /// failures degrade to an empty listing.
    pub(crate) async fn rooms_list_frame(&self) -> ServerFrame {
        let rooms = match self.db.rooms().list_active().await {
            Ok(rows) => rows
                .into_iter()
                .map(|r| crate::proto::RoomEntry {
                    name: r.name,
                    created_by: r.created_by,
                    created_at: r.created_at,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list rooms from catalog");
                Vec::new()
            }
        };
        ServerFrame::RoomsList { rooms }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Admit a connection as a registered session.
    ///
    /// Reserves the identity, rehydrates persisted memberships (always
    /// including `main`), and emits the welcome plus the roster
    /// broadcasts.
    pub async fn register(
        &self,
        tx: mpsc::Sender<Outbound>,
        ip: String,
        requested: Option<&str>,
    ) -> Result<SessionId, DispatchError> {
        let sid = self.ids.next();

        let username = {
            let mut w = self.world.write();
            let username = match requested {
                Some(name) => {
                    w.identities.reserve(name, sid).map_err(|e| match e {
                        IdentityError::Taken => {
                            DispatchError::Conflict(format!("Invalid username: {e}"))
                        }
                        other => DispatchError::Validation(format!("Invalid username: {other}")),
                    })?;
                    name.to_string()
                }
                None => w.identities.reserve_auto(sid),
            };
            w.sessions.insert(
                sid,
                Session {
                    id: sid,
                    username: username.clone(),
                    ip: ip.clone(),
                    is_admin: false,
                    joined_at: now_iso(),
                    last_ping: Instant::now(),
                    tx,
                },
            );
            username
        };

        let rooms = self.rehydrate_rooms(&username).await;
        let rooms_list = self.rooms_list_frame().await;

        let deliveries = {
            let mut w = self.world.write();
            for room in &rooms {
                w.memberships.join(&username, room);
            }
            let mut deliveries = w.to_session(
                sid,
                &ServerFrame::Welcome {
                    username: username.clone(),
                    message: format!("Connected as {username}"),
                    rooms: w.memberships.rooms_of(&username),
                },
            );
            deliveries.extend(w.to_room(
                MAIN_ROOM,
                &ServerFrame::UserJoined {
                    username: username.clone(),
                    message: format!("{username} joined the chat"),
                    timestamp: now_iso(),
                },
                Some(sid),
            ));
            let users = w.users_list_frame();
            deliveries.extend(w.to_all(&users));
            deliveries.extend(w.to_all(&rooms_list));
            for room in &rooms {
                let roster = w.room_users_frame(room);
                deliveries.extend(w.to_room(room, &roster, None));
            }
            deliveries
        };
        self.deliver(deliveries).await;

        info!(%sid, username = %username, ip = %ip, "Session registered");
        Ok(sid)
    }

    /// Load the identity's persisted memberships and force `main`.
    async fn rehydrate_rooms(&self, username: &str) -> Vec<String> {
        let mut rooms = match self.db.rooms().rooms_of(username).await {
            Ok(rooms) => rooms,
            Err(e) => {
                warn!(username = %username, error = %e, "Failed to load memberships from catalog");
                Vec::new()
            }
        };
        if !rooms.iter().any(|r| r == MAIN_ROOM) {
            if let Err(e) = self.db.rooms().join(username, MAIN_ROOM).await {
                warn!(username = %username, error = %e, "Failed to persist main membership");
            }
            rooms.insert(0, MAIN_ROOM.to_string());
        }
        rooms
    }

    /// Drain a session's entire footprint. Idempotent; safe to call from
    /// connection teardown, the disconnect worker, and the sweep at once.
    pub async fn unregister(&self, sid: SessionId) {
        let deliveries = {
            let mut w = self.world.write();
            let Some(session) = w.sessions.remove(&sid) else {
                return;
            };
            let username = session.username;
            let rooms = w.memberships.remove_user(&username);
            w.identities.release(&username);
            w.public_keys.remove(&username);
            w.rate.remove(&username);

            let mut deliveries = Vec::new();
            for room in &rooms {
                deliveries.extend(w.to_room(
                    room,
                    &ServerFrame::UserLeft {
                        username: username.clone(),
                        message: format!("{username} left {room}"),
                        timestamp: now_iso(),
                    },
                    None,
                ));
                let roster = w.room_users_frame(room);
                deliveries.extend(w.to_room(room, &roster, None));
            }
            let users = w.users_list_frame();
            deliveries.extend(w.to_all(&users));
            info!(%sid, username = %username, "Session unregistered");
            deliveries
        };
        self.deliver(deliveries).await;
    }

    /// Application-level ping: refresh liveness and answer `pong`.
    pub async fn ping(&self, sid: SessionId) -> Result<(), DispatchError> {
        let deliveries = {
            let mut w = self.world.write();
            let Some(session) = w.sessions.get_mut(&sid) else {
                return Ok(());
            };
            session.last_ping = Instant::now();
            w.to_session(
                sid,
                &ServerFrame::Pong {
                    timestamp: now_iso(),
                },
            )
        };
        self.deliver(deliveries).await;
        Ok(())
    }

    /// Transport-level pong observed by the connection loop.
    pub fn touch_liveness(&self, sid: SessionId) {
        if let Some(session) = self.world.write().sessions.get_mut(&sid) {
            session.last_ping = Instant::now();
        }
    }

    /// Periodic liveness sweep: ping every live session through its
    /// outbound queue and reap peers whose writer is gone.
    pub async fn sweep(&self) {
        let targets: Vec<(SessionId, mpsc::Sender<Outbound>)> = {
            let w = self.world.read();
            w.sessions.values().map(|s| (s.id, s.tx.clone())).collect()
        };
        let mut dead = Vec::new();
        for (sid, tx) in targets {
            match tx.try_send(Outbound::Ping) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Closed(_)) => dead.push(sid),
                // A full queue means the writer is busy, not broken.
                Err(mpsc::error::TrySendError::Full(_)) => {}
            }
        }
        for sid in dead {
            self.unregister(sid).await;
        }
    }
}

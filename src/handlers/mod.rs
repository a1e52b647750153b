//! Frame dispatch and the slash-command registry.
//!
//! Post-registration frames arrive here already parsed; the dispatcher
//! routes them by kind, and text starting with `/` goes through a table
//! of command handlers, each tagged with whether it requires admin.

mod commands;

pub use commands::HELP_TEXT;

use crate::error::{DispatchError, DispatchResult};
use crate::proto::ClientFrame;
use crate::state::{Hub, SessionId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Handler context passed to each command handler.
pub struct Context<'a> {
    /// The acting session.
    pub sid: SessionId,
    /// Shared server state.
    pub hub: &'a Arc<Hub>,
}

/// Trait implemented by all slash-command handlers.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle the command. `args` is everything after the first space,
    /// verbatim.
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> DispatchResult;

    /// Message sent when a non-admin invokes an admin-only command.
    fn admin_denial(&self) -> &'static str {
        "Admin privileges required"
    }
}

struct Entry {
    handler: Box<dyn CommandHandler>,
    requires_admin: bool,
}

/// Registry of slash-command handlers.
pub struct Registry {
    commands: HashMap<&'static str, Entry>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut commands: HashMap<&'static str, Entry> = HashMap::new();
        let mut add = |name: &'static str, requires_admin: bool, handler: Box<dyn CommandHandler>| {
            commands.insert(name, Entry { handler, requires_admin });
        };

        add("changeuname", false, Box::new(commands::ChangeUnameHandler));
        add("admin", false, Box::new(commands::AdminHandler));
        add("help", false, Box::new(commands::HelpHandler));

        add("join", false, Box::new(commands::JoinHandler));
        add("left", false, Box::new(commands::LeftHandler));
        add("createroom", true, Box::new(commands::CreateRoomHandler));
        add("deleteroom", true, Box::new(commands::DeleteRoomHandler));

        add("kick", true, Box::new(commands::KickHandler));
        add("ban", true, Box::new(commands::BanHandler));
        add("userinfo", true, Box::new(commands::UserInfoHandler));

        Self { commands }
    }

    /// Run a command if it is known. `None` means "not a command": the
    /// caller routes the line as ordinary chat.
    pub async fn dispatch(
        &self,
        ctx: &Context<'_>,
        name: &str,
        args: &str,
    ) -> Option<DispatchResult> {
        let entry = self.commands.get(name)?;
        if entry.requires_admin && !ctx.hub.is_admin(ctx.sid) {
            return Some(Err(DispatchError::Authorization(
                entry.handler.admin_denial().to_string(),
            )));
        }
        Some(entry.handler.handle(ctx, args).await)
    }
}

/// Route one parsed frame from a registered session.
pub async fn dispatch_frame(
    hub: &Arc<Hub>,
    registry: &Registry,
    sid: SessionId,
    frame: ClientFrame,
) -> DispatchResult {
    match frame {
        // Only honored as the first frame of a connection.
        ClientFrame::Register { .. } => Ok(()),
        ClientFrame::Ping => hub.ping(sid).await,
        ClientFrame::RegisterKey {
            public_key: Some(key),
        } => hub.register_key(sid, key).await,
        ClientFrame::RegisterKey { public_key: None } => Ok(()),
        ClientFrame::Private {
            recipient: Some(recipient),
            encrypted_content: Some(content),
        } => hub.private(sid, &recipient, &content).await,
        ClientFrame::Private { .. } => Ok(()),
        ClientFrame::GetRooms => hub.get_rooms(sid).await,
        ClientFrame::GetRoomUsers { room } => hub.get_room_users(sid, &room).await,
        ClientFrame::JoinRoom { room: Some(room) } => hub.join_room(sid, &room).await,
        ClientFrame::JoinRoom { room: None } => Ok(()),
        ClientFrame::LeaveRoom { room: Some(room) } => hub.leave_room(sid, &room).await,
        ClientFrame::LeaveRoom { room: None } => Ok(()),
        ClientFrame::Text { content, room } => {
            let content = content.trim();
            if content.is_empty() {
                return Ok(());
            }
            if let Some(rest) = content.strip_prefix('/') {
                let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
                let ctx = Context { sid, hub };
                if let Some(result) = registry.dispatch(&ctx, name, args).await {
                    return result;
                }
                // Unknown commands fall through as ordinary chat.
            }
            hub.chat(sid, &room, content).await
        }
    }
}

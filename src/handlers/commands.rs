//! Slash-command handlers.

use super::{CommandHandler, Context};
use crate::error::{DispatchError, DispatchResult};
use crate::proto::ServerFrame;
use async_trait::async_trait;

pub const HELP_TEXT: &str = "Commands: /admin <password>, /changeuname <new_username>, \
/kick <username>, /ban <username>, /userinfo <username>, /join #room-name, /left, \
/createroom <n> (admin), /deleteroom <n> (admin)";

/// Validate a room name, stripping one leading `#`.
fn validate_room_name(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("Room name cannot be empty".to_string());
    }
    let name = raw.strip_prefix('#').unwrap_or(raw);
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(
            "Room name can only contain letters, numbers, underscore, and hyphen".to_string(),
        );
    }
    if name.len() < 2 || name.len() > 20 {
        return Err("Room name must be between 2 and 20 characters".to_string());
    }
    Ok(name.to_string())
}

fn invalid_room(message: String) -> DispatchError {
    DispatchError::Validation(format!("Invalid room name: {message}"))
}

pub struct ChangeUnameHandler;

#[async_trait]
impl CommandHandler for ChangeUnameHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> DispatchResult {
        if args.is_empty() {
            return Err(DispatchError::Validation(
                "Usage: /changeuname <new_username>".to_string(),
            ));
        }
        ctx.hub.rename(ctx.sid, args).await
    }
}

pub struct AdminHandler;

#[async_trait]
impl CommandHandler for AdminHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> DispatchResult {
        ctx.hub.elevate(ctx.sid, args).await
    }
}

pub struct KickHandler;

#[async_trait]
impl CommandHandler for KickHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> DispatchResult {
        ctx.hub.kick(ctx.sid, args).await
    }
}

pub struct BanHandler;

#[async_trait]
impl CommandHandler for BanHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> DispatchResult {
        ctx.hub.ban(ctx.sid, args).await
    }
}

pub struct UserInfoHandler;

#[async_trait]
impl CommandHandler for UserInfoHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> DispatchResult {
        ctx.hub.user_info(ctx.sid, args).await
    }
}

pub struct JoinHandler;

#[async_trait]
impl CommandHandler for JoinHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> DispatchResult {
        if args.is_empty() {
            return Err(DispatchError::Validation(
                "Usage: /join #room-name".to_string(),
            ));
        }
        let room = validate_room_name(args).map_err(invalid_room)?;
        ctx.hub.join_room(ctx.sid, &room).await
    }
}

pub struct LeftHandler;

#[async_trait]
impl CommandHandler for LeftHandler {
    async fn handle(&self, ctx: &Context<'_>, _args: &str) -> DispatchResult {
        ctx.hub.leave_last_room(ctx.sid).await
    }
}

pub struct CreateRoomHandler;

#[async_trait]
impl CommandHandler for CreateRoomHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> DispatchResult {
        if args.is_empty() {
            return Err(DispatchError::Validation(
                "Usage: /createroom room-name".to_string(),
            ));
        }
        let room = validate_room_name(args).map_err(invalid_room)?;
        ctx.hub.create_room(ctx.sid, &room).await
    }

    fn admin_denial(&self) -> &'static str {
        "Admin privileges required to create rooms"
    }
}

pub struct DeleteRoomHandler;

#[async_trait]
impl CommandHandler for DeleteRoomHandler {
    async fn handle(&self, ctx: &Context<'_>, args: &str) -> DispatchResult {
        if args.is_empty() {
            return Err(DispatchError::Validation(
                "Usage: /deleteroom room-name".to_string(),
            ));
        }
        let room = validate_room_name(args).map_err(invalid_room)?;
        ctx.hub.delete_room(ctx.sid, &room).await
    }

    fn admin_denial(&self) -> &'static str {
        "Admin privileges required to delete rooms"
    }
}

pub struct HelpHandler;

#[async_trait]
impl CommandHandler for HelpHandler {
    async fn handle(&self, ctx: &Context<'_>, _args: &str) -> DispatchResult {
        ctx.hub
            .send_frame(
                ctx.sid,
                &ServerFrame::Help {
                    message: HELP_TEXT.to_string(),
                },
            )
            .await;
        Ok(())
    }
}

//! Unified error handling for chatterd.
//!
//! Every rejected client action maps to exactly one outbound `error` frame;
//! the variants below carry the user-facing message and classify the
//! failure for log labeling.

use crate::proto::ServerFrame;
use thiserror::Error;

/// Errors raised while dispatching a client frame.
///
/// All variants except `Parse` carry the exact message delivered back to
/// the origin session.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Bad name, room, length, grammar, or empty payload.
    #[error("{0}")]
    Validation(String),

    /// Admin-only operation by a non-admin, or a wrong admin secret.
    #[error("{0}")]
    Authorization(String),

    /// Unknown target user or room.
    #[error("{0}")]
    NotFound(String),

    /// Name already taken, room already exists.
    #[error("{0}")]
    Conflict(String),

    /// Flood suppression, or an attempt to leave/delete `main`.
    #[error("{0}")]
    Policy(String),

    /// Inbound frame was not valid JSON.
    #[error("Invalid message format")]
    Parse,

    /// Catalog or ban-store I/O failure that cannot be absorbed.
    #[error("{0}")]
    Storage(String),
}

impl DispatchError {
    /// Static error code for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Authorization(_) => "authorization",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Policy(_) => "policy",
            Self::Parse => "parse",
            Self::Storage(_) => "storage",
        }
    }

    /// Convert into the single `error` frame sent back to the origin.
    pub fn to_frame(&self) -> ServerFrame {
        ServerFrame::error(self.to_string())
    }
}

/// Result type for frame and command handlers.
pub type DispatchResult = Result<(), DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(DispatchError::Parse.error_code(), "parse");
        assert_eq!(
            DispatchError::Policy("flood".into()).error_code(),
            "policy"
        );
        assert_eq!(
            DispatchError::Conflict("taken".into()).error_code(),
            "conflict"
        );
    }

    #[test]
    fn parse_error_message_is_fixed() {
        assert_eq!(DispatchError::Parse.to_string(), "Invalid message format");
    }

    #[test]
    fn to_frame_carries_the_message() {
        let frame = DispatchError::NotFound("User bob not found".into()).to_frame();
        let json = frame.to_json();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("User bob not found"));
    }
}

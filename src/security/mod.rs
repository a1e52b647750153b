//! Security: the persistent ban set and the rotating admin credential.

pub mod bans;
pub mod secret;

pub use bans::BanStore;
pub use secret::AdminSecret;

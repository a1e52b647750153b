//! Identity reservation: grammar validation, case-insensitive uniqueness,
//! auto-allocation, and atomic renames.

use crate::state::session::SessionId;
use std::collections::HashMap;
use thiserror::Error;

/// Why a name cannot be reserved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("Username cannot be empty")]
    Empty,

    #[error("Username can only contain letters, numbers, underscore, and hyphen")]
    Grammar,

    #[error("Username must be between 2 and 20 characters")]
    Length,

    #[error("Username is already taken")]
    Taken,
}

/// Check the identity grammar: `[A-Za-z0-9_-]`, length 2..=20.
pub fn validate_name(name: &str) -> Result<(), IdentityError> {
    if name.is_empty() {
        return Err(IdentityError::Empty);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(IdentityError::Grammar);
    }
    if name.len() < 2 || name.len() > 20 {
        return Err(IdentityError::Length);
    }
    Ok(())
}

/// Reserved identities, keyed case-folded. The display form lives on the
/// owning session; this registry only answers availability and lookup.
#[derive(Debug)]
pub struct IdentityRegistry {
    taken: HashMap<String, SessionId>,
    auto_prefix: String,
    auto_counter: u32,
}

impl IdentityRegistry {
    pub fn new(auto_prefix: String) -> Self {
        Self {
            taken: HashMap::new(),
            auto_prefix,
            auto_counter: 0,
        }
    }

    fn fold(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    /// Reserve a caller-chosen name for `sid`.
    pub fn reserve(&mut self, name: &str, sid: SessionId) -> Result<(), IdentityError> {
        validate_name(name)?;
        let key = Self::fold(name);
        if self.taken.contains_key(&key) {
            return Err(IdentityError::Taken);
        }
        self.taken.insert(key, sid);
        Ok(())
    }

    /// Allocate the next free auto name (prefix + 4-digit counter).
    pub fn reserve_auto(&mut self, sid: SessionId) -> String {
        loop {
            self.auto_counter += 1;
            let candidate = format!("{}{:04}", self.auto_prefix, self.auto_counter);
            let key = Self::fold(&candidate);
            if !self.taken.contains_key(&key) {
                self.taken.insert(key, sid);
                return candidate;
            }
        }
    }

    /// Idempotent removal.
    pub fn release(&mut self, name: &str) {
        self.taken.remove(&Self::fold(name));
    }

    /// Atomically swap `old` for `new`. On any error the reservation for
    /// `old` is untouched.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<(), IdentityError> {
        validate_name(new)?;
        let old_key = Self::fold(old);
        let new_key = Self::fold(new);
        // A pure case change of one's own name is not a collision.
        if self.taken.contains_key(&new_key) && new_key != old_key {
            return Err(IdentityError::Taken);
        }
        match self.taken.remove(&old_key) {
            Some(sid) => {
                self.taken.insert(new_key, sid);
                Ok(())
            }
            None => Err(IdentityError::Empty),
        }
    }

    /// Case-folded lookup.
    pub fn lookup(&self, name: &str) -> Option<SessionId> {
        self.taken.get(&Self::fold(name)).copied()
    }
}

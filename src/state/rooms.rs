//! In-memory room membership: a bag of (user, room) tuples maintained as
//! two lookup views that are always mutated together.
//!
//! `user_rooms` preserves join order so "the most recently joined
//! non-main room" is well defined for `/left`.

use std::collections::{HashMap, HashSet};

pub const MAIN_ROOM: &str = "main";

#[derive(Debug, Default)]
pub struct RoomIndex {
    room_users: HashMap<String, HashSet<String>>,
    user_rooms: HashMap<String, Vec<String>>,
}

impl RoomIndex {
    /// Add a membership. Returns false if it already existed.
    pub fn join(&mut self, user: &str, room: &str) -> bool {
        let members = self.room_users.entry(room.to_string()).or_default();
        if !members.insert(user.to_string()) {
            return false;
        }
        self.user_rooms
            .entry(user.to_string())
            .or_default()
            .push(room.to_string());
        true
    }

    /// Remove a membership. Returns false if it did not exist.
    pub fn leave(&mut self, user: &str, room: &str) -> bool {
        let existed = self
            .room_users
            .get_mut(room)
            .is_some_and(|members| members.remove(user));
        if let Some(rooms) = self.user_rooms.get_mut(user) {
            rooms.retain(|r| r != room);
        }
        existed
    }

    /// Drop every membership of `user`, returning the rooms they were in
    /// (join order).
    pub fn remove_user(&mut self, user: &str) -> Vec<String> {
        let rooms = self.user_rooms.remove(user).unwrap_or_default();
        for room in &rooms {
            if let Some(members) = self.room_users.get_mut(room) {
                members.remove(user);
            }
        }
        rooms
    }

    /// Rewrite both views for an identity rename.
    pub fn rename_user(&mut self, old: &str, new: &str) {
        if let Some(rooms) = self.user_rooms.remove(old) {
            for room in &rooms {
                if let Some(members) = self.room_users.get_mut(room) {
                    members.remove(old);
                    members.insert(new.to_string());
                }
            }
            self.user_rooms.insert(new.to_string(), rooms);
        }
    }

    /// Drop a room entirely, returning its former members.
    pub fn drop_room(&mut self, room: &str) -> Vec<String> {
        let members: Vec<String> = self
            .room_users
            .remove(room)
            .map(|m| m.into_iter().collect())
            .unwrap_or_default();
        for user in &members {
            if let Some(rooms) = self.user_rooms.get_mut(user) {
                rooms.retain(|r| r != room);
            }
        }
        members
    }

    pub fn is_member(&self, user: &str, room: &str) -> bool {
        self.room_users
            .get(room)
            .is_some_and(|members| members.contains(user))
    }

    /// Rooms of a user, in join order.
    pub fn rooms_of(&self, user: &str) -> Vec<String> {
        self.user_rooms.get(user).cloned().unwrap_or_default()
    }

    pub fn members_of(&self, room: &str) -> Vec<String> {
        self.room_users
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The most recently joined room other than `main`, if any.
    pub fn last_joined_non_main(&self, user: &str) -> Option<String> {
        self.user_rooms
            .get(user)?
            .iter()
            .rev()
            .find(|r| r.as_str() != MAIN_ROOM)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_is_recorded_in_both_views() {
        let mut idx = RoomIndex::default();
        assert!(idx.join("alice", "main"));
        assert!(!idx.join("alice", "main"));
        assert!(idx.is_member("alice", "main"));
        assert_eq!(idx.rooms_of("alice"), vec!["main"]);
        assert_eq!(idx.members_of("main"), vec!["alice"]);
    }

    #[test]
    fn leave_keeps_views_consistent() {
        let mut idx = RoomIndex::default();
        idx.join("alice", "main");
        idx.join("alice", "lounge");
        assert!(idx.leave("alice", "lounge"));
        assert!(!idx.leave("alice", "lounge"));
        assert_eq!(idx.rooms_of("alice"), vec!["main"]);
        assert!(idx.members_of("lounge").is_empty());
    }

    #[test]
    fn remove_user_reports_all_rooms() {
        let mut idx = RoomIndex::default();
        idx.join("alice", "main");
        idx.join("alice", "lounge");
        idx.join("bob", "lounge");
        let rooms = idx.remove_user("alice");
        assert_eq!(rooms, vec!["main", "lounge"]);
        assert_eq!(idx.members_of("lounge"), vec!["bob"]);
        assert!(idx.rooms_of("alice").is_empty());
    }

    #[test]
    fn rename_rewrites_both_views() {
        let mut idx = RoomIndex::default();
        idx.join("bob", "main");
        idx.join("bob", "lounge");
        idx.rename_user("bob", "robert");
        assert!(idx.is_member("robert", "lounge"));
        assert!(!idx.is_member("bob", "lounge"));
        assert_eq!(idx.rooms_of("robert"), vec!["main", "lounge"]);
    }

    #[test]
    fn drop_room_detaches_every_member() {
        let mut idx = RoomIndex::default();
        idx.join("alice", "lounge");
        idx.join("bob", "lounge");
        idx.join("bob", "main");
        let mut members = idx.drop_room("lounge");
        members.sort();
        assert_eq!(members, vec!["alice", "bob"]);
        assert_eq!(idx.rooms_of("bob"), vec!["main"]);
    }

    #[test]
    fn last_joined_non_main_follows_join_order() {
        let mut idx = RoomIndex::default();
        idx.join("alice", "main");
        assert_eq!(idx.last_joined_non_main("alice"), None);
        idx.join("alice", "lounge");
        idx.join("alice", "games");
        assert_eq!(idx.last_joined_non_main("alice"), Some("games".into()));
        idx.leave("alice", "games");
        assert_eq!(idx.last_joined_non_main("alice"), Some("lounge".into()));
    }
}

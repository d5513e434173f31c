//! Room membership tracking.
//!
//! [`RoomRegistry`] keeps two indexes that always agree: room name to member
//! connections, and connection to the rooms it belongs to. Rooms exist only
//! while they have members; the last `leave` (or disconnect) removes the
//! entry so the index never accumulates empty rooms.
//!
//! The registry holds no locks. It is owned by the hub task, which applies
//! every mutation to completion before handling the next command.
//!
//! # Example
//!
//! ```rust
//! use socket_broker::rooms::RoomRegistry;
//! use socket_broker::types::ConnectionId;
//!
//! let mut rooms = RoomRegistry::new();
//! let conn = ConnectionId::new();
//!
//! rooms.join(conn, "lobby");
//! assert!(rooms.is_member(conn, "lobby"));
//!
//! rooms.remove_connection(conn);
//! assert_eq!(rooms.room_count(), 0);
//! ```

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::types::ConnectionId;

/// Bidirectional membership index.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// Room name to members. Never contains an empty set.
    members: HashMap<String, HashSet<ConnectionId>>,

    /// Connection to joined rooms. Never contains an empty set.
    memberships: HashMap<ConnectionId, HashSet<String>>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `conn` to `room`.
    ///
    /// Returns `true` if the membership is new. Joining a room twice is a
    /// no-op.
    pub fn join(&mut self, conn: ConnectionId, room: &str) -> bool {
        let added = self
            .members
            .entry(room.to_string())
            .or_default()
            .insert(conn);

        if added {
            self.memberships
                .entry(conn)
                .or_default()
                .insert(room.to_string());
            trace!(connection = %conn, room, "Joined room");
        }
        added
    }

    /// Removes `conn` from `room`.
    ///
    /// Returns `true` if a membership was removed. Leaving a room the
    /// connection is not in is a no-op.
    pub fn leave(&mut self, conn: ConnectionId, room: &str) -> bool {
        let Some(members) = self.members.get_mut(room) else {
            return false;
        };
        if !members.remove(&conn) {
            return false;
        }
        if members.is_empty() {
            self.members.remove(room);
        }

        if let Some(rooms) = self.memberships.get_mut(&conn) {
            rooms.remove(room);
            if rooms.is_empty() {
                self.memberships.remove(&conn);
            }
        }

        trace!(connection = %conn, room, "Left room");
        true
    }

    /// Removes `conn` from every room it belongs to.
    ///
    /// Returns the rooms the connection was removed from.
    pub fn remove_connection(&mut self, conn: ConnectionId) -> Vec<String> {
        let Some(rooms) = self.memberships.remove(&conn) else {
            return Vec::new();
        };

        for room in &rooms {
            if let Some(members) = self.members.get_mut(room) {
                members.remove(&conn);
                if members.is_empty() {
                    self.members.remove(room);
                }
            }
        }

        rooms.into_iter().collect()
    }

    /// Members of `room`; empty if the room does not exist.
    pub fn members(&self, room: &str) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members.get(room).into_iter().flatten().copied()
    }

    /// Rooms `conn` belongs to; empty for unknown connections.
    pub fn rooms_of(&self, conn: ConnectionId) -> impl Iterator<Item = &str> + '_ {
        self.memberships
            .get(&conn)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn is_member(&self, conn: ConnectionId, room: &str) -> bool {
        self.members
            .get(room)
            .is_some_and(|members| members.contains(&conn))
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.members.len()
    }

    /// Checks that both indexes describe the same relation.
    pub fn is_consistent(&self) -> bool {
        let forward = self.members.iter().all(|(room, members)| {
            !members.is_empty()
                && members.iter().all(|conn| {
                    self.memberships
                        .get(conn)
                        .is_some_and(|rooms| rooms.contains(room))
                })
        });
        let backward = self.memberships.iter().all(|(conn, rooms)| {
            !rooms.is_empty()
                && rooms.iter().all(|room| {
                    self.members
                        .get(room)
                        .is_some_and(|members| members.contains(conn))
                })
        });
        forward && backward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_rooms(registry: &RoomRegistry, conn: ConnectionId) -> Vec<String> {
        let mut rooms: Vec<String> = registry.rooms_of(conn).map(String::from).collect();
        rooms.sort();
        rooms
    }

    #[test]
    fn join_creates_room_and_membership() {
        let mut rooms = RoomRegistry::new();
        let conn = ConnectionId::new();

        assert!(rooms.join(conn, "lobby"));
        assert!(rooms.is_member(conn, "lobby"));
        assert_eq!(rooms.members("lobby").collect::<Vec<_>>(), vec![conn]);
        assert_eq!(sorted_rooms(&rooms, conn), vec!["lobby"]);
        assert!(rooms.is_consistent());
    }

    #[test]
    fn join_is_idempotent() {
        let mut rooms = RoomRegistry::new();
        let conn = ConnectionId::new();

        assert!(rooms.join(conn, "lobby"));
        assert!(!rooms.join(conn, "lobby"));

        assert_eq!(rooms.members("lobby").count(), 1);
        assert_eq!(rooms.rooms_of(conn).count(), 1);
        assert_eq!(rooms.room_count(), 1);
        assert!(rooms.is_consistent());
    }

    #[test]
    fn any_string_is_a_valid_room_name() {
        let mut rooms = RoomRegistry::new();
        let conn = ConnectionId::new();

        assert!(rooms.join(conn, ""));
        assert!(rooms.join(conn, "with spaces / and: symbols"));
        assert!(rooms.join(conn, "日本語"));
        assert_eq!(rooms.room_count(), 3);
        assert!(rooms.is_consistent());
    }

    #[test]
    fn leave_non_member_room_is_noop() {
        let mut rooms = RoomRegistry::new();
        let conn = ConnectionId::new();
        let other = ConnectionId::new();
        rooms.join(other, "lobby");

        assert!(!rooms.leave(conn, "lobby"));
        assert!(!rooms.leave(conn, "never-created"));

        assert_eq!(rooms.members("lobby").collect::<Vec<_>>(), vec![other]);
        assert_eq!(rooms.rooms_of(conn).count(), 0);
        assert!(rooms.is_consistent());
    }

    #[test]
    fn leaving_last_member_removes_room() {
        let mut rooms = RoomRegistry::new();
        let conn = ConnectionId::new();
        rooms.join(conn, "lobby");

        assert!(rooms.leave(conn, "lobby"));
        assert_eq!(rooms.room_count(), 0);
        assert_eq!(rooms.members("lobby").count(), 0);
        assert!(rooms.is_consistent());
    }

    #[test]
    fn leave_keeps_other_members() {
        let mut rooms = RoomRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        rooms.join(a, "lobby");
        rooms.join(b, "lobby");

        rooms.leave(a, "lobby");
        assert!(!rooms.is_member(a, "lobby"));
        assert!(rooms.is_member(b, "lobby"));
        assert!(rooms.is_consistent());
    }

    #[test]
    fn remove_connection_clears_every_room() {
        let mut rooms = RoomRegistry::new();
        let c = ConnectionId::new();
        let other = ConnectionId::new();
        rooms.join(c, "A");
        rooms.join(c, "B");
        rooms.join(other, "B");

        let mut removed = rooms.remove_connection(c);
        removed.sort();
        assert_eq!(removed, vec!["A", "B"]);

        assert!(!rooms.members("A").any(|m| m == c));
        assert!(!rooms.members("B").any(|m| m == c));
        assert!(rooms.is_member(other, "B"));
        assert_eq!(rooms.room_count(), 1);
        assert_eq!(rooms.rooms_of(c).count(), 0);
        assert!(rooms.is_consistent());
    }

    #[test]
    fn remove_unknown_connection_is_noop() {
        let mut rooms = RoomRegistry::new();
        assert!(rooms.remove_connection(ConnectionId::new()).is_empty());
        assert!(rooms.is_consistent());
    }

    #[test]
    fn indexes_agree_after_mixed_operations() {
        let mut rooms = RoomRegistry::new();
        let conns: Vec<ConnectionId> = (0..5).map(|_| ConnectionId::new()).collect();
        let names = ["a", "b", "c"];

        for (i, conn) in conns.iter().enumerate() {
            for (j, name) in names.iter().enumerate() {
                if (i + j) % 2 == 0 {
                    rooms.join(*conn, name);
                }
            }
        }
        assert!(rooms.is_consistent());

        rooms.leave(conns[0], "a");
        rooms.leave(conns[1], "b");
        rooms.join(conns[1], "a");
        rooms.leave(conns[2], "z");
        rooms.remove_connection(conns[3]);
        assert!(rooms.is_consistent());

        for conn in &conns {
            for room in sorted_rooms(&rooms, *conn) {
                assert!(rooms.is_member(*conn, &room));
            }
        }
        for name in names {
            for member in rooms.members(name) {
                assert!(rooms.rooms_of(member).any(|r| r == name));
            }
        }
    }
}

//! Room membership registry for the relay server.
//!
//! Maps a room name to the set of endpoints currently in it. Rooms are
//! created by the first join and removed when their last member leaves, so
//! membership always mirrors live connections.
//!
//! Room entries are ephemeral, lost on relay restart, same as connections.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::relay::EndpointId;

/// In-memory map from room name to member endpoints.
///
/// Thread-safe via [`RwLock`]. Broadcasts only need a read lock to snapshot
/// recipients; joins and leaves take the write lock.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, HashSet<EndpointId>>>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Creates a new, empty room registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Adds `endpoint` to `room`, creating the room if needed.
    ///
    /// Returns `true` if the endpoint was not already a member. Joining
    /// twice is not an error.
    pub async fn join(&self, room: &str, endpoint: &EndpointId) -> bool {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room.to_string())
            .or_default()
            .insert(endpoint.clone())
    }

    /// Removes `endpoint` from every room it belongs to.
    ///
    /// Rooms left empty are dropped. Returns the names of the rooms the
    /// endpoint was removed from.
    pub async fn leave_all(&self, endpoint: &EndpointId) -> Vec<String> {
        let mut rooms = self.rooms.write().await;
        let mut left = Vec::new();
        rooms.retain(|name, members| {
            if members.remove(endpoint) {
                left.push(name.clone());
            }
            !members.is_empty()
        });
        left
    }

    /// Returns the members of `room` other than `except`.
    pub async fn others(&self, room: &str, except: &EndpointId) -> Vec<EndpointId> {
        let rooms = self.rooms.read().await;
        rooms.get(room).map_or_else(Vec::new, |members| {
            members.iter().filter(|m| *m != except).cloned().collect()
        })
    }

    /// Returns `true` if `endpoint` is currently a member of `room`.
    #[cfg(test)]
    pub(crate) async fn contains(&self, room: &str, endpoint: &EndpointId) -> bool {
        let rooms = self.rooms.read().await;
        rooms.get(room).is_some_and(|members| members.contains(endpoint))
    }

    /// Returns the number of members in `room` (zero if it does not exist).
    #[cfg(test)]
    pub(crate) async fn member_count(&self, room: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map_or(0, HashSet::len)
    }

    /// Returns the number of non-empty rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

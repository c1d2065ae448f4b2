use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// What happens to a room once its last member leaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyRoomPolicy {
    /// Drop the room entry as soon as it is empty
    Reclaim,
    /// Keep empty rooms around until the process exits
    Retain,
}

impl Default for EmptyRoomPolicy {
    fn default() -> Self {
        EmptyRoomPolicy::Reclaim
    }
}

/// A named broadcast group
#[derive(Debug, Clone)]
pub struct Room {
    /// Client-supplied identifier, compared as an exact string
    pub id: String,
    /// Set of connection IDs currently in the room
    pub members: HashSet<String>,
    /// Timestamp of room creation
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Room {
    pub fn new(id: String) -> Self {
        Self {
            id,
            members: HashSet::new(),
            created_at: chrono::Utc::now(),
        }
    }

    /// Adds a member; returns false if it was already present
    pub fn add_member(&mut self, connection_id: String) -> bool {
        self.members.insert(connection_id)
    }

    /// Removes a member; returns false if it was not present
    pub fn remove_member(&mut self, connection_id: &str) -> bool {
        self.members.remove(connection_id)
    }

    pub fn has_member(&self, connection_id: &str) -> bool {
        self.members.contains(connection_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Manages room membership for every live connection.
///
/// Two maps are kept in step: room id to members, and connection id to the
/// rooms it joined. Writers always take `rooms` before `client_rooms`.
pub struct RoomManager {
    rooms: RwLock<HashMap<String, Room>>,
    client_rooms: RwLock<HashMap<String, HashSet<String>>>,
    policy: EmptyRoomPolicy,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::with_policy(EmptyRoomPolicy::default())
    }

    pub fn with_policy(policy: EmptyRoomPolicy) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            client_rooms: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> EmptyRoomPolicy {
        self.policy
    }

    /// Adds a connection to a room, creating the room on first join.
    /// Returns false when the connection was already a member.
    pub async fn join(&self, room_id: &str, connection_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let mut client_rooms = self.client_rooms.write().await;

        let added = rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                log::debug!("Creating room {}", room_id);
                Room::new(room_id.to_string())
            })
            .add_member(connection_id.to_string());

        client_rooms
            .entry(connection_id.to_string())
            .or_default()
            .insert(room_id.to_string());

        added
    }

    /// Removes a connection from a room.
    /// Returns false when the connection was not a member.
    pub async fn leave(&self, room_id: &str, connection_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let mut client_rooms = self.client_rooms.write().await;

        let removed = Self::detach(&mut rooms, self.policy, room_id, connection_id);

        if let Some(joined) = client_rooms.get_mut(connection_id) {
            joined.remove(room_id);
            if joined.is_empty() {
                client_rooms.remove(connection_id);
            }
        }

        removed
    }

    /// Removes a connection from every room it joined and returns those rooms.
    /// Cost is proportional to the rooms of this connection only.
    pub async fn leave_all(&self, connection_id: &str) -> Vec<String> {
        let mut rooms = self.rooms.write().await;
        let mut client_rooms = self.client_rooms.write().await;

        let joined = match client_rooms.remove(connection_id) {
            Some(joined) => joined,
            None => return Vec::new(),
        };

        for room_id in &joined {
            Self::detach(&mut rooms, self.policy, room_id, connection_id);
        }

        joined.into_iter().collect()
    }

    fn detach(
        rooms: &mut HashMap<String, Room>,
        policy: EmptyRoomPolicy,
        room_id: &str,
        connection_id: &str,
    ) -> bool {
        let Some(room) = rooms.get_mut(room_id) else {
            return false;
        };
        let removed = room.remove_member(connection_id);

        if room.is_empty() && policy == EmptyRoomPolicy::Reclaim {
            rooms.remove(room_id);
            log::debug!("Reclaimed empty room {}", room_id);
        }

        removed
    }

    /// Snapshot of a room's members; unknown rooms have no members
    pub async fn members_of(&self, room_id: &str) -> HashSet<String> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    /// Gets all rooms a connection is in
    pub async fn rooms_of(&self, connection_id: &str) -> HashSet<String> {
        self.client_rooms
            .read()
            .await
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn is_member(&self, room_id: &str, connection_id: &str) -> bool {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map_or(false, |room| room.has_member(connection_id))
    }

    pub async fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.read().await.contains_key(room_id)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Lists all rooms with their member counts
    pub async fn list_rooms(&self) -> Vec<(String, usize)> {
        self.rooms
            .read()
            .await
            .values()
            .map(|room| (room.id.clone(), room.member_count()))
            .collect()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

//! Rooms, participants and the identifiers that key them.
//!
//! These mirror the rows of the remote `rooms` and `room_participants` tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Room identifier (UUID assigned by the data store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(Uuid);

impl RoomId {
    /// Generate a fresh random room id.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for RoomId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// User identifier issued by the auth collaborator.
///
/// The same string is used as the participant identity on the audio transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The signed-in user as seen by the room lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: impl Into<UserId>, display_name: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name,
        }
    }

    /// Name given to a room created without an explicit one.
    #[must_use]
    pub fn default_room_name(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{name}'s Room"),
            _ => format!("{}'s Room", self.user_id),
        }
    }
}

/// A shared room. Rooms are never deleted, only closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub creator_id: UserId,
    pub name: String,
    pub is_private: bool,
    pub is_active: bool,
    pub audio_active: bool,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Room {
    /// Whether the row satisfies `closed_at.is_some() == !is_active`.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.closed_at.is_some() == !self.is_active
    }
}

/// Insert payload for a new room; the store assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoom {
    pub creator_id: UserId,
    pub name: String,
    pub is_private: bool,
}

/// Room membership row, unique per `(room_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub is_muted: bool,
    pub joined_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_room_name_uses_display_name() {
        let profile = UserProfile::new("user-1", Some("Ada".to_string()));
        assert_eq!(profile.default_room_name(), "Ada's Room");
    }

    #[test]
    fn test_default_room_name_falls_back_to_user_id() {
        let profile = UserProfile::new("user-1", None);
        assert_eq!(profile.default_room_name(), "user-1's Room");

        let blank = UserProfile::new("user-2", Some("   ".to_string()));
        assert_eq!(blank.default_room_name(), "user-2's Room");
    }

    #[test]
    fn test_room_consistency() {
        let mut room = Room {
            id: RoomId::new_v4(),
            creator_id: UserId::from("creator"),
            name: "Study Hall".to_string(),
            is_private: false,
            is_active: true,
            audio_active: false,
            created_at: Utc::now(),
            closed_at: None,
        };
        assert!(room.is_consistent());

        room.is_active = false;
        assert!(!room.is_consistent());

        room.closed_at = Some(Utc::now());
        assert!(room.is_consistent());
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let user = UserId::from("abc");
        assert_eq!(serde_json::to_string(&user).unwrap(), "\"abc\"");

        let uuid = Uuid::new_v4();
        let room = RoomId::from(uuid);
        assert_eq!(
            serde_json::to_string(&room).unwrap(),
            format!("\"{uuid}\"")
        );
    }
}

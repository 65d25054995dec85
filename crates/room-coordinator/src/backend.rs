//! Remote data store contract.
//!
//! The coordinator never owns room durability. Everything it persists goes
//! through [`RoomBackend`], which also exposes the push-based change feed used
//! by presence mirroring.

use crate::errors::CoordinatorError;
use crate::models::{NewRoom, Participant, Room, RoomId, UserId};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Tables that publish change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeTable {
    Rooms,
    RoomParticipants,
}

impl ChangeTable {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeTable::Rooms => "rooms",
            ChangeTable::RoomParticipants => "room_participants",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Row-level change pushed by the store. Presence treats every event as a
/// resync trigger, so the payload carries only what is useful for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub kind: ChangeKind,
    pub room_id: Option<RoomId>,
}

/// Subscription filter: all changes on one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: ChangeTable,
}

impl ChangeFilter {
    #[must_use]
    pub fn table(table: ChangeTable) -> Self {
        Self { table }
    }
}

/// Opaque backend subscription identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A live change feed. Events arrive in the order the store emitted them; the
/// receiver closes when the subscription ends.
#[derive(Debug)]
pub struct ChangeFeed {
    pub id: SubscriptionId,
    pub events: mpsc::Receiver<ChangeEvent>,
}

/// Durable record of rooms and participants.
///
/// Implementations map their own failures to
/// [`CoordinatorError::BackendError`].
#[async_trait::async_trait]
pub trait RoomBackend: Send + Sync {
    /// Insert a new active room and return the stored row.
    async fn insert_room(&self, room: NewRoom) -> Result<Room, CoordinatorError>;

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, CoordinatorError>;

    /// Active rooms, newest first.
    async fn list_active_rooms(&self) -> Result<Vec<Room>, CoordinatorError>;

    /// Set `is_active = false, closed_at = closed_at` where the room is still
    /// active. Returns whether a row changed; closing a closed room is `Ok(false)`.
    async fn close_room(
        &self,
        room_id: RoomId,
        closed_at: DateTime<Utc>,
    ) -> Result<bool, CoordinatorError>;

    async fn find_participant(
        &self,
        room_id: RoomId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, CoordinatorError>;

    /// Insert a membership row. Inserting an identity that already exists must
    /// not create a second row.
    async fn insert_participant(
        &self,
        participant: Participant,
    ) -> Result<Participant, CoordinatorError>;

    /// Delete a membership row. Returns whether a row existed.
    async fn delete_participant(
        &self,
        room_id: RoomId,
        user_id: &UserId,
    ) -> Result<bool, CoordinatorError>;

    /// Participants of a room, in join order.
    async fn list_participants(
        &self,
        room_id: RoomId,
    ) -> Result<Vec<Participant>, CoordinatorError>;

    async fn count_participants(&self, room_id: RoomId) -> Result<usize, CoordinatorError>;

    /// Update the mute flag on a membership row and return the updated row.
    async fn set_participant_muted(
        &self,
        room_id: RoomId,
        user_id: &UserId,
        is_muted: bool,
    ) -> Result<Participant, CoordinatorError>;

    /// Open one change feed covering every filter.
    async fn subscribe(&self, filters: &[ChangeFilter]) -> Result<ChangeFeed, CoordinatorError>;

    /// Release a change feed. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), CoordinatorError>;
}

//! In-memory `RoomBackend` for Room Coordinator tests.
//!
//! Rows live behind one mutex. Every mutation pushes a `ChangeEvent` to the
//! subscriptions whose filters cover the table, so presence tests see the same
//! push-then-reload flow a remote store produces.
//!
//! # Example
//!
//! ```rust,ignore
//! use rc_test_utils::{BackendOp, InMemoryBackend, TestRoom};
//!
//! let backend = InMemoryBackend::new()
//!     .with_room(TestRoom::new(&creator).build())
//!     .with_failure(BackendOp::InsertParticipant);
//!
//! assert_eq!(backend.subscribe_calls(), 0);
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use room_coordinator::backend::{
    ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, ChangeTable, RoomBackend, SubscriptionId,
};
use room_coordinator::errors::CoordinatorError;
use room_coordinator::models::{NewRoom, Participant, Room, RoomId, UserId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Change feed buffer per subscription.
const FEED_BUFFER: usize = 256;

/// Backend operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOp {
    InsertRoom,
    GetRoom,
    ListActiveRooms,
    CloseRoom,
    FindParticipant,
    InsertParticipant,
    DeleteParticipant,
    ListParticipants,
    CountParticipants,
    SetParticipantMuted,
    Subscribe,
}

#[derive(Debug)]
struct Subscription {
    tables: Vec<ChangeTable>,
    sender: mpsc::Sender<ChangeEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Rooms in insertion order.
    rooms: Vec<Room>,
    /// Participants in join order.
    participants: Vec<Participant>,
    subscriptions: HashMap<u64, Subscription>,
    next_subscription_id: u64,
    failures: HashSet<BackendOp>,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
    list_active_rooms_calls: usize,
    /// Yield to the scheduler before every backend call.
    interleave: bool,
}

impl Inner {
    fn check(&self, op: BackendOp) -> Result<(), CoordinatorError> {
        if self.failures.contains(&op) {
            return Err(CoordinatorError::BackendError(format!(
                "injected failure: {op:?}"
            )));
        }
        Ok(())
    }

    fn notify(&mut self, table: ChangeTable, kind: ChangeKind, room_id: RoomId) {
        let event = ChangeEvent {
            table,
            kind,
            room_id: Some(room_id),
        };
        self.subscriptions.retain(|_, sub| {
            if !sub.tables.contains(&table) {
                return true;
            }
            // A dropped receiver ends the subscription.
            !matches!(
                sub.sender.try_send(event.clone()),
                Err(mpsc::error::TrySendError::Closed(_))
            )
        });
    }

    fn room_mut(&mut self, room_id: RoomId) -> Option<&mut Room> {
        self.rooms.iter_mut().find(|room| room.id == room_id)
    }
}

/// In-memory room store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a room row.
    #[must_use]
    pub fn with_room(self, room: Room) -> Self {
        self.inner.lock().unwrap().rooms.push(room);
        self
    }

    /// Seed a participant row.
    #[must_use]
    pub fn with_participant(self, participant: Participant) -> Self {
        self.inner.lock().unwrap().participants.push(participant);
        self
    }

    /// Make `op` fail until cleared.
    #[must_use]
    pub fn with_failure(self, op: BackendOp) -> Self {
        self.fail(op);
        self
    }

    /// Yield before every backend call, so concurrent callers on one runtime
    /// interleave between steps the way remote round trips do.
    #[must_use]
    pub fn with_interleaving(self) -> Self {
        self.inner.lock().unwrap().interleave = true;
        self
    }

    async fn round_trip(&self) {
        let interleave = self.inner.lock().unwrap().interleave;
        if interleave {
            tokio::task::yield_now().await;
        }
    }

    pub fn fail(&self, op: BackendOp) {
        self.inner.lock().unwrap().failures.insert(op);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().failures.clear();
    }

    pub fn room(&self, room_id: RoomId) -> Option<Room> {
        let inner = self.inner.lock().unwrap();
        inner.rooms.iter().find(|room| room.id == room_id).cloned()
    }

    pub fn rooms(&self) -> Vec<Room> {
        self.inner.lock().unwrap().rooms.clone()
    }

    pub fn participants(&self, room_id: RoomId) -> Vec<Participant> {
        let inner = self.inner.lock().unwrap();
        inner
            .participants
            .iter()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect()
    }

    pub fn participant_rows(&self, room_id: RoomId, user_id: &UserId) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .participants
            .iter()
            .filter(|p| p.room_id == room_id && &p.user_id == user_id)
            .count()
    }

    /// Subscriptions currently open.
    pub fn active_subscriptions(&self) -> usize {
        self.inner.lock().unwrap().subscriptions.len()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.inner.lock().unwrap().subscribe_calls
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.inner.lock().unwrap().unsubscribe_calls
    }

    /// Number of `list_active_rooms` calls, i.e. presence resyncs.
    pub fn list_active_rooms_calls(&self) -> usize {
        self.inner.lock().unwrap().list_active_rooms_calls
    }

    /// Push a change event without touching any row.
    pub fn emit_change(&self, table: ChangeTable, kind: ChangeKind, room_id: RoomId) {
        self.inner.lock().unwrap().notify(table, kind, room_id);
    }
}

#[async_trait]
impl RoomBackend for InMemoryBackend {
    async fn insert_room(&self, room: NewRoom) -> Result<Room, CoordinatorError> {
        self.round_trip().await;
        let mut inner = self.inner.lock().unwrap();
        inner.check(BackendOp::InsertRoom)?;

        let row = Room {
            id: RoomId::new_v4(),
            creator_id: room.creator_id,
            name: room.name,
            is_private: room.is_private,
            is_active: true,
            audio_active: false,
            created_at: Utc::now(),
            closed_at: None,
        };
        inner.rooms.push(row.clone());
        inner.notify(ChangeTable::Rooms, ChangeKind::Insert, row.id);

        Ok(row)
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>, CoordinatorError> {
        self.round_trip().await;
        let inner = self.inner.lock().unwrap();
        inner.check(BackendOp::GetRoom)?;
        Ok(inner.rooms.iter().find(|room| room.id == room_id).cloned())
    }

    async fn list_active_rooms(&self) -> Result<Vec<Room>, CoordinatorError> {
        self.round_trip().await;
        let mut inner = self.inner.lock().unwrap();
        inner.list_active_rooms_calls += 1;
        inner.check(BackendOp::ListActiveRooms)?;

        // Insertion order is creation order; newest first.
        Ok(inner
            .rooms
            .iter()
            .rev()
            .filter(|room| room.is_active)
            .cloned()
            .collect())
    }

    async fn close_room(
        &self,
        room_id: RoomId,
        closed_at: DateTime<Utc>,
    ) -> Result<bool, CoordinatorError> {
        self.round_trip().await;
        let mut inner = self.inner.lock().unwrap();
        inner.check(BackendOp::CloseRoom)?;

        let closed = match inner.room_mut(room_id) {
            Some(room) if room.is_active => {
                room.is_active = false;
                room.closed_at = Some(closed_at);
                true
            }
            _ => false,
        };
        if closed {
            inner.notify(ChangeTable::Rooms, ChangeKind::Update, room_id);
        }

        Ok(closed)
    }

    async fn find_participant(
        &self,
        room_id: RoomId,
        user_id: &UserId,
    ) -> Result<Option<Participant>, CoordinatorError> {
        self.round_trip().await;
        let inner = self.inner.lock().unwrap();
        inner.check(BackendOp::FindParticipant)?;
        Ok(inner
            .participants
            .iter()
            .find(|p| p.room_id == room_id && &p.user_id == user_id)
            .cloned())
    }

    async fn insert_participant(
        &self,
        participant: Participant,
    ) -> Result<Participant, CoordinatorError> {
        self.round_trip().await;
        let mut inner = self.inner.lock().unwrap();
        inner.check(BackendOp::InsertParticipant)?;

        if let Some(existing) = inner
            .participants
            .iter()
            .find(|p| p.room_id == participant.room_id && p.user_id == participant.user_id)
        {
            return Ok(existing.clone());
        }

        let room_id = participant.room_id;
        inner.participants.push(participant.clone());
        inner.notify(ChangeTable::RoomParticipants, ChangeKind::Insert, room_id);

        Ok(participant)
    }

    async fn delete_participant(
        &self,
        room_id: RoomId,
        user_id: &UserId,
    ) -> Result<bool, CoordinatorError> {
        self.round_trip().await;
        let mut inner = self.inner.lock().unwrap();
        inner.check(BackendOp::DeleteParticipant)?;

        let before = inner.participants.len();
        inner
            .participants
            .retain(|p| !(p.room_id == room_id && &p.user_id == user_id));
        let removed = inner.participants.len() < before;

        if removed {
            inner.notify(ChangeTable::RoomParticipants, ChangeKind::Delete, room_id);
        }

        Ok(removed)
    }

    async fn list_participants(
        &self,
        room_id: RoomId,
    ) -> Result<Vec<Participant>, CoordinatorError> {
        self.round_trip().await;
        let inner = self.inner.lock().unwrap();
        inner.check(BackendOp::ListParticipants)?;
        Ok(inner
            .participants
            .iter()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn count_participants(&self, room_id: RoomId) -> Result<usize, CoordinatorError> {
        self.round_trip().await;
        let inner = self.inner.lock().unwrap();
        inner.check(BackendOp::CountParticipants)?;
        Ok(inner
            .participants
            .iter()
            .filter(|p| p.room_id == room_id)
            .count())
    }

    async fn set_participant_muted(
        &self,
        room_id: RoomId,
        user_id: &UserId,
        is_muted: bool,
    ) -> Result<Participant, CoordinatorError> {
        self.round_trip().await;
        let mut inner = self.inner.lock().unwrap();
        inner.check(BackendOp::SetParticipantMuted)?;

        let participant = inner
            .participants
            .iter_mut()
            .find(|p| p.room_id == room_id && &p.user_id == user_id)
            .ok_or_else(|| CoordinatorError::NotFound(format!("participant {user_id}")))?;
        participant.is_muted = is_muted;
        let updated = participant.clone();

        inner.notify(ChangeTable::RoomParticipants, ChangeKind::Update, room_id);
        Ok(updated)
    }

    async fn subscribe(&self, filters: &[ChangeFilter]) -> Result<ChangeFeed, CoordinatorError> {
        self.round_trip().await;
        let mut inner = self.inner.lock().unwrap();
        inner.subscribe_calls += 1;
        inner.check(BackendOp::Subscribe)?;

        inner.next_subscription_id += 1;
        let id = inner.next_subscription_id;
        let (sender, events) = mpsc::channel(FEED_BUFFER);
        inner.subscriptions.insert(
            id,
            Subscription {
                tables: filters.iter().map(|f| f.table).collect(),
                sender,
            },
        );

        Ok(ChangeFeed {
            id: SubscriptionId(id),
            events,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), CoordinatorError> {
        self.round_trip().await;
        let mut inner = self.inner.lock().unwrap();
        inner.unsubscribe_calls += 1;
        inner.subscriptions.remove(&id.0);
        Ok(())
    }
}

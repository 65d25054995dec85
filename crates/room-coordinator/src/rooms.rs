//! Room lifecycle: create, idempotent join, leave with empty-room close.
//!
//! The manager is stateful per consumer: it remembers the signed-in caller and
//! the room it is currently bound to. All durability lives in the
//! [`RoomBackend`].

use crate::backend::RoomBackend;
use crate::config::RoomClosePolicy;
use crate::errors::CoordinatorError;
use crate::models::{NewRoom, Participant, Room, RoomId, UserId, UserProfile};
use crate::observability::metrics;

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The room this manager is bound to and the identity that joined it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CurrentRoom {
    room_id: RoomId,
    user_id: UserId,
}

/// What a leave did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Room that was left, if the manager was bound to one.
    pub room_id: Option<RoomId>,
    /// Whether this leave closed the room.
    pub room_closed: bool,
}

pub struct RoomLifecycleManager {
    backend: Arc<dyn RoomBackend>,
    caller: Option<UserProfile>,
    current: Option<CurrentRoom>,
    close_policy: RoomClosePolicy,
}

impl RoomLifecycleManager {
    pub fn new(backend: Arc<dyn RoomBackend>, close_policy: RoomClosePolicy) -> Self {
        Self {
            backend,
            caller: None,
            current: None,
            close_policy,
        }
    }

    /// Set or clear the signed-in caller.
    pub fn set_caller(&mut self, caller: Option<UserProfile>) {
        self.caller = caller;
    }

    #[must_use]
    pub fn caller(&self) -> Option<&UserProfile> {
        self.caller.as_ref()
    }

    #[must_use]
    pub fn current_room(&self) -> Option<RoomId> {
        self.current.as_ref().map(|current| current.room_id)
    }

    #[must_use]
    pub fn close_policy(&self) -> RoomClosePolicy {
        self.close_policy
    }

    fn require_caller(&self) -> Result<UserProfile, CoordinatorError> {
        self.caller.clone().ok_or(CoordinatorError::Unauthenticated)
    }

    /// Create a room owned by the caller and join it muted.
    ///
    /// A blank or missing name falls back to `"{display name}'s Room"`.
    /// If the creator's participant insert fails the room row is left behind.
    #[instrument(skip_all, fields(is_private = is_private))]
    pub async fn create_room(
        &mut self,
        name: Option<String>,
        is_private: bool,
    ) -> Result<Room, CoordinatorError> {
        let caller = self.require_caller()?;

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| caller.default_room_name());

        let room = self
            .backend
            .insert_room(NewRoom {
                creator_id: caller.user_id.clone(),
                name,
                is_private,
            })
            .await?;

        let creator = Participant {
            room_id: room.id,
            user_id: caller.user_id.clone(),
            is_muted: true,
            joined_at: Utc::now(),
        };

        if let Err(e) = self.backend.insert_participant(creator).await {
            warn!(
                target: "rc.room",
                room_id = %room.id,
                error = %e,
                "Creator join failed after room insert, room left without participants"
            );
            return Err(e);
        }

        metrics::record_room_created();
        info!(
            target: "rc.room",
            room_id = %room.id,
            creator_id = %caller.user_id,
            "Room created"
        );

        self.current = Some(CurrentRoom {
            room_id: room.id,
            user_id: caller.user_id,
        });

        Ok(room)
    }

    /// Join a room muted. Joining a room the caller is already in returns the
    /// existing row.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn join_room(&mut self, room_id: RoomId) -> Result<Participant, CoordinatorError> {
        let result = self.join_room_inner(room_id).await;

        let outcome = match &result {
            Ok((_, true)) => "joined",
            Ok((_, false)) => "already_member",
            Err(CoordinatorError::NotFound(_)) => "not_found",
            Err(CoordinatorError::AlreadyClosed(_)) => "already_closed",
            Err(CoordinatorError::Unauthenticated) => "unauthenticated",
            Err(_) => "backend_error",
        };
        metrics::record_room_join(outcome);

        result.map(|(participant, _)| participant)
    }

    async fn join_room_inner(
        &mut self,
        room_id: RoomId,
    ) -> Result<(Participant, bool), CoordinatorError> {
        let caller = self.require_caller()?;

        let room = self
            .backend
            .get_room(room_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(format!("room {room_id}")))?;

        if !room.is_active {
            debug!(target: "rc.room", room_id = %room_id, "Join rejected, room closed");
            return Err(CoordinatorError::AlreadyClosed(format!("room {room_id}")));
        }

        let (participant, inserted) = match self
            .backend
            .find_participant(room_id, &caller.user_id)
            .await?
        {
            Some(existing) => {
                debug!(
                    target: "rc.room",
                    room_id = %room_id,
                    user_id = %caller.user_id,
                    "Already a participant"
                );
                (existing, false)
            }
            None => {
                let participant = self
                    .backend
                    .insert_participant(Participant {
                        room_id,
                        user_id: caller.user_id.clone(),
                        is_muted: true,
                        joined_at: Utc::now(),
                    })
                    .await?;
                info!(
                    target: "rc.room",
                    room_id = %room_id,
                    user_id = %caller.user_id,
                    "Joined room"
                );
                (participant, true)
            }
        };

        self.current = Some(CurrentRoom {
            room_id,
            user_id: caller.user_id,
        });

        Ok((participant, inserted))
    }

    /// Leave the current room, closing it if the roster is now empty and the
    /// close policy allows this caller to close it.
    ///
    /// Leaving with no current room, or after the row is already gone, succeeds.
    #[instrument(skip_all)]
    pub async fn leave_room(&mut self) -> Result<LeaveOutcome, CoordinatorError> {
        let Some(current) = self.current.take() else {
            debug!(target: "rc.room", "Leave with no current room");
            return Ok(LeaveOutcome::default());
        };
        let room_id = current.room_id;

        let removed = match self
            .backend
            .delete_participant(room_id, &current.user_id)
            .await
        {
            Ok(removed) => removed,
            Err(e) => {
                // Still a member remotely; keep the binding so leave can be retried.
                self.current = Some(current);
                return Err(e);
            }
        };

        if !removed {
            debug!(
                target: "rc.room",
                room_id = %room_id,
                user_id = %current.user_id,
                "Participant row already gone"
            );
        }

        let remaining = self.backend.count_participants(room_id).await?;
        let mut outcome = LeaveOutcome {
            room_id: Some(room_id),
            room_closed: false,
        };

        if remaining == 0 && self.may_close(room_id, &current.user_id).await? {
            outcome.room_closed = self.backend.close_room(room_id, Utc::now()).await?;
            if outcome.room_closed {
                metrics::record_room_closed();
                info!(target: "rc.room", room_id = %room_id, "Room closed, last participant left");
            }
        }

        info!(
            target: "rc.room",
            room_id = %room_id,
            user_id = %current.user_id,
            remaining,
            "Left room"
        );

        Ok(outcome)
    }

    async fn may_close(&self, room_id: RoomId, leaver: &UserId) -> Result<bool, CoordinatorError> {
        match self.close_policy {
            RoomClosePolicy::LastOneOut => Ok(true),
            RoomClosePolicy::CreatorOnly => Ok(self
                .backend
                .get_room(room_id)
                .await?
                .is_some_and(|room| &room.creator_id == leaver)),
        }
    }

    /// Flip the caller's room mute flag in the current room.
    #[instrument(skip_all)]
    pub async fn toggle_mute(&mut self) -> Result<Participant, CoordinatorError> {
        let current = self
            .current
            .clone()
            .ok_or_else(|| CoordinatorError::NotFound("no current room".to_string()))?;

        let participant = self
            .backend
            .find_participant(current.room_id, &current.user_id)
            .await?
            .ok_or_else(|| {
                CoordinatorError::NotFound(format!("participant in room {}", current.room_id))
            })?;

        let updated = self
            .backend
            .set_participant_muted(current.room_id, &current.user_id, !participant.is_muted)
            .await?;

        debug!(
            target: "rc.room",
            room_id = %current.room_id,
            is_muted = updated.is_muted,
            "Room mute toggled"
        );

        Ok(updated)
    }

    /// Active rooms, newest first.
    pub async fn list_active_rooms(&self) -> Result<Vec<Room>, CoordinatorError> {
        self.backend.list_active_rooms().await
    }

    /// Roster of the current room; empty when not bound to a room.
    pub async fn list_participants(&self) -> Result<Vec<Participant>, CoordinatorError> {
        match self.current_room() {
            Some(room_id) => self.backend.list_participants(room_id).await,
            None => Ok(Vec::new()),
        }
    }
}

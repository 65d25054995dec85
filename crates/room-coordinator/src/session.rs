//! `SessionFacade` - the component-facing entry point.
//!
//! A facade composes the room lifecycle, the shared presence registry and the
//! audio session for one signed-in user viewing one room. It also owns the task
//! that turns a silence timeout into a full audio disconnect.
//!
//! The audio session is injected and may be shared by several facades (a view
//! remounting while the old one unmounts). Dropping a facade stops only its own
//! task; the audio actor lives until whoever spawned it cancels it.

use crate::audio::{AudioConnectionState, AudioEvent, AudioSessionHandle, AudioStatus};
use crate::backend::RoomBackend;
use crate::config::RoomClosePolicy;
use crate::errors::CoordinatorError;
use crate::models::{Participant, Room, RoomId, UserId, UserProfile};
use crate::presence::{PresenceFeed, PresenceSnapshot, PresenceSync};
use crate::rooms::RoomLifecycleManager;

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub struct SessionFacade {
    user: UserProfile,
    rooms: RoomLifecycleManager,
    presence: PresenceSync,
    feed: Option<PresenceFeed>,
    audio: AudioSessionHandle,
    cancel_token: CancellationToken,
}

impl SessionFacade {
    /// Build a facade for `user`. Must be called inside a Tokio runtime.
    pub fn new(
        user: UserProfile,
        backend: Arc<dyn RoomBackend>,
        presence: PresenceSync,
        audio: AudioSessionHandle,
        close_policy: RoomClosePolicy,
    ) -> Self {
        let mut rooms = RoomLifecycleManager::new(backend, close_policy);
        rooms.set_caller(Some(user.clone()));

        let cancel_token = CancellationToken::new();
        tokio::spawn(run_silence_disconnect(
            audio.clone(),
            audio.subscribe_events(),
            cancel_token.clone(),
        ));

        Self {
            user,
            rooms,
            presence,
            feed: None,
            audio,
            cancel_token,
        }
    }

    #[must_use]
    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    #[must_use]
    pub fn current_room(&self) -> Option<RoomId> {
        self.rooms.current_room()
    }

    /// Join `room_id` and mirror its roster. Does not connect audio.
    ///
    /// Bound to a different room, the facade stops that session first. That
    /// teardown is best effort: a failure is logged and the bind goes ahead.
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn bind_room(&mut self, room_id: RoomId) -> Result<Participant, CoordinatorError> {
        if self
            .rooms
            .current_room()
            .is_some_and(|current| current != room_id)
        {
            self.stop_previous().await;
        }

        let participant = self.rooms.join_room(room_id).await?;
        self.watch_room(Some(room_id)).await?;

        info!(target: "rc.session", room_id = %room_id, "Room bound");
        Ok(participant)
    }

    /// Create a room, join it and mirror its roster.
    #[instrument(skip_all)]
    pub async fn create_room(
        &mut self,
        name: Option<String>,
        is_private: bool,
    ) -> Result<Room, CoordinatorError> {
        if self.rooms.current_room().is_some() {
            self.stop_previous().await;
        }

        let room = self.rooms.create_room(name, is_private).await?;
        self.watch_room(Some(room.id)).await?;

        info!(target: "rc.session", room_id = %room.id, "Room created and bound");
        Ok(room)
    }

    /// Tear down the current session before binding another room.
    async fn stop_previous(&mut self) {
        let previous = self.rooms.current_room();
        if let Err(e) = self.stop().await {
            warn!(
                target: "rc.session",
                previous_room_id = ?previous,
                error = %e,
                "Teardown of previous room failed, continuing with new room"
            );
        }
    }

    async fn watch_room(&mut self, room_id: Option<RoomId>) -> Result<(), CoordinatorError> {
        let feed = self.presence.bind(self.user.user_id.clone()).await?;
        feed.watch_room(room_id).await?;
        self.feed = Some(feed);
        Ok(())
    }

    /// Leave the room and disconnect audio. Both always run; the first error
    /// is returned.
    #[instrument(skip_all)]
    pub async fn stop(&mut self) -> Result<(), CoordinatorError> {
        let left = self.rooms.leave_room().await;
        let disconnected = self.audio.disconnect().await;

        if let Some(feed) = &self.feed {
            if let Err(e) = feed.watch_room(None).await {
                debug!(target: "rc.session", error = %e, "Could not clear watched room");
            }
        }

        match &left {
            Ok(outcome) => info!(
                target: "rc.session",
                room_closed = outcome.room_closed,
                "Session stopped"
            ),
            Err(e) => warn!(target: "rc.session", error = %e, "Leave failed during stop"),
        }

        left.map(|_| ()).and(disconnected)
    }

    /// Stop the session and release this user's presence feed.
    #[instrument(skip_all)]
    pub async fn sign_out(&mut self) -> Result<(), CoordinatorError> {
        let stopped = self.stop().await;

        self.presence.unbind(&self.user.user_id).await;
        self.feed = None;
        self.rooms.set_caller(None);

        info!(target: "rc.session", user_id = %self.user.user_id, "Signed out");
        stopped
    }

    /// Talk: connect if needed, otherwise enable the microphone.
    #[instrument(skip_all)]
    pub async fn unmute(&self) -> Result<(), CoordinatorError> {
        match self.audio.status().state {
            AudioConnectionState::Connected | AudioConnectionState::Reconnecting => {
                self.audio.set_local_microphone_enabled(true).await
            }
            _ => {
                let room_id = self
                    .rooms
                    .current_room()
                    .ok_or_else(|| CoordinatorError::NotFound("no current room".to_string()))?;
                self.audio
                    .connect(room_id, self.user.user_id.clone())
                    .await
            }
        }
    }

    pub async fn mute(&self) -> Result<(), CoordinatorError> {
        self.audio.set_local_microphone_enabled(false).await
    }

    pub async fn disconnect_audio(&self) -> Result<(), CoordinatorError> {
        self.audio.disconnect().await
    }

    /// Flip the caller's room-level mute flag.
    pub async fn toggle_room_mute(&mut self) -> Result<Participant, CoordinatorError> {
        self.rooms.toggle_mute().await
    }

    /// Active rooms straight from the store, newest first.
    pub async fn list_active_rooms(&self) -> Result<Vec<Room>, CoordinatorError> {
        self.rooms.list_active_rooms().await
    }

    /// Force a presence resync.
    pub async fn refresh_presence(&self) -> Result<(), CoordinatorError> {
        match &self.feed {
            Some(feed) => feed.refresh().await,
            None => Ok(()),
        }
    }

    /// Mirrored roster of the current room.
    #[must_use]
    pub fn participants(&self) -> Vec<Participant> {
        match (self.presence(), self.rooms.current_room()) {
            (Some(snapshot), Some(room_id)) if snapshot.room_id == Some(room_id) => {
                snapshot.participants
            }
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn presence(&self) -> Option<PresenceSnapshot> {
        self.feed.as_ref().map(PresenceFeed::snapshot)
    }

    #[must_use]
    pub fn audio_status(&self) -> AudioStatus {
        self.audio.status()
    }

    #[must_use]
    pub fn is_speaking(&self, participant: &UserId) -> bool {
        self.audio.is_speaking(participant)
    }

    #[must_use]
    pub fn audio_events(&self) -> broadcast::Receiver<AudioEvent> {
        self.audio.subscribe_events()
    }
}

impl Drop for SessionFacade {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Disconnect audio whenever the silence watchdog fires.
async fn run_silence_disconnect(
    audio: AudioSessionHandle,
    mut events: broadcast::Receiver<AudioEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,

            event = events.recv() => match event {
                Ok(AudioEvent::SilenceTimeout) => {
                    info!(target: "rc.session", "Silence timeout, disconnecting audio");
                    if let Err(e) = audio.disconnect().await {
                        warn!(target: "rc.session", error = %e, "Silence disconnect failed");
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "rc.session", skipped, "Audio events lagged");
                    // A missed silence timeout leaves the watchdog disarmed.
                    if silence_elapsed(&audio.status()) {
                        info!(target: "rc.session", "Silence timeout lost to lag, disconnecting audio");
                        if let Err(e) = audio.disconnect().await {
                            warn!(target: "rc.session", error = %e, "Silence disconnect failed");
                        }
                    }
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// Connected, everyone muted and no silence deadline pending: the watchdog
/// has already fired.
fn silence_elapsed(status: &AudioStatus) -> bool {
    status.state == AudioConnectionState::Connected
        && !status.anyone_unmuted
        && !status.silence_pending
}

//! Message and status types for the audio session actor.

use crate::errors::CoordinatorError;
use crate::models::{RoomId, UserId};
use std::collections::BTreeSet;
use tokio::sync::oneshot;

/// Audio connection lifecycle as exposed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl AudioConnectionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioConnectionState::Disconnected => "disconnected",
            AudioConnectionState::Connecting => "connecting",
            AudioConnectionState::Connected => "connected",
            AudioConnectionState::Reconnecting => "reconnecting",
            AudioConnectionState::Error => "error",
        }
    }
}

/// Snapshot of the audio session, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudioStatus {
    pub state: AudioConnectionState,
    /// Room of the live (or connecting) session.
    pub room_id: Option<RoomId>,
    /// Participants currently detected as speaking.
    pub speaking: BTreeSet<UserId>,
    pub local_microphone_enabled: bool,
    /// Local microphone enabled or any remote track unmuted.
    pub anyone_unmuted: bool,
    /// A silence deadline is scheduled.
    pub silence_pending: bool,
}

impl AudioStatus {
    #[must_use]
    pub fn is_speaking(&self, participant: &UserId) -> bool {
        self.speaking.contains(participant)
    }
}

/// Ordered notifications from the audio session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioEvent {
    StateChanged(AudioConnectionState),
    SpeakingChanged(BTreeSet<UserId>),
    Error(CoordinatorError),
    /// Everyone stayed muted for a full silence period.
    SilenceTimeout,
}

/// Messages sent to the `AudioSessionActor`.
#[derive(Debug)]
pub enum AudioSessionMessage {
    /// Open the single audio connection for a room.
    Connect {
        room_id: RoomId,
        user_id: UserId,
        /// Answered once the attempt settles.
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    /// Tear down the session. Always succeeds.
    Disconnect {
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    SetLocalMicrophoneEnabled {
        enabled: bool,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    IsAnyoneUnmuted {
        respond_to: oneshot::Sender<bool>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_disconnected_and_silent() {
        let status = AudioStatus::default();
        assert_eq!(status.state, AudioConnectionState::Disconnected);
        assert!(status.room_id.is_none());
        assert!(status.speaking.is_empty());
        assert!(!status.local_microphone_enabled);
        assert!(!status.anyone_unmuted);
    }

    #[test]
    fn test_is_speaking() {
        let mut status = AudioStatus::default();
        status.speaking.insert(UserId::from("alice"));

        assert!(status.is_speaking(&UserId::from("alice")));
        assert!(!status.is_speaking(&UserId::from("bob")));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(AudioConnectionState::Connected.as_str(), "connected");
        assert_eq!(AudioConnectionState::Reconnecting.as_str(), "reconnecting");
    }
}

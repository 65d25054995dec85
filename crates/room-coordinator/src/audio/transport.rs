//! Control-plane contract of the audio transport and token issuer.
//!
//! Only connection control is consumed here; media (codecs, NAT traversal) is
//! entirely the transport's business. Transport callbacks are delivered as an
//! ordered `mpsc` stream that the audio session actor drains.

use crate::errors::CoordinatorError;
use crate::models::{RoomId, UserId};
use secrecy::SecretString;
use std::fmt;
use tokio::sync::mpsc;

/// Short-lived credentials for one room connection.
#[derive(Clone)]
pub struct AudioGrant {
    /// Access token. Never logged.
    pub access_token: SecretString,
    pub server_url: String,
    /// Room name on the media server.
    pub room_display_name: String,
}

impl fmt::Debug for AudioGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioGrant")
            .field("access_token", &"[REDACTED]")
            .field("server_url", &self.server_url)
            .field("room_display_name", &self.room_display_name)
            .finish()
    }
}

/// Connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Reconnecting,
    /// Signalling channel is re-establishing while media may still flow.
    SignalReconnecting,
    Disconnected,
}

/// Events pushed by an open transport connection, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ConnectionStateChanged(TransportState),
    /// Full list of participants currently detected as speaking.
    ActiveSpeakersChanged(Vec<UserId>),
    TrackMuted {
        participant: UserId,
    },
    TrackUnmuted {
        participant: UserId,
    },
    ParticipantConnected {
        participant: UserId,
        microphone_enabled: bool,
    },
    ParticipantDisconnected {
        participant: UserId,
    },
    /// Terminal disconnect initiated by the server or the network.
    Disconnected,
}

/// Issues access grants for the audio transport.
#[async_trait::async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue_token(
        &self,
        room_id: RoomId,
        user_id: &UserId,
    ) -> Result<AudioGrant, CoordinatorError>;
}

/// A live transport connection.
#[async_trait::async_trait]
pub trait TransportConnection: Send + Sync {
    /// Identity of the local participant on this connection.
    fn local_identity(&self) -> UserId;

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), CoordinatorError>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&self) -> Result<(), CoordinatorError>;
}

/// Result of opening the transport: the connection plus its event stream.
pub struct OpenedTransport {
    pub connection: Box<dyn TransportConnection>,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl fmt::Debug for OpenedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedTransport")
            .field("local_identity", &self.connection.local_identity())
            .finish_non_exhaustive()
    }
}

/// Factory for transport connections.
#[async_trait::async_trait]
pub trait AudioTransport: Send + Sync {
    /// Ask the device for microphone access. `Ok(false)` means refused.
    async fn request_microphone_permission(&self) -> Result<bool, CoordinatorError>;

    async fn open(&self, grant: &AudioGrant) -> Result<OpenedTransport, CoordinatorError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_debug_redacts_token() {
        let grant = AudioGrant {
            access_token: SecretString::from("eyJhbGciOiJIUzI1NiJ9.secret".to_string()),
            server_url: "wss://audio.example.com".to_string(),
            room_display_name: "room-abc".to_string(),
        };

        let debug_output = format!("{grant:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("eyJhbGci"));
        assert!(debug_output.contains("wss://audio.example.com"));
    }
}

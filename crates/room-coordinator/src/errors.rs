//! Room Coordinator error types.
//!
//! Every failed operation surfaces one of these variants. Collaborator detail
//! (backend messages, transport URLs) stays in the `Display` output for logs;
//! [`CoordinatorError::client_message`] is what a UI may show.

use thiserror::Error;

/// Room Coordinator error type.
///
/// Error codes:
/// - `Unauthenticated`: 1
/// - `PermissionDenied`: 3
/// - `NotFound`: 4
/// - `AlreadyClosed`, `AlreadyConnecting`: 5 (conflict)
/// - `TokenError`: 8
/// - `TransportError`, `Timeout`, `Cancelled`: 9
/// - `BackendError`, `Config`, `Internal`: 6
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    /// Room or participant row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Join attempted on a room that is no longer active.
    #[error("Room already closed: {0}")]
    AlreadyClosed(String),

    /// Operation requires an authenticated caller.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Microphone access refused by the device.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Access token issuance failed.
    #[error("Token error: {0}")]
    TokenError(String),

    /// Transport connection could not be opened or maintained.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Generic data-store failure.
    #[error("Backend error: {0}")]
    BackendError(String),

    /// A connection attempt or live connection already exists.
    #[error("Audio connection already in progress")]
    AlreadyConnecting,

    /// A connect attempt was abandoned by a disconnect request.
    #[error("Connect cancelled")]
    Cancelled,

    /// A bounded collaborator call did not complete in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (actor channel closed, task failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Returns the stable numeric code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            CoordinatorError::Unauthenticated => 1,
            CoordinatorError::PermissionDenied(_) => 3,
            CoordinatorError::NotFound(_) => 4,
            CoordinatorError::AlreadyClosed(_) | CoordinatorError::AlreadyConnecting => 5,
            CoordinatorError::BackendError(_)
            | CoordinatorError::Config(_)
            | CoordinatorError::Internal(_) => 6,
            CoordinatorError::TokenError(_) => 8,
            CoordinatorError::TransportError(_)
            | CoordinatorError::Timeout(_)
            | CoordinatorError::Cancelled => 9,
        }
    }

    /// Returns a client-safe error message (no collaborator details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            CoordinatorError::NotFound(_) => "Room not found".to_string(),
            CoordinatorError::AlreadyClosed(_) => "This room has closed".to_string(),
            CoordinatorError::Unauthenticated => "You must be logged in".to_string(),
            CoordinatorError::PermissionDenied(_) => {
                "Please enable microphone access in your device settings to use voice chat"
                    .to_string()
            }
            CoordinatorError::TokenError(_) => "Failed to get audio token".to_string(),
            CoordinatorError::TransportError(_) | CoordinatorError::Timeout(_) => {
                "Failed to connect to audio".to_string()
            }
            CoordinatorError::AlreadyConnecting => "Audio is already connecting".to_string(),
            CoordinatorError::Cancelled => "Audio connection was cancelled".to_string(),
            CoordinatorError::BackendError(_)
            | CoordinatorError::Config(_)
            | CoordinatorError::Internal(_) => "An internal error occurred".to_string(),
        }
    }

    /// Whether the failure leaves the audio state machine untouched and may be
    /// retried by the caller as-is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::TokenError(_)
                | CoordinatorError::TransportError(_)
                | CoordinatorError::Timeout(_)
                | CoordinatorError::BackendError(_)
                | CoordinatorError::Cancelled
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(CoordinatorError::Unauthenticated.error_code(), 1);
        assert_eq!(
            CoordinatorError::PermissionDenied("mic".to_string()).error_code(),
            3
        );
        assert_eq!(CoordinatorError::NotFound("room-1".to_string()).error_code(), 4);
        assert_eq!(
            CoordinatorError::AlreadyClosed("room-1".to_string()).error_code(),
            5
        );
        assert_eq!(CoordinatorError::AlreadyConnecting.error_code(), 5);
        assert_eq!(
            CoordinatorError::BackendError("timeout".to_string()).error_code(),
            6
        );
        assert_eq!(CoordinatorError::Internal("closed".to_string()).error_code(), 6);
        assert_eq!(
            CoordinatorError::TokenError("401".to_string()).error_code(),
            8
        );
        assert_eq!(
            CoordinatorError::TransportError("refused".to_string()).error_code(),
            9
        );
        assert_eq!(CoordinatorError::Cancelled.error_code(), 9);
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let backend_err =
            CoordinatorError::BackendError("connection refused at 10.0.0.7:5432".to_string());
        assert!(!backend_err.client_message().contains("10.0.0.7"));
        assert_eq!(backend_err.client_message(), "An internal error occurred");

        let transport_err =
            CoordinatorError::TransportError("wss://media.internal:7880 reset".to_string());
        assert!(!transport_err.client_message().contains("wss://"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(CoordinatorError::TokenError("503".to_string()).is_retryable());
        assert!(CoordinatorError::Cancelled.is_retryable());
        assert!(!CoordinatorError::PermissionDenied("denied".to_string()).is_retryable());
        assert!(!CoordinatorError::AlreadyClosed("room".to_string()).is_retryable());
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", CoordinatorError::NotFound("room abc".to_string())),
            "Not found: room abc"
        );
        assert_eq!(
            format!("{}", CoordinatorError::AlreadyConnecting),
            "Audio connection already in progress"
        );
    }
}

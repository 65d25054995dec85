//! Mock `TokenIssuer`.

use async_trait::async_trait;
use room_coordinator::audio::{AudioGrant, TokenIssuer};
use room_coordinator::errors::CoordinatorError;
use room_coordinator::models::{RoomId, UserId};
use secrecy::SecretString;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Inner {
    failure: Option<String>,
    delay: Option<Duration>,
    calls: Vec<(RoomId, UserId)>,
}

/// Token issuer that grants a fixed token, optionally after a delay or with a
/// scripted failure.
#[derive(Debug, Clone, Default)]
pub struct MockTokenIssuer {
    inner: Arc<Mutex<Inner>>,
}

impl MockTokenIssuer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request fails with `TokenError(message)`.
    #[must_use]
    pub fn failing(self, message: &str) -> Self {
        self.set_failure(Some(message.to_string()));
        self
    }

    /// Every request waits `delay` before answering.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().delay = Some(delay);
        self
    }

    pub fn set_failure(&self, message: Option<String>) {
        self.inner.lock().unwrap().failure = message;
    }

    pub fn calls(&self) -> Vec<(RoomId, UserId)> {
        self.inner.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl TokenIssuer for MockTokenIssuer {
    async fn issue_token(
        &self,
        room_id: RoomId,
        user_id: &UserId,
    ) -> Result<AudioGrant, CoordinatorError> {
        let (delay, failure) = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push((room_id, user_id.clone()));
            (inner.delay, inner.failure.clone())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = failure {
            return Err(CoordinatorError::TokenError(message));
        }

        Ok(AudioGrant {
            access_token: SecretString::from(format!("test-token-{room_id}-{user_id}")),
            server_url: "wss://audio.test.local".to_string(),
            room_display_name: room_id.to_string(),
        })
    }
}

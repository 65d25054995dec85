//! Test fixtures: users, rooms, tracing.

use chrono::Utc;
use room_coordinator::models::{Room, RoomId, UserId, UserProfile};
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `room_coordinator=debug`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "room_coordinator=debug,rc=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A signed-in user with a display name.
#[must_use]
pub fn test_user(name: &str) -> UserProfile {
    UserProfile::new(format!("user-{name}"), Some(capitalize(name)))
}

#[must_use]
pub fn user_id(name: &str) -> UserId {
    test_user(name).user_id
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Room row builder for seeding a backend.
#[derive(Debug, Clone)]
pub struct TestRoom {
    room: Room,
}

impl TestRoom {
    /// An active public room created by `creator`.
    #[must_use]
    pub fn new(creator: &UserId) -> Self {
        Self {
            room: Room {
                id: RoomId::new_v4(),
                creator_id: creator.clone(),
                name: "Test Room".to_string(),
                is_private: false,
                is_active: true,
                audio_active: false,
                created_at: Utc::now(),
                closed_at: None,
            },
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.room.name = name.into();
        self
    }

    #[must_use]
    pub fn private(mut self) -> Self {
        self.room.is_private = true;
        self
    }

    /// Mark the room closed now.
    #[must_use]
    pub fn closed(mut self) -> Self {
        self.room.is_active = false;
        self.room.closed_at = Some(Utc::now());
        self
    }

    #[must_use]
    pub fn build(self) -> Room {
        self.room
    }
}

//! Room lifecycle tests against the in-memory backend.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use rc_test_utils::{init_test_tracing, test_user, BackendOp, InMemoryBackend, TestRoom};
use chrono::Duration;
use room_coordinator::backend::RoomBackend;
use room_coordinator::config::RoomClosePolicy;
use room_coordinator::errors::CoordinatorError;
use room_coordinator::models::{RoomId, UserProfile};
use room_coordinator::rooms::RoomLifecycleManager;
use std::sync::Arc;

fn manager_for(
    backend: &InMemoryBackend,
    user: &UserProfile,
    policy: RoomClosePolicy,
) -> RoomLifecycleManager {
    let mut manager = RoomLifecycleManager::new(Arc::new(backend.clone()), policy);
    manager.set_caller(Some(user.clone()));
    manager
}

#[tokio::test]
async fn test_create_room_joins_creator_muted() {
    init_test_tracing();
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let mut rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);

    let room = rooms.create_room(None, false).await.unwrap();

    assert_eq!(room.name, "Alice's Room");
    assert_eq!(room.creator_id, alice.user_id);
    assert!(room.is_active);
    assert!(!room.audio_active);
    assert!(room.closed_at.is_none());
    assert_eq!(rooms.current_room(), Some(room.id));

    let participants = backend.participants(room.id);
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].user_id, alice.user_id);
    assert!(participants[0].is_muted);
}

#[tokio::test]
async fn test_create_room_uses_given_name() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let mut rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);

    let room = rooms
        .create_room(Some("  Study Hall ".to_string()), true)
        .await
        .unwrap();

    assert_eq!(room.name, "Study Hall");
    assert!(room.is_private);
}

#[tokio::test]
async fn test_create_room_requires_caller() {
    let backend = InMemoryBackend::new();
    let mut rooms = RoomLifecycleManager::new(Arc::new(backend.clone()), RoomClosePolicy::LastOneOut);

    let result = rooms.create_room(None, false).await;

    assert_eq!(result.unwrap_err(), CoordinatorError::Unauthenticated);
    assert!(backend.rooms().is_empty());
}

#[tokio::test]
async fn test_create_room_participant_failure_leaves_room_orphaned() {
    let backend = InMemoryBackend::new().with_failure(BackendOp::InsertParticipant);
    let alice = test_user("alice");
    let mut rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);

    let result = rooms.create_room(None, false).await;

    assert!(matches!(result, Err(CoordinatorError::BackendError(_))));
    assert_eq!(rooms.current_room(), None);

    let stored = backend.rooms();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].is_active);
    assert!(backend.participants(stored[0].id).is_empty());
}

#[tokio::test]
async fn test_join_room_twice_creates_one_row() {
    let alice = test_user("alice");
    let bob = test_user("bob");
    let room = TestRoom::new(&alice.user_id).build();
    let backend = InMemoryBackend::new().with_room(room.clone());
    let mut rooms = manager_for(&backend, &bob, RoomClosePolicy::LastOneOut);

    let first = rooms.join_room(room.id).await.unwrap();
    let second = rooms.join_room(room.id).await.unwrap();

    assert_eq!(first, second);
    assert!(first.is_muted);
    assert_eq!(backend.participant_rows(room.id, &bob.user_id), 1);
    assert_eq!(rooms.current_room(), Some(room.id));
}

#[tokio::test]
async fn test_join_missing_room_is_not_found() {
    let backend = InMemoryBackend::new();
    let bob = test_user("bob");
    let mut rooms = manager_for(&backend, &bob, RoomClosePolicy::LastOneOut);

    let result = rooms.join_room(RoomId::new_v4()).await;

    assert!(matches!(result, Err(CoordinatorError::NotFound(_))));
    assert_eq!(rooms.current_room(), None);
}

#[tokio::test]
async fn test_join_closed_room_is_rejected() {
    let alice = test_user("alice");
    let room = TestRoom::new(&alice.user_id).closed().build();
    let backend = InMemoryBackend::new().with_room(room.clone());
    let bob = test_user("bob");
    let mut rooms = manager_for(&backend, &bob, RoomClosePolicy::LastOneOut);

    let result = rooms.join_room(room.id).await;

    assert!(matches!(result, Err(CoordinatorError::AlreadyClosed(_))));
    assert!(backend.participants(room.id).is_empty());
}

#[tokio::test]
async fn test_join_requires_caller() {
    let alice = test_user("alice");
    let room = TestRoom::new(&alice.user_id).build();
    let backend = InMemoryBackend::new().with_room(room.clone());
    let mut rooms = RoomLifecycleManager::new(Arc::new(backend.clone()), RoomClosePolicy::LastOneOut);

    let result = rooms.join_room(room.id).await;

    assert_eq!(result.unwrap_err(), CoordinatorError::Unauthenticated);
}

#[tokio::test]
async fn test_creator_last_leaver_closes_room() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let mut rooms = manager_for(&backend, &alice, RoomClosePolicy::CreatorOnly);

    let room = rooms.create_room(None, false).await.unwrap();
    let outcome = rooms.leave_room().await.unwrap();

    assert_eq!(outcome.room_id, Some(room.id));
    assert!(outcome.room_closed);

    let stored = backend.room(room.id).unwrap();
    assert!(!stored.is_active);
    assert!(stored.closed_at.is_some());
    assert!(stored.is_consistent());

    // Leaving again is a no-op and does not reopen.
    let again = rooms.leave_room().await.unwrap();
    assert_eq!(again.room_id, None);
    assert!(!backend.room(room.id).unwrap().is_active);
}

#[tokio::test]
async fn test_leave_without_room_is_ok() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let mut rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);

    let outcome = rooms.leave_room().await.unwrap();

    assert_eq!(outcome.room_id, None);
    assert!(!outcome.room_closed);
}

#[tokio::test]
async fn test_study_hall_scenario() {
    init_test_tracing();
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let bob = test_user("bob");
    let mut alice_rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);
    let mut bob_rooms = manager_for(&backend, &bob, RoomClosePolicy::LastOneOut);

    let room = alice_rooms
        .create_room(Some("Study Hall".to_string()), false)
        .await
        .unwrap();
    bob_rooms.join_room(room.id).await.unwrap();
    assert_eq!(backend.participants(room.id).len(), 2);

    // Alice leaves: room stays open with Bob.
    let outcome = alice_rooms.leave_room().await.unwrap();
    assert!(!outcome.room_closed);
    let participants = backend.participants(room.id);
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].user_id, bob.user_id);
    assert!(backend.room(room.id).unwrap().is_active);

    // Bob leaves last: room closes.
    let outcome = bob_rooms.leave_room().await.unwrap();
    assert!(outcome.room_closed);
    let stored = backend.room(room.id).unwrap();
    assert!(!stored.is_active);
    assert!(stored.closed_at.is_some());
    assert!(backend.participants(room.id).is_empty());
}

#[tokio::test]
async fn test_concurrent_last_leavers_close_room_once() {
    let backend = InMemoryBackend::new().with_interleaving();
    let alice = test_user("alice");
    let bob = test_user("bob");
    let mut alice_rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);
    let mut bob_rooms = manager_for(&backend, &bob, RoomClosePolicy::LastOneOut);

    let room = alice_rooms.create_room(None, false).await.unwrap();
    bob_rooms.join_room(room.id).await.unwrap();

    // Both deletes land before either count, so both see an empty roster.
    let (alice_left, bob_left) = tokio::join!(alice_rooms.leave_room(), bob_rooms.leave_room());
    let alice_left = alice_left.unwrap();
    let bob_left = bob_left.unwrap();

    assert_eq!(alice_left.room_id, Some(room.id));
    assert_eq!(bob_left.room_id, Some(room.id));
    assert!(alice_left.room_closed ^ bob_left.room_closed);

    let stored = backend.room(room.id).unwrap();
    assert!(!stored.is_active);
    assert!(stored.is_consistent());
    assert!(backend.participants(room.id).is_empty());
}

#[tokio::test]
async fn test_close_closed_room_keeps_first_closed_at() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let mut rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);

    let room = rooms.create_room(None, false).await.unwrap();
    assert!(rooms.leave_room().await.unwrap().room_closed);
    let closed_at = backend.room(room.id).unwrap().closed_at.unwrap();

    let closed_again = backend
        .close_room(room.id, closed_at + Duration::hours(1))
        .await
        .unwrap();

    assert!(!closed_again);
    assert_eq!(backend.room(room.id).unwrap().closed_at, Some(closed_at));
}

#[tokio::test]
async fn test_rejoin_while_open_recreates_row() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let bob = test_user("bob");
    let mut alice_rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);
    let mut bob_rooms = manager_for(&backend, &bob, RoomClosePolicy::LastOneOut);

    let room = alice_rooms.create_room(None, false).await.unwrap();
    bob_rooms.join_room(room.id).await.unwrap();

    bob_rooms.leave_room().await.unwrap();
    assert_eq!(backend.participant_rows(room.id, &bob.user_id), 0);
    assert!(backend.room(room.id).unwrap().is_active);

    bob_rooms.join_room(room.id).await.unwrap();
    assert_eq!(backend.participant_rows(room.id, &bob.user_id), 1);
}

#[tokio::test]
async fn test_creator_only_policy_keeps_room_open_for_non_creator() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let bob = test_user("bob");
    let mut alice_rooms = manager_for(&backend, &alice, RoomClosePolicy::CreatorOnly);
    let mut bob_rooms = manager_for(&backend, &bob, RoomClosePolicy::CreatorOnly);

    let room = alice_rooms.create_room(None, false).await.unwrap();
    bob_rooms.join_room(room.id).await.unwrap();
    alice_rooms.leave_room().await.unwrap();

    let outcome = bob_rooms.leave_room().await.unwrap();

    assert!(!outcome.room_closed);
    assert!(backend.participants(room.id).is_empty());
    assert!(backend.room(room.id).unwrap().is_active);
}

#[tokio::test]
async fn test_leave_after_row_already_deleted_is_ok() {
    let alice = test_user("alice");
    let bob = test_user("bob");
    let room = TestRoom::new(&alice.user_id).build();
    let backend = InMemoryBackend::new().with_room(room.clone());
    let mut bob_rooms = manager_for(&backend, &bob, RoomClosePolicy::LastOneOut);
    let mut other_device = manager_for(&backend, &bob, RoomClosePolicy::LastOneOut);

    bob_rooms.join_room(room.id).await.unwrap();
    other_device.join_room(room.id).await.unwrap();
    other_device.leave_room().await.unwrap();

    let outcome = bob_rooms.leave_room().await.unwrap();

    assert_eq!(outcome.room_id, Some(room.id));
    // Already closed by the other device; close is not repeated.
    assert!(!outcome.room_closed);
    assert!(!backend.room(room.id).unwrap().is_active);
}

#[tokio::test]
async fn test_leave_failure_keeps_binding_for_retry() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let mut rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);
    let room = rooms.create_room(None, false).await.unwrap();

    backend.fail(BackendOp::DeleteParticipant);
    assert!(rooms.leave_room().await.is_err());
    assert_eq!(rooms.current_room(), Some(room.id));

    backend.clear_failures();
    let outcome = rooms.leave_room().await.unwrap();
    assert!(outcome.room_closed);
}

#[tokio::test]
async fn test_toggle_mute_flips_row() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let mut rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);
    let room = rooms.create_room(None, false).await.unwrap();

    let unmuted = rooms.toggle_mute().await.unwrap();
    assert!(!unmuted.is_muted);
    assert!(!backend.participants(room.id)[0].is_muted);

    let muted = rooms.toggle_mute().await.unwrap();
    assert!(muted.is_muted);
}

#[tokio::test]
async fn test_toggle_mute_without_room_is_not_found() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let mut rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);

    let result = rooms.toggle_mute().await;

    assert!(matches!(result, Err(CoordinatorError::NotFound(_))));
}

#[tokio::test]
async fn test_list_active_rooms_newest_first() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let bob = test_user("bob");
    let mut alice_rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);
    let mut bob_rooms = manager_for(&backend, &bob, RoomClosePolicy::LastOneOut);

    let first = alice_rooms.create_room(None, false).await.unwrap();
    let second = bob_rooms.create_room(None, false).await.unwrap();
    let third = alice_rooms
        .create_room(Some("Late Night".to_string()), false)
        .await
        .unwrap();

    // Alice's first room is still open: the manager just rebinds on create.
    let active = bob_rooms.list_active_rooms().await.unwrap();
    let ids: Vec<RoomId> = active.iter().map(|room| room.id).collect();
    assert_eq!(ids, vec![third.id, second.id, first.id]);

    bob_rooms.leave_room().await.unwrap();
    let active = bob_rooms.list_active_rooms().await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|room| room.id != second.id));
}

#[tokio::test]
async fn test_list_participants_for_current_room() {
    let backend = InMemoryBackend::new();
    let alice = test_user("alice");
    let bob = test_user("bob");
    let mut alice_rooms = manager_for(&backend, &alice, RoomClosePolicy::LastOneOut);
    let mut bob_rooms = manager_for(&backend, &bob, RoomClosePolicy::LastOneOut);

    assert!(bob_rooms.list_participants().await.unwrap().is_empty());

    let room = alice_rooms.create_room(None, false).await.unwrap();
    bob_rooms.join_room(room.id).await.unwrap();

    let participants = bob_rooms.list_participants().await.unwrap();
    assert_eq!(participants.len(), 2);
    assert_eq!(participants[0].user_id, alice.user_id);
    assert_eq!(participants[1].user_id, bob.user_id);
}

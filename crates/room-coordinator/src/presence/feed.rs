//! `PresenceFeed` - one backend change subscription mirrored into a snapshot.
//!
//! A feed owns a pump task that drains the change stream. Change events are
//! throttled (leading edge); explicit `watch_room` and `refresh` calls always
//! resync.

use super::throttle::ResyncThrottle;
use crate::backend::{ChangeEvent, ChangeFilter, ChangeTable, RoomBackend, SubscriptionId};
use crate::errors::CoordinatorError;
use crate::models::{Participant, Room, RoomId, UserId};
use crate::observability::metrics;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Mailbox capacity for feed commands.
const FEED_CHANNEL_BUFFER: usize = 16;

/// Consistent view of rooms and the watched room's roster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    /// Active rooms, newest first.
    pub active_rooms: Vec<Room>,
    /// Room whose roster is mirrored.
    pub room_id: Option<RoomId>,
    pub participants: Vec<Participant>,
}

#[derive(Debug)]
enum FeedCommand {
    WatchRoom {
        room_id: Option<RoomId>,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    Refresh {
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    },
}

struct FeedShared {
    user_id: UserId,
    subscription_id: SubscriptionId,
    backend: Arc<dyn RoomBackend>,
    commands: mpsc::Sender<FeedCommand>,
    snapshot: watch::Receiver<PresenceSnapshot>,
    cancel_token: CancellationToken,
    closed: AtomicBool,
}

/// Handle to a live presence feed. Clones share one subscription.
#[derive(Clone)]
pub struct PresenceFeed {
    shared: Arc<FeedShared>,
}

impl PresenceFeed {
    /// Subscribe to `rooms` and `room_participants`, load an initial snapshot
    /// and start the pump.
    pub(crate) async fn open(
        user_id: UserId,
        backend: Arc<dyn RoomBackend>,
        throttle_window: Duration,
        cancel_token: CancellationToken,
    ) -> Result<Self, CoordinatorError> {
        let change_feed = backend
            .subscribe(&[
                ChangeFilter::table(ChangeTable::Rooms),
                ChangeFilter::table(ChangeTable::RoomParticipants),
            ])
            .await?;

        let initial = match load_snapshot(backend.as_ref(), None).await {
            Ok(snapshot) => {
                metrics::record_presence_resync("initial");
                snapshot
            }
            Err(e) => {
                warn!(
                    target: "rc.presence",
                    user_id = %user_id,
                    error = %e,
                    "Initial presence load failed, starting empty"
                );
                PresenceSnapshot::default()
            }
        };

        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        let (command_tx, command_rx) = mpsc::channel(FEED_CHANNEL_BUFFER);

        let pump = FeedPump {
            user_id: user_id.clone(),
            subscription_id: change_feed.id,
            backend: Arc::clone(&backend),
            events: Some(change_feed.events),
            commands: command_rx,
            snapshot_tx,
            throttle: ResyncThrottle::new(throttle_window),
            watched_room: None,
            cancel_token: cancel_token.clone(),
        };
        tokio::spawn(pump.run());

        info!(
            target: "rc.presence",
            user_id = %user_id,
            subscription_id = change_feed.id.0,
            "Presence feed opened"
        );

        Ok(Self {
            shared: Arc::new(FeedShared {
                user_id,
                subscription_id: change_feed.id,
                backend,
                commands: command_tx,
                snapshot: snapshot_rx,
                cancel_token,
                closed: AtomicBool::new(false),
            }),
        })
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.shared.user_id
    }

    #[must_use]
    pub fn subscription_id(&self) -> SubscriptionId {
        self.shared.subscription_id
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PresenceSnapshot> {
        self.shared.snapshot.clone()
    }

    /// Whether two handles share the same subscription.
    #[must_use]
    pub fn same_feed(&self, other: &PresenceFeed) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Mirror the roster of `room_id` (or none) and resync now.
    pub async fn watch_room(&self, room_id: Option<RoomId>) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(FeedCommand::WatchRoom {
            room_id,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))?
    }

    /// Resync immediately, bypassing the throttle.
    pub async fn refresh(&self) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.send(FeedCommand::Refresh { respond_to: tx }).await?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))?
    }

    async fn send(&self, command: FeedCommand) -> Result<(), CoordinatorError> {
        if self.is_closed() {
            return Err(CoordinatorError::Internal("presence feed closed".to_string()));
        }
        self.shared
            .commands
            .send(command)
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))
    }

    /// Release the backend subscription and stop the pump. Idempotent.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.cancel_token.cancel();

        if let Err(e) = self
            .shared
            .backend
            .unsubscribe(self.shared.subscription_id)
            .await
        {
            warn!(
                target: "rc.presence",
                user_id = %self.shared.user_id,
                error = %e,
                "Failed to release change feed"
            );
        }

        info!(
            target: "rc.presence",
            user_id = %self.shared.user_id,
            subscription_id = self.shared.subscription_id.0,
            "Presence feed closed"
        );
    }
}

/// Task that drains change events and feed commands.
struct FeedPump {
    user_id: UserId,
    subscription_id: SubscriptionId,
    backend: Arc<dyn RoomBackend>,
    /// `None` once the backend ends the stream.
    events: Option<mpsc::Receiver<ChangeEvent>>,
    commands: mpsc::Receiver<FeedCommand>,
    snapshot_tx: watch::Sender<PresenceSnapshot>,
    throttle: ResyncThrottle,
    watched_room: Option<RoomId>,
    cancel_token: CancellationToken,
}

impl FeedPump {
    #[instrument(skip_all, name = "rc.actor.presence_feed", fields(user_id = %self.user_id))]
    async fn run(mut self) {
        debug!(target: "rc.presence", "Presence pump started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    break;
                }

                command = self.commands.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            // Every handle dropped without close().
                            if let Err(e) = self.backend.unsubscribe(self.subscription_id).await {
                                warn!(target: "rc.presence", error = %e, "Failed to release change feed");
                            }
                            break;
                        }
                    }
                }

                event = next_change(&mut self.events) => {
                    match event {
                        Some(event) => self.handle_change(&event).await,
                        None => {
                            warn!(target: "rc.presence", "Change feed ended by backend");
                            self.events = None;
                        }
                    }
                }
            }
        }

        debug!(target: "rc.presence", "Presence pump stopped");
    }

    async fn handle_command(&mut self, command: FeedCommand) {
        match command {
            FeedCommand::WatchRoom {
                room_id,
                respond_to,
            } => {
                self.watched_room = room_id;
                let result = self.resync("room_changed").await;
                let _ = respond_to.send(result);
            }
            FeedCommand::Refresh { respond_to } => {
                let result = self.resync("manual").await;
                let _ = respond_to.send(result);
            }
        }
    }

    async fn handle_change(&mut self, event: &ChangeEvent) {
        if !self.throttle.try_acquire(Instant::now()) {
            metrics::record_presence_event_throttled();
            debug!(
                target: "rc.presence",
                table = event.table.as_str(),
                "Change event inside throttle window, dropped"
            );
            return;
        }

        if let Err(e) = self.resync("change_feed").await {
            warn!(
                target: "rc.presence",
                table = event.table.as_str(),
                error = %e,
                "Presence resync failed"
            );
        }
    }

    async fn resync(&mut self, trigger: &str) -> Result<(), CoordinatorError> {
        let snapshot = load_snapshot(self.backend.as_ref(), self.watched_room).await?;
        debug!(
            target: "rc.presence",
            trigger,
            active_rooms = snapshot.active_rooms.len(),
            participants = snapshot.participants.len(),
            "Presence resynced"
        );
        self.snapshot_tx.send_replace(snapshot);
        metrics::record_presence_resync(trigger);
        Ok(())
    }
}

async fn load_snapshot(
    backend: &dyn RoomBackend,
    room_id: Option<RoomId>,
) -> Result<PresenceSnapshot, CoordinatorError> {
    let active_rooms = backend.list_active_rooms().await?;
    let participants = match room_id {
        Some(room_id) => backend.list_participants(room_id).await?,
        None => Vec::new(),
    };

    Ok(PresenceSnapshot {
        active_rooms,
        room_id,
        participants,
    })
}

async fn next_change(events: &mut Option<mpsc::Receiver<ChangeEvent>>) -> Option<ChangeEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

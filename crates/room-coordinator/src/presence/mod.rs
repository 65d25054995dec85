//! Presence mirroring.
//!
//! [`PresenceSync`] is the process-wide registry of presence feeds. It keeps at
//! most one live [`PresenceFeed`] and hands the same feed to every consumer
//! bound to the same user, so remounting a view never opens a second backend
//! subscription.
//!
//! # Modules
//!
//! - [`feed`] - `PresenceFeed` handle and its pump task
//! - [`throttle`] - leading-edge resync throttle

pub mod feed;
pub mod throttle;

pub use feed::{PresenceFeed, PresenceSnapshot};
pub use throttle::ResyncThrottle;

use crate::backend::RoomBackend;
use crate::errors::CoordinatorError;
use crate::models::UserId;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct PresenceSyncInner {
    backend: Arc<dyn RoomBackend>,
    throttle_window: Duration,
    active: Mutex<Option<PresenceFeed>>,
}

/// Registry of presence feeds, one per user id. Cheap to clone.
#[derive(Clone)]
pub struct PresenceSync {
    inner: Arc<PresenceSyncInner>,
}

impl PresenceSync {
    pub fn new(backend: Arc<dyn RoomBackend>, throttle_window: Duration) -> Self {
        Self {
            inner: Arc::new(PresenceSyncInner {
                backend,
                throttle_window,
                active: Mutex::new(None),
            }),
        }
    }

    /// Return the live feed for `user_id`, opening one if needed.
    ///
    /// A feed bound to a different user is closed first.
    pub async fn bind(&self, user_id: UserId) -> Result<PresenceFeed, CoordinatorError> {
        let mut active = self.inner.active.lock().await;

        if let Some(feed) = active.as_ref() {
            if feed.user_id() == &user_id && !feed.is_closed() {
                debug!(target: "rc.presence", user_id = %user_id, "Reusing presence feed");
                return Ok(feed.clone());
            }
        }

        if let Some(previous) = active.take() {
            if !previous.is_closed() {
                info!(
                    target: "rc.presence",
                    previous_user_id = %previous.user_id(),
                    user_id = %user_id,
                    "Replacing presence feed for new user"
                );
            }
            previous.close().await;
        }

        let feed = PresenceFeed::open(
            user_id,
            Arc::clone(&self.inner.backend),
            self.inner.throttle_window,
            CancellationToken::new(),
        )
        .await?;

        *active = Some(feed.clone());
        Ok(feed)
    }

    /// Close the feed for `user_id`. Returns whether one was bound.
    pub async fn unbind(&self, user_id: &UserId) -> bool {
        let mut active = self.inner.active.lock().await;

        match active.take() {
            Some(feed) if feed.user_id() == user_id => {
                feed.close().await;
                true
            }
            other => {
                *active = other;
                false
            }
        }
    }

    /// The currently bound feed, if it is still open.
    pub async fn current(&self) -> Option<PresenceFeed> {
        self.inner
            .active
            .lock()
            .await
            .as_ref()
            .filter(|feed| !feed.is_closed())
            .cloned()
    }

    /// Close whichever feed is bound.
    pub async fn shutdown(&self) {
        let feed = self.inner.active.lock().await.take();
        if let Some(feed) = feed {
            feed.close().await;
        }
    }
}

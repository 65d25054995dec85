//! Mock `AudioTransport` with scriptable remote events.
//!
//! Each successful `open` records a [`MockConnection`] handle. Tests push
//! transport events through that handle (or through [`MockAudioTransport::emit`]
//! for the most recent connection) and inspect microphone and close calls.

use async_trait::async_trait;
use room_coordinator::audio::{
    AudioGrant, AudioTransport, OpenedTransport, TransportConnection, TransportEvent,
};
use room_coordinator::errors::CoordinatorError;
use room_coordinator::models::UserId;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Event buffer per mock connection.
const EVENT_BUFFER: usize = 64;

#[derive(Debug)]
struct ConnectionState {
    identity: UserId,
    events: Option<mpsc::Sender<TransportEvent>>,
    microphone_calls: Vec<bool>,
    close_calls: usize,
    fail_microphone: bool,
}

/// Handle onto one opened mock connection.
#[derive(Debug, Clone)]
pub struct MockConnection {
    state: Arc<Mutex<ConnectionState>>,
}

impl MockConnection {
    /// Deliver a transport event to the session. Returns false once closed.
    pub async fn send(&self, event: TransportEvent) -> bool {
        let sender = self.state.lock().unwrap().events.clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().close_calls > 0
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }

    /// Every `set_microphone_enabled` argument, in order.
    pub fn microphone_calls(&self) -> Vec<bool> {
        self.state.lock().unwrap().microphone_calls.clone()
    }

    pub fn microphone_enabled(&self) -> bool {
        self.microphone_calls().last().copied().unwrap_or(false)
    }
}

/// The `TransportConnection` handed to the session.
struct MockConnectionImpl {
    state: Arc<Mutex<ConnectionState>>,
}

#[async_trait]
impl TransportConnection for MockConnectionImpl {
    fn local_identity(&self) -> UserId {
        self.state.lock().unwrap().identity.clone()
    }

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), CoordinatorError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_microphone {
            return Err(CoordinatorError::TransportError(
                "microphone publish failed".to_string(),
            ));
        }
        state.microphone_calls.push(enabled);
        Ok(())
    }

    async fn close(&self) -> Result<(), CoordinatorError> {
        let mut state = self.state.lock().unwrap();
        state.close_calls += 1;
        state.events = None;
        Ok(())
    }
}

#[derive(Debug)]
struct Inner {
    local_identity: UserId,
    permission_granted: bool,
    open_failure: Option<String>,
    open_delay: Option<Duration>,
    fail_microphone: bool,
    permission_requests: usize,
    open_calls: usize,
    connections: Vec<MockConnection>,
}

/// Scriptable audio transport. Clones share state.
#[derive(Debug, Clone)]
pub struct MockAudioTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockAudioTransport {
    /// Transport whose connections report `local_identity`.
    #[must_use]
    pub fn new(local_identity: impl Into<UserId>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                local_identity: local_identity.into(),
                permission_granted: true,
                open_failure: None,
                open_delay: None,
                fail_microphone: false,
                permission_requests: 0,
                open_calls: 0,
                connections: Vec::new(),
            })),
        }
    }

    #[must_use]
    pub fn with_permission_denied(self) -> Self {
        self.set_permission(false);
        self
    }

    /// Every open fails with `TransportError(message)`.
    #[must_use]
    pub fn with_open_failure(self, message: &str) -> Self {
        self.set_open_failure(Some(message.to_string()));
        self
    }

    /// Every open waits `delay` before answering.
    #[must_use]
    pub fn with_open_delay(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().open_delay = Some(delay);
        self
    }

    /// Connections opened from now on reject microphone changes.
    #[must_use]
    pub fn with_microphone_failure(self) -> Self {
        self.inner.lock().unwrap().fail_microphone = true;
        self
    }

    pub fn set_permission(&self, granted: bool) {
        self.inner.lock().unwrap().permission_granted = granted;
    }

    pub fn set_open_failure(&self, message: Option<String>) {
        self.inner.lock().unwrap().open_failure = message;
    }

    pub fn set_open_delay(&self, delay: Option<Duration>) {
        self.inner.lock().unwrap().open_delay = delay;
    }

    pub fn permission_requests(&self) -> usize {
        self.inner.lock().unwrap().permission_requests
    }

    pub fn open_calls(&self) -> usize {
        self.inner.lock().unwrap().open_calls
    }

    /// Handles for every connection opened so far, oldest first.
    pub fn connections(&self) -> Vec<MockConnection> {
        self.inner.lock().unwrap().connections.clone()
    }

    pub fn last_connection(&self) -> Option<MockConnection> {
        self.inner.lock().unwrap().connections.last().cloned()
    }

    /// Deliver an event on the most recent connection.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        match self.last_connection() {
            Some(connection) => connection.send(event).await,
            None => false,
        }
    }
}

#[async_trait]
impl AudioTransport for MockAudioTransport {
    async fn request_microphone_permission(&self) -> Result<bool, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.permission_requests += 1;
        Ok(inner.permission_granted)
    }

    async fn open(&self, _grant: &AudioGrant) -> Result<OpenedTransport, CoordinatorError> {
        let (delay, failure) = {
            let mut inner = self.inner.lock().unwrap();
            inner.open_calls += 1;
            (inner.open_delay, inner.open_failure.clone())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = failure {
            return Err(CoordinatorError::TransportError(message));
        }

        let (sender, events) = mpsc::channel(EVENT_BUFFER);
        let mut inner = self.inner.lock().unwrap();
        let state = Arc::new(Mutex::new(ConnectionState {
            identity: inner.local_identity.clone(),
            events: Some(sender),
            microphone_calls: Vec::new(),
            close_calls: 0,
            fail_microphone: inner.fail_microphone,
        }));
        inner.connections.push(MockConnection {
            state: Arc::clone(&state),
        });

        Ok(OpenedTransport {
            connection: Box::new(MockConnectionImpl { state }),
            events,
        })
    }
}

//! `AudioSessionActor` - owns the single live audio connection.
//!
//! The actor:
//! - Runs the connect sequence (permission, token, transport open) in a
//!   spawned attempt task so a disconnect is never blocked behind it
//! - Drains the transport event stream in emission order
//! - Tracks who is speaking and who is unmuted
//! - Drives the [`SilenceWatchdog`] and emits [`AudioEvent::SilenceTimeout`]
//!
//! # Abandoned Connects
//!
//! A disconnect that arrives while an attempt is in flight returns at once.
//! The attempt runs to completion, any connection it opened is closed, and the
//! connect caller receives [`CoordinatorError::Cancelled`]. Until then new
//! connects are rejected with [`CoordinatorError::AlreadyConnecting`].

use super::messages::{AudioConnectionState, AudioEvent, AudioSessionMessage, AudioStatus};
use super::transport::{
    AudioTransport, OpenedTransport, TokenIssuer, TransportConnection, TransportEvent,
    TransportState,
};
use super::watchdog::SilenceWatchdog;
use crate::config::Config;
use crate::errors::CoordinatorError;
use crate::models::{RoomId, UserId};
use crate::observability::metrics;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Mailbox capacity for the audio session actor.
const AUDIO_CHANNEL_BUFFER: usize = 64;

/// Timing and buffering knobs for the audio session.
#[derive(Debug, Clone)]
pub struct AudioSessionConfig {
    pub silence_timeout: Duration,
    pub token_timeout: Duration,
    pub transport_open_timeout: Duration,
    pub event_buffer: usize,
}

impl From<&Config> for AudioSessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            silence_timeout: config.silence_timeout,
            token_timeout: config.token_timeout,
            transport_open_timeout: config.transport_open_timeout,
            event_buffer: config.event_buffer,
        }
    }
}

impl Default for AudioSessionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Handle to the `AudioSessionActor`.
#[derive(Clone)]
pub struct AudioSessionHandle {
    sender: mpsc::Sender<AudioSessionMessage>,
    status: watch::Receiver<AudioStatus>,
    events: broadcast::Sender<AudioEvent>,
    cancel_token: CancellationToken,
}

impl AudioSessionHandle {
    /// Connect to a room's audio. Resolves once the attempt settles.
    ///
    /// # Errors
    ///
    /// `AlreadyConnecting` if an attempt is in flight or a connection is live;
    /// `PermissionDenied`, `TokenError`, `TransportError` from the sequence;
    /// `Cancelled` if a disconnect abandoned the attempt.
    pub async fn connect(&self, room_id: RoomId, user_id: UserId) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AudioSessionMessage::Connect {
                room_id,
                user_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))?
    }

    /// Tear down the session from any state.
    pub async fn disconnect(&self) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AudioSessionMessage::Disconnect { respond_to: tx })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))?
    }

    /// Enable or disable the local microphone. No-op without a live connection.
    pub async fn set_local_microphone_enabled(&self, enabled: bool) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AudioSessionMessage::SetLocalMicrophoneEnabled {
                enabled,
                respond_to: tx,
            })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))?
    }

    /// Whether the local microphone or any remote track is unmuted.
    pub async fn is_anyone_unmuted(&self) -> Result<bool, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AudioSessionMessage::IsAnyoneUnmuted { respond_to: tx })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))
    }

    /// Latest published status.
    #[must_use]
    pub fn status(&self) -> AudioStatus {
        self.status.borrow().clone()
    }

    /// Whether `participant` is in the latest active-speaker set.
    #[must_use]
    pub fn is_speaking(&self, participant: &UserId) -> bool {
        self.status.borrow().is_speaking(participant)
    }

    /// Watch the status; the receiver sees every change after the current value.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<AudioStatus> {
        self.status.clone()
    }

    /// Subscribe to ordered audio events from this point on.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<AudioEvent> {
        self.events.subscribe()
    }

    /// Cancel the actor. Any open connection is closed on the way out.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Result reported by a connect attempt task.
struct ConnectOutcome {
    attempt: u64,
    result: Result<OpenedTransport, CoordinatorError>,
}

/// The connect attempt currently in flight.
struct PendingConnect {
    attempt: u64,
    room_id: RoomId,
    respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    cancel_token: CancellationToken,
    /// Set by a disconnect; the attempt's result is discarded.
    abandoned: bool,
}

/// The live transport connection.
struct LiveSession {
    room_id: RoomId,
    local_identity: UserId,
    connection: Box<dyn TransportConnection>,
    events: mpsc::Receiver<TransportEvent>,
}

/// Collaborators and bounds needed by one connect attempt.
struct ConnectSteps {
    token_issuer: Arc<dyn TokenIssuer>,
    transport: Arc<dyn AudioTransport>,
    token_timeout: Duration,
    transport_open_timeout: Duration,
}

impl ConnectSteps {
    async fn run(
        &self,
        room_id: RoomId,
        user_id: &UserId,
        cancel_token: &CancellationToken,
    ) -> Result<OpenedTransport, CoordinatorError> {
        if !self.transport.request_microphone_permission().await? {
            return Err(CoordinatorError::PermissionDenied(
                "microphone access refused".to_string(),
            ));
        }

        let grant = tokio::time::timeout(
            self.token_timeout,
            self.token_issuer.issue_token(room_id, user_id),
        )
        .await
        .map_err(|_| {
            CoordinatorError::TokenError(format!(
                "token request timed out after {}s",
                self.token_timeout.as_secs()
            ))
        })??;

        debug!(
            target: "rc.audio",
            room_id = %room_id,
            server_url = %grant.server_url,
            "Audio grant issued"
        );

        let opened = tokio::time::timeout(self.transport_open_timeout, self.transport.open(&grant))
            .await
            .map_err(|_| {
                CoordinatorError::TransportError(format!(
                    "transport open timed out after {}s",
                    self.transport_open_timeout.as_secs()
                ))
            })??;

        if cancel_token.is_cancelled() {
            close_quietly(opened.connection.as_ref()).await;
            return Err(CoordinatorError::Cancelled);
        }

        Ok(opened)
    }
}

/// The `AudioSessionActor` implementation.
pub struct AudioSessionActor {
    config: AudioSessionConfig,
    token_issuer: Arc<dyn TokenIssuer>,
    transport: Arc<dyn AudioTransport>,
    receiver: mpsc::Receiver<AudioSessionMessage>,
    cancel_token: CancellationToken,
    attempt_tx: mpsc::Sender<ConnectOutcome>,
    attempt_rx: mpsc::Receiver<ConnectOutcome>,
    next_attempt: u64,
    pending: Option<PendingConnect>,
    live: Option<LiveSession>,
    state: AudioConnectionState,
    speaking: BTreeSet<UserId>,
    /// Remote participant -> track muted.
    remote_muted: HashMap<UserId, bool>,
    local_microphone_enabled: bool,
    watchdog: SilenceWatchdog,
    status_tx: watch::Sender<AudioStatus>,
    events_tx: broadcast::Sender<AudioEvent>,
}

impl AudioSessionActor {
    /// Spawn the audio session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        config: AudioSessionConfig,
        token_issuer: Arc<dyn TokenIssuer>,
        transport: Arc<dyn AudioTransport>,
        cancel_token: CancellationToken,
    ) -> (AudioSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(AUDIO_CHANNEL_BUFFER);
        let (attempt_tx, attempt_rx) = mpsc::channel(4);
        let (status_tx, status_rx) = watch::channel(AudioStatus::default());
        let (events_tx, _) = broadcast::channel(config.event_buffer.max(1));

        let actor = Self {
            watchdog: SilenceWatchdog::new(config.silence_timeout),
            config,
            token_issuer,
            transport,
            receiver,
            cancel_token: cancel_token.clone(),
            attempt_tx,
            attempt_rx,
            next_attempt: 0,
            pending: None,
            live: None,
            state: AudioConnectionState::Disconnected,
            speaking: BTreeSet::new(),
            remote_muted: HashMap::new(),
            local_microphone_enabled: false,
            status_tx,
            events_tx: events_tx.clone(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = AudioSessionHandle {
            sender,
            status: status_rx,
            events: events_tx,
            cancel_token,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "rc.actor.audio_session")]
    async fn run(mut self) {
        info!(
            target: "rc.audio",
            silence_timeout_secs = self.config.silence_timeout.as_secs(),
            "AudioSessionActor started"
        );

        loop {
            // Transport events drain ahead of intents, so a reply reflects
            // every event the transport emitted before the request.
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    info!(target: "rc.audio", "AudioSessionActor received cancellation signal");
                    self.shutdown().await;
                    break;
                }

                event = next_transport_event(&mut self.live) => {
                    self.handle_transport_event(event).await;
                }

                Some(outcome) = self.attempt_rx.recv() => {
                    self.handle_connect_outcome(outcome).await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(target: "rc.audio", "AudioSessionActor channel closed, exiting");
                            self.shutdown().await;
                            break;
                        }
                    }
                }

                () = self.watchdog.expired() => {
                    self.handle_silence_expired();
                }
            }
        }

        info!(
            target: "rc.audio",
            connect_attempts = self.next_attempt,
            "AudioSessionActor stopped"
        );
    }

    async fn handle_message(&mut self, message: AudioSessionMessage) {
        match message {
            AudioSessionMessage::Connect {
                room_id,
                user_id,
                respond_to,
            } => {
                self.handle_connect(room_id, user_id, respond_to);
            }

            AudioSessionMessage::Disconnect { respond_to } => {
                self.handle_disconnect().await;
                let _ = respond_to.send(Ok(()));
            }

            AudioSessionMessage::SetLocalMicrophoneEnabled {
                enabled,
                respond_to,
            } => {
                let result = self.handle_set_microphone(enabled).await;
                let _ = respond_to.send(result);
            }

            AudioSessionMessage::IsAnyoneUnmuted { respond_to } => {
                let _ = respond_to.send(self.is_anyone_unmuted());
            }
        }
    }

    /// Start a connect attempt, or reject it if one is already underway.
    fn handle_connect(
        &mut self,
        room_id: RoomId,
        user_id: UserId,
        respond_to: oneshot::Sender<Result<(), CoordinatorError>>,
    ) {
        if self.pending.is_some() || self.live.is_some() {
            debug!(
                target: "rc.audio",
                room_id = %room_id,
                state = self.state.as_str(),
                "Connect rejected, session already active"
            );
            let _ = respond_to.send(Err(CoordinatorError::AlreadyConnecting));
            return;
        }

        self.next_attempt += 1;
        let attempt = self.next_attempt;
        let attempt_token = self.cancel_token.child_token();

        self.pending = Some(PendingConnect {
            attempt,
            room_id,
            respond_to,
            cancel_token: attempt_token.clone(),
            abandoned: false,
        });
        self.transition(AudioConnectionState::Connecting);

        info!(
            target: "rc.audio",
            room_id = %room_id,
            user_id = %user_id,
            attempt,
            "Audio connect started"
        );

        let steps = ConnectSteps {
            token_issuer: Arc::clone(&self.token_issuer),
            transport: Arc::clone(&self.transport),
            token_timeout: self.config.token_timeout,
            transport_open_timeout: self.config.transport_open_timeout,
        };
        let outcome_tx = self.attempt_tx.clone();

        tokio::spawn(async move {
            let result = steps.run(room_id, &user_id, &attempt_token).await;

            // Actor gone: nobody will close what we opened.
            if let Err(mpsc::error::SendError(outcome)) =
                outcome_tx.send(ConnectOutcome { attempt, result }).await
            {
                if let Ok(opened) = outcome.result {
                    close_quietly(opened.connection.as_ref()).await;
                }
            }
        });
    }

    async fn handle_connect_outcome(&mut self, outcome: ConnectOutcome) {
        let pending = match self.pending.take() {
            Some(pending) if pending.attempt == outcome.attempt => pending,
            other => {
                self.pending = other;
                warn!(
                    target: "rc.audio",
                    attempt = outcome.attempt,
                    "Stale connect outcome discarded"
                );
                if let Ok(opened) = outcome.result {
                    close_quietly(opened.connection.as_ref()).await;
                }
                return;
            }
        };

        if pending.abandoned {
            if let Ok(opened) = outcome.result {
                close_quietly(opened.connection.as_ref()).await;
            }
            metrics::record_audio_connect("cancelled");
            info!(
                target: "rc.audio",
                room_id = %pending.room_id,
                attempt = pending.attempt,
                "Abandoned audio connect settled"
            );
            self.publish_status();
            let _ = pending.respond_to.send(Err(CoordinatorError::Cancelled));
            return;
        }

        let result = match outcome.result {
            Ok(opened) => self.establish(pending.room_id, opened).await,
            Err(err) => Err(err),
        };

        match &result {
            Ok(()) => {
                metrics::record_audio_connect("connected");
                info!(
                    target: "rc.audio",
                    room_id = %pending.room_id,
                    attempt = pending.attempt,
                    "Audio connected"
                );
            }
            Err(err) => {
                metrics::record_audio_connect(outcome_label(err));
                self.fail(err).await;
            }
        }

        let _ = pending.respond_to.send(result);
    }

    /// Adopt an opened transport: connected, microphone on, watchdog armed.
    async fn establish(
        &mut self,
        room_id: RoomId,
        opened: OpenedTransport,
    ) -> Result<(), CoordinatorError> {
        let OpenedTransport { connection, events } = opened;
        let local_identity = connection.local_identity();

        self.live = Some(LiveSession {
            room_id,
            local_identity,
            connection,
            events,
        });
        metrics::set_audio_connected(true);
        self.transition(AudioConnectionState::Connected);

        if let Some(session) = self.live.as_ref() {
            session.connection.set_microphone_enabled(true).await?;
        }
        self.local_microphone_enabled = true;
        self.restart_watchdog();
        self.publish_status();

        Ok(())
    }

    /// Surface a failure, then end in `Disconnected`.
    async fn fail(&mut self, err: &CoordinatorError) {
        warn!(target: "rc.audio", error = %err, "Audio session failed");
        self.transition(AudioConnectionState::Error);
        self.emit(AudioEvent::Error(err.clone()));
        self.teardown().await;
    }

    async fn handle_disconnect(&mut self) {
        if let Some(pending) = self.pending.as_mut() {
            if !pending.abandoned {
                pending.abandoned = true;
                pending.cancel_token.cancel();
                info!(
                    target: "rc.audio",
                    room_id = %pending.room_id,
                    attempt = pending.attempt,
                    "Disconnect during connect, abandoning attempt"
                );
            }
        }

        self.teardown().await;
    }

    /// Release the connection and reset all per-session state.
    async fn teardown(&mut self) {
        self.watchdog.disarm();

        if let Some(session) = self.live.take() {
            close_quietly(session.connection.as_ref()).await;
            metrics::set_audio_connected(false);
            info!(target: "rc.audio", room_id = %session.room_id, "Audio disconnected");
        }

        if !self.speaking.is_empty() {
            self.speaking.clear();
            self.emit(AudioEvent::SpeakingChanged(BTreeSet::new()));
        }
        self.remote_muted.clear();
        self.local_microphone_enabled = false;

        self.transition(AudioConnectionState::Disconnected);
        self.publish_status();
    }

    async fn handle_set_microphone(&mut self, enabled: bool) -> Result<(), CoordinatorError> {
        let Some(session) = self.live.as_ref() else {
            debug!(target: "rc.audio", enabled, "No live connection, microphone change ignored");
            return Ok(());
        };

        session.connection.set_microphone_enabled(enabled).await?;
        self.local_microphone_enabled = enabled;

        if enabled {
            self.restart_watchdog();
        } else {
            self.check_all_muted();
        }
        self.publish_status();

        Ok(())
    }

    async fn handle_transport_event(&mut self, event: Option<TransportEvent>) {
        let Some(event) = event else {
            info!(target: "rc.audio", "Transport event stream closed");
            self.teardown().await;
            return;
        };

        match event {
            TransportEvent::ConnectionStateChanged(state) => match state {
                TransportState::Connecting => {
                    self.watchdog.disarm();
                    self.transition(AudioConnectionState::Connecting);
                }
                TransportState::Connected => {
                    self.transition(AudioConnectionState::Connected);
                    self.check_all_muted();
                }
                TransportState::Reconnecting | TransportState::SignalReconnecting => {
                    // Silence is not counted while the link is down.
                    self.watchdog.disarm();
                    self.transition(AudioConnectionState::Reconnecting);
                }
                TransportState::Disconnected => self.teardown().await,
            },

            TransportEvent::ActiveSpeakersChanged(speakers) => {
                let speaking: BTreeSet<UserId> = speakers.into_iter().collect();
                let anyone_speaking = !speaking.is_empty();
                if speaking != self.speaking {
                    self.speaking = speaking.clone();
                    self.emit(AudioEvent::SpeakingChanged(speaking));
                }
                if anyone_speaking {
                    self.restart_watchdog();
                }
            }

            TransportEvent::TrackMuted { participant } => {
                if !self.is_local(&participant) {
                    self.remote_muted.insert(participant, true);
                }
                self.check_all_muted();
            }

            TransportEvent::TrackUnmuted { participant } => {
                if !self.is_local(&participant) {
                    self.remote_muted.insert(participant, false);
                }
                self.restart_watchdog();
            }

            TransportEvent::ParticipantConnected {
                participant,
                microphone_enabled,
            } => {
                if !self.is_local(&participant) {
                    debug!(target: "rc.audio", participant = %participant, "Participant connected");
                    self.remote_muted.insert(participant, !microphone_enabled);
                }
            }

            TransportEvent::ParticipantDisconnected { participant } => {
                debug!(target: "rc.audio", participant = %participant, "Participant disconnected");
                if self.speaking.remove(&participant) {
                    self.emit(AudioEvent::SpeakingChanged(self.speaking.clone()));
                }
                self.remote_muted.remove(&participant);
                self.check_all_muted();
            }

            TransportEvent::Disconnected => {
                info!(target: "rc.audio", "Transport reported disconnect");
                self.teardown().await;
            }
        }

        self.publish_status();
    }

    fn handle_silence_expired(&mut self) {
        if self.state != AudioConnectionState::Connected {
            self.watchdog.disarm();
            self.publish_status();
            return;
        }

        if self.is_anyone_unmuted() {
            debug!(
                target: "rc.audio.watchdog",
                "Silence period elapsed with someone unmuted, re-arming"
            );
            self.watchdog.reset();
            return;
        }

        info!(
            target: "rc.audio.watchdog",
            silence_secs = self.watchdog.period().as_secs(),
            "Everyone muted for the full silence period"
        );
        self.watchdog.disarm();
        metrics::record_silence_timeout();
        self.emit(AudioEvent::SilenceTimeout);
        self.publish_status();
    }

    /// Start a fresh silence period. Only counts while connected.
    fn restart_watchdog(&mut self) {
        if self.live.is_some() && self.state == AudioConnectionState::Connected {
            self.watchdog.reset();
        }
    }

    /// Arm the watchdog if nobody is unmuted.
    fn check_all_muted(&mut self) {
        if !self.is_anyone_unmuted() {
            self.restart_watchdog();
        }
    }

    fn is_anyone_unmuted(&self) -> bool {
        self.local_microphone_enabled || self.remote_muted.values().any(|muted| !muted)
    }

    fn is_local(&self, participant: &UserId) -> bool {
        self.live
            .as_ref()
            .is_some_and(|session| &session.local_identity == participant)
    }

    fn transition(&mut self, next: AudioConnectionState) {
        if self.state == next {
            return;
        }

        debug!(
            target: "rc.audio",
            from = self.state.as_str(),
            to = next.as_str(),
            "Audio state changed"
        );
        self.state = next;
        self.emit(AudioEvent::StateChanged(next));
        self.publish_status();
    }

    fn emit(&self, event: AudioEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn publish_status(&self) {
        let room_id = self.live.as_ref().map(|session| session.room_id).or_else(|| {
            self.pending
                .as_ref()
                .filter(|pending| !pending.abandoned)
                .map(|pending| pending.room_id)
        });

        let status = AudioStatus {
            state: self.state,
            room_id,
            speaking: self.speaking.clone(),
            local_microphone_enabled: self.local_microphone_enabled,
            anyone_unmuted: self.is_anyone_unmuted(),
            silence_pending: self.watchdog.is_armed(),
        };

        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    async fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel_token.cancel();
            let _ = pending.respond_to.send(Err(CoordinatorError::Cancelled));
        }
        self.teardown().await;
    }
}

/// Next event from the live connection; pending forever when there is none.
async fn next_transport_event(live: &mut Option<LiveSession>) -> Option<TransportEvent> {
    match live {
        Some(session) => session.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn close_quietly(connection: &dyn TransportConnection) {
    if let Err(e) = connection.close().await {
        warn!(target: "rc.audio", error = %e, "Failed to close transport connection");
    }
}

fn outcome_label(err: &CoordinatorError) -> &'static str {
    match err {
        CoordinatorError::PermissionDenied(_) => "permission_denied",
        CoordinatorError::TokenError(_) => "token_error",
        CoordinatorError::TransportError(_) => "transport_error",
        CoordinatorError::Timeout(_) => "timeout",
        CoordinatorError::Cancelled => "cancelled",
        _ => "error",
    }
}

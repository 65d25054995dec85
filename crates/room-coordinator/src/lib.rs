//! Room Coordinator Library
//!
//! Coordination core for ephemeral presence rooms with ambient voice:
//!
//! - Room lifecycle against a remote data store (create, idempotent join,
//!   last-one-out close)
//! - Deduplicated, throttled presence mirroring from the backend change feed
//! - A single live audio session driven through an explicit state machine
//! - Silence watchdog that ends the audio session after sustained mutual silence
//!
//! # Architecture
//!
//! ```text
//! SessionFacade (one per consumer / mounted room view)
//! ├── RoomLifecycleManager ──► RoomBackend (remote rows)
//! ├── PresenceSync (shared, one feed per user id)
//! │   └── PresenceFeed ──► RoomBackend::subscribe (change feed)
//! └── AudioSessionHandle
//!     └── AudioSessionActor (owns the one live transport connection)
//!         ├── SilenceWatchdog (at most one pending deadline)
//!         ├── TokenIssuer (short-lived access grants)
//!         └── AudioTransport ──► TransportConnection + ordered event stream
//! ```
//!
//! # Key Design Decisions
//!
//! - **Injected singletons**: the live audio connection and the per-user feed
//!   registry are owned by explicit objects, not module-level state
//! - **Actor ownership**: all audio state mutations happen inside one message
//!   loop, so transport events apply in emission order
//! - **Idempotent close**: closing a room is a conditional update, so racing
//!   final leavers cannot conflict
//!
//! # Modules
//!
//! - [`audio`] - audio session actor, transport contract, silence watchdog
//! - [`backend`] - remote data store contract and change feed types
//! - [`config`] - configuration from environment
//! - [`errors`] - error taxonomy with client-safe messages
//! - [`models`] - rooms, participants and identifiers
//! - [`observability`] - metrics
//! - [`presence`] - presence mirroring
//! - [`rooms`] - room lifecycle
//! - [`session`] - component-facing facade

pub mod audio;
pub mod backend;
pub mod config;
pub mod errors;
pub mod models;
pub mod observability;
pub mod presence;
pub mod rooms;
pub mod session;

pub use audio::{
    AudioConnectionState, AudioEvent, AudioSessionActor, AudioSessionConfig, AudioSessionHandle,
    AudioStatus,
};
pub use config::{Config, RoomClosePolicy};
pub use errors::CoordinatorError;
pub use models::{Participant, Room, RoomId, UserId, UserProfile};
pub use presence::{PresenceFeed, PresenceSnapshot, PresenceSync};
pub use rooms::{LeaveOutcome, RoomLifecycleManager};
pub use session::SessionFacade;

//! Single-session audio coordination.
//!
//! ```text
//! AudioSessionHandle ──mpsc──► AudioSessionActor
//!                                ├── connect attempt task (permission, token, open)
//!                                ├── TransportConnection + ordered TransportEvent stream
//!                                └── SilenceWatchdog
//! AudioSessionActor ──watch──► AudioStatus
//!                   ──broadcast──► AudioEvent
//! ```
//!
//! # Modules
//!
//! - [`controller`] - `AudioSessionActor` and its handle
//! - [`messages`] - mailbox messages, status and event types
//! - [`transport`] - token issuer and transport contracts
//! - [`watchdog`] - silence deadline tracking

pub mod controller;
pub mod messages;
pub mod transport;
pub mod watchdog;

pub use controller::{AudioSessionActor, AudioSessionConfig, AudioSessionHandle};
pub use messages::{AudioConnectionState, AudioEvent, AudioSessionMessage, AudioStatus};
pub use transport::{
    AudioGrant, AudioTransport, OpenedTransport, TokenIssuer, TransportConnection,
    TransportEvent, TransportState,
};
pub use watchdog::SilenceWatchdog;

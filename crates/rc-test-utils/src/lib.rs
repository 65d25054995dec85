//! # Room Coordinator Test Utilities
//!
//! Mocks and fixtures for exercising the Room Coordinator without a remote
//! data store, token service or media server.
//!
//! ## Modules
//!
//! - `memory_backend` - In-memory `RoomBackend` with a live change feed
//! - `mock_token` - Scriptable `TokenIssuer`
//! - `mock_transport` - Scriptable `AudioTransport` with remote event injection
//! - `fixtures` - Users, rooms and tracing setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let backend = InMemoryBackend::new();
//!     let transport = MockAudioTransport::new("alice");
//!     let issuer = MockTokenIssuer::new();
//!
//!     // Spawn the audio actor with the mocks, then drive remote events:
//!     transport.emit(TransportEvent::TrackUnmuted { participant: "bob".into() }).await;
//! }
//! ```

pub mod fixtures;
pub mod memory_backend;
pub mod mock_token;
pub mod mock_transport;

pub use fixtures::*;
pub use memory_backend::*;
pub use mock_token::*;
pub use mock_transport::*;

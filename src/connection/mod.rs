//! Push-event connection with a reconnecting state machine.
//!
//! - [`ConnectionManager`] owns the single logical connection, applies the
//!   backoff policy and broadcasts every transition on `status_change`.
//! - [`Transport`] is the seam to the wire: [`WebSocketTransport`] for real
//!   feeds, [`MockTransport`] for tests.

mod config;
mod manager;
pub mod mock;
mod transport;
mod websocket;

pub use config::ConnectionConfig;
pub use manager::{ConnectionManager, EnvelopeHandler, StatusChange, STATUS_TOPIC};
pub use mock::{MockOutcome, MockPeer, MockTransport};
pub use transport::{Transport, TransportFrame, TransportLink};
pub use websocket::WebSocketTransport;

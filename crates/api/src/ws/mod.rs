//! WebSocket streaming of subscription events.
//!
//! Provides the HTTP upgrade handler used by the subscription routes and the
//! [`WsTransport`] that writes stream messages as JSON text frames.

mod handler;
pub mod transport;

pub use handler::ws_handler;
pub use transport::WsTransport;

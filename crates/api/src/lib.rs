//! bujo daemon server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! WebSocket streaming, background jobs) so integration tests and the
//! binary entrypoint can both access them.

pub mod app;
pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod trash;
pub mod ws;

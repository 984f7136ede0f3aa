use std::sync::Arc;

use bujo_events::NotificationHub;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::trash::TrashLedger;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Subscriptions, producer channels and stream sessions.
    pub hub: Arc<NotificationHub>,
    /// Projects waiting to be cleaned up.
    pub trash: Arc<TrashLedger>,
    /// Live WebSocket sessions, awaited on shutdown.
    pub sessions: TaskTracker,
}

//! Route definitions for the `/subscriptions` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::subscription;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/subscriptions`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(subscription::list_subscriptions))
        .route("/{identity}", get(subscription::get_subscription))
        .route("/{identity}/ws", get(ws::ws_handler))
}

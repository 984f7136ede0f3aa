pub mod health;
pub mod subscription;
pub mod trash;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /subscriptions                          list (GET)
/// /subscriptions/{identity}               state (GET)
/// /subscriptions/{identity}/ws            stream over WebSocket (GET)
///
/// /projects/trash                         list trashed (GET)
/// /projects/{id}/trash                    trash (POST), restore (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/subscriptions", subscription::router())
        .nest("/projects", trash::router())
}

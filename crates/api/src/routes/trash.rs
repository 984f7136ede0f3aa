//! Route definitions for project trash management.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::trash;
use crate::state::AppState;

/// Routes mounted at `/projects`.
///
/// ```text
/// GET    /trash          -> list_trashed
/// POST   /{id}/trash     -> trash_project
/// DELETE /{id}/trash     -> restore_project
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trash", get(trash::list_trashed))
        .route(
            "/{id}/trash",
            post(trash::trash_project).delete(trash::restore_project),
        )
}

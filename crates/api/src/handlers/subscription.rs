//! Handlers for the `/subscriptions` resource.

use axum::extract::{Path, State};
use axum::Json;
use bujo_core::error::CoreError;
use bujo_events::EntryView;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /api/v1/subscriptions
pub async fn list_subscriptions(State(state): State<AppState>) -> Json<Vec<EntryView>> {
    Json(state.hub.registry().list())
}

/// GET /api/v1/subscriptions/{identity}
///
/// Report the identity's state (`idle`, `streaming` or `closed`) and its
/// producers. Returns 404 for unknown identities.
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> AppResult<Json<EntryView>> {
    state.hub.describe(&identity).map(Json).ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Subscription",
            id: identity,
        })
    })
}

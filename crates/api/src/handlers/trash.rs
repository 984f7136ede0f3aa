//! Handlers for project trash management.
//!
//! Trashing a project starts its retention clock; the cleanup job announces
//! it to subscribers once the retention has passed. Restoring stops the
//! clock.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bujo_core::error::CoreError;
use bujo_core::types::DbId;
use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::trash::TrashedProject;

/// GET /api/v1/projects/trash
pub async fn list_trashed(State(state): State<AppState>) -> Json<Vec<TrashedProject>> {
    Json(state.trash.list())
}

/// POST /api/v1/projects/{id}/trash
///
/// Returns 201 when the project enters the trash and 409 if it is already
/// there.
pub async fn trash_project(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<(StatusCode, Json<serde_json::Value>)> {
    validate_project_id(id)?;
    let trashed_at = Utc::now();
    if !state.trash.trash(id, trashed_at) {
        return Err(AppError::Core(CoreError::Conflict(format!(
            "Project {id} is already in the trash"
        ))));
    }

    tracing::info!(project_id = id, "Project moved to trash");
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": id,
            "trashed_at": trashed_at,
        })),
    ))
}

/// DELETE /api/v1/projects/{id}/trash
///
/// Restore a trashed project. Returns 404 if it is not in the trash.
pub async fn restore_project(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !state.trash.restore(id) {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "TrashedProject",
            id: id.to_string(),
        }));
    }
    tracing::info!(project_id = id, "Project restored from trash");
    Ok(StatusCode::NO_CONTENT)
}

fn validate_project_id(id: DbId) -> AppResult<()> {
    if id <= 0 {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Project id must be positive, got {id}"
        ))));
    }
    Ok(())
}

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{close_code, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use bujo_events::{SessionEnd, StreamSession};

use crate::error::AppResult;
use crate::state::AppState;
use crate::ws::transport::WsTransport;

/// GET /api/v1/subscriptions/{identity}/ws
///
/// Claims the subscription before upgrading so a duplicate or unknown
/// identity gets a plain HTTP error (409, 404 or 410). If the upgrade itself
/// is rejected or fails, the session is dropped and the subscription goes
/// back to Idle.
pub async fn ws_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> AppResult<Response> {
    let session = state.hub.subscribe(&identity)?;

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::info!(identity = %identity, error = %rejection, "WebSocket upgrade rejected");
            drop(session);
            return Ok(rejection.into_response());
        }
    };

    let sessions = state.sessions.clone();
    Ok(upgrade
        .on_upgrade(move |socket| sessions.track_future(stream_to_socket(socket, session))))
}

/// Run a claimed session over an upgraded connection until it ends.
async fn stream_to_socket(socket: WebSocket, session: StreamSession) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let identity = session.identity().to_string();
    tracing::info!(conn_id = %conn_id, identity = %identity, "WebSocket connected");

    let mut transport = WsTransport::from_socket(socket);
    let report = session.run(&mut transport).await;

    match report.end {
        SessionEnd::ChannelClosed => {
            transport.close(close_code::AWAY, "server shutting down").await;
        }
        SessionEnd::PeerClosed => transport.close(close_code::NORMAL, "").await,
        SessionEnd::TransportFailed => {}
    }

    tracing::info!(
        conn_id = %conn_id,
        identity = %identity,
        end = ?report.end,
        delivered = report.delivered,
        "WebSocket disconnected"
    );
}

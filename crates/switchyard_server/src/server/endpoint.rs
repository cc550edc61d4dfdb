//! HTTP surface: the WebSocket upgrade endpoint and the optional admin routes.

use super::core::{ConnectionInfo, SocketServer, Statistics};
use super::handshake::RequestMetadata;
use super::session::{SessionHandler, SessionOutcome};
use super::transport::split_socket;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use switchyard_events::ClientId;
use tracing::{debug, trace};

/// Body of `POST /invites`.
#[derive(Debug, Default, Deserialize)]
pub struct InviteRequest {
    #[serde(default, alias = "clientId")]
    pub client_id: Option<ClientId>,
}

pub(crate) fn router(server: Arc<SocketServer>) -> Router {
    let mut router = Router::new().route(&server.config.endpoint_path, get(upgrade));
    if server.config.admin_routes {
        router = router
            .route("/invites", post(create_invite))
            .route("/stats", get(statistics));
    }
    router.with_state(server)
}

async fn upgrade(
    State(server): State<Arc<SocketServer>>,
    remote: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!(%rejection, "Rejecting non-upgrade request");
            return (StatusCode::BAD_REQUEST, "Expected a WebSocket upgrade request").into_response();
        }
    };

    let metadata = RequestMetadata::from_headers(&headers, remote.map(|ConnectInfo(addr)| addr));
    upgrade.on_upgrade(move |socket| run_session(server, metadata, socket))
}

async fn run_session(server: Arc<SocketServer>, metadata: RequestMetadata, socket: WebSocket) {
    let (stream, sink) = split_socket(socket);
    let cancel = server.shutdown_token();
    let outcome = SessionHandler::new(server, metadata).run(stream, sink, cancel).await;
    if let SessionOutcome::Completed { session_id, exit, .. } = outcome {
        trace!(session = %session_id, ?exit, "Session task finished");
    }
}

async fn create_invite(
    State(server): State<Arc<SocketServer>>,
    request: Option<Json<InviteRequest>>,
) -> Json<ConnectionInfo> {
    let client_id = request
        .and_then(|Json(request)| request.client_id)
        .unwrap_or_default();
    Json(server.issue_invite(client_id))
}

async fn statistics(State(server): State<Arc<SocketServer>>) -> Json<Statistics> {
    Json(server.statistics())
}

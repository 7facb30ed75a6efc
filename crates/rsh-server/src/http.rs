//! HTTP demo surface
//!
//! `GET /get/{agent_id}?cmd=<cmdline>` dispatches a command to the agent and
//! streams its output as the response body; `GET /agents` lists registered
//! tunnels. Handler panics become HTTP 500 via the catch-panic layer.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::dispatch::dispatch;
use crate::registry::FleetRegistry;

/// Command used when the caller does not provide one.
const DEFAULT_COMMAND: &str = "ls /";

/// Deadline for HTTP-initiated dispatches.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FleetRegistry>,
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/get/{agent_id}", get(dispatch_handler))
        .route("/agents", get(list_agents))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch_handler(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let command_line = params
        .get("cmd")
        .cloned()
        .unwrap_or_else(|| DEFAULT_COMMAND.to_string());

    // Decide the status before streaming starts
    if state.registry.get(&agent_id).is_none() {
        return (
            StatusCode::NOT_FOUND,
            format!("agent {} not registered\n", agent_id),
        )
            .into_response();
    }

    let (chunk_tx, chunk_rx) = mpsc::channel(64);
    let registry = Arc::clone(&state.registry);
    tokio::spawn(async move {
        match dispatch(
            &registry,
            &agent_id,
            &command_line,
            DISPATCH_TIMEOUT,
            chunk_tx,
        )
        .await
        {
            Ok(exit_code) => {
                tracing::info!(%agent_id, exit_code, "dispatch finished");
            }
            Err(e) => {
                tracing::warn!(%agent_id, error = %e, "dispatch failed");
            }
        }
    });

    let body = Body::from_stream(
        ReceiverStream::new(chunk_rx).map(|chunk| Ok::<Bytes, Infallible>(chunk.into_bytes())),
    );
    body.into_response()
}

#[derive(Serialize)]
struct AgentInfo {
    agent_id: Option<String>,
    peer_addr: String,
    peer_common_name: Option<String>,
    uptime_secs: u64,
    last_heartbeat_millis: u64,
}

async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentInfo>> {
    let agents = state
        .registry
        .list()
        .iter()
        .map(|tunnel| AgentInfo {
            agent_id: tunnel.agent_id.clone(),
            peer_addr: tunnel.peer_addr.clone(),
            peer_common_name: tunnel.peer_common_name.clone(),
            uptime_secs: tunnel.uptime().as_secs(),
            last_heartbeat_millis: tunnel.last_heartbeat_millis(),
        })
        .collect();
    Json(agents)
}

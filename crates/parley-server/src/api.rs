use std::sync::Arc;

use axum::{
    async_trait,
    extract::{ws::WebSocketUpgrade, FromRequestParts, Path, Query, State},
    http::{request::Parts, Method},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use parley_shared::constants::MAX_FRAME_SIZE;
use parley_shared::protocol::ConversationSummary;
use parley_shared::{ConversationRef, UserId};

use crate::auth::{authenticate, IdentityVerifier};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway::Gateway;
use crate::socket;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_upgrade))
        .route("/conversations/:conversation_ref", get(conversation_info))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    name: String,
    version: &'static str,
    connections: usize,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// The user a request's bearer credential was issued for.
///
/// Extractors run in argument order: listed before `WebSocketUpgrade`, a bad
/// handshake is answered 401 before the upgrade is looked at.
pub struct AuthUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let query_token = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token);

        authenticate(state.verifier.as_ref(), &parts.headers, query_token.as_deref())
            .map(AuthUser)
            .map_err(|e| {
                debug!(path = %parts.uri.path(), error = %e, "request refused");
                ServerError::Unauthorized
            })
    }
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        connections: state.gateway.registry().len(),
    })
}

/// Hand an authenticated handshake to the gateway. A bad or missing
/// credential never gets this far: [`AuthUser`] answers 401 first.
async fn ws_upgrade(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let gateway = state.gateway.clone();
    ws.max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| socket::run(socket, gateway, user))
}

async fn conversation_info(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(conversation_ref): Path<String>,
) -> Result<Json<ConversationSummary>, ServerError> {
    let reference: ConversationRef = conversation_ref.parse().map_err(|_| {
        ServerError::BadRequest(format!("invalid conversation: {conversation_ref}"))
    })?;

    let summary = state.gateway.conversation_summary(reference, user).await?;
    Ok(Json(summary))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

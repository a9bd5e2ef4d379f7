use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, patch},
};
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use parley_types::api::{Claims, ConversationPartner, SendMessageRequest};
use parley_types::models::Message;

use crate::middleware::require_auth;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// Authenticated REST routes for conversations and messages.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/conversations", get(list_partners))
        .route(
            "/conversations/{counterpart_id}/messages",
            get(get_messages).post(send_message),
        )
        .route("/messages/{message_id}/seen", patch(mark_seen))
        .route("/messages/{message_id}", delete(delete_message))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

pub async fn list_partners(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let rows = tokio::task::spawn_blocking(move || db.list_partners(&me))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let partners: Vec<ConversationPartner> = rows
        .into_iter()
        .filter_map(|row| {
            row.into_partner()
                .map_err(|e| warn!("Skipping partner: {}", e))
                .ok()
        })
        .collect();

    Ok(Json(partners))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(counterpart_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let other = counterpart_id.to_string();
    let limit = query.limit.min(200);

    let rows = tokio::task::spawn_blocking(move || db.get_conversation(&me, &other, limit))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<Message> = rows
        .into_iter()
        .filter_map(|row| {
            row.into_message()
                .map_err(|e| warn!("Skipping message: {}", e))
                .ok()
        })
        .collect();

    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(counterpart_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = state
        .dispatcher
        .send(claims.sub, counterpart_id, req.text, req.image)
        .await
        .map_err(|e| {
            warn!("{} send to {} failed: {}", claims.sub, counterpart_id, e);
            e.status()
        })?;

    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_seen(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let me = claims.sub.to_string();
    let updated = tokio::task::spawn_blocking(move || db.mark_seen(&message_id.to_string(), &me))
        .await
        .map_err(|e| { error!("spawn_blocking join error: {}", e); StatusCode::INTERNAL_SERVER_ERROR })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let message = state
        .dispatcher
        .delete(claims.sub, message_id)
        .await
        .map_err(|e| {
            warn!("{} delete of {} failed: {}", claims.sub, message_id, e);
            e.status()
        })?;

    Ok(Json(message))
}

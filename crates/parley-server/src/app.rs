use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use parley_api::dispatch::MessageDispatcher;
use parley_api::messages;
use parley_api::state::{AppState, AppStateInner};
use parley_db::Database;
use parley_gateway::auth::TokenValidator;
use parley_gateway::connection::{self, GatewayContext};
use parley_gateway::presence::PresenceRegistry;

/// Wire the REST routes and the WebSocket gateway around one presence registry.
///
/// The registry is returned so the caller owns its teardown.
pub fn build(db: Arc<Database>, jwt_secret: &str) -> (Router, PresenceRegistry) {
    let presence = PresenceRegistry::new();
    let validator = TokenValidator::new(jwt_secret);

    let app_state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        dispatcher: MessageDispatcher::new(db.clone(), presence.clone()),
        validator: validator.clone(),
    });

    let gateway = GatewayContext {
        presence: presence.clone(),
        validator,
        db,
    };

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(gateway);

    let app = Router::new()
        .merge(messages::routes(app_state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    (app, presence)
}

async fn ws_upgrade(
    State(gateway): State<GatewayContext>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, gateway))
}

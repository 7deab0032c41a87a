//! The HTTP/WebSocket API: the dashboard's passive read interface plus the
//! two manual-trigger admin endpoints.

pub mod error;
pub mod routes;
pub mod ws;

use crate::events::{EventBus, EventStore};
use crate::middleware::{rate_limit::rate_limit_middleware, request_logging, RateLimitConfig, RateLimitLayer};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Commands the HTTP layer sends to the main orchestration loop — the API
/// itself has no chain adapter or reasoner, it only asks the loop to run
/// the routine and waits for the reply.
pub enum AdminCommand {
    SimulateAttack(oneshot::Sender<routes::SimulateAttackResponse>),
    ResetAmm(oneshot::Sender<routes::ResetAmmResponse>),
}

#[derive(Clone)]
pub struct AppState {
    pub event_store: Arc<EventStore>,
    pub bus: Arc<EventBus>,
    pub admin_tx: mpsc::Sender<AdminCommand>,
}

pub fn build_router(state: AppState) -> Router {
    let limiter = RateLimitLayer::new(RateLimitConfig::default());

    let admin = Router::new()
        .route("/api/admin/simulate-attack", post(routes::post_simulate_attack))
        .route("/api/admin/reset-amm", post(routes::post_reset_amm))
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit_middleware));

    Router::new()
        .route("/api/stats", get(routes::get_stats))
        .route("/api/events", get(routes::get_events))
        .route("/api/events/threats", get(routes::get_events_threats))
        .route("/api/events/actions", get(routes::get_events_actions))
        .route("/api/prices", get(routes::get_prices))
        .route("/health", get(routes::health_check))
        .route("/ws", get(ws::websocket_handler))
        .merge(admin)
        .layer(axum::middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! HTTP handlers for the dashboard's read surface plus the two manual
//! admin triggers — the passive event-store reader plus a small write path
//! described in SPEC_FULL §6.

use super::error::ApiError;
use super::{AdminCommand, AppState};
use crate::events::EventPayload;
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HoursQuery {
    pub hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_events: u64,
    pub threats_detected: u64,
    pub actions_taken: u64,
    pub current_oracle_price: i128,
    pub current_amm_price: i128,
    pub price_deviation: f64,
    pub amm_paused: bool,
    pub vault_paused: bool,
    pub liquidations_blocked: bool,
    pub last_update_iso: String,
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let recent_obs = state.event_store.recent_of_kind(&["ObservationEvent"], 1);
    let (oracle_price, amm_price, deviation, amm_paused, vault_paused, liq_blocked) =
        match recent_obs.last().map(|e| &e.payload) {
            Some(EventPayload::ObservationEvent { snapshot }) => (
                snapshot.oracle_price,
                snapshot.amm_spot_price,
                snapshot.deviation_pct,
                snapshot.amm_paused,
                snapshot.vault_paused,
                snapshot.liquidations_blocked,
            ),
            _ => (0, 0, 0.0, false, false, false),
        };

    let threats_detected = state.event_store.recent_threats(usize::MAX).len() as u64;

    let actions_taken = state
        .event_store
        .recent_of_kind(&["ActionEvent"], usize::MAX)
        .into_iter()
        .filter(|e| matches!(&e.payload, EventPayload::ActionEvent { action } if action.tx_hash.is_some()))
        .count() as u64;

    Json(StatsResponse {
        total_events: state.event_store.total_events(),
        threats_detected,
        actions_taken,
        current_oracle_price: oracle_price,
        current_amm_price: amm_price,
        price_deviation: deviation,
        amm_paused,
        vault_paused,
        liquidations_blocked: liq_blocked,
        last_update_iso: Utc::now().to_rfc3339(),
    })
}

pub async fn get_events(
    Query(q): Query<LimitQuery>,
    State(state): State<AppState>,
) -> Json<Vec<crate::events::Event>> {
    Json(state.event_store.recent(q.limit.unwrap_or(100)))
}

pub async fn get_events_threats(
    Query(q): Query<LimitQuery>,
    State(state): State<AppState>,
) -> Json<Vec<crate::events::Event>> {
    Json(state.event_store.recent_threats(q.limit.unwrap_or(100)))
}

pub async fn get_events_actions(
    Query(q): Query<LimitQuery>,
    State(state): State<AppState>,
) -> Json<Vec<crate::events::Event>> {
    Json(state.event_store.recent_of_kind(&["ActionEvent"], q.limit.unwrap_or(100)))
}

pub async fn get_prices(
    Query(q): Query<HoursQuery>,
    State(state): State<AppState>,
) -> Json<Vec<crate::models::Snapshot>> {
    let hours = q.hours.unwrap_or(24).clamp(1, 24 * 7);
    let since = Utc::now() - chrono::Duration::hours(hours);

    let snapshots = state
        .event_store
        .range_since(since, 100_000)
        .into_iter()
        .filter_map(|e| match e.payload {
            EventPayload::ObservationEvent { snapshot } => Some(snapshot),
            _ => None,
        })
        .collect();

    Json(snapshots)
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulateAttackResponse {
    pub success: bool,
    pub blocked: bool,
    pub message: String,
    pub tx_hash: Option<String>,
    pub price_before: Option<i128>,
    pub price_after: Option<i128>,
}

pub async fn post_simulate_attack(
    State(state): State<AppState>,
) -> Result<Json<SimulateAttackResponse>, ApiError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .admin_tx
        .send(AdminCommand::SimulateAttack(tx))
        .await
        .map_err(|_| ApiError::Internal("admin command channel closed".to_string()))?;

    rx.await
        .map(Json)
        .map_err(|_| ApiError::Internal("attack simulation task dropped its reply".to_string()))
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetAmmResponse {
    pub success: bool,
    pub message: String,
    pub new_price: Option<i128>,
    pub tx_hash: Option<String>,
}

pub async fn post_reset_amm(
    State(state): State<AppState>,
) -> Result<Json<ResetAmmResponse>, ApiError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    state
        .admin_tx
        .send(AdminCommand::ResetAmm(tx))
        .await
        .map_err(|_| ApiError::Internal("admin command channel closed".to_string()))?;

    rx.await
        .map(Json)
        .map_err(|_| ApiError::Internal("reset task dropped its reply".to_string()))
}

pub async fn health_check() -> &'static str {
    "ok"
}

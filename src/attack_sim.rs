//! The seam `POST /api/admin/simulate-attack` calls through.
//!
//! The attack-simulation scripts themselves are an out-of-core collaborator
//! (SPEC_FULL §1 Non-goals) — this module only defines the interface and a
//! production implementation that forwards the trigger to an externally
//! configured runner, the same "seam, not reimplementation" shape the
//! Chain Adapter and LLM client use for their own external collaborators.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::api::routes::SimulateAttackResponse;

#[async_trait]
pub trait AttackSimulator: Send + Sync {
    async fn simulate(&self) -> SimulateAttackResponse;
}

#[derive(Debug, Deserialize)]
struct RemoteAttackResult {
    blocked: bool,
    message: String,
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    price_before: Option<i128>,
    #[serde(default)]
    price_after: Option<i128>,
}

/// Forwards the trigger to `attack_sim_url` (POST, empty body) and relays
/// its JSON reply. When no runner is configured, returns a response saying
/// so rather than guessing at attack semantics that live outside this crate.
pub struct HttpAttackSimulator {
    http: reqwest::Client,
    url: Option<String>,
}

impl HttpAttackSimulator {
    pub fn new(url: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl AttackSimulator for HttpAttackSimulator {
    async fn simulate(&self) -> SimulateAttackResponse {
        let Some(url) = &self.url else {
            return SimulateAttackResponse {
                success: false,
                blocked: false,
                message: "no attack-simulation runner configured (ATTACK_SIM_URL unset)"
                    .to_string(),
                tx_hash: None,
                price_before: None,
                price_after: None,
            };
        };

        let resp = match self.http.post(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to reach attack-simulation runner");
                return SimulateAttackResponse {
                    success: false,
                    blocked: false,
                    message: format!("failed to reach attack runner: {e}"),
                    tx_hash: None,
                    price_before: None,
                    price_after: None,
                };
            }
        };

        if !resp.status().is_success() {
            return SimulateAttackResponse {
                success: false,
                blocked: false,
                message: format!("attack runner returned http {}", resp.status()),
                tx_hash: None,
                price_before: None,
                price_after: None,
            };
        }

        match resp.json::<RemoteAttackResult>().await {
            Ok(r) => SimulateAttackResponse {
                success: true,
                blocked: r.blocked,
                message: r.message,
                tx_hash: r.tx_hash,
                price_before: r.price_before,
                price_after: r.price_after,
            },
            Err(e) => SimulateAttackResponse {
                success: false,
                blocked: false,
                message: format!("attack runner returned a malformed response: {e}"),
                tx_hash: None,
                price_before: None,
                price_after: None,
            },
        }
    }
}

/// Scriptable test double.
pub struct FakeAttackSimulator {
    response: SimulateAttackResponse,
}

impl FakeAttackSimulator {
    pub fn new(response: SimulateAttackResponse) -> Self {
        Self { response }
    }
}

#[async_trait]
impl AttackSimulator for FakeAttackSimulator {
    async fn simulate(&self) -> SimulateAttackResponse {
        self.response.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_runner_reports_unsuccessful() {
        let sim = HttpAttackSimulator::new(None);
        let resp = sim.simulate().await;
        assert!(!resp.success);
        assert!(resp.message.contains("ATTACK_SIM_URL"));
    }

    #[tokio::test]
    async fn fake_simulator_returns_scripted_response() {
        let scripted = SimulateAttackResponse {
            success: true,
            blocked: true,
            message: "pause fired before the attack confirmed".to_string(),
            tx_hash: Some("0xabc".to_string()),
            price_before: Some(3_000_00000000),
            price_after: Some(2_000_00000000),
        };
        let sim = FakeAttackSimulator::new(scripted.clone());
        let resp = sim.simulate().await;
        assert!(resp.blocked);
        assert_eq!(resp.tx_hash, scripted.tx_hash);
    }
}

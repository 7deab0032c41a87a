//! The Observer: one tick per `poll_interval_sec`, turning a `ChainAdapter`
//! read into a `Snapshot`.
//!
//! Mirrors the polling-loop shape the feed scrapers in this codebase already
//! use (`tokio::time::interval` driving a single async step), generalized
//! from a single price feed to the oracle+AMM+vault view plus a log scan.

use crate::chain::{ChainAdapter, ChainError, Log, LogTopic};
use crate::models::{Price8, Snapshot, PRICE_SCALE};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, warn};

/// Consecutive transient-failure counter at which the Observer slows its
/// poll interval by 10x and emits a DEGRADED lifecycle event, per SPEC_FULL §7.
pub const DEGRADE_AFTER_CONSECUTIVE_FAILURES: u32 = 10;
pub const DEGRADE_SLOWDOWN_FACTOR: u32 = 10;

pub struct Observer<C: ChainAdapter> {
    chain: Arc<C>,
    cycle: u64,
    last_scanned_block: Option<u64>,
    consecutive_failures: u32,
}

/// Outcome of a single tick: either a snapshot was produced, the tick was
/// aborted (logged but no snapshot — e.g. a transient log-fetch failure),
/// or the observer has crossed into the degraded polling regime.
pub enum TickOutcome {
    Snapshot(Snapshot),
    Aborted { reason: String },
    Degraded { reason: String },
}

impl<C: ChainAdapter> Observer<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self {
            chain,
            cycle: 0,
            last_scanned_block: None,
            consecutive_failures: 0,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub async fn tick(&mut self) -> TickOutcome {
        let block = match self.chain.current_block().await {
            Ok(b) => b,
            Err(e) => return self.record_failure(e),
        };

        let view = match self.chain.fetch_view_state().await {
            Ok(v) => v,
            Err(e) => return self.record_failure(e),
        };

        let from_block = self.last_scanned_block.map(|b| b + 1).unwrap_or(block);
        let logs = match self.chain.fetch_logs(from_block, block).await {
            Ok(l) => l,
            Err(ChainError::Transient(e)) => {
                // A transient log-fetch failure aborts only this tick; the
                // view state already read this cycle is discarded rather
                // than paired with a stale log window.
                warn!(cycle = self.cycle, error = %e, "log fetch failed, aborting tick");
                self.consecutive_failures += 1;
                return TickOutcome::Aborted {
                    reason: format!("log fetch: {e}"),
                };
            }
            Err(e) => return self.record_failure(e),
        };
        self.last_scanned_block = Some(block);
        self.consecutive_failures = 0;

        let snapshot = self.assemble_snapshot(block, view, &logs);
        self.cycle += 1;
        TickOutcome::Snapshot(snapshot)
    }

    fn record_failure(&mut self, e: ChainError) -> TickOutcome {
        self.consecutive_failures += 1;
        error!(
            cycle = self.cycle,
            consecutive_failures = self.consecutive_failures,
            error = %e,
            "observation tick failed"
        );
        if self.consecutive_failures == DEGRADE_AFTER_CONSECUTIVE_FAILURES {
            return TickOutcome::Degraded {
                reason: format!(
                    "{} consecutive chain RPC failures, slowing poll interval {}x",
                    self.consecutive_failures, DEGRADE_SLOWDOWN_FACTOR
                ),
            };
        }
        TickOutcome::Aborted {
            reason: e.to_string(),
        }
    }

    fn assemble_snapshot(
        &self,
        block: u64,
        view: crate::chain::ViewState,
        logs: &[Log],
    ) -> Snapshot {
        let valid = view.amm_weth_reserve > 0
            && view.amm_usdc_reserve > 0
            && view.oracle_price > 0
            && Self::spot_price_matches_reserves(&view);

        let deviation_pct = if valid && view.oracle_price > 0 {
            let diff = (view.oracle_price - view.amm_spot_price) as f64;
            diff / view.oracle_price as f64 * 100.0
        } else {
            0.0
        };

        let swaps_in_block = logs
            .iter()
            .filter(|l| l.topic == LogTopic::Swap)
            .count() as u32;
        let largest_swap_weth = logs
            .iter()
            .filter(|l| l.topic == LogTopic::Swap)
            .filter_map(|l| l.swap_input_weth)
            .fold(0.0_f64, f64::max);
        let oracle_updates_in_block = logs
            .iter()
            .filter(|l| l.topic == LogTopic::PriceUpdated)
            .count() as u32;
        let liquidation_seen = logs.iter().any(|l| l.topic == LogTopic::Liquidation);
        let liquidated_user = logs
            .iter()
            .filter(|l| l.topic == LogTopic::Liquidation)
            .find_map(|l| l.liquidated_user.clone());

        Snapshot {
            cycle: self.cycle,
            timestamp: Utc::now(),
            block,
            oracle_price: view.oracle_price,
            amm_spot_price: view.amm_spot_price,
            weth_reserve: view.amm_weth_reserve,
            usdc_reserve: view.amm_usdc_reserve,
            deviation_pct,
            swaps_in_block,
            largest_swap_weth,
            oracle_updates_in_block,
            liquidation_seen,
            liquidated_user,
            amm_paused: view.amm_paused,
            vault_paused: view.vault_paused,
            liquidations_blocked: view.liquidations_blocked,
            valid,
        }
    }

    /// Sanity check: the AMM's reported spot price should equal
    /// `usdc_reserve / weth_reserve` within a tight tolerance. A mismatch
    /// (or zero reserves) marks the snapshot invalid rather than feeding a
    /// nonsensical deviation into the Filter.
    fn spot_price_matches_reserves(view: &crate::chain::ViewState) -> bool {
        if view.amm_weth_reserve == 0 {
            return false;
        }
        let implied: Price8 = view.amm_usdc_reserve * PRICE_SCALE / view.amm_weth_reserve;
        let diff = (implied - view.amm_spot_price).abs();
        let tolerance = view.amm_spot_price.abs() / 1_000 + 1; // 0.1% + epsilon
        diff <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FakeChainAdapter;

    fn valid_view(oracle: Price8, spot: Price8, weth: Price8, usdc: Price8) -> crate::chain::ViewState {
        crate::chain::ViewState {
            oracle_price: oracle,
            amm_weth_reserve: weth,
            amm_usdc_reserve: usdc,
            amm_spot_price: spot,
            amm_paused: false,
            vault_paused: false,
            liquidations_blocked: false,
        }
    }

    #[tokio::test]
    async fn produces_valid_snapshot_for_consistent_reserves() {
        let fake = Arc::new(FakeChainAdapter::new());
        fake.set_block(100);
        // weth=1000 (raw), usdc=300_000_000 (raw) -> implied spot = usdc*SCALE/weth = 300_000e8
        fake.push_view_state(valid_view(
            300_000 * PRICE_SCALE,
            300_000 * PRICE_SCALE,
            1_000,
            300_000_000,
        ));

        let mut obs = Observer::new(fake);
        match obs.tick().await {
            TickOutcome::Snapshot(s) => {
                assert!(s.valid);
                assert_eq!(s.cycle, 0);
                assert!(s.deviation_pct.abs() < 0.01);
            }
            _ => panic!("expected snapshot"),
        }
    }

    #[tokio::test]
    async fn zero_reserves_mark_snapshot_invalid() {
        let fake = Arc::new(FakeChainAdapter::new());
        fake.set_block(1);
        fake.push_view_state(valid_view(300_000 * PRICE_SCALE, 0, 0, 0));

        let mut obs = Observer::new(fake);
        match obs.tick().await {
            TickOutcome::Snapshot(s) => assert!(!s.valid),
            _ => panic!("expected snapshot"),
        }
    }

    #[tokio::test]
    async fn transient_failure_aborts_tick_without_incrementing_cycle() {
        let fake = Arc::new(FakeChainAdapter::new());
        fake.fail_next_view_state(ChainError::Transient(
            crate::chain::TransientChainError::Timeout("slow".into()),
        ));

        let mut obs = Observer::new(fake);
        match obs.tick().await {
            TickOutcome::Aborted { .. } => {}
            _ => panic!("expected aborted tick"),
        }
        assert_eq!(obs.cycle, 0);
        assert_eq!(obs.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn tenth_consecutive_failure_reports_degraded() {
        let fake = Arc::new(FakeChainAdapter::new());
        let mut obs = Observer::new(fake.clone());

        for _ in 0..9 {
            fake.fail_next_view_state(ChainError::Transient(
                crate::chain::TransientChainError::Network("down".into()),
            ));
            obs.tick().await;
        }
        fake.fail_next_view_state(ChainError::Transient(
            crate::chain::TransientChainError::Network("down".into()),
        ));
        match obs.tick().await {
            TickOutcome::Degraded { .. } => {}
            _ => panic!("expected degraded outcome on 10th consecutive failure"),
        }
    }
}

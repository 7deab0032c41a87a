//! The Anomaly Filter: a pure deterministic predicate deciding whether a
//! `Snapshot` warrants an (expensive) LLM reasoning call.
//!
//! Every rule uses strict inequality against a configured threshold —
//! values exactly at the boundary are NOT anomalies — and fixed-point /
//! float comparisons here never touch the wire-level `Price8` integers
//! directly other than via `Snapshot::deviation_pct`, which is itself
//! derived once in the Observer.

use crate::models::{AnomalySignal, Snapshot};

#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub price_deviation_threshold_pct: f64,
    pub extreme_move_threshold_pct: f64,
    pub large_swap_weth: f64,
}

/// Evaluates the six deterministic rules against `snapshot` and the
/// previous snapshots (most recent first). Returns the first matching
/// signal in rule order; `None` means the cycle can skip the Reasoner
/// entirely.
pub fn should_reason(
    snapshot: &Snapshot,
    previous: &[Snapshot],
    cfg: &FilterConfig,
) -> Option<AnomalySignal> {
    if !snapshot.valid {
        return None;
    }

    if snapshot.abs_deviation_pct() > cfg.price_deviation_threshold_pct {
        return Some(AnomalySignal::LargeDeviation);
    }

    if snapshot.oracle_updates_in_block > 1 {
        return Some(AnomalySignal::MultipleOracleUpdates);
    }

    if snapshot.swaps_in_block > 3 || snapshot.largest_swap_weth > cfg.large_swap_weth {
        return Some(AnomalySignal::AttackSwapPattern);
    }

    if let Some(signal) = same_block_recovery(snapshot, previous) {
        return Some(signal);
    }

    if snapshot.liquidation_seen && snapshot.abs_deviation_pct() > cfg.price_deviation_threshold_pct
    {
        return Some(AnomalySignal::UnfairLiquidation);
    }

    if let Some(prev) = previous.first() {
        if prev.amm_spot_price != 0 {
            let move_pct = ((snapshot.amm_spot_price - prev.amm_spot_price).abs() as f64)
                / (prev.amm_spot_price as f64)
                * 100.0;
            if move_pct > cfg.extreme_move_threshold_pct {
                return Some(AnomalySignal::ExtremeMove);
            }
        }
    }

    None
}

/// Rule 4: within a 3-block window `p[n-2], p[n-1], p[n]`, the price
/// returns close to where it was two snapshots ago after a large
/// single-snapshot swing — the textbook "crash, then restore before anyone
/// notices" pattern. `previous` is ordered most-recent-first, so
/// `previous[0]` is `p[n-1]` and `previous[1]` is `p[n-2]`.
fn same_block_recovery(snapshot: &Snapshot, previous: &[Snapshot]) -> Option<AnomalySignal> {
    let p_n = snapshot.amm_spot_price;
    let p_n1 = previous.first()?.amm_spot_price;
    let p_n2 = previous.get(1)?.amm_spot_price;

    if p_n2 == 0 {
        return None;
    }

    let recovered = ((p_n2 - p_n).abs() as f64) / (p_n2 as f64) * 100.0 < 1.0;
    let dipped = ((p_n1 - p_n2).abs() as f64) / (p_n2 as f64) * 100.0 > 10.0;

    if recovered && dipped {
        Some(AnomalySignal::SameBlockRecovery)
    } else {
        None
    }
}

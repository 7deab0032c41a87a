//! Deterministic context construction for the LLM call, plus the 128-bit
//! digest used for content-level deduplication.
//!
//! Key discipline: the context is built with sorted/fixed field order (a
//! `serde_json::Map` with `preserve_order` would still need this — we build
//! the object by hand instead) so that semantically identical inputs always
//! hash to the same digest.

use crate::models::{AnomalySignal, Snapshot};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningContext {
    pub block: u64,
    pub signal: &'static str,
    pub oracle_price: i128,
    pub amm_spot_price: i128,
    pub deviation_pct: f64,
    pub swaps_in_block: u32,
    pub largest_swap_weth: f64,
    pub oracle_updates_in_block: u32,
    pub liquidation_seen: bool,
    /// Most recent first, truncated to 3 entries: `(block, amm_spot_price)`.
    pub recent_prices: Vec<(u64, i128)>,
}

impl ReasoningContext {
    pub fn build(snapshot: &Snapshot, signal: AnomalySignal, previous: &[Snapshot]) -> Self {
        let recent_prices = previous
            .iter()
            .take(3)
            .map(|s| (s.block, s.amm_spot_price))
            .collect();

        Self {
            block: snapshot.block,
            signal: signal.as_str(),
            oracle_price: snapshot.oracle_price,
            amm_spot_price: snapshot.amm_spot_price,
            deviation_pct: snapshot.deviation_pct,
            swaps_in_block: snapshot.swaps_in_block,
            largest_swap_weth: snapshot.largest_swap_weth,
            oracle_updates_in_block: snapshot.oracle_updates_in_block,
            liquidation_seen: snapshot.liquidation_seen,
            recent_prices,
        }
    }

    /// 128-bit digest (truncated SHA-256) of the canonical JSON encoding.
    /// `serde_json` serializes struct fields in declaration order, which is
    /// fixed here, so this is stable across calls for identical contexts.
    pub fn digest(&self) -> [u8; 16] {
        let encoded = serde_json::to_vec(self).expect("ReasoningContext always serializes");
        let full = Sha256::digest(&encoded);
        let mut out = [0u8; 16];
        out.copy_from_slice(&full[..16]);
        out
    }

    pub fn to_prompt_json(&self) -> String {
        serde_json::to_string(self).expect("ReasoningContext always serializes")
    }
}

//! The Decider: a pure function from `(Classification, OnChainState)` to
//! `Intent`. No I/O, no mutable state — same inputs always produce the
//! same output, which is what makes the policy table in SPEC_FULL §4.5
//! testable as a straight truth table.

use crate::models::{Classification, ClassificationKind, Intent, IntentAction, OnChainState};

/// The two decider thresholds the Config surface exposes
/// (`pause_confidence_threshold`, `block_liquidation_confidence_threshold`).
/// The `UNKNOWN_ANOMALY` row's 0.90 floor is a fixed policy-table constant,
/// not a configuration option, per SPEC_FULL §6.
#[derive(Debug, Clone, Copy)]
pub struct DeciderConfig {
    pub pause_confidence_threshold: f64,
    pub block_liquidation_confidence_threshold: f64,
}

const UNKNOWN_ANOMALY_CONFIDENCE_FLOOR: f64 = 0.90;

pub fn decide(classification: &Classification, state: &OnChainState, cfg: &DeciderConfig) -> Intent {
    let c = classification.confidence;

    let candidate = match classification.kind {
        ClassificationKind::Natural => None,

        ClassificationKind::FlashLoanAttack if c >= cfg.pause_confidence_threshold => {
            if state.amm_paused {
                Some((IntentAction::None, "AMM already paused (idempotent)"))
            } else {
                Some((IntentAction::PauseAmm, "flash loan attack, high confidence"))
            }
        }
        ClassificationKind::FlashLoanAttack
            if (cfg.block_liquidation_confidence_threshold..cfg.pause_confidence_threshold)
                .contains(&c) =>
        {
            if state.amm_paused {
                None
            } else {
                Some((
                    IntentAction::BlockLiquidations,
                    "flash loan attack, moderate confidence",
                ))
            }
        }

        ClassificationKind::OracleManipulation if c >= cfg.block_liquidation_confidence_threshold => {
            if state.liquidations_blocked {
                None
            } else {
                Some((IntentAction::BlockLiquidations, "oracle manipulation suspected"))
            }
        }

        ClassificationKind::Sandwich if c >= cfg.pause_confidence_threshold => {
            if state.amm_paused {
                None
            } else {
                Some((IntentAction::PauseAmm, "sandwich attack, high confidence"))
            }
        }

        ClassificationKind::UnknownAnomaly if c >= UNKNOWN_ANOMALY_CONFIDENCE_FLOOR => {
            if state.amm_paused || state.vault_paused {
                None
            } else {
                Some((IntentAction::PauseVault, "unclassified high-confidence anomaly"))
            }
        }

        _ => None,
    };

    match candidate {
        Some((action, rationale)) => Intent {
            action,
            rationale: rationale.to_string(),
            min_confidence: c,
        },
        None => Intent::none(format!(
            "no policy rule matched: kind={:?} confidence={:.2}",
            classification.kind, c
        )),
    }
}

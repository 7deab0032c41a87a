//! Core domain types shared across the pipeline: `Snapshot`, `Classification`,
//! `Intent`, `ActionRecord`, and the process `Config`.
//!
//! These are realized as tagged structs/enums rather than untyped bags of
//! fields — every field the rest of the pipeline reads is named and typed
//! here, never stuffed into a `serde_json::Value` grab bag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A price, expressed as an integer scaled by 1e8 (8-decimal fixed point).
/// Never converted to floating point inside the filter/decider/restore-math
/// paths — only at the HTTP boundary, for display.
pub type Price8 = i128;

pub const PRICE_SCALE: i128 = 100_000_000;

/// Immutable record produced once per observation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotone cycle index, starting at 0.
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub block: u64,
    pub oracle_price: Price8,
    pub amm_spot_price: Price8,
    pub weth_reserve: Price8,
    pub usdc_reserve: Price8,
    /// Signed percent: `(oracle - amm) / oracle * 100`.
    pub deviation_pct: f64,
    pub swaps_in_block: u32,
    /// Largest single swap input seen this cycle, in WETH-equivalent units.
    pub largest_swap_weth: f64,
    pub oracle_updates_in_block: u32,
    pub liquidation_seen: bool,
    /// The liquidated address from this cycle's `Liquidation` log, when the
    /// chain adapter decoded one. `None` while `liquidation_seen` is true
    /// only if the log itself didn't carry a decodable address.
    pub liquidated_user: Option<String>,
    pub amm_paused: bool,
    pub vault_paused: bool,
    pub liquidations_blocked: bool,
    /// False when reserves/prices failed the `amm_spot = usdc/weth` sanity
    /// check (or both reserves are zero) — the Anomaly Filter treats an
    /// invalid snapshot as NATURAL without evaluating any rule.
    pub valid: bool,
}

impl Snapshot {
    pub fn abs_deviation_pct(&self) -> f64 {
        self.deviation_pct.abs()
    }
}

/// One of the deterministic conditions the Anomaly Filter can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalySignal {
    LargeDeviation,
    MultipleOracleUpdates,
    AttackSwapPattern,
    SameBlockRecovery,
    UnfairLiquidation,
    ExtremeMove,
}

impl AnomalySignal {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LargeDeviation => "LARGE_DEVIATION",
            Self::MultipleOracleUpdates => "MULTIPLE_ORACLE_UPDATES",
            Self::AttackSwapPattern => "ATTACK_SWAP_PATTERN",
            Self::SameBlockRecovery => "SAME_BLOCK_RECOVERY",
            Self::UnfairLiquidation => "UNFAIR_LIQUIDATION",
            Self::ExtremeMove => "EXTREME_MOVE",
        }
    }
}

/// The labeled output of the Reasoner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassificationKind {
    Natural,
    FlashLoanAttack,
    OracleManipulation,
    Sandwich,
    UnknownAnomaly,
}

impl ClassificationKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NATURAL" => Some(Self::Natural),
            "FLASH_LOAN_ATTACK" => Some(Self::FlashLoanAttack),
            "ORACLE_MANIPULATION" => Some(Self::OracleManipulation),
            "SANDWICH" => Some(Self::Sandwich),
            "UNKNOWN_ANOMALY" => Some(Self::UnknownAnomaly),
            _ => None,
        }
    }
}

/// Where a `Classification` came from — governs the invariant that anything
/// other than a genuine `llm` call is `NATURAL` with zero confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    DeterministicSkip,
    DedupSkip,
    Llm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ClassificationKind,
    pub confidence: f64,
    pub explanation: String,
    pub evidence: Vec<String>,
    pub source: ClassificationSource,
}

impl Classification {
    pub fn natural(source: ClassificationSource, explanation: impl Into<String>) -> Self {
        debug_assert!(
            !matches!(source, ClassificationSource::Llm),
            "natural() is for non-llm skips only"
        );
        Self {
            kind: ClassificationKind::Natural,
            confidence: 0.0,
            explanation: explanation.into(),
            evidence: Vec::new(),
            source,
        }
    }

    /// Upholds the invariant: `source != llm` implies `kind == NATURAL` and
    /// `confidence == 0`.
    pub fn is_invariant_valid(&self) -> bool {
        if self.source == ClassificationSource::Llm {
            true
        } else {
            self.kind == ClassificationKind::Natural && self.confidence == 0.0
        }
    }
}

/// The Decider's chosen action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentAction {
    None,
    PauseAmm,
    BlockLiquidations,
    PauseVault,
    Restore,
}

impl IntentAction {
    /// Severity ordering used for the tie-break rule and for the actor's
    /// coalescing queue (higher replaces lower).
    pub fn severity(self) -> u8 {
        match self {
            Self::None => 0,
            Self::BlockLiquidations => 1,
            Self::PauseAmm => 2,
            Self::PauseVault => 3,
            Self::Restore => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub action: IntentAction,
    pub rationale: String,
    pub min_confidence: f64,
}

impl Intent {
    pub fn none(rationale: impl Into<String>) -> Self {
        Self {
            action: IntentAction::None,
            rationale: rationale.into(),
            min_confidence: 0.0,
        }
    }
}

/// Product of the Actor: the outcome of attempting to execute an `Intent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub intent: Intent,
    pub success: bool,
    pub tx_hash: Option<String>,
    pub failure_reason: Option<String>,
    pub block_of_inclusion: Option<u64>,
    pub duration_ms: u64,
}

/// Read-mostly view of on-chain pause/block state, refreshed once per
/// observation tick and consulted by the Decider and Actor for idempotency.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OnChainState {
    pub amm_paused: bool,
    pub vault_paused: bool,
    pub liquidations_blocked: bool,
}

/// Process-wide configuration, environment-backed with documented defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub chain_rpc_url: String,
    pub signer_key: String,
    pub contract_weth: String,
    pub contract_usdc: String,
    pub contract_oracle: String,
    pub contract_amm: String,
    pub contract_vault: String,
    pub llm_api_key: String,
    pub llm_model: String,

    pub poll_interval_sec: u64,
    pub price_deviation_threshold_pct: f64,
    pub extreme_move_threshold_pct: f64,
    pub large_swap_weth: f64,
    pub pause_confidence_threshold: f64,
    pub block_liquidation_confidence_threshold: f64,
    pub restore_delay_sec: u64,
    pub event_store_capacity: usize,
    pub analyzed_events_capacity: usize,
    pub llm_call_timeout_sec: u64,
    /// Open question resolved: default leaves the AMM unpaused after a
    /// successful restore (see DESIGN.md).
    pub repause_after_restore: bool,
    pub http_port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        use std::env;

        let required = |key: &str| -> anyhow::Result<String> {
            env::var(key).map_err(|_| anyhow::anyhow!("missing required config: {key}"))
        };

        let parse_or = |key: &str, default: &str| -> String {
            env::var(key).unwrap_or_else(|_| default.to_string())
        };

        let parse_num = |key: &str, default: f64| -> f64 {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .unwrap_or(default)
        };

        let parse_u64 = |key: &str, default: u64| -> u64 {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(default)
        };

        Ok(Self {
            chain_rpc_url: required("CHAIN_RPC_URL")?,
            signer_key: required("SIGNER_KEY")?,
            contract_weth: required("CONTRACT_WETH")?,
            contract_usdc: required("CONTRACT_USDC")?,
            contract_oracle: required("CONTRACT_ORACLE")?,
            contract_amm: required("CONTRACT_AMM")?,
            contract_vault: required("CONTRACT_VAULT")?,
            llm_api_key: required("LLM_API_KEY")?,
            llm_model: parse_or("LLM_MODEL", "anthropic/claude-3-haiku"),

            poll_interval_sec: parse_u64("POLL_INTERVAL_SEC", 2).clamp(1, 30),
            price_deviation_threshold_pct: parse_num("PRICE_DEVIATION_THRESHOLD_PCT", 5.0),
            extreme_move_threshold_pct: parse_num("EXTREME_MOVE_THRESHOLD_PCT", 10.0),
            large_swap_weth: parse_num("LARGE_SWAP_WETH", 10.0),
            pause_confidence_threshold: parse_num("PAUSE_CONFIDENCE_THRESHOLD", 0.75),
            block_liquidation_confidence_threshold: parse_num(
                "BLOCK_LIQUIDATION_CONFIDENCE_THRESHOLD",
                0.50,
            ),
            restore_delay_sec: parse_u64("RESTORE_DELAY_SEC", 5),
            event_store_capacity: parse_u64("EVENT_STORE_CAPACITY", 10_000) as usize,
            analyzed_events_capacity: parse_u64("ANALYZED_EVENTS_CAPACITY", 1_000) as usize,
            llm_call_timeout_sec: parse_u64("LLM_CALL_TIMEOUT_SEC", 10),
            repause_after_restore: env::var("REPAUSE_AFTER_RESTORE")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
                .unwrap_or(false),
            http_port: parse_u64("PORT", 8080) as u16,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_invariant_rejects_llm_kind_on_skip() {
        let c = Classification::natural(ClassificationSource::DedupSkip, "same block");
        assert!(c.is_invariant_valid());

        let bad = Classification {
            kind: ClassificationKind::FlashLoanAttack,
            confidence: 0.9,
            explanation: "bad".into(),
            evidence: vec![],
            source: ClassificationSource::DedupSkip,
        };
        assert!(!bad.is_invariant_valid());
    }

    #[test]
    fn intent_severity_orders_pause_vault_highest() {
        assert!(IntentAction::PauseVault.severity() > IntentAction::PauseAmm.severity());
        assert!(IntentAction::PauseAmm.severity() > IntentAction::BlockLiquidations.severity());
        assert!(IntentAction::BlockLiquidations.severity() > IntentAction::None.severity());
    }

    #[test]
    fn classification_kind_parse_roundtrips_known_values() {
        for k in [
            "NATURAL",
            "FLASH_LOAN_ATTACK",
            "ORACLE_MANIPULATION",
            "SANDWICH",
            "UNKNOWN_ANOMALY",
        ] {
            assert!(ClassificationKind::parse(k).is_some(), "failed for {k}");
        }
        assert!(ClassificationKind::parse("something_else").is_none());
    }
}

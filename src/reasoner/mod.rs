//! The Reasoner: deduplication gate + LLM call + response parsing into a
//! `Classification`. The expensive half of the cost-gated classifier —
//! everything here runs only when the Anomaly Filter already fired.

pub mod cache;
pub mod context;
pub mod llm;

use crate::models::{AnomalySignal, Classification, ClassificationKind, ClassificationSource, Snapshot};
use cache::ReasonerCache;
use context::ReasoningContext;
use llm::{LlmClient, LlmError, RawLlmResponse};
use std::time::Duration;
use tracing::{info, warn};

pub struct Reasoner<L: LlmClient> {
    llm: std::sync::Arc<L>,
    cache: ReasonerCache,
    call_timeout: Duration,
    model: String,
}

/// Outcome of a reasoning step: the classification plus whether an LLM call
/// actually happened, for the efficiency-invariant test suite.
pub struct ReasonOutcome {
    pub classification: Classification,
    pub llm_called: bool,
}

impl<L: LlmClient> Reasoner<L> {
    pub fn new(llm: std::sync::Arc<L>, analyzed_events_capacity: usize, call_timeout: Duration, model: String) -> Self {
        Self {
            llm,
            cache: ReasonerCache::new(analyzed_events_capacity),
            call_timeout,
            model,
        }
    }

    pub async fn reason(
        &mut self,
        snapshot: &Snapshot,
        signal: AnomalySignal,
        previous: &[Snapshot],
    ) -> ReasonOutcome {
        if self.cache.is_same_block(snapshot.block) {
            return ReasonOutcome {
                classification: Classification::natural(
                    ClassificationSource::DedupSkip,
                    "same block already analyzed",
                ),
                llm_called: false,
            };
        }

        let ctx = ReasoningContext::build(snapshot, signal, previous);
        let digest = ctx.digest();

        if self.cache.is_same_context(&digest) {
            return ReasonOutcome {
                classification: Classification::natural(
                    ClassificationSource::DedupSkip,
                    "identical context already analyzed",
                ),
                llm_called: false,
            };
        }

        if signal == AnomalySignal::UnfairLiquidation {
            if let Some(user) = liquidation_event_key_user(snapshot) {
                let key = format!("liq:{user}:{}", snapshot.block);
                if self.cache.contains_analyzed_event(&key) {
                    return ReasonOutcome {
                        classification: Classification::natural(
                            ClassificationSource::DedupSkip,
                            "liquidation event already analyzed",
                        ),
                        llm_called: false,
                    };
                }
                self.cache.insert_analyzed_event(key);
            }
        }

        let prompt = build_prompt(&ctx, &self.model);
        let raw = self.llm.complete(&prompt, self.call_timeout).await;

        let classification = match raw {
            Err(LlmError::Timeout) | Err(LlmError::Transport(_)) => {
                warn!(block = snapshot.block, "LLM transport failure, no dedup state update");
                // Transport failures intentionally skip record_llm_reply so
                // the next cycle may retry.
                Classification {
                    kind: ClassificationKind::UnknownAnomaly,
                    confidence: 0.5,
                    explanation: "LLM unavailable".to_string(),
                    evidence: Vec::new(),
                    source: ClassificationSource::Llm,
                }
            }
            Ok(body) => {
                self.cache.record_llm_reply(snapshot.block, digest);
                parse_llm_reply(&body)
            }
        };

        info!(
            block = snapshot.block,
            kind = ?classification.kind,
            confidence = classification.confidence,
            source = ?classification.source,
            "reasoning complete"
        );

        ReasonOutcome {
            classification,
            llm_called: true,
        }
    }
}

/// Keys the per-liquidation dedup entry on the actual liquidated address
/// (`liq:{user}:{block}`, per spec). Falls back to a per-block key only if
/// the adapter saw a `Liquidation` log but couldn't decode an address out of
/// it — this should not happen against a well-formed log stream.
fn liquidation_event_key_user(snapshot: &Snapshot) -> Option<String> {
    if !snapshot.liquidation_seen {
        return None;
    }
    Some(
        snapshot
            .liquidated_user
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
    )
}

fn build_prompt(ctx: &ReasoningContext, model_hint: &str) -> String {
    format!(
        "You are a DeFi security monitor evaluating on-chain market data for model {model_hint}.\n\
         Respond with ONLY a JSON object matching exactly this schema:\n\
         {{\"classification\": one of [\"NATURAL\",\"FLASH_LOAN_ATTACK\",\"ORACLE_MANIPULATION\",\"SANDWICH\",\"UNKNOWN_ANOMALY\"], \
         \"confidence\": number in [0,1], \"explanation\": string, \"evidence\": array of up to 5 strings}}\n\n\
         Market state:\n{}",
        ctx.to_prompt_json()
    )
}

/// Parses the LLM's JSON reply into a `Classification`. On parse failure or
/// an unrecognized enum value, falls back to `UNKNOWN_ANOMALY` at
/// confidence 0.5 per SPEC_FULL §4.4 — this is a content failure, distinct
/// from the transport failure handled in `reason()`.
fn parse_llm_reply(body: &str) -> Classification {
    let parsed: Result<RawLlmResponse, _> = serde_json::from_str(body);

    let raw = match parsed {
        Ok(r) => r,
        Err(_) => {
            return Classification {
                kind: ClassificationKind::UnknownAnomaly,
                confidence: 0.5,
                explanation: "parse failure".to_string(),
                evidence: Vec::new(),
                source: ClassificationSource::Llm,
            }
        }
    };

    let kind = ClassificationKind::parse(&raw.classification).unwrap_or(ClassificationKind::UnknownAnomaly);
    let confidence = raw.confidence.clamp(0.0, 1.0);
    let evidence = raw.evidence.into_iter().take(5).collect();

    Classification {
        kind,
        confidence,
        explanation: raw.explanation,
        evidence,
        source: ClassificationSource::Llm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoner::llm::FakeLlmClient;
    use chrono::Utc;
    use std::sync::Arc;

    fn snapshot(block: u64) -> Snapshot {
        Snapshot {
            cycle: block,
            timestamp: Utc::now(),
            block,
            oracle_price: 200_000_000_000,
            amm_spot_price: 120_000_000_000,
            weth_reserve: 1_000,
            usdc_reserve: 120_000,
            deviation_pct: 40.0,
            swaps_in_block: 1,
            largest_swap_weth: 50.0,
            oracle_updates_in_block: 0,
            liquidation_seen: false,
            liquidated_user: None,
            amm_paused: false,
            vault_paused: false,
            liquidations_blocked: false,
            valid: true,
        }
    }

    #[tokio::test]
    async fn successful_call_classifies_and_updates_dedup_state() {
        let fake = Arc::new(FakeLlmClient::new());
        fake.push_reply(
            r#"{"classification":"FLASH_LOAN_ATTACK","confidence":0.92,"explanation":"big swap","evidence":["40% deviation"]}"#,
        );
        let mut reasoner = Reasoner::new(fake, 1000, Duration::from_secs(10), "test-model".into());

        let s = snapshot(100);
        let outcome = reasoner.reason(&s, AnomalySignal::LargeDeviation, &[]).await;

        assert!(outcome.llm_called);
        assert_eq!(outcome.classification.kind, ClassificationKind::FlashLoanAttack);
        assert_eq!(outcome.classification.confidence, 0.92);

        // Second call, same block: dedup skip, no further LLM call.
        let outcome2 = reasoner.reason(&s, AnomalySignal::LargeDeviation, &[]).await;
        assert!(!outcome2.llm_called);
        assert_eq!(outcome2.classification.kind, ClassificationKind::Natural);
        assert_eq!(outcome2.classification.source, ClassificationSource::DedupSkip);
    }

    #[tokio::test]
    async fn parse_failure_still_updates_dedup_state() {
        let fake = Arc::new(FakeLlmClient::new());
        fake.push_reply("not json");
        let mut reasoner = Reasoner::new(fake.clone(), 1000, Duration::from_secs(10), "test-model".into());

        let s = snapshot(200);
        let outcome = reasoner.reason(&s, AnomalySignal::LargeDeviation, &[]).await;
        assert_eq!(outcome.classification.kind, ClassificationKind::UnknownAnomaly);
        assert_eq!(outcome.classification.explanation, "parse failure");

        fake.push_reply("not json either");
        let outcome2 = reasoner.reason(&s, AnomalySignal::LargeDeviation, &[]).await;
        assert!(!outcome2.llm_called);
        assert_eq!(outcome2.classification.source, ClassificationSource::DedupSkip);
    }

    #[tokio::test]
    async fn timeout_does_not_update_dedup_state_allowing_retry() {
        let fake = Arc::new(FakeLlmClient::new());
        fake.push_timeout();
        fake.push_reply(
            r#"{"classification":"FLASH_LOAN_ATTACK","confidence":0.8,"explanation":"x","evidence":[]}"#,
        );
        let mut reasoner = Reasoner::new(fake, 1000, Duration::from_secs(10), "test-model".into());

        let s = snapshot(300);
        let outcome = reasoner.reason(&s, AnomalySignal::LargeDeviation, &[]).await;
        assert_eq!(outcome.classification.kind, ClassificationKind::UnknownAnomaly);
        assert_eq!(outcome.classification.explanation, "LLM unavailable");

        // Next cycle, same block: dedup state was NOT updated, so the LLM
        // is called again rather than short-circuiting.
        let outcome2 = reasoner.reason(&s, AnomalySignal::LargeDeviation, &[]).await;
        assert!(outcome2.llm_called);
        assert_eq!(outcome2.classification.kind, ClassificationKind::FlashLoanAttack);
    }

    #[tokio::test]
    async fn unknown_enum_value_maps_to_unknown_anomaly() {
        let fake = Arc::new(FakeLlmClient::new());
        fake.push_reply(
            r#"{"classification":"SOMETHING_ELSE","confidence":0.6,"explanation":"x","evidence":[]}"#,
        );
        let mut reasoner = Reasoner::new(fake, 1000, Duration::from_secs(10), "test-model".into());
        let outcome = reasoner
            .reason(&snapshot(400), AnomalySignal::ExtremeMove, &[])
            .await;
        assert_eq!(outcome.classification.kind, ClassificationKind::UnknownAnomaly);
    }

    #[tokio::test]
    async fn confidence_is_clamped_to_unit_interval() {
        let fake = Arc::new(FakeLlmClient::new());
        fake.push_reply(
            r#"{"classification":"SANDWICH","confidence":1.5,"explanation":"x","evidence":[]}"#,
        );
        let mut reasoner = Reasoner::new(fake, 1000, Duration::from_secs(10), "test-model".into());
        let outcome = reasoner
            .reason(&snapshot(500), AnomalySignal::AttackSwapPattern, &[])
            .await;
        assert_eq!(outcome.classification.confidence, 1.0);
    }
}

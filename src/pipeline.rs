//! The per-cycle orchestration: `Clock → Observer → Filter → (Reasoner?) →
//! Decider → (Actor?) → EventStore → Bus`, plus the hook that arms the
//! Restore Scheduler after a successful `PAUSE_AMM`.
//!
//! Kept as a standalone, generic-over-collaborators struct (rather than
//! inlined in `main`) so the integration tests can drive the exact same
//! cycle logic against `FakeChainAdapter` + `FakeLlmClient` that
//! production drives against the real adapters.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::actor::Actor;
use crate::chain::ChainAdapter;
use crate::decider::{self, DeciderConfig};
use crate::events::{Event, EventBus, EventPayload, EventStore, LifecycleLevel};
use crate::filter::{self, FilterConfig};
use crate::models::{IntentAction, OnChainState, Snapshot};
use crate::observer::{Observer, TickOutcome, DEGRADE_AFTER_CONSECUTIVE_FAILURES};
use crate::reasoner::llm::LlmClient;
use crate::reasoner::Reasoner;
use crate::restore::RestoreScheduler;

/// How many previous snapshots the Filter/Reasoner ever need (the 3-block
/// recovery window plus slack); bounding this keeps per-cycle memory flat
/// regardless of how long the process has been running.
const SNAPSHOT_HISTORY_DEPTH: usize = 8;

pub struct PipelineConfig {
    pub filter: FilterConfig,
    pub decider: DeciderConfig,
}

/// Outcome of one `run_cycle` call, surfaced to the caller so it can adapt
/// its own poll cadence (SPEC_FULL §7: 10x slowdown after 10 consecutive
/// failures, restored to normal on recovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Observed,
    Aborted,
    Degraded,
}

pub struct Pipeline<C: ChainAdapter, L: LlmClient> {
    chain: Arc<C>,
    observer: Observer<C>,
    reasoner: Reasoner<L>,
    actor: Actor<C>,
    restore: Arc<RestoreScheduler<C>>,
    event_store: Arc<EventStore>,
    bus: Arc<EventBus>,
    cfg: PipelineConfig,
    history: VecDeque<Snapshot>,
    on_chain_state: OnChainState,
    was_degraded: bool,
    restore_armed: bool,
}

impl<C: ChainAdapter + 'static, L: LlmClient + 'static> Pipeline<C, L> {
    pub fn new(
        chain: Arc<C>,
        reasoner: Reasoner<L>,
        restore: Arc<RestoreScheduler<C>>,
        event_store: Arc<EventStore>,
        bus: Arc<EventBus>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            observer: Observer::new(chain.clone()),
            actor: Actor::new(chain.clone()),
            chain,
            reasoner,
            restore,
            event_store,
            bus,
            cfg,
            history: VecDeque::with_capacity(SNAPSHOT_HISTORY_DEPTH),
            on_chain_state: OnChainState::default(),
            was_degraded: false,
            restore_armed: false,
        }
    }

    fn publish(&self, cycle: u64, payload: EventPayload) -> Event {
        let event = self.event_store.append(cycle, payload);
        self.bus.publish(event.clone());
        event
    }

    /// Most-recent-first slice of up to `SNAPSHOT_HISTORY_DEPTH` prior
    /// snapshots — the shape the Filter's 3-block window and the
    /// Reasoner's context both expect.
    fn previous_snapshots(&self) -> Vec<Snapshot> {
        self.history.iter().cloned().collect()
    }

    fn push_history(&mut self, snapshot: Snapshot) {
        self.history.push_front(snapshot);
        while self.history.len() > SNAPSHOT_HISTORY_DEPTH {
            self.history.pop_back();
        }
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        match self.observer.tick().await {
            TickOutcome::Snapshot(snapshot) => {
                if self.was_degraded {
                    self.was_degraded = false;
                    self.publish(
                        snapshot.cycle,
                        EventPayload::AgentLifecycleEvent {
                            level: LifecycleLevel::Info,
                            message: "observation recovered, resuming normal poll interval"
                                .to_string(),
                        },
                    );
                }

                self.on_chain_state = OnChainState {
                    amm_paused: snapshot.amm_paused,
                    vault_paused: snapshot.vault_paused,
                    liquidations_blocked: snapshot.liquidations_blocked,
                };

                let cycle = snapshot.cycle;
                self.publish(cycle, EventPayload::ObservationEvent { snapshot: snapshot.clone() });

                let previous = self.previous_snapshots();
                if let Some(signal) = filter::should_reason(&snapshot, &previous, &self.cfg.filter) {
                    self.publish(cycle, EventPayload::AnomalyEvent { signal: signal.as_str() });

                    let outcome = self.reasoner.reason(&snapshot, signal, &previous).await;
                    self.publish(
                        cycle,
                        EventPayload::ReasoningEvent {
                            classification: outcome.classification.clone(),
                        },
                    );

                    let intent = decider::decide(&outcome.classification, &self.on_chain_state, &self.cfg.decider);
                    self.publish(cycle, EventPayload::DecisionEvent { intent: intent.clone() });

                    if intent.action != IntentAction::None {
                        // A fresh actionable intent supersedes any restore
                        // still waiting to fire.
                        if self.restore_armed {
                            self.restore.cancel();
                            self.restore_armed = false;
                        }

                        let action_intent = intent.clone();
                        let record = self.actor.execute(intent, &self.on_chain_state).await;
                        self.publish(cycle, EventPayload::ActionEvent { action: record.clone() });

                        if record.success && action_intent.action == IntentAction::PauseAmm {
                            self.arm_restore(cycle, snapshot.oracle_price);
                        }
                    }
                }

                self.push_history(snapshot);
                CycleOutcome::Observed
            }
            TickOutcome::Aborted { reason } => {
                warn!(reason = %reason, "observation cycle aborted");
                CycleOutcome::Aborted
            }
            TickOutcome::Degraded { reason } => {
                self.was_degraded = true;
                error!(
                    reason = %reason,
                    threshold = DEGRADE_AFTER_CONSECUTIVE_FAILURES,
                    "observation loop entering degraded polling regime"
                );
                self.publish(
                    0,
                    EventPayload::AgentLifecycleEvent {
                        level: LifecycleLevel::Degraded,
                        message: reason,
                    },
                );
                CycleOutcome::Degraded
            }
        }
    }

    /// Spawns the armed restore on the current Tokio runtime and appends a
    /// `RestoreEvent` once it resolves — the cycle itself does not block on
    /// the `restore_delay_sec` wait.
    fn arm_restore(&mut self, cycle: u64, target_oracle_price: crate::models::Price8) {
        self.restore_armed = true;
        let fut = self.restore.arm(target_oracle_price);
        let event_store = self.event_store.clone();
        let bus = self.bus.clone();

        tokio::spawn(async move {
            let outcome = fut.await;
            let event = event_store.append(
                cycle,
                EventPayload::RestoreEvent {
                    success: outcome.success,
                    new_price: outcome.new_price,
                    tx_hash: outcome.tx_hash,
                    message: outcome.message,
                },
            );
            bus.publish(event);
        });

        info!(cycle, target_oracle_price, "restore armed after successful pause");
    }

    /// Drives a manual restore (the `POST /api/admin/reset-amm` path) to
    /// completion synchronously, publishing the resulting `RestoreEvent`
    /// before returning — unlike `arm_restore`, the caller is waiting on an
    /// HTTP response and needs the outcome, not just the side effect.
    pub async fn manual_restore(&mut self, target_oracle_price: crate::models::Price8) -> crate::restore::RestoreOutcome {
        self.restore_armed = false;
        let outcome = self.restore.arm(target_oracle_price).await;
        let event = self.event_store.append(
            0,
            EventPayload::RestoreEvent {
                success: outcome.success,
                new_price: outcome.new_price,
                tx_hash: outcome.tx_hash,
                message: outcome.message.clone(),
            },
        );
        self.bus.publish(event);
        outcome
    }

    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    pub fn on_chain_state(&self) -> OnChainState {
        self.on_chain_state
    }

    /// Oracle price from the most recent observed snapshot, if any — the
    /// target price `POST /api/admin/reset-amm` restores the AMM toward.
    pub fn last_oracle_price(&self) -> Option<crate::models::Price8> {
        self.history.front().map(|s| s.oracle_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FakeChainAdapter;
    use crate::models::PRICE_SCALE;
    use crate::reasoner::llm::FakeLlmClient;
    use std::time::Duration;

    fn default_cfg() -> PipelineConfig {
        PipelineConfig {
            filter: FilterConfig {
                price_deviation_threshold_pct: 5.0,
                extreme_move_threshold_pct: 10.0,
                large_swap_weth: 10.0,
            },
            decider: DeciderConfig {
                pause_confidence_threshold: 0.75,
                block_liquidation_confidence_threshold: 0.50,
            },
        }
    }

    fn view(oracle: i128, spot: i128, weth: i128, usdc: i128) -> crate::chain::ViewState {
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

    fn make_pipeline(
        chain: Arc<FakeChainAdapter>,
        llm: Arc<FakeLlmClient>,
    ) -> Pipeline<FakeChainAdapter, FakeLlmClient> {
        let reasoner = Reasoner::new(llm, 1000, Duration::from_secs(10), "test-model".to_string());
        let restore = Arc::new(RestoreScheduler::new(chain.clone(), Duration::from_millis(5), false));
        let store = Arc::new(EventStore::new(1000));
        let bus = Arc::new(EventBus::new());
        Pipeline::new(chain, reasoner, restore, store, bus, default_cfg())
    }

    #[tokio::test]
    async fn quiet_market_produces_only_an_observation_event() {
        let chain = Arc::new(FakeChainAdapter::new());
        chain.set_block(1);
        chain.push_view_state(view(2_000 * PRICE_SCALE, 2_002 * PRICE_SCALE, 1_000, 2_002_000));
        let llm = Arc::new(FakeLlmClient::new());

        let mut pipeline = make_pipeline(chain, llm.clone());
        let outcome = pipeline.run_cycle().await;

        assert_eq!(outcome, CycleOutcome::Observed);
        assert_eq!(llm.call_count(), 0);
        assert_eq!(pipeline.event_store.total_events(), 1);
    }

    #[tokio::test]
    async fn large_deviation_triggers_reasoning_and_pause() {
        let chain = Arc::new(FakeChainAdapter::new());
        chain.set_block(10);
        // oracle 2000, amm 1200 -> 40% deviation
        chain.push_view_state(view(2_000 * PRICE_SCALE, 1_200 * PRICE_SCALE, 1_000, 1_200_000));
        let llm = Arc::new(FakeLlmClient::new());
        llm.push_reply(
            r#"{"classification":"FLASH_LOAN_ATTACK","confidence":0.92,"explanation":"big swap","evidence":["40% deviation"]}"#,
        );

        let mut pipeline = make_pipeline(chain.clone(), llm.clone());
        pipeline.run_cycle().await;

        assert_eq!(llm.call_count(), 1);
        assert_eq!(chain.submitted_calls().len(), 1);
        assert_eq!(chain.submitted_calls()[0].method(), "amm.pause");

        // 5 events: Observation, Anomaly, Reasoning, Decision, Action.
        assert_eq!(pipeline.event_store.total_events(), 5);
    }

    #[tokio::test]
    async fn threshold_boundary_deviation_does_not_reason() {
        let chain = Arc::new(FakeChainAdapter::new());
        chain.set_block(1);
        // exactly 5.00% deviation -> strict > means no anomaly
        chain.push_view_state(view(2_000 * PRICE_SCALE, 2_100 * PRICE_SCALE, 1_000, 2_100_000));
        let llm = Arc::new(FakeLlmClient::new());

        let mut pipeline = make_pipeline(chain, llm.clone());
        pipeline.run_cycle().await;

        assert_eq!(llm.call_count(), 0);
        assert_eq!(pipeline.event_store.total_events(), 1);
    }
}

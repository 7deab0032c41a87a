//! The Actor: executes an `Intent` against the chain, guarded so at most
//! one transaction is in flight at a time, with depth-1 coalescing for
//! anything queued behind it.

use crate::chain::{retry_transient, ChainAdapter, ChainCall, ChainError};
use crate::models::{ActionRecord, Intent, IntentAction, OnChainState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

/// Depth-1 coalescing queue: a newly submitted intent replaces whatever is
/// pending only if it is at least as severe; lower-severity intents behind
/// an in-flight higher-severity one are simply dropped.
pub struct PendingQueue {
    slot: Mutex<Option<Intent>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self { slot: Mutex::new(None) }
    }

    /// Returns `true` if `intent` was accepted into the (possibly replaced)
    /// pending slot.
    pub fn offer(&self, intent: Intent) -> bool {
        let mut guard = self.slot.lock();
        let accept = match guard.as_ref() {
            None => true,
            Some(pending) => intent.action.severity() >= pending.action.severity(),
        };
        if accept {
            *guard = Some(intent);
        }
        accept
    }

    pub fn take(&self) -> Option<Intent> {
        self.slot.lock().take()
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Actor<C: ChainAdapter> {
    chain: Arc<C>,
    in_flight: AsyncMutex<()>,
}

impl<C: ChainAdapter> Actor<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self {
            chain,
            in_flight: AsyncMutex::new(()),
        }
    }

    /// Executes `intent` against `state`, reconciling with the already-known
    /// on-chain pause/block flags so a redundant intent never reaches the
    /// chain adapter at all.
    pub async fn execute(&self, intent: Intent, state: &OnChainState) -> ActionRecord {
        let _guard = self.in_flight.lock().await;
        let started = Instant::now();

        if intent.action == IntentAction::None {
            return ActionRecord {
                intent,
                success: true,
                tx_hash: None,
                failure_reason: None,
                block_of_inclusion: None,
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }

        if is_redundant(intent.action, state) {
            info!(
                action = ?intent.action,
                "intent redundant with current on-chain state, skipping submission"
            );
            return ActionRecord {
                intent,
                success: true,
                tx_hash: None,
                failure_reason: None,
                block_of_inclusion: None,
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }

        let call = to_chain_call(intent.action);
        let chain = self.chain.clone();
        let result = retry_transient(|| {
            let chain = chain.clone();
            let call = call.clone();
            async move { chain.submit(call).await }
        })
        .await;

        match result {
            Ok(receipt) => {
                info!(action = ?intent.action, tx_hash = %receipt.tx_hash, "action executed");
                ActionRecord {
                    intent,
                    success: true,
                    tx_hash: Some(receipt.tx_hash),
                    failure_reason: None,
                    block_of_inclusion: Some(receipt.block),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(ChainError::Permanent(e)) if e.is_idempotent_revert() => {
                info!(
                    action = ?intent.action,
                    revert = %e,
                    "revert indicates already in target state, treating as success"
                );
                ActionRecord {
                    intent,
                    success: true,
                    tx_hash: None,
                    failure_reason: None,
                    block_of_inclusion: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
            Err(e) => {
                warn!(action = ?intent.action, error = %e, "action failed");
                ActionRecord {
                    intent,
                    success: false,
                    tx_hash: None,
                    failure_reason: Some(e.to_string()),
                    block_of_inclusion: None,
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }
}

fn is_redundant(action: IntentAction, state: &OnChainState) -> bool {
    match action {
        IntentAction::None => true,
        IntentAction::PauseAmm => state.amm_paused,
        IntentAction::BlockLiquidations => state.liquidations_blocked,
        IntentAction::PauseVault => state.vault_paused,
        IntentAction::Restore => false,
    }
}

fn to_chain_call(action: IntentAction) -> ChainCall {
    match action {
        IntentAction::PauseAmm => ChainCall::AmmPause,
        IntentAction::BlockLiquidations => ChainCall::VaultBlockLiquidations,
        IntentAction::PauseVault => ChainCall::VaultPause {
            reason: "anomaly detected".to_string(),
        },
        IntentAction::Restore => ChainCall::AmmUnpause,
        IntentAction::None => unreachable!("None is handled before reaching to_chain_call"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FakeChainAdapter;

    fn intent(action: IntentAction) -> Intent {
        Intent {
            action,
            rationale: "test".into(),
            min_confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn redundant_pause_amm_skips_chain_call() {
        let fake = Arc::new(FakeChainAdapter::new());
        let actor = Actor::new(fake.clone());
        let state = OnChainState {
            amm_paused: true,
            ..Default::default()
        };

        let record = actor.execute(intent(IntentAction::PauseAmm), &state).await;
        assert!(record.success);
        assert!(record.tx_hash.is_none());
        assert_eq!(fake.submitted_calls().len(), 0);
    }

    #[tokio::test]
    async fn non_redundant_pause_amm_submits_transaction() {
        let fake = Arc::new(FakeChainAdapter::new());
        fake.set_block(50);
        let actor = Actor::new(fake.clone());

        let record = actor.execute(intent(IntentAction::PauseAmm), &OnChainState::default()).await;
        assert!(record.success);
        assert!(record.tx_hash.is_some());
        assert_eq!(fake.submitted_calls().len(), 1);
    }

    #[tokio::test]
    async fn idempotent_revert_is_treated_as_success() {
        let fake = Arc::new(FakeChainAdapter::new());
        fake.fail_next_submit(ChainError::Permanent(
            crate::chain::PermanentChainError::Revert("Error: already paused".into()),
        ));
        let actor = Actor::new(fake);

        let record = actor.execute(intent(IntentAction::PauseAmm), &OnChainState::default()).await;
        assert!(record.success);
        assert!(record.tx_hash.is_none());
    }

    #[tokio::test]
    async fn genuine_permanent_failure_reports_unsuccessful() {
        let fake = Arc::new(FakeChainAdapter::new());
        fake.fail_next_submit(ChainError::Permanent(
            crate::chain::PermanentChainError::Revert("Error: insufficient funds".into()),
        ));
        let actor = Actor::new(fake);

        let record = actor.execute(intent(IntentAction::PauseAmm), &OnChainState::default()).await;
        assert!(!record.success);
        assert!(record.failure_reason.is_some());
    }

    #[test]
    fn pending_queue_coalesces_to_higher_severity() {
        let queue = PendingQueue::new();
        assert!(queue.offer(intent(IntentAction::BlockLiquidations)));
        assert!(queue.offer(intent(IntentAction::PauseVault)));
        let taken = queue.take().unwrap();
        assert_eq!(taken.action, IntentAction::PauseVault);
    }

    #[test]
    fn pending_queue_rejects_lower_severity_replacement() {
        let queue = PendingQueue::new();
        assert!(queue.offer(intent(IntentAction::PauseVault)));
        assert!(!queue.offer(intent(IntentAction::BlockLiquidations)));
        let taken = queue.take().unwrap();
        assert_eq!(taken.action, IntentAction::PauseVault);
    }
}

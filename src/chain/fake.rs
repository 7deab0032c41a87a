//! Scriptable in-memory `ChainAdapter` used by the Filter/Decider/Actor test
//! suite and the integration tests — lets a test drive a sequence of
//! snapshots and assert on the calls the Actor submits.

use super::adapter::ChainAdapter;
use super::errors::ChainError;
use super::types::{ChainCall, Log, TxReceipt, ViewState};
use async_trait::async_trait;
use parking_lot::Mutex;

#[derive(Default)]
struct FakeState {
    block: u64,
    view_states: Vec<ViewState>,
    logs_by_block: Vec<(u64, u64, Vec<Log>)>,
    next_view_error: Option<ChainError>,
    next_logs_error: Option<ChainError>,
    next_submit_error: Option<ChainError>,
    submitted: Vec<ChainCall>,
}

/// A fully in-memory `ChainAdapter`. Queue up view states / logs / errors
/// ahead of time with the builder methods, then drive the pipeline against
/// it; `submitted_calls()` lets a test assert on what the Actor attempted.
pub struct FakeChainAdapter {
    state: Mutex<FakeState>,
}

impl FakeChainAdapter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn set_block(&self, block: u64) {
        self.state.lock().block = block;
    }

    pub fn push_view_state(&self, view: ViewState) {
        self.state.lock().view_states.push(view);
    }

    pub fn push_logs(&self, from_block: u64, to_block: u64, logs: Vec<Log>) {
        self.state
            .lock()
            .logs_by_block
            .push((from_block, to_block, logs));
    }

    pub fn fail_next_view_state(&self, err: ChainError) {
        self.state.lock().next_view_error = Some(err);
    }

    pub fn fail_next_logs(&self, err: ChainError) {
        self.state.lock().next_logs_error = Some(err);
    }

    pub fn fail_next_submit(&self, err: ChainError) {
        self.state.lock().next_submit_error = Some(err);
    }

    pub fn submitted_calls(&self) -> Vec<ChainCall> {
        self.state.lock().submitted.clone()
    }
}

impl Default for FakeChainAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainAdapter for FakeChainAdapter {
    async fn current_block(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().block)
    }

    async fn fetch_view_state(&self) -> Result<ViewState, ChainError> {
        let mut guard = self.state.lock();
        if let Some(err) = guard.next_view_error.take() {
            return Err(err);
        }
        if guard.view_states.is_empty() {
            return Ok(ViewState {
                oracle_price: 0,
                amm_weth_reserve: 0,
                amm_usdc_reserve: 0,
                amm_spot_price: 0,
                amm_paused: false,
                vault_paused: false,
                liquidations_blocked: false,
            });
        }
        if guard.view_states.len() == 1 {
            Ok(guard.view_states[0].clone())
        } else {
            Ok(guard.view_states.remove(0))
        }
    }

    async fn fetch_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, ChainError> {
        let mut guard = self.state.lock();
        if let Some(err) = guard.next_logs_error.take() {
            return Err(err);
        }
        if let Some(pos) = guard
            .logs_by_block
            .iter()
            .position(|(f, t, _)| *f == from_block && *t == to_block)
        {
            Ok(guard.logs_by_block.remove(pos).2)
        } else {
            Ok(Vec::new())
        }
    }

    async fn submit(&self, call: ChainCall) -> Result<TxReceipt, ChainError> {
        let mut guard = self.state.lock();
        if let Some(err) = guard.next_submit_error.take() {
            return Err(err);
        }
        let block = guard.block;
        guard.submitted.push(call.clone());
        Ok(TxReceipt {
            tx_hash: format!("0xfake{}", guard.submitted.len()),
            block,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::errors::TransientChainError;

    #[tokio::test]
    async fn returns_queued_view_state_then_repeats_last() {
        let fake = FakeChainAdapter::new();
        fake.push_view_state(ViewState {
            oracle_price: 300_000_000_000,
            amm_weth_reserve: 1_000,
            amm_usdc_reserve: 3_000_000,
            amm_spot_price: 300_000_000_000,
            amm_paused: false,
            vault_paused: false,
            liquidations_blocked: false,
        });

        let v1 = fake.fetch_view_state().await.unwrap();
        assert_eq!(v1.oracle_price, 300_000_000_000);
        let v2 = fake.fetch_view_state().await.unwrap();
        assert_eq!(v2.oracle_price, 300_000_000_000);
    }

    #[tokio::test]
    async fn fail_next_view_state_surfaces_once() {
        let fake = FakeChainAdapter::new();
        fake.fail_next_view_state(ChainError::Transient(TransientChainError::Timeout(
            "slow".into(),
        )));

        assert!(fake.fetch_view_state().await.is_err());
        assert!(fake.fetch_view_state().await.is_ok());
    }

    #[tokio::test]
    async fn submit_records_calls_in_order() {
        let fake = FakeChainAdapter::new();
        fake.set_block(42);
        fake.submit(ChainCall::AmmPause).await.unwrap();
        fake.submit(ChainCall::VaultBlockLiquidations).await.unwrap();

        let calls = fake.submitted_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].method(), "amm.pause");
        assert_eq!(calls[1].method(), "vault.blockLiquidations");
    }
}

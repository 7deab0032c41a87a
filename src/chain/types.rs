//! Wire/ABI-adjacent types the Chain Adapter hands back to the Observer and
//! Actor: decoded view-call results, log entries, and transaction outcomes.

use crate::models::Price8;
use serde::{Deserialize, Serialize};

/// A decoded log entry in the range the Observer asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    pub block: u64,
    pub topic: LogTopic,
    /// Present for `Swap`: WETH-equivalent input amount.
    pub swap_input_weth: Option<f64>,
    /// Present for `Liquidation`: the liquidated user address.
    pub liquidated_user: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum LogTopic {
    Swap,
    PriceUpdated,
    Liquidation,
    EmergencyPaused,
    LiquidationsBlocked,
    ReserveAnomaly,
}

/// Raw (not-yet-assembled-into-a-Snapshot) view of the oracle/AMM/vault
/// contract state fetched this tick.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub oracle_price: Price8,
    pub amm_weth_reserve: Price8,
    pub amm_usdc_reserve: Price8,
    pub amm_spot_price: Price8,
    pub amm_paused: bool,
    pub vault_paused: bool,
    pub liquidations_blocked: bool,
}

#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block: u64,
}

/// The write calls the Actor and Restore Scheduler can submit. Kept as a
/// closed enum (not a free-form method string) so every call site is
/// exhaustively matched against the ABI surface in SPEC_FULL §6.
#[derive(Debug, Clone)]
pub enum ChainCall {
    AmmPause,
    AmmUnpause,
    VaultPause { reason: String },
    VaultUnpause,
    VaultBlockLiquidations,
    VaultUnblockLiquidations,
    AmmSwapWethForUsdc { amount_weth: Price8 },
    AmmSwapUsdcForWeth { amount_usdc: Price8 },
    OracleForceUpdatePrice { price: Price8 },
}

impl ChainCall {
    pub fn method(&self) -> &'static str {
        match self {
            Self::AmmPause => "amm.pause",
            Self::AmmUnpause => "amm.unpause",
            Self::VaultPause { .. } => "vault.pause",
            Self::VaultUnpause => "vault.unpause",
            Self::VaultBlockLiquidations => "vault.blockLiquidations",
            Self::VaultUnblockLiquidations => "vault.unblockLiquidations",
            Self::AmmSwapWethForUsdc { .. } => "amm.swapWethForUsdc",
            Self::AmmSwapUsdcForWeth { .. } => "amm.swapUsdcForWeth",
            Self::OracleForceUpdatePrice { .. } => "oracle.forceUpdatePrice",
        }
    }
}

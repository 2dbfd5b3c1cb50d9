//! ERC-20 transfers through an alloy provider.
//!
//! The merchant wallet signs every transfer. Callers reach the chain through
//! [`TokenTransfer`] so the payment flow does not depend on a live node.

use std::time::Duration;

use alloy::network::{EthereumWallet, ReceiptResponse};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{
    DynProvider, PendingTransactionError, Provider, ProviderBuilder, WatchTxError,
};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function transfer(address to, uint256 value) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid RPC URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("{0}")]
    Rpc(String),

    #[error("Transaction {0} reverted")]
    Reverted(TxHash),

    #[error("Transaction {tx_hash} not confirmed after {secs} seconds")]
    ConfirmationTimeout { tx_hash: TxHash, secs: u64 },
}

/// Outcome of a confirmed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}

#[async_trait]
pub trait TokenTransfer: Send + Sync {
    /// Submit `token.transfer(to, amount)` and wait until the network confirms it.
    async fn transfer(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TransferReceipt, ChainError>;
}

pub struct Erc20Client {
    provider: DynProvider,
    merchant: Address,
    confirmations: u64,
    timeout: Option<Duration>,
}

impl Erc20Client {
    pub fn new(
        rpc_url: &str,
        private_key: &str,
        confirmations: u64,
        timeout: Option<Duration>,
    ) -> Result<Self, ChainError> {
        let url: url::Url = rpc_url.parse().map_err(|e: url::ParseError| {
            ChainError::InvalidUrl {
                url: rpc_url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let key_hex = private_key.strip_prefix("0x").unwrap_or(private_key);
        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| ChainError::Wallet(format!("Invalid private key format: {}", e)))?;
        let merchant = signer.address();

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        log::info!("Chain client ready, signing as {}", merchant);

        Ok(Self {
            provider,
            merchant,
            confirmations: confirmations.max(1),
            timeout,
        })
    }

    /// Address derived from the merchant private key.
    pub fn merchant(&self) -> Address {
        self.merchant
    }

    pub async fn balance_of(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        let contract = IERC20::new(token, self.provider.clone());
        contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }

    pub async fn decimals(&self, token: Address) -> Result<u8, ChainError> {
        let contract = IERC20::new(token, self.provider.clone());
        contract
            .decimals()
            .call()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))
    }
}

#[async_trait]
impl TokenTransfer for Erc20Client {
    async fn transfer(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TransferReceipt, ChainError> {
        let contract = IERC20::new(token, self.provider.clone());

        let pending = contract
            .transfer(to, amount)
            .send()
            .await
            .map_err(|e| ChainError::Rpc(e.to_string()))?
            .with_required_confirmations(self.confirmations)
            .with_timeout(self.timeout);
        let tx_hash = *pending.tx_hash();
        log::info!(
            "Submitted transfer of {} units of {} to {}: {}",
            amount,
            token,
            to,
            tx_hash
        );

        let receipt = pending.get_receipt().await.map_err(|e| match e {
            PendingTransactionError::TxWatcher(WatchTxError::Timeout) => {
                ChainError::ConfirmationTimeout {
                    tx_hash,
                    secs: self.timeout.map(|t| t.as_secs()).unwrap_or_default(),
                }
            }
            other => ChainError::Rpc(other.to_string()),
        })?;

        if !receipt.status() {
            log::warn!("Transfer {} reverted", tx_hash);
            return Err(ChainError::Reverted(tx_hash));
        }

        log::debug!("Transfer {} confirmed in block {:?}", tx_hash, receipt.block_number());
        Ok(TransferReceipt {
            tx_hash,
            block_number: receipt.block_number(),
        })
    }
}

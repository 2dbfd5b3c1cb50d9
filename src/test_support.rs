use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256, address};
use async_trait::async_trait;
use common::{
    ChainError, Database, PriceTable, RetryQueue, TokenConfig, TokenRegistry, TokenTransfer,
    TransferReceipt,
};

use crate::state::{AppState, Settlement};

pub const NOLLYSPOT_TOKEN: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");
pub const NOLLYWOOD_SPOTLIGHT_TOKEN: Address =
    address!("0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512");
pub const MERCHANT: Address = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
pub const REFUND: Address = address!("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

#[derive(Debug, Clone, PartialEq)]
pub struct TransferCall {
    pub token: Address,
    pub to: Address,
    pub amount: U256,
    pub tx_hash: TxHash,
}

/// Chain stand-in that records every confirmed transfer.
#[derive(Default)]
pub struct RecordingChain {
    calls: Mutex<Vec<TransferCall>>,
    failure: Mutex<Option<String>>,
    delay: Option<Duration>,
    nonce: AtomicU64,
}

impl RecordingChain {
    pub fn failing(reason: &str) -> Self {
        let chain = Self::default();
        chain.fail_with(reason);
        chain
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_with(&self, reason: &str) {
        *self.failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn succeed(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn calls(&self) -> Vec<TransferCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenTransfer for RecordingChain {
    async fn transfer(
        &self,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TransferReceipt, ChainError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.failure.lock().unwrap().clone() {
            return Err(ChainError::Rpc(reason));
        }

        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst) + 1;
        let tx_hash = TxHash::left_padding_from(&nonce.to_be_bytes());
        self.calls.lock().unwrap().push(TransferCall {
            token,
            to,
            amount,
            tx_hash,
        });
        Ok(TransferReceipt {
            tx_hash,
            block_number: Some(nonce),
        })
    }
}

static QUEUE_FILES: AtomicU64 = AtomicU64::new(0);

/// App state over a fresh in-memory database and its own retry-queue file.
pub async fn test_state(chain: Arc<RecordingChain>) -> AppState {
    let db = Database::in_memory().await.unwrap();
    let queue_path = std::env::temp_dir().join(format!(
        "nollyspot_pending_{}_{}.json",
        std::process::id(),
        QUEUE_FILES.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_file(&queue_path);
    let retry_queue = RetryQueue::load(&queue_path).await.unwrap();

    AppState::new(
        db,
        chain,
        TokenRegistry::new(
            TokenConfig {
                address: NOLLYSPOT_TOKEN,
                decimals: 18,
            },
            TokenConfig {
                address: NOLLYWOOD_SPOTLIGHT_TOKEN,
                decimals: 18,
            },
        ),
        PriceTable::default(),
        Settlement {
            merchant_address: MERCHANT,
            refund_address: REFUND,
            fee_percent: 2.5,
        },
        retry_queue,
    )
}

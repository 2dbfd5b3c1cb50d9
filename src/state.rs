use std::sync::Arc;

use alloy::primitives::Address;
use common::{Database, PriceTable, RetryQueue, TokenRegistry, TokenTransfer};

/// Where payments and refunds are sent, and what the platform keeps.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub merchant_address: Address,
    pub refund_address: Address,
    pub fee_percent: f64,
}

pub struct AppState {
    pub db: Database,
    pub chain: Arc<dyn TokenTransfer>,
    pub tokens: TokenRegistry,
    pub prices: PriceTable,
    pub settlement: Settlement,
    pub retry_queue: RetryQueue,
}

impl AppState {
    pub fn new(
        db: Database,
        chain: Arc<dyn TokenTransfer>,
        tokens: TokenRegistry,
        prices: PriceTable,
        settlement: Settlement,
        retry_queue: RetryQueue,
    ) -> Self {
        AppState {
            db,
            chain,
            tokens,
            prices,
            settlement,
            retry_queue,
        }
    }
}

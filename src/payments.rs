//! Payment and refund flows.
//!
//! Both flows talk to the chain first and write to the database only after the
//! transfer is confirmed. A write that fails at that point goes to the retry
//! queue instead of being reported as a failed payment.

use std::time::Duration;

use actix_web::web;
use common::{
    ChainError, NewTransaction, PendingOp, TokenSymbol, Transaction, TransactionStatus,
    refund_amount, to_token_units,
};
use serde::Serialize;
use tokio::time::sleep;

use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("User {0} not found")]
    UserNotFound(i64),

    #[error("Post {0} not found")]
    PostNotFound(i64),

    #[error("Transaction {0} not found")]
    TransactionNotFound(i64),

    #[error("Post {post_id} does not belong to user {user_id}")]
    PostOwnerMismatch { post_id: i64, user_id: i64 },

    #[error("Transaction {0} has already been refunded")]
    AlreadyRefunded(i64),

    #[error("A refund for transaction {0} is already in progress")]
    RefundInProgress(i64),

    #[error("Transaction {id} is {status} and cannot be refunded")]
    NotRefundable { id: i64, status: TransactionStatus },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub token: TokenSymbol,
    pub amount: f64,
    pub user_id: i64,
    pub post_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub tx_hash: String,
    /// None when the row is still waiting in the retry queue.
    pub transaction: Option<Transaction>,
    pub queued: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundReceipt {
    pub transaction_id: i64,
    pub refund_amount: f64,
    pub refund_tx_hash: String,
    pub queued: bool,
}

/// Collects `request.amount` of the token into the merchant address and
/// records a completed transaction.
///
/// Paying for a purchased post settles its pending row rather than adding one.
pub async fn process_payment(
    state: &AppState,
    request: &PaymentRequest,
) -> Result<PaymentReceipt, PaymentError> {
    if state.db.get_user(request.user_id).await?.is_none() {
        return Err(PaymentError::UserNotFound(request.user_id));
    }
    if let Some(post_id) = request.post_id {
        let post = state
            .db
            .get_post(post_id)
            .await?
            .ok_or(PaymentError::PostNotFound(post_id))?;
        if post.user_id != request.user_id {
            return Err(PaymentError::PostOwnerMismatch {
                post_id,
                user_id: request.user_id,
            });
        }
    }

    let token = state.tokens.get(request.token);
    let units = to_token_units(request.amount, token.decimals)
        .map_err(|e| PaymentError::InvalidAmount(e.to_string()))?;

    log::info!(
        "Collecting {} {} ({} units) for user {}",
        request.amount,
        request.token,
        units,
        request.user_id
    );
    let receipt = state
        .chain
        .transfer(token.address, state.settlement.merchant_address, units)
        .await
        .map_err(|e| {
            log::error!(
                "Payment transfer for user {} failed: {}",
                request.user_id,
                e
            );
            e
        })?;
    let tx_hash = receipt.tx_hash.to_string();

    let new_transaction = NewTransaction::completed(
        request.user_id,
        request.token,
        request.amount,
        request.post_id,
        tx_hash.clone(),
    );
    match state.db.save_transaction(&new_transaction).await {
        Ok(transaction) => Ok(PaymentReceipt {
            tx_hash,
            transaction: Some(transaction),
            queued: false,
        }),
        Err(e) => {
            log::error!(
                "Transfer {} confirmed but saving it failed: {:#}",
                tx_hash,
                e
            );
            state
                .retry_queue
                .push_and_persist(PendingOp::SaveTransaction(new_transaction))
                .await?;
            Ok(PaymentReceipt {
                tx_hash,
                transaction: None,
                queued: true,
            })
        }
    }
}

/// Sends the transaction's amount minus the platform fee to the refund
/// address and marks the transaction refunded.
///
/// The `completed` → `refunding` claim happens before the transfer, so only
/// one request can refund a given transaction.
pub async fn process_refund(
    state: &AppState,
    transaction_id: i64,
) -> Result<RefundReceipt, PaymentError> {
    let transaction = state
        .db
        .get_transaction(transaction_id)
        .await?
        .ok_or(PaymentError::TransactionNotFound(transaction_id))?;
    check_refundable(&transaction)?;

    let refund = refund_amount(transaction.amount, state.settlement.fee_percent);
    let token = state.tokens.get(transaction.token_type);
    let units = to_token_units(refund, token.decimals)
        .map_err(|e| PaymentError::InvalidAmount(e.to_string()))?;

    let claimed = state
        .db
        .transition_status(
            transaction_id,
            TransactionStatus::Completed,
            TransactionStatus::Refunding,
        )
        .await?;
    if !claimed {
        // Someone else moved the row between the read and the claim.
        return match state.db.get_transaction(transaction_id).await? {
            Some(current) => {
                check_refundable(&current)?;
                Err(PaymentError::RefundInProgress(transaction_id))
            }
            None => Err(PaymentError::TransactionNotFound(transaction_id)),
        };
    }

    log::info!(
        "Refunding {} {} ({} units) for transaction {}",
        refund,
        transaction.token_type,
        units,
        transaction_id
    );
    let receipt = match state
        .chain
        .transfer(token.address, state.settlement.refund_address, units)
        .await
    {
        Ok(receipt) => receipt,
        Err(e) => {
            log::error!("Refund transfer for transaction {} failed: {}", transaction_id, e);
            release_claim(state, transaction_id).await;
            return Err(e.into());
        }
    };
    let refund_tx_hash = receipt.tx_hash.to_string();

    let queued = match state.db.complete_refund(transaction_id, &refund_tx_hash).await {
        Ok(true) => false,
        Ok(false) => {
            log::warn!(
                "Transaction {} left the refunding state before refund {} was recorded",
                transaction_id,
                refund_tx_hash
            );
            false
        }
        Err(e) => {
            log::error!(
                "Refund {} confirmed but recording it failed: {:#}",
                refund_tx_hash,
                e
            );
            state
                .retry_queue
                .push_and_persist(PendingOp::CompleteRefund {
                    transaction_id,
                    refund_tx_hash: refund_tx_hash.clone(),
                })
                .await?;
            true
        }
    };

    Ok(RefundReceipt {
        transaction_id,
        refund_amount: refund,
        refund_tx_hash,
        queued,
    })
}

fn check_refundable(transaction: &Transaction) -> Result<(), PaymentError> {
    match transaction.status {
        TransactionStatus::Completed => Ok(()),
        TransactionStatus::Refunded => Err(PaymentError::AlreadyRefunded(transaction.id)),
        TransactionStatus::Refunding => Err(PaymentError::RefundInProgress(transaction.id)),
        status @ TransactionStatus::Pending => Err(PaymentError::NotRefundable {
            id: transaction.id,
            status,
        }),
    }
}

/// Puts a claimed transaction back to `completed` after a failed transfer.
async fn release_claim(state: &AppState, transaction_id: i64) {
    let released = state
        .db
        .transition_status(
            transaction_id,
            TransactionStatus::Refunding,
            TransactionStatus::Completed,
        )
        .await;
    if let Err(e) = released {
        log::error!(
            "Failed to release refund claim on transaction {}: {:#}",
            transaction_id,
            e
        );
        if let Err(e) = state
            .retry_queue
            .push_and_persist(PendingOp::ReleaseRefund { transaction_id })
            .await
        {
            log::error!(
                "Transaction {} is stuck in refunding: {:#}",
                transaction_id,
                e
            );
        }
    }
}

/// Replays queued database writes every `interval`.
pub async fn start_retry_runner(data: web::Data<AppState>, interval: Duration) {
    loop {
        sleep(interval).await;
        if data.retry_queue.is_empty().await {
            continue;
        }
        match data.retry_queue.flush(&data.db).await {
            Ok(applied) if applied > 0 => {
                log::info!("Applied {} queued database operations", applied)
            }
            Ok(_) => {}
            Err(e) => log::error!("Error flushing retry queue: {:#}", e),
        }
    }
}

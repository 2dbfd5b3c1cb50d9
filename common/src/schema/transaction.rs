use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::TokenSymbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Recorded by a purchase, nothing has moved on chain yet.
    Pending,
    Completed,
    /// A refund transfer has been claimed and is in flight.
    Refunding,
    Refunded,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Pending,
        TransactionStatus::Completed,
        TransactionStatus::Refunding,
        TransactionStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Refunding => "refunding",
            TransactionStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown transaction status: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub token_type: TokenSymbol,
    pub amount: f64,
    pub post_id: Option<i64>,
    pub status: TransactionStatus,
    pub tx_hash: Option<String>,
    pub refund_tx_hash: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A transaction row waiting to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub user_id: i64,
    pub token_type: TokenSymbol,
    pub amount: f64,
    pub post_id: Option<i64>,
    pub status: TransactionStatus,
    pub tx_hash: Option<String>,
    /// When the transfer confirmed. The database clock is used when absent.
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

impl NewTransaction {
    pub fn completed(
        user_id: i64,
        token_type: TokenSymbol,
        amount: f64,
        post_id: Option<i64>,
        tx_hash: String,
    ) -> Self {
        NewTransaction {
            user_id,
            token_type,
            amount,
            post_id,
            status: TransactionStatus::Completed,
            tx_hash: Some(tx_hash),
            created_at: Some(Utc::now().naive_utc()),
        }
    }

    pub fn pending(user_id: i64, token_type: TokenSymbol, amount: f64, post_id: i64) -> Self {
        NewTransaction {
            user_id,
            token_type,
            amount,
            post_id: Some(post_id),
            status: TransactionStatus::Pending,
            tx_hash: None,
            created_at: None,
        }
    }
}

/// Flat row used for CSV export.
#[derive(Debug, Serialize)]
struct TransactionRecord<'a> {
    id: i64,
    user_id: i64,
    token_type: &'static str,
    amount: f64,
    post_id: Option<i64>,
    status: &'static str,
    tx_hash: Option<&'a str>,
    refund_tx_hash: Option<&'a str>,
    created_at: String,
    updated_at: String,
}

impl Transaction {
    pub async fn export_to_csv(path: &str, transactions: &[Transaction]) -> anyhow::Result<()> {
        let file = tokio::fs::File::create(path).await?;
        let mut wtr = csv_async::AsyncSerializer::from_writer(file);

        for tx in transactions {
            wtr.serialize(TransactionRecord {
                id: tx.id,
                user_id: tx.user_id,
                token_type: tx.token_type.as_str(),
                amount: tx.amount,
                post_id: tx.post_id,
                status: tx.status.as_str(),
                tx_hash: tx.tx_hash.as_deref(),
                refund_tx_hash: tx.refund_tx_hash.as_deref(),
                created_at: tx.created_at.to_string(),
                updated_at: tx.updated_at.to_string(),
            })
            .await?;
        }
        wtr.flush().await?;
        log::info!("Exported {} transactions to {}", transactions.len(), path);
        Ok(())
    }
}

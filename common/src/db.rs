use std::str::FromStr;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};

use crate::schema::{NewPost, NewTransaction, Post, Transaction, TransactionStatus, User};

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Failed to create SQLite connect options")?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {}", database_url))?;
        Self::from_pool(pool).await
    }

    /// Private in-memory store on a single long-lived connection.
    pub async fn in_memory() -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Failed to create SQLite connect options")?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> anyhow::Result<Self> {
        sqlx::migrate!()
            .run(&pool)
            .await
            .context("Database migration error")?;
        Ok(Self { pool })
    }

    pub async fn upsert_user(&self, wallet_address: &str) -> anyhow::Result<User> {
        let mut conn = self.pool.acquire().await?;
        upsert_user(&mut conn, wallet_address).await
    }

    pub async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, wallet_address, created_at FROM users WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context(format!("Failed to get user with id {}", user_id))?;
        Ok(user)
    }

    pub async fn get_user_by_wallet(&self, wallet_address: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, wallet_address, created_at FROM users WHERE wallet_address = ?
            "#,
        )
        .bind(wallet_address)
        .fetch_optional(&self.pool)
        .await
        .context(format!("Failed to get user with wallet {}", wallet_address))?;
        Ok(user)
    }

    pub async fn get_all_users(&self) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, wallet_address, created_at FROM users ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to get all users")?;
        Ok(users)
    }

    pub async fn count_users(&self) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?;
        Ok(count)
    }

    pub async fn create_post(&self, post: &NewPost) -> anyhow::Result<Post> {
        let mut conn = self.pool.acquire().await?;
        insert_post(&mut conn, post).await
    }

    pub async fn get_posts(&self) -> anyhow::Result<Vec<Post>> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to get all posts")?;
        Ok(posts)
    }

    pub async fn get_post(&self, post_id: i64) -> anyhow::Result<Option<Post>> {
        let post = sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .context(format!("Failed to get post with id {}", post_id))?;
        Ok(post)
    }

    /// Upserts the buyer and records the post with its unpaid transaction in one unit.
    pub async fn record_purchase(
        &self,
        wallet_address: &str,
        post: NewPost,
    ) -> anyhow::Result<(User, Post, Transaction)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin purchase transaction")?;

        let user = upsert_user(&mut tx, wallet_address).await?;
        let post = insert_post(&mut tx, &NewPost { user_id: user.id, ..post }).await?;
        let transaction = insert_transaction(
            &mut tx,
            &NewTransaction::pending(user.id, post.price_token, post.price_amount, post.id),
        )
        .await?;

        tx.commit()
            .await
            .context("Failed to commit purchase transaction")?;
        Ok((user, post, transaction))
    }

    /// Records a transaction row.
    ///
    /// A payment whose hash is already stored returns the stored row, so a
    /// replayed write never creates a second row for one transfer. A completed
    /// payment for a post settles that post's pending purchase row if there is one.
    pub async fn save_transaction(&self, transaction: &NewTransaction) -> anyhow::Result<Transaction> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction write")?;

        if let Some(tx_hash) = &transaction.tx_hash {
            if let Some(existing) = find_by_tx_hash(&mut tx, tx_hash).await? {
                log::warn!(
                    "Transfer {} is already recorded as transaction {}",
                    tx_hash,
                    existing.id
                );
                return Ok(existing);
            }
        }

        let saved = match settle_pending_purchase(&mut tx, transaction).await? {
            Some(settled) => settled,
            None => insert_transaction(&mut tx, transaction).await?,
        };

        tx.commit()
            .await
            .context("Failed to commit transaction write")?;
        Ok(saved)
    }

    pub async fn get_transaction(&self, transaction_id: i64) -> anyhow::Result<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions WHERE id = ?
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await
        .context(format!("Failed to get transaction with id {}", transaction_id))?;
        Ok(transaction)
    }

    /// Newest first.
    pub async fn get_all_transactions(&self) -> anyhow::Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to get all transactions")?;
        Ok(transactions)
    }

    pub async fn get_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> anyhow::Result<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions WHERE status = ? ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .context(format!("Failed to get {} transactions", status))?;
        Ok(transactions)
    }

    pub async fn count_transactions_by_status(
        &self,
        status: TransactionStatus,
    ) -> anyhow::Result<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM transactions WHERE status = ?")
                .bind(status)
                .fetch_one(&self.pool)
                .await
                .context(format!("Failed to count {} transactions", status))?;
        Ok(count)
    }

    /// Atomically moves a transaction from `from` to `to`.
    ///
    /// Returns false when the row is missing or no longer in `from`, which is
    /// how concurrent refunds of the same transaction lose the race.
    pub async fn transition_status(
        &self,
        transaction_id: i64,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to)
        .bind(transaction_id)
        .bind(from)
        .execute(&self.pool)
        .await
        .context(format!(
            "Failed to move transaction {} from {} to {}",
            transaction_id, from, to
        ))?;
        Ok(result.rows_affected() == 1)
    }

    /// Finishes a claimed refund: `refunding` → `refunded` with the refund hash.
    pub async fn complete_refund(
        &self,
        transaction_id: i64,
        refund_tx_hash: &str,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = ?,
                refund_tx_hash = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(TransactionStatus::Refunded)
        .bind(refund_tx_hash)
        .bind(transaction_id)
        .bind(TransactionStatus::Refunding)
        .execute(&self.pool)
        .await
        .context(format!(
            "Failed to mark transaction {} as refunded",
            transaction_id
        ))?;
        Ok(result.rows_affected() == 1)
    }
}

async fn upsert_user(conn: &mut SqliteConnection, wallet_address: &str) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (wallet_address) VALUES (?)
        ON CONFLICT(wallet_address) DO UPDATE SET wallet_address = excluded.wallet_address
        RETURNING id, wallet_address, created_at
        "#,
    )
    .bind(wallet_address)
    .fetch_one(&mut *conn)
    .await
    .context(format!("Failed to upsert user with wallet {}", wallet_address))?;
    Ok(user)
}

async fn insert_post(conn: &mut SqliteConnection, post: &NewPost) -> anyhow::Result<Post> {
    let saved = sqlx::query_as::<_, Post>(
        r#"
        INSERT INTO posts (title, message, post_type, price_token, price_amount, user_id)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&post.title)
    .bind(&post.message)
    .bind(post.post_type)
    .bind(post.price_token)
    .bind(post.price_amount)
    .bind(post.user_id)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to save post to database")?;
    log::debug!("Saved post to database: {:?}", saved);
    Ok(saved)
}

async fn insert_transaction(
    conn: &mut SqliteConnection,
    transaction: &NewTransaction,
) -> anyhow::Result<Transaction> {
    let inserted = sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (user_id, token_type, amount, post_id, status, tx_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?, COALESCE(?, CURRENT_TIMESTAMP))
        ON CONFLICT(tx_hash) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(transaction.user_id)
    .bind(transaction.token_type)
    .bind(transaction.amount)
    .bind(transaction.post_id)
    .bind(transaction.status)
    .bind(&transaction.tx_hash)
    .bind(transaction.created_at)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to save transaction")?;

    let saved = match (inserted, &transaction.tx_hash) {
        (Some(saved), _) => saved,
        (None, Some(tx_hash)) => find_by_tx_hash(conn, tx_hash)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Transaction {} vanished after a conflict", tx_hash))?,
        (None, None) => anyhow::bail!("Transaction insert returned no row"),
    };
    log::debug!("Saved transaction to database: {:?}", saved);
    Ok(saved)
}

async fn find_by_tx_hash(
    conn: &mut SqliteConnection,
    tx_hash: &str,
) -> anyhow::Result<Option<Transaction>> {
    let transaction = sqlx::query_as::<_, Transaction>(
        r#"
        SELECT * FROM transactions WHERE tx_hash = ?
        "#,
    )
    .bind(tx_hash)
    .fetch_optional(&mut *conn)
    .await
    .context(format!("Failed to look up transaction {}", tx_hash))?;
    Ok(transaction)
}

/// Turns the oldest pending purchase row of the paid post into the completed payment.
async fn settle_pending_purchase(
    conn: &mut SqliteConnection,
    transaction: &NewTransaction,
) -> anyhow::Result<Option<Transaction>> {
    let (TransactionStatus::Completed, Some(post_id)) = (transaction.status, transaction.post_id)
    else {
        return Ok(None);
    };

    let settled = sqlx::query_as::<_, Transaction>(
        r#"
        UPDATE transactions
        SET status = ?,
            amount = ?,
            tx_hash = ?,
            created_at = COALESCE(?, created_at),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = (
            SELECT id FROM transactions
            WHERE post_id = ? AND user_id = ? AND token_type = ? AND status = ?
            ORDER BY id
            LIMIT 1
        )
        RETURNING *
        "#,
    )
    .bind(TransactionStatus::Completed)
    .bind(transaction.amount)
    .bind(&transaction.tx_hash)
    .bind(transaction.created_at)
    .bind(post_id)
    .bind(transaction.user_id)
    .bind(transaction.token_type)
    .bind(TransactionStatus::Pending)
    .fetch_optional(&mut *conn)
    .await
    .context(format!("Failed to settle pending purchase for post {}", post_id))?;

    if let Some(settled) = &settled {
        log::info!(
            "Settled pending transaction {} for post {}",
            settled.id,
            post_id
        );
    }
    Ok(settled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PostType, TokenSymbol};

    const WALLET: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const OTHER_WALLET: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

    fn blog_post(user_id: i64) -> NewPost {
        NewPost {
            title: "Premiere night".to_string(),
            message: "Come watch".to_string(),
            post_type: PostType::BlogPost,
            price_token: TokenSymbol::NollywoodSpotlight,
            price_amount: 100_000.0,
            user_id,
        }
    }

    #[tokio::test]
    async fn upsert_user_is_idempotent() {
        let db = Database::in_memory().await.unwrap();

        let first = db.upsert_user(WALLET).await.unwrap();
        let second = db.upsert_user(WALLET).await.unwrap();
        let other = db.upsert_user(OTHER_WALLET).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other.id);
        assert_eq!(db.count_users().await.unwrap(), 2);
        assert_eq!(
            db.get_user_by_wallet(WALLET).await.unwrap().map(|u| u.id),
            Some(first.id)
        );
    }

    #[tokio::test]
    async fn record_purchase_links_post_and_pending_transaction() {
        let db = Database::in_memory().await.unwrap();

        let (user, post, tx) = db.record_purchase(WALLET, blog_post(0)).await.unwrap();

        assert_eq!(post.user_id, user.id);
        assert_eq!(post.post_type, PostType::BlogPost);
        assert_eq!(tx.post_id, Some(post.id));
        assert_eq!(tx.user_id, user.id);
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.amount, 100_000.0);
        assert_eq!(tx.token_type, TokenSymbol::NollywoodSpotlight);
        assert!(tx.tx_hash.is_none());
        assert_eq!(db.get_posts().await.unwrap(), vec![post]);
    }

    #[tokio::test]
    async fn post_for_unknown_user_violates_foreign_key() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.create_post(&blog_post(42)).await.is_err());
    }

    fn at(timestamp: &str) -> Option<chrono::NaiveDateTime> {
        chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S").ok()
    }

    #[tokio::test]
    async fn transactions_are_listed_by_confirmation_time() {
        let db = Database::in_memory().await.unwrap();
        let user = db.upsert_user(WALLET).await.unwrap();

        // Insertion order disagrees with confirmation order.
        let confirmed = ["2025-06-02 09:00:00", "2025-06-03 09:00:00", "2025-06-01 09:00:00"];
        let mut ids = Vec::new();
        for (i, timestamp) in confirmed.into_iter().enumerate() {
            let mut new_tx = NewTransaction::completed(
                user.id,
                TokenSymbol::NollySpot,
                10.0,
                None,
                format!("0x{i}"),
            );
            new_tx.created_at = at(timestamp);
            ids.push(db.save_transaction(&new_tx).await.unwrap().id);
        }

        let listed: Vec<i64> = db
            .get_all_transactions()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(listed, vec![ids[1], ids[0], ids[2]]);

        let stored = db.get_transaction(ids[2]).await.unwrap().unwrap();
        assert_eq!(Some(stored.created_at), at("2025-06-01 09:00:00"));
    }

    #[tokio::test]
    async fn saving_a_known_hash_returns_the_existing_row() {
        let db = Database::in_memory().await.unwrap();
        let user = db.upsert_user(WALLET).await.unwrap();
        let payment = NewTransaction::completed(
            user.id,
            TokenSymbol::NollySpot,
            25_000.0,
            None,
            "0xsame".to_string(),
        );

        let first = db.save_transaction(&payment).await.unwrap();
        let second = db.save_transaction(&payment).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(db.get_all_transactions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn payment_for_purchased_post_settles_pending_row() {
        let db = Database::in_memory().await.unwrap();
        let (user, post, pending) = db.record_purchase(WALLET, blog_post(0)).await.unwrap();

        let paid = db
            .save_transaction(&NewTransaction::completed(
                user.id,
                TokenSymbol::NollywoodSpotlight,
                100_000.0,
                Some(post.id),
                "0xpaid".to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(paid.id, pending.id);
        assert_eq!(paid.status, TransactionStatus::Completed);
        assert_eq!(paid.tx_hash.as_deref(), Some("0xpaid"));
        assert_eq!(db.get_all_transactions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_transition_only_applies_from_expected_state() {
        let db = Database::in_memory().await.unwrap();
        let user = db.upsert_user(WALLET).await.unwrap();
        let tx = db
            .save_transaction(&NewTransaction::completed(
                user.id,
                TokenSymbol::NollySpot,
                25_000.0,
                None,
                "0xpay".to_string(),
            ))
            .await
            .unwrap();

        assert!(
            db.transition_status(tx.id, TransactionStatus::Completed, TransactionStatus::Refunding)
                .await
                .unwrap()
        );
        assert!(
            !db.transition_status(tx.id, TransactionStatus::Completed, TransactionStatus::Refunding)
                .await
                .unwrap()
        );
        assert!(db.complete_refund(tx.id, "0xrefund").await.unwrap());
        assert!(!db.complete_refund(tx.id, "0xrefund-again").await.unwrap());

        let stored = db.get_transaction(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Refunded);
        assert_eq!(stored.refund_tx_hash.as_deref(), Some("0xrefund"));
        assert_eq!(
            db.count_transactions_by_status(TransactionStatus::Refunded)
                .await
                .unwrap(),
            1
        );
        assert!(
            db.get_transactions_by_status(TransactionStatus::Completed)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn missing_transaction_is_none() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.get_transaction(99).await.unwrap().is_none());
        assert!(
            !db.transition_status(99, TransactionStatus::Completed, TransactionStatus::Refunding)
                .await
                .unwrap()
        );
    }
}

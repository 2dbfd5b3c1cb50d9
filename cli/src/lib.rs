mod args;

use std::str::FromStr;

pub use args::{Args, Commands};
use clap::Parser;
use common::{
    Database, PriceTable, RetryQueue, Transaction, TransactionStatus, normalize_wallet_address,
};

const DEFAULT_DATABASE_URL: &str = "sqlite://nollyspot.sqlite";
const DEFAULT_PENDING_JSON: &str = "pending_ops.json";

/// Runs the CLI command parser and executes the selected command.
/// Returns true if a CLI command was handled, false otherwise.
pub async fn run_cli() -> bool {
    let args = Args::parse();
    let Some(command) = &args.command else {
        return false;
    };

    if let Err(e) = run_command(command).await {
        eprintln!("Error: {e:#}");
    }
    true
}

async fn run_command(command: &Commands) -> anyhow::Result<()> {
    match command {
        Commands::Prices(prices_args) => {
            let path = prices_args
                .prices_yaml
                .clone()
                .or_else(|| std::env::var("PRICES_YAML").ok());
            let table = match path {
                Some(path) => PriceTable::from_yaml_file(&path).await?,
                None => PriceTable::default(),
            };
            println!("{}", serde_json::to_string_pretty(&table)?);
        }
        Commands::RegisterUser(user_args) => {
            let db = connect().await?;
            let wallet = normalize_wallet_address(&user_args.wallet)?;
            let user = db.upsert_user(&wallet).await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Commands::ListTransactions(list_args) => {
            let db = connect().await?;
            let transactions = list_transactions(&db, list_args.status.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&transactions)?);
        }
        Commands::ExportTransactions(export_args) => {
            let db = connect().await?;
            let transactions = db.get_all_transactions().await?;
            Transaction::export_to_csv(&export_args.out, &transactions).await?;
            println!(
                "Exported {} transactions to {}",
                transactions.len(),
                export_args.out
            );
        }
        Commands::ReleaseRefund(release_args) => {
            let db = connect().await?;
            release_refund(&db, release_args.id).await?;
            println!("Transaction {} is completed again", release_args.id);
        }
        Commands::FlushPending(flush_args) => {
            let db = connect().await?;
            let path = flush_args
                .path
                .clone()
                .or_else(|| std::env::var("PENDING_JSON").ok())
                .unwrap_or_else(|| DEFAULT_PENDING_JSON.to_string());
            let queue = RetryQueue::load(&path).await?;
            let applied = queue.flush(&db).await?;
            println!(
                "Applied {} operations, {} left in {}",
                applied,
                queue.len().await,
                queue.path().display()
            );
        }
    }
    Ok(())
}

/// Opens the database named by DATABASE_URL.
async fn connect() -> anyhow::Result<Database> {
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    Database::new(&database_url, 1).await
}

async fn list_transactions(
    db: &Database,
    status: Option<&str>,
) -> anyhow::Result<Vec<Transaction>> {
    match status {
        Some(status) => {
            db.get_transactions_by_status(TransactionStatus::from_str(status)?)
                .await
        }
        None => db.get_all_transactions().await,
    }
}

async fn release_refund(db: &Database, transaction_id: i64) -> anyhow::Result<()> {
    let released = db
        .transition_status(
            transaction_id,
            TransactionStatus::Refunding,
            TransactionStatus::Completed,
        )
        .await?;
    if !released {
        anyhow::bail!("Transaction {} is not in refunding", transaction_id);
    }
    Ok(())
}

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "NollySpot CLI - inspect and repair the payments database")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register a wallet as a user, or show the existing one
    RegisterUser(RegisterUserArgs),

    /// Print transactions as JSON, newest first
    ListTransactions(ListTransactionsArgs),

    /// Export every transaction to a CSV file
    ExportTransactions(ExportTransactionsArgs),

    /// Print the active price table
    Prices(PricesArgs),

    /// Move a transaction stuck in `refunding` back to `completed`
    ///
    /// Only run this after checking on chain that no refund was sent.
    ReleaseRefund(ReleaseRefundArgs),

    /// Replay the queued database operations once
    FlushPending(FlushPendingArgs),
}

#[derive(ClapArgs, Debug)]
pub struct RegisterUserArgs {
    #[arg(short, long, help = "0x-prefixed wallet address")]
    pub wallet: String,
}

#[derive(ClapArgs, Debug)]
pub struct ListTransactionsArgs {
    #[arg(
        short,
        long,
        help = "Only show transactions in this status (pending, completed, refunding, refunded)"
    )]
    pub status: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct ExportTransactionsArgs {
    #[arg(short, long, help = "Output CSV file path")]
    pub out: String,
}

#[derive(ClapArgs, Debug)]
pub struct PricesArgs {
    /// Falls back to PRICES_YAML, then to the built-in table
    #[arg(short, long, help = "YAML file with price overrides")]
    pub prices_yaml: Option<String>,
}

#[derive(ClapArgs, Debug)]
pub struct ReleaseRefundArgs {
    #[arg(short, long, help = "Transaction id")]
    pub id: i64,
}

#[derive(ClapArgs, Debug)]
pub struct FlushPendingArgs {
    /// Falls back to PENDING_JSON, then to pending_ops.json
    #[arg(short, long, help = "Retry queue file")]
    pub path: Option<String>,
}

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, anyhow};
use common::{
    DEFAULT_TOKEN_DECIMALS, Database, Erc20Client, PriceTable, RetryQueue, TokenConfig,
    TokenRegistry, TokenSymbol,
};

use crate::state::{AppState, Settlement};

pub const DEFAULT_FEE_PERCENT: f64 = 2.5;

pub struct AppConfig {
    pub provider_url: String,
    pub merchant_private_key: String,
    pub merchant_address: Address,
    pub refund_address: Address,
    pub tokens: TokenRegistry,
    pub fee_percent: f64,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub prices_yaml: Option<String>,
    pub pending_json: String,
    pub retry_interval: Duration,
    pub chain_confirmations: u64,
    pub chain_timeout: Option<Duration>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> anyhow::Result<String> {
            var(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{} must be set", key))
        };

        let provider_url = required("PROVIDER_URL")?;
        let merchant_private_key = required("MERCHANT_PRIVATE_KEY")?;
        let merchant_address = parse_address("MERCHANT_ADDRESS", &required("MERCHANT_ADDRESS")?)?;
        let refund_address = parse_address("REFUND_ADDRESS", &required("REFUND_ADDRESS")?)?;

        let default_decimals: u8 = parse_or(&var, "TOKEN_DECIMALS", DEFAULT_TOKEN_DECIMALS)?;
        let tokens = TokenRegistry::new(
            TokenConfig {
                address: parse_address(
                    "NOLLYSPOT_TOKEN_ADDRESS",
                    &required("NOLLYSPOT_TOKEN_ADDRESS")?,
                )?,
                decimals: parse_or(&var, "NOLLYSPOT_TOKEN_DECIMALS", default_decimals)?,
            },
            TokenConfig {
                address: parse_address(
                    "NOLLYWOODSPOT_TOKEN_ADDRESS",
                    &required("NOLLYWOODSPOT_TOKEN_ADDRESS")?,
                )?,
                decimals: parse_or(&var, "NOLLYWOODSPOT_TOKEN_DECIMALS", default_decimals)?,
            },
        );

        let fee_percent: f64 = parse_or(&var, "PLATFORM_FEE_PERCENT", DEFAULT_FEE_PERCENT)?;
        if !(0.0..=100.0).contains(&fee_percent) {
            return Err(anyhow!(
                "PLATFORM_FEE_PERCENT must be between 0 and 100, got {}",
                fee_percent
            ));
        }

        let chain_timeout = match var("CHAIN_TIMEOUT_SECS") {
            Some(secs) => Some(Duration::from_secs(
                secs.trim()
                    .parse()
                    .context("CHAIN_TIMEOUT_SECS must be a whole number of seconds")?,
            )),
            None => None,
        };

        Ok(Self {
            provider_url,
            merchant_private_key,
            merchant_address,
            refund_address,
            tokens,
            fee_percent,
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&var, "PORT", 4000)?,
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://nollyspot.sqlite".to_string()),
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 5)?,
            prices_yaml: var("PRICES_YAML"),
            pending_json: var("PENDING_JSON").unwrap_or_else(|| "pending_ops.json".to_string()),
            retry_interval: Duration::from_secs(parse_or(&var, "RETRY_INTERVAL_SECS", 10)?),
            chain_confirmations: parse_or(&var, "CHAIN_CONFIRMATIONS", 1)?,
            chain_timeout,
        })
    }

    pub async fn create_app_state(&self) -> anyhow::Result<AppState> {
        let chain = Erc20Client::new(
            &self.provider_url,
            &self.merchant_private_key,
            self.chain_confirmations,
            self.chain_timeout,
        )
        .context("Failed to initialize chain client")?;
        check_merchant_funding(&chain, &self.tokens).await;

        let db = Database::new(&self.database_url, self.database_max_connections)
            .await
            .context("Failed to initialize database")?;
        log::info!("Database initialized successfully!");

        let prices = match &self.prices_yaml {
            Some(path) => PriceTable::from_yaml_file(path)
                .await
                .with_context(|| format!("Failed to load prices from `{}`", path))?,
            None => PriceTable::default(),
        };

        let retry_queue = RetryQueue::load(&self.pending_json)
            .await
            .context("Failed to load retry queue")?;

        Ok(AppState::new(
            db,
            Arc::new(chain),
            self.tokens.clone(),
            prices,
            Settlement {
                merchant_address: self.merchant_address,
                refund_address: self.refund_address,
                fee_percent: self.fee_percent,
            },
            retry_queue,
        ))
    }
}

fn parse_address(key: &str, value: &str) -> anyhow::Result<Address> {
    Address::from_str(value.trim()).with_context(|| format!("{} is not a valid address", key))
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has an invalid value `{}`: {}", key, raw, e)),
        _ => Ok(default),
    }
}

/// Logs the merchant's balance and on-chain decimals for every token.
///
/// Startup continues when the node is unreachable; transfers will report the error.
async fn check_merchant_funding(chain: &Erc20Client, tokens: &TokenRegistry) {
    for symbol in TokenSymbol::ALL {
        let token = tokens.get(symbol);
        match chain.decimals(token.address).await {
            Ok(decimals) if decimals != token.decimals => log::warn!(
                "{} reports {} decimals on chain but {} are configured",
                symbol,
                decimals,
                token.decimals
            ),
            Ok(_) => {}
            Err(e) => log::warn!("Could not read decimals of {}: {}", symbol, e),
        }
        match chain.balance_of(token.address, chain.merchant()).await {
            Ok(balance) if balance.is_zero() => {
                log::warn!("Merchant wallet holds no {}", symbol)
            }
            Ok(balance) => log::info!("Merchant wallet holds {} units of {}", balance, symbol),
            Err(e) => log::warn!("Could not read {} balance: {}", symbol, e),
        }
    }
}

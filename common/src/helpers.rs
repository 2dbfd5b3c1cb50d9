use anyhow::anyhow;
use fancy_regex::Regex;
use once_cell::sync::Lazy;

/// Checks that `wallet` is a 0x-prefixed 20-byte hex address and returns it lowercased.
pub fn normalize_wallet_address(wallet: &str) -> anyhow::Result<String> {
    static RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").ok());
    let is_valid = match &*RE {
        Some(re) => re
            .is_match(wallet.trim())
            .map_err(|e| anyhow!("Regex error for wallet address: {e}"))?,
        None => {
            return Err(anyhow!(
                "Wallet address regex failed to compile. Rejecting all addresses."
            ));
        }
    };
    if !is_valid {
        return Err(anyhow!(
            "walletAddress must be a 0x-prefixed 40 character hex address"
        ));
    }
    Ok(wallet.trim().to_lowercase())
}

//! Conversions between human token amounts and fixed-point units.

use alloy::primitives::U256;
use alloy::primitives::utils::parse_units;
use anyhow::{Context, anyhow};

/// Scales `amount` by `10^decimals`.
///
/// Digits beyond the token's precision are truncated, never rounded up.
pub fn to_token_units(amount: f64, decimals: u8) -> anyhow::Result<U256> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(anyhow!("amount must be a positive number, got {}", amount));
    }

    // f64 Display never uses exponent notation.
    let repr = amount.to_string();
    let repr = match repr.split_once('.') {
        Some((whole, fraction)) if fraction.len() > decimals as usize => {
            if decimals == 0 {
                whole.to_string()
            } else {
                format!("{}.{}", whole, &fraction[..decimals as usize])
            }
        }
        _ => repr,
    };

    let units = parse_units(&repr, decimals)
        .with_context(|| format!("Failed to convert {} to {} decimal units", repr, decimals))?
        .get_absolute();
    if units.is_zero() {
        return Err(anyhow!(
            "amount {} is below the smallest unit of a {} decimal token",
            amount,
            decimals
        ));
    }
    Ok(units)
}

/// Amount returned to the payer once the platform fee is withheld.
pub fn refund_amount(amount: f64, fee_percent: f64) -> f64 {
    amount * (100.0 - fee_percent) / 100.0
}

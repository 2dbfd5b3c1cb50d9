use std::fmt;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
pub enum TokenSymbol {
    #[serde(rename = "$NOLLYSPOT")]
    #[sqlx(rename = "$NOLLYSPOT")]
    NollySpot,
    #[serde(rename = "$NOLLYWOODSPOTLIGHT")]
    #[sqlx(rename = "$NOLLYWOODSPOTLIGHT")]
    NollywoodSpotlight,
}

impl TokenSymbol {
    pub const ALL: [TokenSymbol; 2] = [TokenSymbol::NollySpot, TokenSymbol::NollywoodSpotlight];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSymbol::NollySpot => "$NOLLYSPOT",
            TokenSymbol::NollywoodSpotlight => "$NOLLYWOODSPOTLIGHT",
        }
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenSymbol {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenSymbol::ALL
            .into_iter()
            .find(|symbol| symbol.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown token symbol: {}", s))
    }
}

/// On-chain location and precision of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenConfig {
    pub address: Address,
    pub decimals: u8,
}

/// Every symbol the platform accepts, resolved to its contract.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRegistry {
    nollyspot: TokenConfig,
    nollywood_spotlight: TokenConfig,
}

impl TokenRegistry {
    pub fn new(nollyspot: TokenConfig, nollywood_spotlight: TokenConfig) -> Self {
        Self {
            nollyspot,
            nollywood_spotlight,
        }
    }

    pub fn get(&self, symbol: TokenSymbol) -> &TokenConfig {
        match symbol {
            TokenSymbol::NollySpot => &self.nollyspot,
            TokenSymbol::NollywoodSpotlight => &self.nollywood_spotlight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_exact_symbols() {
        assert_eq!(
            "$NOLLYSPOT".parse::<TokenSymbol>().unwrap(),
            TokenSymbol::NollySpot
        );
        assert_eq!(
            "$NOLLYWOODSPOTLIGHT".parse::<TokenSymbol>().unwrap(),
            TokenSymbol::NollywoodSpotlight
        );
        assert!("NOLLYSPOT".parse::<TokenSymbol>().is_err());
        assert!("$nollyspot".parse::<TokenSymbol>().is_err());
        assert!("".parse::<TokenSymbol>().is_err());
    }

    #[test]
    fn registry_resolves_each_symbol_to_its_own_contract() {
        let spot = TokenConfig {
            address: Address::repeat_byte(0x11),
            decimals: 18,
        };
        let spotlight = TokenConfig {
            address: Address::repeat_byte(0x22),
            decimals: 6,
        };
        let registry = TokenRegistry::new(spot, spotlight);

        assert_eq!(registry.get(TokenSymbol::NollySpot), &spot);
        assert_eq!(registry.get(TokenSymbol::NollywoodSpotlight), &spotlight);
    }

    #[test]
    fn symbol_serializes_with_dollar_prefix() {
        let json = serde_json::to_string(&TokenSymbol::NollySpot).unwrap();
        assert_eq!(json, "\"$NOLLYSPOT\"");
    }
}

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::schema::TokenSymbol;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostType {
    ProfilePost,
    BlogPost,
    WebsitePost,
}

impl PostType {
    pub const ALL: [PostType; 3] = [PostType::ProfilePost, PostType::BlogPost, PostType::WebsitePost];

    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::ProfilePost => "PROFILE_POST",
            PostType::BlogPost => "BLOG_POST",
            PostType::WebsitePost => "WEBSITE_POST",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PostType::ALL
            .into_iter()
            .find(|post_type| post_type.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown post type: {}", s))
    }
}

/// What a listing of a given type costs, in token human units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    pub token: TokenSymbol,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PriceTable {
    prices: BTreeMap<PostType, Price>,
}

impl Default for PriceTable {
    fn default() -> Self {
        let prices = BTreeMap::from([
            (
                PostType::ProfilePost,
                Price {
                    amount: 25_000.0,
                    token: TokenSymbol::NollySpot,
                },
            ),
            (
                PostType::BlogPost,
                Price {
                    amount: 100_000.0,
                    token: TokenSymbol::NollywoodSpotlight,
                },
            ),
            (
                PostType::WebsitePost,
                Price {
                    amount: 50_000.0,
                    token: TokenSymbol::NollywoodSpotlight,
                },
            ),
        ]);
        Self { prices }
    }
}

impl PriceTable {
    pub fn price(&self, post_type: PostType) -> Price {
        // Every PostType is seeded by Default and overrides only replace entries.
        self.prices[&post_type]
    }

    /// Built-in prices with the entries listed in `yaml` replacing their defaults.
    pub fn with_overrides(yaml: &str) -> anyhow::Result<Self> {
        let overrides: HashMap<PostType, Price> =
            serde_yaml::from_str(yaml).context("Invalid price table YAML")?;
        let mut table = Self::default();
        for (post_type, price) in overrides {
            if !price.amount.is_finite() || price.amount <= 0.0 {
                anyhow::bail!(
                    "Price for {} must be a positive number, got {}",
                    post_type,
                    price.amount
                );
            }
            table.prices.insert(post_type, price);
        }
        Ok(table)
    }

    pub async fn from_yaml_file(path: &str) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read price table `{}`", path))?;
        let table = Self::with_overrides(&content)?;
        log::debug!("Loaded price table from {}: {:?}", path, table);
        Ok(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PostType, &Price)> {
        self.prices.iter()
    }
}

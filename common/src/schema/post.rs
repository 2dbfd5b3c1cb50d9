use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::schema::{PostType, TokenSymbol, User};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub post_type: PostType,
    pub price_token: TokenSymbol,
    pub price_amount: f64,
    pub user_id: i64,
    pub created_at: NaiveDateTime,
}

/// A post as it is about to be inserted.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub message: String,
    pub post_type: PostType,
    pub price_token: TokenSymbol,
    pub price_amount: f64,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostWithUser {
    #[serde(flatten)]
    pub post: Post,
    pub user: User,
}

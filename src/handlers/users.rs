use actix_web::{HttpResponse, get, post, web};
use common::normalize_wallet_address;
use serde::Deserialize;

use super::non_blank;
use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserRequest {
    wallet_address: Option<String>,
}

/// Creates the user for a wallet, or returns the one that already exists.
#[post("/user")]
pub async fn register_user(
    body: web::Json<RegisterUserRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let wallet = non_blank(&body.wallet_address)
        .ok_or_else(|| ApiError::bad_request("walletAddress is required"))?;
    let wallet =
        normalize_wallet_address(wallet).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let user = app_state.db.upsert_user(&wallet).await.map_err(|e| {
        log::error!("Failed to upsert user {}: {:#}", wallet, e);
        ApiError::upstream("Failed to create or find user", format!("{:#}", e))
    })?;

    Ok(HttpResponse::Ok().json(user))
}

#[get("/users/{wallet}")]
pub async fn get_user_by_wallet(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let wallet =
        normalize_wallet_address(&path.into_inner()).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let user = app_state
        .db
        .get_user_by_wallet(&wallet)
        .await
        .map_err(|e| {
            log::error!("Failed to get user by wallet {}: {:#}", wallet, e);
            ApiError::upstream("Failed to get user", format!("{:#}", e))
        })?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(HttpResponse::Ok().json(user))
}

use std::str::FromStr;

use actix_web::{HttpResponse, post, web};
use common::TokenSymbol;
use serde::Deserialize;
use serde_json::json;

use super::{non_blank, number_or_string_f64, number_or_string_i64};
use crate::errors::ApiError;
use crate::payments::{PaymentRequest, process_payment, process_refund};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayRequest {
    token_type: Option<String>,
    #[serde(default, deserialize_with = "number_or_string_f64")]
    amount: Option<f64>,
    #[serde(default, deserialize_with = "number_or_string_i64")]
    user_id: Option<i64>,
    #[serde(default, deserialize_with = "number_or_string_i64")]
    post_id: Option<i64>,
}

#[post("/pay")]
pub async fn pay(
    body: web::Json<PayRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let (Some(token_type), Some(amount), Some(user_id)) =
        (non_blank(&body.token_type), body.amount, body.user_id)
    else {
        return Err(ApiError::bad_request("Missing tokenType, amount or userId"));
    };
    let token =
        TokenSymbol::from_str(token_type).map_err(|_| ApiError::bad_request("Invalid tokenType"))?;

    let request = PaymentRequest {
        token,
        amount,
        user_id,
        post_id: body.post_id,
    };
    let receipt = process_payment(&app_state, &request)
        .await
        .map_err(|e| ApiError::from_payment(e, "Payment failed"))?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "txHash": receipt.tx_hash,
        "transactionId": receipt.transaction.as_ref().map(|tx| tx.id),
        "queued": receipt.queued,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default, deserialize_with = "number_or_string_i64")]
    transaction_id: Option<i64>,
}

/// Refunds a completed transaction minus the platform fee.
#[post("/cancel")]
pub async fn cancel(
    body: web::Json<CancelRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let transaction_id = body
        .transaction_id
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("transactionId must be a positive integer"))?;

    let receipt = process_refund(&app_state, transaction_id)
        .await
        .map_err(|e| ApiError::from_payment(e, "Refund failed"))?;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "refundAmount": receipt.refund_amount,
        "refundTxHash": receipt.refund_tx_hash,
        "transactionId": receipt.transaction_id,
        "queued": receipt.queued,
    })))
}

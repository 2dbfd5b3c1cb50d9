use std::str::FromStr;

use actix_web::{HttpResponse, get, web};
use common::TransactionStatus;
use serde::Deserialize;

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    status: Option<String>,
}

#[get("/transactions")]
pub async fn get_transactions(
    query: web::Query<TransactionQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(TransactionStatus::from_str)
        .transpose()
        .map_err(|_| {
            ApiError::bad_request(
                "Transaction status must be one of 'pending', 'completed', 'refunding' or 'refunded'.",
            )
        })?;

    let transactions = match status {
        Some(status) => app_state.db.get_transactions_by_status(status).await,
        None => app_state.db.get_all_transactions().await,
    }
    .map_err(|e| {
        log::error!("Failed to get transactions: {:#}", e);
        ApiError::upstream("Failed to get transactions", format!("{:#}", e))
    })?;

    Ok(HttpResponse::Ok().json(transactions))
}

#[get("/transactions/{id}")]
pub async fn get_transaction_by_id(
    path: web::Path<i64>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let transaction_id = path.into_inner();

    let transaction = app_state
        .db
        .get_transaction(transaction_id)
        .await
        .map_err(|e| {
            log::error!("Failed to get transaction {}: {:#}", transaction_id, e);
            ApiError::upstream("Failed to get transaction", format!("{:#}", e))
        })?
        .ok_or_else(|| ApiError::not_found("Transaction not found"))?;

    Ok(HttpResponse::Ok().json(transaction))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, http::StatusCode, test};
    use common::{NewTransaction, TokenSymbol};
    use serde_json::Value;

    use crate::handlers::routes;
    use crate::test_support::{RecordingChain, test_state};

    use super::*;

    #[actix_web::test]
    async fn transactions_list_newest_first_and_filter_by_status() {
        let data = web::Data::new(test_state(Arc::new(RecordingChain::default())).await);
        let user = data
            .db
            .upsert_user("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266")
            .await
            .unwrap();
        let mut ids = Vec::new();
        for (i, amount) in [10.0, 20.0, 30.0].into_iter().enumerate() {
            let tx = data
                .db
                .save_transaction(&NewTransaction::completed(
                    user.id,
                    TokenSymbol::NollySpot,
                    amount,
                    None,
                    format!("0x{:064x}", i + 1),
                ))
                .await
                .unwrap();
            ids.push(tx.id);
        }
        data.db
            .transition_status(ids[0], TransactionStatus::Completed, TransactionStatus::Refunding)
            .await
            .unwrap();

        let app = test::init_service(App::new().app_data(data.clone()).configure(routes)).await;

        let req = test::TestRequest::get().uri("/transactions").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        let listed: Vec<i64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|tx| tx["id"].as_i64().unwrap())
            .collect();
        assert_eq!(listed, vec![ids[2], ids[1], ids[0]]);

        let req = test::TestRequest::get()
            .uri("/transactions?status=refunding")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["id"].as_i64(), Some(ids[0]));

        let req = test::TestRequest::get()
            .uri("/transactions?status=success")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn single_transaction_lookup() {
        let data = web::Data::new(test_state(Arc::new(RecordingChain::default())).await);
        let app = test::init_service(App::new().app_data(data.clone()).configure(routes)).await;

        let req = test::TestRequest::get().uri("/transactions/5").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Transaction not found");
    }
}

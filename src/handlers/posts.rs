use std::collections::HashMap;
use std::str::FromStr;

use actix_web::{HttpResponse, get, post, web};
use common::{NewPost, PostType, PostWithUser, TokenSymbol, normalize_wallet_address};
use serde::Deserialize;
use serde_json::json;

use super::{non_blank, number_or_string_f64, number_or_string_i64};
use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    wallet_address: Option<String>,
    post_type: Option<String>,
    message: Option<String>,
    title: Option<String>,
}

/// Records a listing and its unpaid transaction at the table price.
#[post("/purchase")]
pub async fn purchase(
    body: web::Json<PurchaseRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let (Some(wallet), Some(post_type), Some(message), Some(title)) = (
        non_blank(&body.wallet_address),
        non_blank(&body.post_type),
        non_blank(&body.message),
        non_blank(&body.title),
    ) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };
    let wallet =
        normalize_wallet_address(wallet).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let post_type =
        PostType::from_str(post_type).map_err(|_| ApiError::bad_request("Invalid post type"))?;
    let price = app_state.prices.price(post_type);

    let new_post = NewPost {
        title: title.to_string(),
        message: message.to_string(),
        post_type,
        price_token: price.token,
        price_amount: price.amount,
        user_id: 0,
    };
    let (_, post, tx) = app_state
        .db
        .record_purchase(&wallet, new_post)
        .await
        .map_err(|e| {
            log::error!("Failed to record purchase for {}: {:#}", wallet, e);
            ApiError::upstream("Transaction failed", format!("{:#}", e))
        })?;

    log::info!(
        "Recorded {} purchase by {} for {} {}",
        post_type,
        wallet,
        price.amount,
        price.token
    );
    Ok(HttpResponse::Ok().json(json!({
        "message": "Post and transaction recorded!",
        "post": post,
        "tx": tx,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostsQuery {
    #[serde(default)]
    include_user: bool,
}

#[get("/posts")]
pub async fn get_posts(
    query: web::Query<PostsQuery>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let posts = app_state.db.get_posts().await.map_err(|e| {
        log::error!("Failed to fetch posts: {:#}", e);
        ApiError::upstream("Server error fetching posts", format!("{:#}", e))
    })?;

    if !query.include_user {
        return Ok(HttpResponse::Ok().json(posts));
    }

    let users: HashMap<i64, _> = app_state
        .db
        .get_all_users()
        .await
        .map_err(|e| {
            log::error!("Failed to fetch post owners: {:#}", e);
            ApiError::upstream("Server error fetching posts", format!("{:#}", e))
        })?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    let mut with_users = Vec::with_capacity(posts.len());
    for post in posts {
        let Some(user) = users.get(&post.user_id).cloned() else {
            log::warn!("Post {} has no owner {}", post.id, post.user_id);
            continue;
        };
        with_users.push(PostWithUser { post, user });
    }

    Ok(HttpResponse::Ok().json(with_users))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    title: Option<String>,
    message: Option<String>,
    #[serde(rename = "type")]
    post_type: Option<String>,
    price_token: Option<String>,
    #[serde(default, deserialize_with = "number_or_string_f64")]
    price_amount: Option<f64>,
    #[serde(default, deserialize_with = "number_or_string_i64")]
    user_id: Option<i64>,
}

#[post("/posts")]
pub async fn create_post(
    body: web::Json<CreatePostRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let (Some(title), Some(message), Some(post_type), Some(price_token), Some(price_amount), Some(user_id)) = (
        non_blank(&body.title),
        non_blank(&body.message),
        non_blank(&body.post_type),
        non_blank(&body.price_token),
        body.price_amount,
        body.user_id,
    ) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };

    let post_type =
        PostType::from_str(post_type).map_err(|_| ApiError::bad_request("Invalid post type"))?;
    let price_token = TokenSymbol::from_str(price_token)
        .map_err(|_| ApiError::bad_request("Invalid priceToken"))?;
    if !price_amount.is_finite() || price_amount <= 0.0 {
        return Err(ApiError::bad_request("priceAmount must be a positive number"));
    }

    let owner = app_state.db.get_user(user_id).await.map_err(|e| {
        log::error!("Failed to get user {}: {:#}", user_id, e);
        ApiError::upstream("Server error creating post", format!("{:#}", e))
    })?;
    if owner.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let post = app_state
        .db
        .create_post(&NewPost {
            title: title.to_string(),
            message: message.to_string(),
            post_type,
            price_token,
            price_amount,
            user_id,
        })
        .await
        .map_err(|e| {
            log::error!("Failed to create post for user {}: {:#}", user_id, e);
            ApiError::upstream("Server error creating post", format!("{:#}", e))
        })?;

    Ok(HttpResponse::Ok().json(post))
}

#[get("/prices")]
pub async fn get_prices(app_state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(&app_state.prices)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use actix_web::{App, http::StatusCode, test};
    use serde_json::Value;

    use crate::handlers::{json_config, routes};
    use crate::test_support::{RecordingChain, test_state};

    use super::*;

    const WALLET: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[actix_web::test]
    async fn purchase_uses_table_price_not_caller_values() {
        let data = web::Data::new(test_state(Arc::new(RecordingChain::default())).await);
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .app_data(json_config())
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/purchase")
            .set_json(json!({
                "walletAddress": WALLET,
                "postType": "BLOG_POST",
                "message": "Premiere night",
                "title": "Lagos Lights",
                "priceAmount": 1,
                "priceToken": "$NOLLYSPOT",
            }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["message"], "Post and transaction recorded!");
        assert_eq!(body["post"]["type"], "BLOG_POST");
        assert_eq!(body["post"]["priceAmount"], 100_000.0);
        assert_eq!(body["post"]["priceToken"], "$NOLLYWOODSPOTLIGHT");
        assert_eq!(body["tx"]["status"], "pending");
        assert_eq!(body["tx"]["amount"], 100_000.0);
        assert_eq!(body["tx"]["postId"], body["post"]["id"]);
        assert_eq!(data.db.count_users().await.unwrap(), 1);
    }

    #[actix_web::test]
    async fn purchase_rejects_unknown_type_and_missing_fields() {
        let data = web::Data::new(test_state(Arc::new(RecordingChain::default())).await);
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .app_data(json_config())
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/purchase")
            .set_json(json!({
                "walletAddress": WALLET,
                "postType": "BILLBOARD",
                "message": "m",
                "title": "t",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/purchase")
            .set_json(json!({ "walletAddress": WALLET, "postType": "BLOG_POST" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        assert!(data.db.get_posts().await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn created_posts_list_with_their_owner() {
        let data = web::Data::new(test_state(Arc::new(RecordingChain::default())).await);
        let user = data.db.upsert_user(WALLET).await.unwrap();
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .app_data(json_config())
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/posts")
            .set_json(json!({
                "title": "Casting call",
                "message": "Auditions on Friday",
                "type": "PROFILE_POST",
                "priceToken": "$NOLLYSPOT",
                "priceAmount": "25000",
                "userId": user.id,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get()
            .uri("/posts?includeUser=true")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["title"], "Casting call");
        assert_eq!(body[0]["user"]["walletAddress"], WALLET);

        let req = test::TestRequest::get().uri("/posts").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert!(body[0].get("user").is_none());
    }

    #[actix_web::test]
    async fn create_post_validates_fields_and_owner() {
        let data = web::Data::new(test_state(Arc::new(RecordingChain::default())).await);
        let app = test::init_service(
            App::new()
                .app_data(data.clone())
                .app_data(json_config())
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/posts")
            .set_json(json!({ "title": "t", "message": "m" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Missing required fields");

        let req = test::TestRequest::post()
            .uri("/posts")
            .set_json(json!({
                "title": "t",
                "message": "m",
                "type": "PROFILE_POST",
                "priceToken": "$NOLLYSPOT",
                "priceAmount": 10,
                "userId": 42,
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn prices_expose_the_active_table() {
        let data = web::Data::new(test_state(Arc::new(RecordingChain::default())).await);
        let app = test::init_service(App::new().app_data(data).configure(routes)).await;

        let req = test::TestRequest::get().uri("/prices").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["PROFILE_POST"]["amount"], 25_000.0);
        assert_eq!(body["PROFILE_POST"]["token"], "$NOLLYSPOT");
        assert_eq!(body["WEBSITE_POST"]["token"], "$NOLLYWOODSPOTLIGHT");
    }
}

mod payments;
mod posts;
mod transactions;
mod users;

use actix_web::{HttpResponse, Responder, get, web};
use serde::{Deserialize, Deserializer, de::Error as _};
use serde_json::{Value, json};

pub use payments::*;
pub use posts::*;
pub use transactions::*;
pub use users::*;

use crate::errors::ApiError;

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok().body("NollySpot payments backend is running!")
}

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Registers every endpoint on the app.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(health)
        .service(register_user)
        .service(get_user_by_wallet)
        .service(purchase)
        .service(get_posts)
        .service(create_post)
        .service(get_prices)
        .service(pay)
        .service(cancel)
        .service(get_transactions)
        .service(get_transaction_by_id);
}

/// Turns body extraction failures into `400 { error }`.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        log::warn!("Rejected request body: {}", err);
        ApiError::bad_request(format!("Invalid request body: {}", err)).into()
    })
}

/// Accepts `12.5` as well as `"12.5"`.
pub(crate) fn number_or_string_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| D::Error::custom("number out of range")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("`{}` is not a number", s))),
        Some(other) => Err(D::Error::custom(format!("expected a number, got {}", other))),
    }
}

/// Accepts `7` as well as `"7"`.
pub(crate) fn number_or_string_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("{} is not an integer", n))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("`{}` is not an integer", s))),
        Some(other) => Err(D::Error::custom(format!("expected an integer, got {}", other))),
    }
}

/// Treats blank strings like missing ones.
pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

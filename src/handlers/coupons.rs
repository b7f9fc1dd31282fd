use crate::handlers::common::{success_response, validate_input};
use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for coupon endpoints
pub fn routes() -> Router<AppState> {
    Router::new().route("/validate", post(validate_coupon))
}

/// Validate a coupon code against an order amount.
///
/// Unlike checkout, which silently ignores bad codes, this endpoint is
/// precise: unknown codes are 404s and rejections are 400s with the reason.
#[utoipa::path(
    post,
    path = "/api/v1/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon is valid; response carries the quoted discount"),
        (status = 400, description = "Coupon rejected (expired, exhausted, below minimum, …)", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown coupon code", body = crate::errors::ErrorResponse)
    ),
    tag = "Coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    Json(payload): Json<ValidateCouponRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let quote = state
        .services
        .coupons
        .validate_code(&payload.code, payload.customer_id, payload.order_amount)
        .await?;

    Ok(success_response(serde_json::json!({
        "coupon": quote.coupon,
        "discount_amount": quote.discount_amount,
        "free_shipping": quote.free_shipping,
        "message": "Coupon is valid",
    })))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    pub customer_id: Uuid,
    pub order_amount: Decimal,
}

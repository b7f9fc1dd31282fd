use crate::handlers::common::{created_response, success_response};
use crate::{
    entities::PaymentMethod,
    errors::ServiceError,
    services::payments::CreateIntentInput,
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

/// Creates the router for payment endpoints (the webhook receiver is wired
/// separately; it is signature-verified instead of customer-scoped).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/intent", post(create_payment_intent))
        .route("/:id/confirm", post(confirm_payment))
        .route("/:id/refund", post(refund_payment))
}

/// Open a payment attempt for an order awaiting payment
#[utoipa::path(
    post,
    path = "/api/v1/payments/intent",
    request_body = CreateIntentRequest,
    responses(
        (status = 201, description = "Payment attempt created; response carries the provider intent reference"),
        (status = 400, description = "Order is not awaiting payment", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(payload): Json<CreateIntentRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let payment = state
        .services
        .payments
        .create_intent(CreateIntentInput {
            customer_id: payload.customer_id,
            order_id: payload.order_id,
            method: payload.method,
        })
        .await?;

    let provider_intent_id = payment.provider_intent_id.clone();
    Ok(created_response(serde_json::json!({
        "payment": payment,
        "provider_intent_id": provider_intent_id,
    })))
}

/// Confirm a pending payment attempt
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/confirm",
    request_body = ConfirmPaymentRequest,
    responses(
        (status = 200, description = "Payment confirmed; order marked paid"),
        (status = 400, description = "Payment cannot be confirmed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConfirmPaymentRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let payment = state
        .services
        .payments
        .confirm(id, payload.customer_id)
        .await?;

    Ok(success_response(payment))
}

/// Refund a succeeded payment, fully or partially
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/refund",
    request_body = RefundPaymentRequest,
    responses(
        (status = 200, description = "Refund recorded; order payment status moved to refunded"),
        (status = 400, description = "Payment cannot be refunded", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RefundPaymentRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let refund = state
        .services
        .payments
        .refund(id, payload.customer_id, payload.amount, payload.reason)
        .await?;

    Ok(success_response(refund))
}

// Request DTOs

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateIntentRequest {
    pub customer_id: Uuid,
    pub order_id: Uuid,
    #[schema(value_type = String)]
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ConfirmPaymentRequest {
    pub customer_id: Uuid,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RefundPaymentRequest {
    pub customer_id: Uuid,
    #[schema(value_type = Option<f64>)]
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

use crate::handlers::common::{created_response, success_response, validate_input};
use crate::{
    errors::ServiceError,
    services::checkout::PlaceOrderInput,
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for order endpoints
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/", get(list_orders))
        .route("/stats", get(order_stats))
        .route("/track/:order_number", get(track_order))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
}

/// Create an order from the customer's cart (checkout)
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created from cart"),
        (status = 400, description = "Empty cart or invalid input", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Product unavailable or out of stock", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let customer_id = payload.customer_id;
    let order = state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id,
            billing_address_id: payload.billing_address_id,
            shipping_address_id: payload.shipping_address_id,
            coupon_code: payload.coupon_code,
            customer_notes: payload.customer_notes,
            payment_method: payload.payment_method,
        })
        .await?;

    let details = state.services.orders.get(order.id, customer_id).await?;
    Ok(created_response(details))
}

/// List the customer's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Paginated orders for the customer")
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list(query.customer_id, query.page, query.limit)
        .await?;

    Ok(success_response(serde_json::json!({
        "orders": orders,
        "total": total,
        "page": query.page,
        "limit": query.limit,
    })))
}

/// Get one of the customer's orders with lines and history
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    responses(
        (status = 200, description = "Order with items, coupon, and status history"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CustomerQuery>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let details = state.services.orders.get(id, query.customer_id).await?;
    Ok(success_response(details))
}

/// Cancel an order while the state machine still allows it
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order cancelled"),
        (status = 400, description = "Order is no longer cancellable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelOrderRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .cancel(id, payload.customer_id, payload.reason)
        .await?;

    Ok(success_response(serde_json::json!({
        "message": "Order cancelled successfully",
        "order": order,
    })))
}

/// Fulfillment timeline looked up by order number
#[utoipa::path(
    get,
    path = "/api/v1/orders/track/{order_number}",
    responses(
        (status = 200, description = "Tracking timeline for the order"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Orders"
)]
pub async fn track_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    Query(query): Query<CustomerQuery>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let tracking = state
        .services
        .orders
        .track(query.customer_id, &order_number)
        .await?;
    Ok(success_response(tracking))
}

/// Order counters and total spend for a customer
async fn order_stats(
    State(state): State<AppState>,
    Query(query): Query<CustomerQuery>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let stats = state.services.orders.stats(query.customer_id).await?;
    Ok(success_response(stats))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate, utoipa::ToSchema)]
pub struct CreateOrderRequest {
    pub customer_id: Uuid,
    pub billing_address_id: Uuid,
    pub shipping_address_id: Uuid,
    #[validate(length(max = 50))]
    pub coupon_code: Option<String>,
    #[validate(length(max = 2000))]
    pub customer_notes: Option<String>,
    #[validate(length(max = 50))]
    pub payment_method: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CancelOrderRequest {
    pub customer_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerQuery {
    pub customer_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub customer_id: Uuid,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    20
}

use crate::handlers::common::{
    created_response, no_content_response, success_response, validate_input,
};
use crate::{
    errors::ServiceError,
    services::carts::{AddItemInput, CartOwner},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(get_or_create_cart))
        .route("/:id", get(get_cart))
        .route("/:id/items", post(add_to_cart))
        .route("/:id/items/:product_id", put(update_cart_item))
        .route("/:id/items/:product_id", delete(remove_cart_item))
        .route("/:id/clear", post(clear_cart))
}

/// Get or lazily create the cart for a customer or guest session
async fn get_or_create_cart(
    State(state): State<AppState>,
    Json(payload): Json<CreateCartRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let owner = match (payload.customer_id, payload.session_key) {
        (Some(customer_id), None) => CartOwner::Customer(customer_id),
        (None, Some(session_key)) if !session_key.trim().is_empty() => {
            CartOwner::Session(session_key)
        }
        _ => {
            return Err(ServiceError::ValidationError(
                "Provide exactly one of customer_id or session_key".to_string(),
            ))
        }
    };

    let cart = state.services.carts.get_or_create(owner).await?;
    let view = state.services.carts.get(cart.id).await?;

    Ok(created_response(view))
}

/// Get cart with items and derived totals
async fn get_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    let view = state.services.carts.get(id).await?;
    Ok(success_response(view))
}

/// Add item to cart (or increment the existing line)
async fn add_to_cart(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let view = state
        .services
        .carts
        .add_item(
            cart_id,
            AddItemInput {
                product_id: payload.product_id,
                quantity: payload.quantity,
            },
        )
        .await?;

    Ok(success_response(view))
}

/// Overwrite a cart line's quantity; zero removes the line
async fn update_cart_item(
    State(state): State<AppState>,
    Path((cart_id, product_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    validate_input(&payload)?;

    let view = state
        .services
        .carts
        .set_quantity(cart_id, product_id, payload.quantity)
        .await?;

    Ok(success_response(view))
}

/// Remove a line from the cart; removing an absent line is a no-op
async fn remove_cart_item(
    State(state): State<AppState>,
    Path((cart_id, product_id)): Path<(Uuid, Uuid)>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    state
        .services
        .carts
        .remove_item(cart_id, product_id)
        .await?;

    Ok(no_content_response())
}

/// Clear all items from the cart
async fn clear_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ServiceError> {
    state.services.carts.clear(id).await?;

    Ok(success_response(serde_json::json!({
        "message": "Cart cleared successfully"
    })))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct CreateCartRequest {
    pub customer_id: Option<Uuid>,
    pub session_key: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    #[validate(range(min = 0))]
    pub quantity: i32,
}

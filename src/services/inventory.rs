use crate::{
    entities::{product, Product, ProductModel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

/// Stock outcome of a depletion, used to raise low-stock alerts after the
/// surrounding transaction commits.
#[derive(Debug, Clone, Copy)]
pub struct DepletionOutcome {
    pub product_id: Uuid,
    /// Remaining units; `None` for untracked products.
    pub remaining: Option<i32>,
    pub low_stock: bool,
}

/// Checks a requested line against availability and tracked stock.
///
/// Stock is only checked here, never reserved; depletion happens inside the
/// checkout transaction via [`deplete`].
pub fn check_line(product: &ProductModel, requested: i32) -> Result<(), ServiceError> {
    if !product.is_available() {
        return Err(ServiceError::ProductUnavailable(format!(
            "Product {} is not available",
            product.name
        )));
    }
    if !product.has_stock(requested) {
        return Err(ServiceError::InsufficientStock(format!(
            "Requested quantity ({}) exceeds available stock ({}) for {}",
            requested, product.quantity, product.name
        )));
    }
    Ok(())
}

/// Depletes tracked stock with an atomic decrement-with-floor:
/// `quantity = quantity - n` only applies while `quantity >= n`, so
/// concurrent checkouts cannot drive stock negative. A failed guard aborts
/// the caller's transaction with `InsufficientStock`.
pub async fn deplete<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<DepletionOutcome, ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::Quantity,
            Expr::col(product::Column::Quantity).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::TrackInventory.eq(true))
        .filter(product::Column::Quantity.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 1 {
        let product = Product::find_by_id(product_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        return Ok(DepletionOutcome {
            product_id,
            remaining: Some(product.quantity),
            low_stock: product.is_low_stock(),
        });
    }

    // The guard did not match: either the product is untracked (fine) or
    // stock was taken by a concurrent checkout since validation.
    let product = Product::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

    if product.track_inventory {
        return Err(ServiceError::InsufficientStock(format!(
            "Requested quantity ({}) exceeds available stock ({}) for {}",
            quantity, product.quantity, product.name
        )));
    }

    Ok(DepletionOutcome {
        product_id,
        remaining: None,
        low_stock: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::product::ProductStatus;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn product(status: ProductStatus, track: bool, quantity: i32) -> ProductModel {
        ProductModel {
            id: Uuid::new_v4(),
            name: "Collier Étoile".to_string(),
            sku: "SD-NECK-002".to_string(),
            price: dec!(120.00),
            compare_at_price: None,
            status,
            track_inventory: track,
            quantity,
            low_stock_threshold: 5,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unpublished_product_is_unavailable() {
        let err = check_line(&product(ProductStatus::Draft, false, 10), 1).unwrap_err();
        assert_matches!(err, ServiceError::ProductUnavailable(_));
    }

    #[test]
    fn tracked_stock_bounds_requests() {
        let p = product(ProductStatus::Published, true, 3);
        assert!(check_line(&p, 3).is_ok());
        let err = check_line(&p, 4).unwrap_err();
        assert_matches!(err, ServiceError::InsufficientStock(_));
    }

    #[test]
    fn untracked_products_never_run_out() {
        let p = product(ProductStatus::Published, false, 0);
        assert!(check_line(&p, 1_000).is_ok());
    }
}

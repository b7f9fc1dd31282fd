use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Catalog product entity.
///
/// Only the slice of the catalog the order path depends on: price,
/// publication status, and tracked inventory.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub sku: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub compare_at_price: Option<Decimal>,
    pub status: ProductStatus,
    pub track_inventory: bool,
    pub quantity: i32,
    pub low_stock_threshold: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A product can be sold when it is published and, if inventory is
    /// tracked, at least one unit remains.
    pub fn is_available(&self) -> bool {
        self.status == ProductStatus::Published && (!self.track_inventory || self.quantity > 0)
    }

    /// Whether the tracked stock covers `requested` units. Untracked
    /// products always have stock.
    pub fn has_stock(&self, requested: i32) -> bool {
        !self.track_inventory || self.quantity >= requested
    }

    pub fn is_low_stock(&self) -> bool {
        self.track_inventory && self.quantity <= self.low_stock_threshold
    }
}

/// Product publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[serde(rename_all = "snake_case")]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ProductStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "published")]
    Published,
    #[sea_orm(string_value = "archived")]
    Archived,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn product(status: ProductStatus, track: bool, quantity: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            name: "Bague Lumière".to_string(),
            sku: "SD-RING-001".to_string(),
            price: dec!(89.00),
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
    fn draft_products_are_never_available() {
        assert!(!product(ProductStatus::Draft, false, 10).is_available());
    }

    #[test]
    fn tracked_product_without_stock_is_unavailable() {
        assert!(!product(ProductStatus::Published, true, 0).is_available());
        assert!(product(ProductStatus::Published, true, 1).is_available());
    }

    #[test]
    fn untracked_product_always_has_stock() {
        assert!(product(ProductStatus::Published, false, 0).has_stock(100));
    }

    #[test]
    fn tracked_stock_is_bounded() {
        let p = product(ProductStatus::Published, true, 3);
        assert!(p.has_stock(3));
        assert!(!p.has_stock(4));
    }
}

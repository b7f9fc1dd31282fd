use crate::{
    entities::{cart, cart_item, product, Cart, CartItem, CartModel, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Who a cart belongs to: an authenticated customer or a guest session.
#[derive(Debug, Clone)]
pub enum CartOwner {
    Customer(Uuid),
    Session(String),
}

/// Input for adding an item to a cart
#[derive(Debug, Deserialize)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// A cart line priced at the current product price.
#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Cart with derived totals. Totals are computed on read from current
/// product prices, never stored, so catalog price changes show up
/// immediately in open carts.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub session_key: Option<String>,
    pub items: Vec<CartLineView>,
    pub total_items: i64,
    pub total_price: Decimal,
    pub is_empty: bool,
}

/// Shopping cart service: lifecycle, line mutations, derived totals.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Returns the owner's cart, creating it lazily on first use.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, owner: CartOwner) -> Result<CartModel, ServiceError> {
        let existing = match &owner {
            CartOwner::Customer(id) => {
                Cart::find()
                    .filter(cart::Column::CustomerId.eq(*id))
                    .one(&*self.db)
                    .await?
            }
            CartOwner::Session(key) => {
                Cart::find()
                    .filter(cart::Column::SessionKey.eq(key.clone()))
                    .one(&*self.db)
                    .await?
            }
        };

        if let Some(cart) = existing {
            return Ok(cart);
        }

        let cart_id = Uuid::new_v4();
        let (customer_id, session_key) = match owner {
            CartOwner::Customer(id) => (Some(id), None),
            CartOwner::Session(key) => (None, Some(key)),
        };

        let cart = cart::ActiveModel {
            id: Set(cart_id),
            customer_id: Set(customer_id),
            session_key: Set(session_key),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };

        let cart = cart.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartCreated(cart_id))
            .await;

        info!("Created cart: {}", cart_id);
        Ok(cart)
    }

    /// Retrieves a cart with its lines priced at current product prices.
    #[instrument(skip(self))]
    pub async fn get(&self, cart_id: Uuid) -> Result<CartView, ServiceError> {
        let cart = self.find_cart(&*self.db, cart_id).await?;
        Self::load_view(&*self.db, &cart).await
    }

    /// Adds an item or increments the existing line. Stock is validated for
    /// the combined quantity (existing + new) but never reserved.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        input: AddItemInput,
    ) -> Result<CartView, ServiceError> {
        if input.quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let cart = self.find_cart(&txn, cart_id).await?;

        let product = Product::find_by_id(input.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", input.product_id))
            })?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::ProductId.eq(input.product_id))
            .one(&txn)
            .await?;

        let combined = existing.as_ref().map(|i| i.quantity).unwrap_or(0) + input.quantity;
        inventory::check_line(&product, combined)?;

        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(combined);
                item.updated_at = Set(Utc::now());
                item.update(&txn).await?;
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart_id),
                    product_id: Set(input.product_id),
                    quantity: Set(input.quantity),
                    created_at: Set(Utc::now()),
                    updated_at: Set(Utc::now()),
                };
                item.insert(&txn).await?;
            }
        }

        Self::touch(&txn, &cart).await?;
        let view = Self::load_view(&txn, &cart).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id,
                product_id: input.product_id,
            })
            .await;

        info!(
            "Added item to cart {}: product {} x{}",
            cart_id, input.product_id, input.quantity
        );
        Ok(view)
    }

    /// Overwrites a line's quantity. Zero or negative removes the line.
    #[instrument(skip(self))]
    pub async fn set_quantity(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(cart_id, product_id).await;
        }

        let txn = self.db.begin().await?;

        let cart = self.find_cart(&txn, cart_id).await?;

        let item = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        inventory::check_line(&product, quantity)?;

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;

        Self::touch(&txn, &cart).await?;
        let view = Self::load_view(&txn, &cart).await?;
        txn.commit().await?;

        Ok(view)
    }

    /// Removes a line. Idempotent: removing an absent line is a no-op.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.find_cart(&txn, cart_id).await?;

        let deleted = CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;

        Self::touch(&txn, &cart).await?;
        let view = Self::load_view(&txn, &cart).await?;
        txn.commit().await?;

        if deleted.rows_affected > 0 {
            self.event_sender
                .send_or_log(Event::CartItemRemoved {
                    cart_id,
                    product_id,
                })
                .await;
        }

        Ok(view)
    }

    /// Deletes every line. The cart row itself is kept.
    #[instrument(skip(self))]
    pub async fn clear(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let cart = self.find_cart(&txn, cart_id).await?;
        Self::clear_items_on(&txn, cart_id).await?;
        Self::touch(&txn, &cart).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart_id))
            .await;

        info!("Cleared cart: {}", cart_id);
        Ok(())
    }

    /// Item deletion shared with the checkout transaction.
    pub(crate) async fn clear_items_on<C: ConnectionTrait>(
        conn: &C,
        cart_id: Uuid,
    ) -> Result<(), ServiceError> {
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn find_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))
    }

    async fn touch<C: ConnectionTrait>(conn: &C, cart: &CartModel) -> Result<(), ServiceError> {
        let mut active: cart::ActiveModel = cart.clone().into();
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;
        Ok(())
    }

    /// Builds the derived view: lines joined with their products at the
    /// current catalog price.
    pub(crate) async fn load_view<C: ConnectionTrait>(
        conn: &C,
        cart: &CartModel,
    ) -> Result<CartView, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(conn)
            .await?;

        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            let product = products.get(&item.product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;
            lines.push(CartLineView {
                product_id: product.id,
                product_name: product.name.clone(),
                sku: product.sku.clone(),
                quantity: item.quantity,
                unit_price: product.price,
                line_total: product.price * Decimal::from(item.quantity),
            });
        }

        let total_items: i64 = lines.iter().map(|l| i64::from(l.quantity)).sum();
        let total_price: Decimal = lines.iter().map(|l| l.line_total).sum();

        Ok(CartView {
            id: cart.id,
            customer_id: cart.customer_id,
            session_key: cart.session_key.clone(),
            is_empty: lines.is_empty(),
            items: lines,
            total_items,
            total_price,
        })
    }
}

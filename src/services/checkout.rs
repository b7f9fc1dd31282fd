use crate::{
    config::AppConfig,
    entities::{
        address, cart, cart_item, coupon::CouponKind, order, order_coupon, order_item,
        product, Address, Cart, CartItem, OrderModel, OrderPaymentStatus, OrderStatus, Product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{carts::CartService, coupons, coupons::CouponService, inventory, orders},
};
use chrono::Utc;
use metrics::{counter, histogram};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Checkout request: which customer buys their cart, where it goes, and an
/// optional coupon code.
#[derive(Debug, Deserialize)]
pub struct PlaceOrderInput {
    pub customer_id: Uuid,
    pub billing_address_id: Uuid,
    pub shipping_address_id: Uuid,
    pub coupon_code: Option<String>,
    pub customer_notes: Option<String>,
    pub payment_method: Option<String>,
}

/// Converts a cart into an order.
///
/// The whole conversion — line re-validation, price snapshotting, coupon
/// application, stock depletion, history, and cart clearing — runs inside
/// one database transaction: either the order exists with all of its side
/// effects, or nothing changed.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
    coupons: CouponService,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
        coupons: CouponService,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
            coupons,
        }
    }

    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub async fn place_order(&self, input: PlaceOrderInput) -> Result<OrderModel, ServiceError> {
        let started = Instant::now();
        let customer_id = input.customer_id;

        let txn = self.db.begin().await?;

        // Both addresses must belong to the ordering customer.
        self.find_owned_address(&txn, input.billing_address_id, customer_id, "Billing")
            .await?;
        self.find_owned_address(&txn, input.shipping_address_id, customer_id, "Shipping")
            .await?;

        let cart = Cart::find()
            .filter(cart::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Your cart is empty".to_string()))?;

        let items = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .all(&txn)
            .await?;
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Your cart is empty".to_string(),
            ));
        }

        // Re-validate every line against the current catalog; all-or-nothing.
        let product_ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut subtotal = Decimal::ZERO;
        for item in &items {
            let product = products.get(&item.product_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;
            inventory::check_line(product, item.quantity)?;
            subtotal += product.price * Decimal::from(item.quantity);
        }

        let tax_rate = Decimal::from_f64(self.config.tax_rate).unwrap_or(Decimal::ZERO);
        // Tax is computed on the subtotal, not the discounted amount.
        let tax_amount = subtotal * tax_rate;
        let mut shipping_cost =
            Decimal::from_f64(self.config.shipping_flat_rate).unwrap_or(Decimal::ZERO);

        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();
        let now = Utc::now();

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(customer_id),
            status: Set(OrderStatus::Pending),
            payment_status: Set(OrderPaymentStatus::Pending),
            billing_address_id: Set(input.billing_address_id),
            shipping_address_id: Set(input.shipping_address_id),
            subtotal: Set(subtotal),
            tax_amount: Set(tax_amount),
            shipping_cost: Set(shipping_cost),
            discount_amount: Set(Decimal::ZERO),
            total_amount: Set(subtotal + tax_amount + shipping_cost),
            currency: Set(self.config.currency.clone()),
            payment_method: Set(input.payment_method),
            tracking_number: Set(None),
            shipping_carrier: Set(None),
            customer_notes: Set(input.customer_notes),
            notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let order = order.insert(&txn).await?;

        // Price snapshot: the order keeps these lines even if the catalog
        // changes afterwards.
        for item in &items {
            let product = &products[&item.product_id];
            let order_item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                sku: Set(product.sku.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(product.price),
                created_at: Set(now),
            };
            order_item.insert(&txn).await?;
        }

        // A bad coupon code never fails checkout; every rejection is logged.
        let mut discount_amount = Decimal::ZERO;
        let mut applied_coupon = None;
        if let Some(code) = normalized_code(input.coupon_code.as_deref()) {
            match self.coupons.find_by_code_on(&txn, &code).await? {
                None => warn!(%code, "Unknown coupon code ignored at checkout"),
                Some(coupon) => {
                    match coupons::validate(&coupon, Utc::now(), customer_id, subtotal) {
                        Err(reason) => {
                            warn!(%code, %reason, "Coupon rejected at checkout");
                        }
                        Ok(()) => {
                            // The guarded increment decides who may use the
                            // last remaining redemption.
                            if self.coupons.consume(&txn, coupon.id).await? {
                                let amount = coupons::discount_for(&coupon, subtotal);
                                if coupon.kind == CouponKind::FreeShipping {
                                    shipping_cost = Decimal::ZERO;
                                }
                                let order_coupon = order_coupon::ActiveModel {
                                    id: Set(Uuid::new_v4()),
                                    order_id: Set(order_id),
                                    coupon_id: Set(coupon.id),
                                    discount_amount: Set(amount),
                                    created_at: Set(now),
                                };
                                order_coupon.insert(&txn).await?;
                                discount_amount = amount;
                                applied_coupon = Some((coupon.id, amount));
                            } else {
                                warn!(%code, "Coupon exhausted by a concurrent checkout; ignored");
                            }
                        }
                    }
                }
            }
        }

        // Stock leaves inventory in the same transaction that creates the
        // order, so a lost decrement race aborts the whole checkout.
        let mut low_stock = Vec::new();
        for item in &items {
            let outcome = inventory::deplete(&txn, item.product_id, item.quantity).await?;
            if outcome.low_stock {
                low_stock.push(outcome);
            }
        }

        let total_amount = subtotal + tax_amount + shipping_cost - discount_amount;
        debug_assert!(total_amount >= Decimal::ZERO);

        let mut active: order::ActiveModel = order.into();
        active.discount_amount = Set(discount_amount);
        active.shipping_cost = Set(shipping_cost);
        active.total_amount = Set(total_amount);
        active.updated_at = Set(Utc::now());
        let order = active.update(&txn).await?;

        orders::record_status(
            &txn,
            order_id,
            OrderStatus::Pending,
            Some("Order created".to_string()),
        )
        .await?;

        CartService::clear_items_on(&txn, cart.id).await?;

        txn.commit().await?;

        counter!("silence_dor_checkout.completed", 1);
        histogram!(
            "silence_dor_checkout.duration_seconds",
            started.elapsed().as_secs_f64()
        );

        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;
        self.event_sender
            .send_or_log(Event::CartCleared(cart.id))
            .await;
        if let Some((coupon_id, amount)) = applied_coupon {
            self.event_sender
                .send_or_log(Event::CouponApplied {
                    order_id,
                    coupon_id,
                    discount_amount: amount,
                })
                .await;
        }
        for outcome in low_stock {
            self.event_sender
                .send_or_log(Event::LowStock {
                    product_id: outcome.product_id,
                    remaining: outcome.remaining.unwrap_or(0),
                })
                .await;
        }

        info!(
            "Checkout completed: order {} ({}) created from cart {}",
            order_id, order_number, cart.id
        );
        Ok(order)
    }

    async fn find_owned_address<C: ConnectionTrait>(
        &self,
        conn: &C,
        address_id: Uuid,
        customer_id: Uuid,
        label: &str,
    ) -> Result<address::Model, ServiceError> {
        Address::find_by_id(address_id)
            .filter(address::Column::CustomerId.eq(customer_id))
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("{} address not found", label)))
    }
}

/// Order numbers are short, unique, human-readable references
/// (`SD` + 8 hex characters), generated once and never changed.
fn generate_order_number() -> String {
    format!(
        "SD{}",
        Uuid::new_v4().to_string()[..8].to_uppercase()
    )
}

fn normalized_code(code: Option<&str>) -> Option<String> {
    code.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(CouponService::normalize_code)
}

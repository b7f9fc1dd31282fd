use crate::{
    config::AppConfig,
    events::EventSender,
    services::{
        AddressService, CartService, CheckoutService, CouponService, OrderService, PaymentService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod carts;
pub mod common;
pub mod coupons;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;

/// Aggregated services shared by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub carts: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub coupons: Arc<CouponService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub addresses: Arc<AddressService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        let coupons = CouponService::new(db.clone());
        Self {
            carts: Arc::new(CartService::new(db.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(
                db.clone(),
                event_sender.clone(),
                config,
                coupons.clone(),
            )),
            coupons: Arc::new(coupons),
            orders: Arc::new(OrderService::new(db.clone(), event_sender.clone())),
            payments: Arc::new(PaymentService::new(db.clone(), event_sender)),
            addresses: Arc::new(AddressService::new(db)),
        }
    }
}

#![allow(dead_code)]

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use silence_dor_api::{
    config::AppConfig,
    db,
    entities::{
        address, coupon, customer, product, AddressModel, CouponKind, CouponModel, CustomerModel,
        ProductModel, ProductStatus,
    },
    events::{EventSender, LogNotifier, process_events},
    handlers::AppServices,
    AppState,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test harness backed by a throwaway SQLite database file.
pub struct TestApp {
    pub state: AppState,
    _tmp: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Construct a test application, letting the caller tweak the pricing
    /// policy (tax rate, shipping) before services are built.
    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let tmp = tempfile::tempdir().expect("temp dir");
        let db_path = tmp.path().join("silence_dor_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(process_events(event_rx, Arc::new(LogNotifier)));

        let db_arc = Arc::new(pool);
        let cfg = Arc::new(cfg);
        let services = AppServices::new(db_arc.clone(), Arc::new(event_sender.clone()), cfg.clone());

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        Self {
            state,
            _tmp: tmp,
            _event_task: event_task,
        }
    }

    pub async fn seed_customer(&self, email: &str) -> CustomerModel {
        let customer = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email.to_string()),
            full_name: Set("Camille Test".to_string()),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        customer
            .insert(&*self.state.db)
            .await
            .expect("failed to seed customer")
    }

    pub async fn seed_address(&self, customer_id: Uuid) -> AddressModel {
        let address = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            line1: Set("12 rue des Orfèvres".to_string()),
            line2: Set(None),
            city: Set("Paris".to_string()),
            postal_code: Set("75001".to_string()),
            country_code: Set("FR".to_string()),
            phone: Set(None),
            is_default_shipping: Set(false),
            is_default_billing: Set(false),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        address
            .insert(&*self.state.db)
            .await
            .expect("failed to seed address")
    }

    /// Seeds a published product with tracked stock.
    pub async fn seed_product(&self, sku: &str, price: Decimal, quantity: i32) -> ProductModel {
        self.seed_product_with(sku, price, quantity, true, ProductStatus::Published)
            .await
    }

    pub async fn seed_product_with(
        &self,
        sku: &str,
        price: Decimal,
        quantity: i32,
        track_inventory: bool,
        status: ProductStatus,
    ) -> ProductModel {
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(format!("Bijou {}", sku)),
            sku: Set(sku.to_string()),
            price: Set(price),
            compare_at_price: Set(None),
            status: Set(status),
            track_inventory: Set(track_inventory),
            quantity: Set(quantity),
            low_stock_threshold: Set(2),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        product
            .insert(&*self.state.db)
            .await
            .expect("failed to seed product")
    }

    /// Seeds an active coupon valid for the next 30 days.
    pub async fn seed_coupon(
        &self,
        code: &str,
        kind: CouponKind,
        value: Decimal,
        minimum_order_amount: Option<Decimal>,
        usage_limit: Option<i32>,
    ) -> CouponModel {
        let coupon = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_uppercase()),
            description: Set(None),
            kind: Set(kind),
            value: Set(value),
            minimum_order_amount: Set(minimum_order_amount),
            maximum_discount_amount: Set(None),
            usage_limit: Set(usage_limit),
            used_count: Set(0),
            applicable_customers: Set(None),
            valid_from: Set(Utc::now() - Duration::days(1)),
            valid_until: Set(Utc::now() + Duration::days(30)),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        coupon
            .insert(&*self.state.db)
            .await
            .expect("failed to seed coupon")
    }
}

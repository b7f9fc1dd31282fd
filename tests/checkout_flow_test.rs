mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use silence_dor_api::{
    entities::{
        product, Coupon, CouponKind, Order, OrderCoupon, OrderItem, OrderPaymentStatus,
        OrderStatus, OrderStatusHistory, Product,
    },
    errors::ServiceError,
    services::{carts::AddItemInput, carts::CartOwner, checkout::PlaceOrderInput},
};
use uuid::Uuid;

/// Seeds the reference basket: 2 × 10.00 + 1 × 5.00.
async fn seed_reference_cart(app: &TestApp, customer_id: Uuid) -> (Uuid, Uuid, Uuid) {
    let ring = app.seed_product("REF-RING", dec!(10.00), 10).await;
    let pendant = app.seed_product("REF-PEND", dec!(5.00), 10).await;

    let carts = &app.state.services.carts;
    let cart = carts
        .get_or_create(CartOwner::Customer(customer_id))
        .await
        .unwrap();
    carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id: ring.id,
                quantity: 2,
            },
        )
        .await
        .unwrap();
    carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id: pendant.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    (cart.id, ring.id, pendant.id)
}

#[tokio::test]
async fn checkout_prices_the_reference_scenario() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("scenario@example.com").await;
    let billing = app.seed_address(customer.id).await;
    let shipping = app.seed_address(customer.id).await;
    let (cart_id, ring_id, pendant_id) = seed_reference_cart(&app, customer.id).await;
    app.seed_coupon(
        "TEN",
        CouponKind::Percentage,
        dec!(10),
        Some(dec!(20.00)),
        None,
    )
    .await;

    let order = app
        .state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: customer.id,
            billing_address_id: billing.id,
            shipping_address_id: shipping.id,
            coupon_code: Some("ten".to_string()),
            customer_notes: Some("Gift wrap please".to_string()),
            payment_method: Some("card".to_string()),
        })
        .await
        .expect("checkout succeeds");

    // subtotal 25.00, 10% discount 2.50, 20% tax on the undiscounted
    // subtotal 5.00, free shipping: total 27.50.
    assert_eq!(order.subtotal, dec!(25.00));
    assert_eq!(order.discount_amount, dec!(2.50));
    assert_eq!(order.tax_amount, dec!(5.00));
    assert_eq!(order.shipping_cost, dec!(0));
    assert_eq!(order.total_amount, dec!(27.50));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, OrderPaymentStatus::Pending);
    assert!(order.order_number.starts_with("SD"));

    // Lines snapshot the current prices.
    let items = OrderItem::find().all(&*app.state.db).await.unwrap();
    assert_eq!(items.len(), 2);

    // Exactly one initial history row.
    let history = OrderStatusHistory::find().all(&*app.state.db).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, OrderStatus::Pending);

    // Stock left inventory with the order.
    let ring = Product::find_by_id(ring_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let pendant = Product::find_by_id(pendant_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ring.quantity, 8);
    assert_eq!(pendant.quantity, 9);

    // Cart cleared, coupon consumed, application frozen.
    let cart_view = app.state.services.carts.get(cart_id).await.unwrap();
    assert!(cart_view.is_empty);

    let coupon = Coupon::find().one(&*app.state.db).await.unwrap().unwrap();
    assert_eq!(coupon.used_count, 1);

    let applied = OrderCoupon::find().one(&*app.state.db).await.unwrap().unwrap();
    assert_eq!(applied.order_id, order.id);
    assert_eq!(applied.discount_amount, dec!(2.50));
}

#[tokio::test]
async fn order_prices_survive_catalog_changes() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("snapshot@example.com").await;
    let billing = app.seed_address(customer.id).await;
    let (_, ring_id, _) = seed_reference_cart(&app, customer.id).await;

    let order = app
        .state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: customer.id,
            billing_address_id: billing.id,
            shipping_address_id: billing.id,
            coupon_code: None,
            customer_notes: None,
            payment_method: None,
        })
        .await
        .unwrap();

    // Reprice the ring after checkout.
    let ring = Product::find_by_id(ring_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut repriced: product::ActiveModel = ring.into();
    repriced.price = Set(dec!(99.00));
    repriced.update(&*app.state.db).await.unwrap();

    let details = app
        .state
        .services
        .orders
        .get(order.id, customer.id)
        .await
        .unwrap();
    let ring_line = details
        .items
        .iter()
        .find(|i| i.product_id == ring_id)
        .unwrap();
    assert_eq!(ring_line.unit_price, dec!(10.00));
    assert_eq!(details.order.subtotal, dec!(25.00));
}

#[tokio::test]
async fn checkout_is_all_or_nothing_when_stock_runs_out() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("atomic@example.com").await;
    let billing = app.seed_address(customer.id).await;

    let plenty = app.seed_product("ATOM-OK", dec!(10.00), 10).await;
    let scarce = app.seed_product("ATOM-LOW", dec!(5.00), 5).await;

    let carts = &app.state.services.carts;
    let cart = carts
        .get_or_create(CartOwner::Customer(customer.id))
        .await
        .unwrap();
    carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id: plenty.id,
                quantity: 2,
            },
        )
        .await
        .unwrap();
    carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id: scarce.id,
                quantity: 5,
            },
        )
        .await
        .unwrap();

    // Stock disappears between add-to-cart and checkout (no reservation).
    let scarce_model = Product::find_by_id(scarce.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut depleted: product::ActiveModel = scarce_model.into();
    depleted.quantity = Set(1);
    depleted.update(&*app.state.db).await.unwrap();

    let err = app
        .state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: customer.id,
            billing_address_id: billing.id,
            shipping_address_id: billing.id,
            coupon_code: None,
            customer_notes: None,
            payment_method: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // Nothing persisted: no order, no items, no history; cart intact;
    // the in-stock product kept its units.
    assert_eq!(Order::find().count(&*app.state.db).await.unwrap(), 0);
    assert_eq!(OrderItem::find().count(&*app.state.db).await.unwrap(), 0);
    assert_eq!(
        OrderStatusHistory::find().count(&*app.state.db).await.unwrap(),
        0
    );

    let view = carts.get(cart.id).await.unwrap();
    assert_eq!(view.items.len(), 2);

    let plenty = Product::find_by_id(plenty.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plenty.quantity, 10);
}

#[tokio::test]
async fn invalid_coupon_codes_do_not_fail_checkout() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("lenient@example.com").await;
    let billing = app.seed_address(customer.id).await;
    seed_reference_cart(&app, customer.id).await;

    let order = app
        .state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: customer.id,
            billing_address_id: billing.id,
            shipping_address_id: billing.id,
            coupon_code: Some("TYPO-CODE".to_string()),
            customer_notes: None,
            payment_method: None,
        })
        .await
        .expect("unknown code is ignored, not fatal");

    assert_eq!(order.discount_amount, dec!(0));
    assert_eq!(order.total_amount, dec!(30.00));
    assert_eq!(OrderCoupon::find().count(&*app.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn exhausted_coupon_downgrades_to_no_coupon() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("exhausted@example.com").await;
    let billing = app.seed_address(customer.id).await;
    seed_reference_cart(&app, customer.id).await;

    let coupon = app
        .seed_coupon("SPENT", CouponKind::Percentage, dec!(10), None, Some(1))
        .await;
    app.state
        .services
        .coupons
        .consume(&*app.state.db, coupon.id)
        .await
        .unwrap();

    let order = app
        .state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: customer.id,
            billing_address_id: billing.id,
            shipping_address_id: billing.id,
            coupon_code: Some("SPENT".to_string()),
            customer_notes: None,
            payment_method: None,
        })
        .await
        .expect("exhausted coupon is ignored");

    assert_eq!(order.discount_amount, dec!(0));

    let stored = Coupon::find_by_id(coupon.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.used_count, 1, "count never exceeds the limit");
}

#[tokio::test]
async fn free_shipping_coupon_zeroes_the_shipping_cost() {
    let app = TestApp::with_config(|cfg| cfg.shipping_flat_rate = 8.0).await;
    let customer = app.seed_customer("freeship@example.com").await;
    let billing = app.seed_address(customer.id).await;
    seed_reference_cart(&app, customer.id).await;
    app.seed_coupon("SHIPFREE", CouponKind::FreeShipping, dec!(0), None, None)
        .await;

    let order = app
        .state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: customer.id,
            billing_address_id: billing.id,
            shipping_address_id: billing.id,
            coupon_code: Some("SHIPFREE".to_string()),
            customer_notes: None,
            payment_method: None,
        })
        .await
        .unwrap();

    // Shipping is zeroed; the subtotal keeps its full price.
    assert_eq!(order.shipping_cost, dec!(0));
    assert_eq!(order.discount_amount, dec!(0));
    assert_eq!(order.total_amount, dec!(30.00));
}

#[tokio::test]
async fn flat_shipping_rate_is_added_to_the_total() {
    let app = TestApp::with_config(|cfg| cfg.shipping_flat_rate = 8.0).await;
    let customer = app.seed_customer("flatrate@example.com").await;
    let billing = app.seed_address(customer.id).await;
    seed_reference_cart(&app, customer.id).await;

    let order = app
        .state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: customer.id,
            billing_address_id: billing.id,
            shipping_address_id: billing.id,
            coupon_code: None,
            customer_notes: None,
            payment_method: None,
        })
        .await
        .unwrap();

    assert_eq!(order.shipping_cost, dec!(8.00));
    assert_eq!(order.total_amount, dec!(38.00));
}

#[tokio::test]
async fn foreign_addresses_are_rejected() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("owner@example.com").await;
    let stranger = app.seed_customer("stranger@example.com").await;
    let foreign_address = app.seed_address(stranger.id).await;
    seed_reference_cart(&app, customer.id).await;

    let err = app
        .state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: customer.id,
            billing_address_id: foreign_address.id,
            shipping_address_id: foreign_address.id,
            coupon_code: None,
            customer_notes: None,
            payment_method: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    assert_eq!(Order::find().count(&*app.state.db).await.unwrap(), 0);
}

#[tokio::test]
async fn empty_carts_cannot_check_out() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("empty@example.com").await;
    let billing = app.seed_address(customer.id).await;
    app.state
        .services
        .carts
        .get_or_create(CartOwner::Customer(customer.id))
        .await
        .unwrap();

    let err = app
        .state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id: customer.id,
            billing_address_id: billing.id,
            shipping_address_id: billing.id,
            coupon_code: None,
            customer_notes: None,
            payment_method: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

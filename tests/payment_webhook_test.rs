mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use silence_dor_api::{
    entities::{
        order_status_history, OrderModel, OrderPaymentStatus, OrderStatus, OrderStatusHistory,
        Payment, PaymentMethod, PaymentModel, PaymentStatus, Refund,
    },
    errors::ServiceError,
    services::{
        carts::AddItemInput, carts::CartOwner, checkout::PlaceOrderInput,
        payments::CreateIntentInput, payments::WebhookOutcome,
    },
};
use uuid::Uuid;

async fn place_order(app: &TestApp, customer_id: Uuid) -> OrderModel {
    let product = app
        .seed_product(&format!("PAY-{}", Uuid::new_v4().simple()), dec!(10.00), 10)
        .await;
    let address = app.seed_address(customer_id).await;

    let carts = &app.state.services.carts;
    let cart = carts
        .get_or_create(CartOwner::Customer(customer_id))
        .await
        .unwrap();
    carts
        .add_item(
            cart.id,
            AddItemInput {
                product_id: product.id,
                quantity: 1,
            },
        )
        .await
        .unwrap();

    app.state
        .services
        .checkout
        .place_order(PlaceOrderInput {
            customer_id,
            billing_address_id: address.id,
            shipping_address_id: address.id,
            coupon_code: None,
            customer_notes: None,
            payment_method: Some("card".to_string()),
        })
        .await
        .unwrap()
}

async fn open_intent(app: &TestApp, customer_id: Uuid, order_id: Uuid) -> PaymentModel {
    app.state
        .services
        .payments
        .create_intent(CreateIntentInput {
            customer_id,
            order_id,
            method: PaymentMethod::Card,
        })
        .await
        .expect("intent created")
}

fn succeeded_event(event_id: &str, intent_id: &str) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "data": {"object": {"id": intent_id, "latest_charge": "ch_123"}}
    })
}

async fn history_count(app: &TestApp, order_id: Uuid) -> u64 {
    OrderStatusHistory::find()
        .filter(order_status_history::Column::OrderId.eq(order_id))
        .count(&*app.state.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn intent_carries_the_order_total() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("intent@example.com").await;
    let order = place_order(&app, customer.id).await;

    let payment = open_intent(&app, customer.id, order.id).await;

    assert_eq!(payment.amount, order.total_amount);
    assert_eq!(payment.currency, order.currency);
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert!(payment.provider_intent_id.starts_with("pi_"));
}

#[tokio::test]
async fn success_webhook_settles_payment_and_order() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("settle@example.com").await;
    let order = place_order(&app, customer.id).await;
    let payment = open_intent(&app, customer.id, order.id).await;

    let outcome = app
        .state
        .services
        .payments
        .apply_webhook(
            "evt_1",
            "payment_intent.succeeded",
            succeeded_event("evt_1", &payment.provider_intent_id),
        )
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let payment = Payment::find_by_id(payment.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Succeeded);
    assert_eq!(payment.provider_charge_id.as_deref(), Some("ch_123"));

    let details = app
        .state
        .services
        .orders
        .get(order.id, customer.id)
        .await
        .unwrap();
    assert_eq!(details.order.payment_status, OrderPaymentStatus::Paid);
    assert_eq!(details.order.status, OrderStatus::Confirmed);
    // Initial pending row plus the payment-received confirmation.
    assert_eq!(history_count(&app, order.id).await, 2);
}

#[tokio::test]
async fn replayed_webhook_is_acknowledged_without_effect() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("replay@example.com").await;
    let order = place_order(&app, customer.id).await;
    let payment = open_intent(&app, customer.id, order.id).await;

    let payments = &app.state.services.payments;
    let event = succeeded_event("evt_dup", &payment.provider_intent_id);

    let first = payments
        .apply_webhook("evt_dup", "payment_intent.succeeded", event.clone())
        .await
        .unwrap();
    assert_eq!(first, WebhookOutcome::Processed);

    let replay = payments
        .apply_webhook("evt_dup", "payment_intent.succeeded", event)
        .await
        .unwrap();
    assert_eq!(replay, WebhookOutcome::AlreadyProcessed);

    // No double transitions: history still has exactly two rows.
    assert_eq!(history_count(&app, order.id).await, 2);
}

#[tokio::test]
async fn second_success_event_for_the_same_intent_is_idempotent() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("resend@example.com").await;
    let order = place_order(&app, customer.id).await;
    let payment = open_intent(&app, customer.id, order.id).await;

    let payments = &app.state.services.payments;
    payments
        .apply_webhook(
            "evt_a",
            "payment_intent.succeeded",
            succeeded_event("evt_a", &payment.provider_intent_id),
        )
        .await
        .unwrap();

    // The provider may emit a distinct event id for the same intent.
    let outcome = payments
        .apply_webhook(
            "evt_b",
            "payment_intent.succeeded",
            succeeded_event("evt_b", &payment.provider_intent_id),
        )
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::AlreadyProcessed);

    assert_eq!(history_count(&app, order.id).await, 2);
}

#[tokio::test]
async fn failure_webhook_records_the_reason() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("declined@example.com").await;
    let order = place_order(&app, customer.id).await;
    let payment = open_intent(&app, customer.id, order.id).await;

    let event = json!({
        "id": "evt_fail",
        "type": "payment_intent.payment_failed",
        "data": {"object": {
            "id": payment.provider_intent_id,
            "last_payment_error": {"message": "Your card was declined."}
        }}
    });

    let outcome = app
        .state
        .services
        .payments
        .apply_webhook("evt_fail", "payment_intent.payment_failed", event)
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);

    let payment = Payment::find_by_id(payment.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(
        payment.failure_reason.as_deref(),
        Some("Your card was declined.")
    );

    let details = app
        .state
        .services
        .orders
        .get(order.id, customer.id)
        .await
        .unwrap();
    assert_eq!(details.order.payment_status, OrderPaymentStatus::Failed);
    // Fulfillment status untouched by a failed payment.
    assert_eq!(details.order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn unknown_intents_are_recorded_but_ignored() {
    let app = TestApp::new().await;
    app.seed_customer("ghost@example.com").await;

    let outcome = app
        .state
        .services
        .payments
        .apply_webhook(
            "evt_ghost",
            "payment_intent.succeeded",
            succeeded_event("evt_ghost", "pi_unknown"),
        )
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);
}

#[tokio::test]
async fn unhandled_event_types_are_ignored() {
    let app = TestApp::new().await;

    let outcome = app
        .state
        .services
        .payments
        .apply_webhook(
            "evt_other",
            "charge.dispute.created",
            json!({"id": "evt_other", "type": "charge.dispute.created"}),
        )
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);
}

#[tokio::test]
async fn paid_orders_cannot_open_new_intents() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("paid@example.com").await;
    let order = place_order(&app, customer.id).await;
    let payment = open_intent(&app, customer.id, order.id).await;

    app.state
        .services
        .payments
        .apply_webhook(
            "evt_paid",
            "payment_intent.succeeded",
            succeeded_event("evt_paid", &payment.provider_intent_id),
        )
        .await
        .unwrap();

    let err = app
        .state
        .services
        .payments
        .create_intent(CreateIntentInput {
            customer_id: customer.id,
            order_id: order.id,
            method: PaymentMethod::Card,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn confirm_is_idempotent() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("confirm@example.com").await;
    let order = place_order(&app, customer.id).await;
    let payment = open_intent(&app, customer.id, order.id).await;

    let payments = &app.state.services.payments;
    let confirmed = payments.confirm(payment.id, customer.id).await.unwrap();
    assert_eq!(confirmed.status, PaymentStatus::Succeeded);

    let again = payments.confirm(payment.id, customer.id).await.unwrap();
    assert_eq!(again.status, PaymentStatus::Succeeded);

    assert_eq!(history_count(&app, order.id).await, 2);
}

#[tokio::test]
async fn refund_walks_payment_and_order_to_refunded() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("refund@example.com").await;
    let order = place_order(&app, customer.id).await;
    let payment = open_intent(&app, customer.id, order.id).await;

    let payments = &app.state.services.payments;
    payments.confirm(payment.id, customer.id).await.unwrap();

    let refund = payments
        .refund(payment.id, customer.id, None, Some("Damaged item".to_string()))
        .await
        .expect("refund succeeds");
    assert_eq!(refund.amount, order.total_amount);

    let payment = Payment::find_by_id(payment.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);

    let details = app
        .state
        .services
        .orders
        .get(order.id, customer.id)
        .await
        .unwrap();
    assert_eq!(details.order.payment_status, OrderPaymentStatus::Refunded);
    assert_eq!(details.order.status, OrderStatus::Refunded);

    assert_eq!(Refund::find().count(&*app.state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn refunding_an_unsettled_payment_fails() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("early@example.com").await;
    let order = place_order(&app, customer.id).await;
    let payment = open_intent(&app, customer.id, order.id).await;

    let err = app
        .state
        .services
        .payments
        .refund(payment.id, customer.id, None, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn partial_refunds_are_bounded_by_the_payment_amount() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("partial@example.com").await;
    let order = place_order(&app, customer.id).await;
    let payment = open_intent(&app, customer.id, order.id).await;

    let payments = &app.state.services.payments;
    payments.confirm(payment.id, customer.id).await.unwrap();

    let err = payments
        .refund(payment.id, customer.id, Some(dec!(999.00)), None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let refund = payments
        .refund(payment.id, customer.id, Some(dec!(5.00)), None)
        .await
        .unwrap();
    assert_eq!(refund.amount, dec!(5.00));
}

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use silence_dor_api::{
    entities::{Coupon, CouponKind},
    errors::ServiceError,
};
use uuid::Uuid;

#[tokio::test]
async fn unknown_codes_are_not_found() {
    let app = TestApp::new().await;

    let err = app
        .state
        .services
        .coupons
        .validate_code("NOPE", Uuid::new_v4(), dec!(100.00))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn lookup_is_case_insensitive() {
    let app = TestApp::new().await;
    app.seed_coupon("WELCOME10", CouponKind::Percentage, dec!(10), None, None)
        .await;

    let quote = app
        .state
        .services
        .coupons
        .validate_code("  welcome10 ", Uuid::new_v4(), dec!(50.00))
        .await
        .expect("valid coupon");

    assert_eq!(quote.discount_amount, dec!(5.00));
    assert!(!quote.free_shipping);
}

#[tokio::test]
async fn rejections_surface_the_reason() {
    let app = TestApp::new().await;
    app.seed_coupon(
        "BIGSPEND",
        CouponKind::Percentage,
        dec!(10),
        Some(dec!(20.00)),
        None,
    )
    .await;

    let err = app
        .state
        .services
        .coupons
        .validate_code("BIGSPEND", Uuid::new_v4(), dec!(19.00))
        .await
        .unwrap_err();

    match err {
        ServiceError::ValidationError(msg) => {
            assert!(msg.contains("below the coupon minimum"), "{msg}");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_coupons_are_rejected() {
    let app = TestApp::new().await;
    let coupon = app
        .seed_coupon("ONCE", CouponKind::Fixed, dec!(5.00), None, Some(1))
        .await;

    // Use up the single redemption.
    let consumed = app
        .state
        .services
        .coupons
        .consume(&*app.state.db, coupon.id)
        .await
        .unwrap();
    assert!(consumed);

    let err = app
        .state
        .services
        .coupons
        .validate_code("ONCE", Uuid::new_v4(), dec!(100.00))
        .await
        .unwrap_err();
    match err {
        ServiceError::ValidationError(msg) => {
            assert!(msg.contains("usage limit"), "{msg}");
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn guarded_consume_never_exceeds_the_limit() {
    let app = TestApp::new().await;
    let coupon = app
        .seed_coupon("LIMIT2", CouponKind::Fixed, dec!(5.00), None, Some(2))
        .await;

    let coupons = &app.state.services.coupons;
    assert!(coupons.consume(&*app.state.db, coupon.id).await.unwrap());
    assert!(coupons.consume(&*app.state.db, coupon.id).await.unwrap());
    // Third consumer loses the guarded increment.
    assert!(!coupons.consume(&*app.state.db, coupon.id).await.unwrap());

    let stored = Coupon::find_by_id(coupon.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.used_count, 2);
}

#[tokio::test]
async fn unlimited_coupons_always_consume() {
    let app = TestApp::new().await;
    let coupon = app
        .seed_coupon("FOREVER", CouponKind::Percentage, dec!(10), None, None)
        .await;

    let coupons = &app.state.services.coupons;
    for _ in 0..5 {
        assert!(coupons.consume(&*app.state.db, coupon.id).await.unwrap());
    }

    let stored = Coupon::find_by_id(coupon.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.used_count, 5);
}

#[tokio::test]
async fn free_shipping_coupons_quote_zero_discount() {
    let app = TestApp::new().await;
    app.seed_coupon("SHIPFREE", CouponKind::FreeShipping, dec!(0), None, None)
        .await;

    let quote = app
        .state
        .services
        .coupons
        .validate_code("SHIPFREE", Uuid::new_v4(), dec!(50.00))
        .await
        .expect("valid coupon");

    assert_eq!(quote.discount_amount, dec!(0));
    assert!(quote.free_shipping);
}

use utoipa::OpenApi;

/// OpenAPI document for the order, coupon, and payment surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Silence d'Or API",
        description = "Carts, checkout, orders, coupons, and payments for the Silence d'Or storefront",
        license(name = "MIT")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::track_order,
        crate::handlers::coupons::validate_coupon,
        crate::handlers::payments::create_payment_intent,
        crate::handlers::payments::confirm_payment,
        crate::handlers::payments::refund_payment,
        crate::handlers::payment_webhooks::payment_webhook,
    ),
    components(schemas(crate::errors::ErrorResponse)),
    tags(
        (name = "Orders", description = "Checkout and order lifecycle"),
        (name = "Coupons", description = "Coupon validation"),
        (name = "Payments", description = "Payment attempts, refunds, and the provider webhook")
    )
)]
pub struct ApiDoc;

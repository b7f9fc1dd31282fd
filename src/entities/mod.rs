/// Persistence entities for the order, pricing, and payment domain.
pub mod address;
pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod customer;
pub mod order;
pub mod order_coupon;
pub mod order_item;
pub mod order_status_history;
pub mod payment;
pub mod product;
pub mod refund;
pub mod webhook_event;

// Re-export entities
pub use address::{Entity as Address, Model as AddressModel};
pub use cart::{Entity as Cart, Model as CartModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coupon::{CouponKind, Entity as Coupon, Model as CouponModel};
pub use customer::{Entity as Customer, Model as CustomerModel};
pub use order::{Entity as Order, Model as OrderModel, OrderPaymentStatus, OrderStatus};
pub use order_coupon::{Entity as OrderCoupon, Model as OrderCouponModel};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use order_status_history::{Entity as OrderStatusHistory, Model as OrderStatusHistoryModel};
pub use payment::{Entity as Payment, Model as PaymentModel, PaymentMethod, PaymentStatus};
pub use product::{Entity as Product, Model as ProductModel, ProductStatus};
pub use refund::{Entity as Refund, Model as RefundModel, RefundStatus};
pub use webhook_event::{Entity as WebhookEvent, Model as WebhookEventModel};

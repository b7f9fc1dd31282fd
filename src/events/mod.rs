use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Maximum notification delivery attempts before an event is dead-lettered.
const MAX_DELIVERY_ATTEMPTS: u32 = 3;
/// Base backoff between delivery attempts; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, product_id: Uuid },
    CartItemRemoved { cart_id: Uuid, product_id: Uuid },
    CartCleared(Uuid),

    // Order events
    OrderCreated(Uuid),
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },

    // Coupon events
    CouponApplied {
        order_id: Uuid,
        coupon_id: Uuid,
        discount_amount: Decimal,
    },

    // Payment events
    PaymentCreated(Uuid),
    PaymentSucceeded(Uuid),
    PaymentFailed(Uuid),
    PaymentRefunded(Uuid),

    // Inventory events
    LowStock { product_id: Uuid, remaining: i32 },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    /// Events are advisory; the request path never fails because of them.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Event dropped: {}", e);
        }
    }
}

/// Downstream consumer of domain events (mail, push, analytics export).
/// Delivery transport is out of scope here; implementations decide what a
/// notification physically is.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &Event) -> anyhow::Result<()>;
}

/// Notifier that records would-be notifications in the structured log.
/// Stands in for the mail/push transport in development and tests.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &Event) -> anyhow::Result<()> {
        match event {
            Event::OrderCreated(order_id) => {
                info!(%order_id, "notification: order confirmation");
            }
            Event::OrderCancelled(order_id) => {
                info!(%order_id, "notification: order cancelled");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "notification: order status update");
            }
            Event::PaymentSucceeded(payment_id) => {
                info!(%payment_id, "notification: payment receipt");
            }
            Event::PaymentFailed(payment_id) => {
                info!(%payment_id, "notification: payment failure");
            }
            Event::LowStock {
                product_id,
                remaining,
            } => {
                warn!(%product_id, remaining, "notification: stock alert");
            }
            _ => {}
        }
        Ok(())
    }
}

/// Drains the event channel and hands each event to the notifier.
///
/// Failed deliveries are retried with bounded exponential backoff; after
/// the last attempt the event is dead-lettered to the error log so the
/// request path that emitted it is never blocked or failed.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, notifier: Arc<dyn Notifier>) {
    while let Some(event) = rx.recv().await {
        let mut attempt = 1;
        loop {
            match notifier.notify(&event).await {
                Ok(()) => break,
                Err(e) if attempt < MAX_DELIVERY_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(
                        attempt,
                        "Notification delivery failed, retrying in {:?}: {}", delay, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(?event, "Notification dead-lettered after {attempt} attempts: {e}");
                    break;
                }
            }
        }
    }
    info!("Event channel closed, notification worker stopping");
}

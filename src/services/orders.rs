use crate::{
    entities::{
        order::{self, OrderStatus},
        order_coupon, order_item, order_status_history, Order, OrderCoupon, OrderItem, OrderModel,
        OrderStatusHistory,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Order with its lines, applied coupon, and audit trail.
#[derive(Debug, Serialize)]
pub struct OrderDetails {
    pub order: OrderModel,
    pub items: Vec<order_item::Model>,
    pub status_history: Vec<order_status_history::Model>,
    pub applied_coupon: Option<order_coupon::Model>,
}

/// Fulfillment timeline for the tracking endpoint.
#[derive(Debug, Serialize)]
pub struct TrackingInfo {
    pub order_number: String,
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub shipping_carrier: Option<String>,
    pub status_history: Vec<TrackingStep>,
}

#[derive(Debug, Serialize)]
pub struct TrackingStep {
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-customer order statistics.
#[derive(Debug, Serialize)]
pub struct OrderStats {
    pub total_orders: u64,
    pub total_spent: Decimal,
    pub pending_orders: u64,
    pub delivered_orders: u64,
    pub cancelled_orders: u64,
}

/// Applies a status transition through the one authoritative guard and
/// appends the matching history row, all on the caller's connection so the
/// write and its audit record share a transaction.
pub(crate) async fn apply_transition<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    new_status: OrderStatus,
    notes: Option<String>,
) -> Result<OrderModel, ServiceError> {
    let old_status = order.status;
    if !old_status.can_transition_to(new_status) {
        return Err(ServiceError::InvalidStatus(format!(
            "Cannot transition order from '{}' to '{}'",
            old_status, new_status
        )));
    }

    let order_id = order.id;
    let mut active: order::ActiveModel = order.into();
    active.status = Set(new_status);
    active.updated_at = Set(Utc::now());
    let updated = active.update(conn).await?;

    record_status(conn, order_id, new_status, notes).await?;

    Ok(updated)
}

/// Appends one history row. Every status write in the system goes through
/// here (or through [`apply_transition`], which calls it).
pub(crate) async fn record_status<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    status: OrderStatus,
    notes: Option<String>,
) -> Result<(), ServiceError> {
    let entry = order_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        status: Set(status),
        notes: Set(notes),
        created_at: Set(Utc::now()),
    };
    entry.insert(conn).await?;
    Ok(())
}

/// Order read models and lifecycle transitions.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Retrieves an order owned by `customer_id`, with lines and history.
    #[instrument(skip(self))]
    pub async fn get(
        &self,
        order_id: Uuid,
        customer_id: Uuid,
    ) -> Result<OrderDetails, ServiceError> {
        let order = self.find_owned(order_id, customer_id).await?;
        self.load_details(order).await
    }

    /// Lists a customer's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        customer_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((orders, total))
    }

    /// Fulfillment timeline looked up by order number.
    #[instrument(skip(self))]
    pub async fn track(
        &self,
        customer_id: Uuid,
        order_number: &str,
    ) -> Result<TrackingInfo, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;

        let history = OrderStatusHistory::find()
            .filter(order_status_history::Column::OrderId.eq(order.id))
            .order_by_desc(order_status_history::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(TrackingInfo {
            order_number: order.order_number,
            status: order.status,
            tracking_number: order.tracking_number,
            shipping_carrier: order.shipping_carrier,
            status_history: history
                .into_iter()
                .map(|h| TrackingStep {
                    status: h.status,
                    notes: h.notes,
                    created_at: h.created_at,
                })
                .collect(),
        })
    }

    /// Counters and total spend across a customer's orders.
    #[instrument(skip(self))]
    pub async fn stats(&self, customer_id: Uuid) -> Result<OrderStats, ServiceError> {
        let orders = Order::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .all(&*self.db)
            .await?;

        let mut stats = OrderStats {
            total_orders: orders.len() as u64,
            total_spent: Decimal::ZERO,
            pending_orders: 0,
            delivered_orders: 0,
            cancelled_orders: 0,
        };

        for order in &orders {
            stats.total_spent += order.total_amount;
            match order.status {
                OrderStatus::Pending => stats.pending_orders += 1,
                OrderStatus::Delivered => stats.delivered_orders += 1,
                OrderStatus::Cancelled => stats.cancelled_orders += 1,
                _ => {}
            }
        }

        Ok(stats)
    }

    /// Moves an order along its state machine, appending one history row.
    #[instrument(skip(self))]
    pub async fn transition_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        notes: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let old_status = order.status;
        let updated = apply_transition(&txn, order, new_status, notes).await?;

        txn.commit().await?;

        info!(
            "Order {} status updated from '{}' to '{}'",
            order_id, old_status, new_status
        );

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;

        Ok(updated)
    }

    /// Cancels an order on behalf of its owner. Eligibility is the shared
    /// state-machine rule: only pending, confirmed, or processing orders.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        order_id: Uuid,
        customer_id: Uuid,
        reason: Option<String>,
    ) -> Result<OrderModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if !order.status.is_cancellable() {
            return Err(ServiceError::InvalidOperation(format!(
                "Order in status '{}' can no longer be cancelled",
                order.status
            )));
        }

        let old_status = order.status;
        let notes = Some(reason.unwrap_or_else(|| "Cancelled by customer".to_string()));
        let updated = apply_transition(&txn, order, OrderStatus::Cancelled, notes).await?;

        txn.commit().await?;

        info!("Order {} cancelled", order_id);

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: OrderStatus::Cancelled.to_string(),
            })
            .await;
        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;

        Ok(updated)
    }

    async fn find_owned(
        &self,
        order_id: Uuid,
        customer_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    pub(crate) async fn load_details(&self, order: OrderModel) -> Result<OrderDetails, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(&*self.db)
            .await?;

        let status_history = OrderStatusHistory::find()
            .filter(order_status_history::Column::OrderId.eq(order.id))
            .order_by_desc(order_status_history::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        let applied_coupon = OrderCoupon::find()
            .filter(order_coupon::Column::OrderId.eq(order.id))
            .one(&*self.db)
            .await?;

        Ok(OrderDetails {
            order,
            items,
            status_history,
            applied_coupon,
        })
    }
}

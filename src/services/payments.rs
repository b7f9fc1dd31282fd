use crate::{
    entities::{
        order, payment, refund, webhook_event, Order, OrderModel, OrderPaymentStatus, OrderStatus,
        Payment, PaymentMethod, PaymentModel, PaymentStatus, RefundStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::orders,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Input for opening a payment attempt against an order.
#[derive(Debug, Deserialize)]
pub struct CreateIntentInput {
    pub customer_id: Uuid,
    pub order_id: Uuid,
    pub method: PaymentMethod,
}

/// What a webhook delivery did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// State was applied for the first time.
    Processed,
    /// Same provider event id seen before; acknowledged without effect.
    AlreadyProcessed,
    /// Verified and recorded, but nothing to apply (unknown type or
    /// unknown payment intent).
    Ignored,
}

/// Payment attempts, confirmation, refunds, and the provider webhook.
///
/// The provider's own processing is an external collaborator: this service
/// records attempts and synchronizes payment and order state from
/// confirmations and signed webhook deliveries.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl PaymentService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Opens a payment attempt for an order awaiting payment. An order may
    /// accumulate several attempts; only one can ultimately succeed.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn create_intent(&self, input: CreateIntentInput) -> Result<PaymentModel, ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(input.order_id)
            .filter(order::Column::CustomerId.eq(input.customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", input.order_id))
            })?;

        if order.payment_status != OrderPaymentStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is not awaiting payment",
                order.order_number
            )));
        }

        let payment = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            customer_id: Set(input.customer_id),
            amount: Set(order.total_amount),
            currency: Set(order.currency.clone()),
            method: Set(input.method),
            status: Set(PaymentStatus::Pending),
            provider_intent_id: Set(format!("pi_{}", Uuid::new_v4().simple())),
            provider_charge_id: Set(None),
            failure_reason: Set(None),
            card_last_four: Set(None),
            card_brand: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let payment = payment.insert(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentCreated(payment.id))
            .await;

        info!(
            "Created payment intent {} for order {}",
            payment.provider_intent_id, order.order_number
        );
        Ok(payment)
    }

    /// Synchronous confirmation path: marks the attempt succeeded and
    /// promotes the order to paid/confirmed. Confirming an already
    /// succeeded attempt is a no-op.
    #[instrument(skip(self))]
    pub async fn confirm(
        &self,
        payment_id: Uuid,
        customer_id: Uuid,
    ) -> Result<PaymentModel, ServiceError> {
        let txn = self.db.begin().await?;

        let payment = Payment::find_by_id(payment_id)
            .filter(payment::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.status == PaymentStatus::Succeeded {
            return Ok(payment);
        }
        if !payment.status.is_open() {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment in status '{}' cannot be confirmed",
                payment.status
            )));
        }

        let payment = self.settle_success(&txn, payment, None).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentSucceeded(payment.id))
            .await;

        Ok(payment)
    }

    /// Applies a verified provider webhook delivery.
    ///
    /// The dedupe row keyed by the provider event id is inserted in the same
    /// transaction as the state change, so a redelivery commits nothing and
    /// is acknowledged as already processed.
    #[instrument(skip(self, payload), fields(event_id = %event_id, event_type = %event_type))]
    pub async fn apply_webhook(
        &self,
        event_id: &str,
        event_type: &str,
        payload: Value,
    ) -> Result<WebhookOutcome, ServiceError> {
        let txn = self.db.begin().await?;

        let dedupe = webhook_event::ActiveModel {
            event_id: Set(event_id.to_string()),
            event_type: Set(event_type.to_string()),
            payload: Set(payload.clone()),
            received_at: Set(Utc::now()),
            processed_at: Set(None),
        };
        let inserted = webhook_event::Entity::insert(dedupe)
            .on_conflict(
                OnConflict::column(webhook_event::Column::EventId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        if inserted == 0 {
            info!("Webhook event {} already processed", event_id);
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let (outcome, fired) = match event_type {
            "payment_intent.succeeded" => self.apply_intent_succeeded(&txn, &payload).await?,
            "payment_intent.payment_failed" => self.apply_intent_failed(&txn, &payload).await?,
            _ => {
                info!("Unhandled payment webhook type: {}", event_type);
                (WebhookOutcome::Ignored, None)
            }
        };

        let mut mark: webhook_event::ActiveModel = webhook_event::Entity::find_by_id(event_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("webhook dedupe row vanished".into()))?
            .into();
        mark.processed_at = Set(Some(Utc::now()));
        mark.update(&txn).await?;

        txn.commit().await?;

        if let Some(event) = fired {
            self.event_sender.send_or_log(event).await;
        }

        Ok(outcome)
    }

    /// Records a refund for a succeeded payment and walks the order's
    /// payment machine paid → refunded.
    #[instrument(skip(self))]
    pub async fn refund(
        &self,
        payment_id: Uuid,
        customer_id: Uuid,
        amount: Option<Decimal>,
        reason: Option<String>,
    ) -> Result<refund::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let payment = Payment::find_by_id(payment_id)
            .filter(payment::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;

        if payment.status != PaymentStatus::Succeeded {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment in status '{}' cannot be refunded",
                payment.status
            )));
        }

        let amount = amount.unwrap_or(payment.amount);
        if amount <= Decimal::ZERO || amount > payment.amount {
            return Err(ServiceError::ValidationError(format!(
                "Refund amount must be between 0 and {}",
                payment.amount
            )));
        }

        let refund = refund::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_id: Set(payment.id),
            order_id: Set(payment.order_id),
            amount: Set(amount),
            currency: Set(payment.currency.clone()),
            status: Set(RefundStatus::Succeeded),
            provider_refund_id: Set(Some(format!("re_{}", Uuid::new_v4().simple()))),
            reason: Set(reason),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let refund = refund.insert(&txn).await?;

        let order_id = payment.order_id;
        let payment_id = payment.id;
        let mut active: payment::ActiveModel = payment.into();
        active.status = Set(PaymentStatus::Refunded);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let order = Order::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let order = set_payment_status(&txn, order, OrderPaymentStatus::Refunded).await?;
        if order.status.can_transition_to(OrderStatus::Refunded) {
            orders::apply_transition(
                &txn,
                order,
                OrderStatus::Refunded,
                Some("Payment refunded".to_string()),
            )
            .await?;
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PaymentRefunded(payment_id))
            .await;

        info!("Refunded payment {} for order {}", payment_id, order_id);
        Ok(refund)
    }

    async fn apply_intent_succeeded<C: ConnectionTrait>(
        &self,
        conn: &C,
        payload: &Value,
    ) -> Result<(WebhookOutcome, Option<Event>), ServiceError> {
        let intent_id = intent_id_from(payload)?;

        let Some(payment) = self.find_by_intent(conn, intent_id).await? else {
            warn!(intent_id, "Webhook for unknown payment intent");
            return Ok((WebhookOutcome::Ignored, None));
        };

        // A second success event for the same intent (different event id)
        // must not re-run the transitions.
        if payment.status == PaymentStatus::Succeeded {
            return Ok((WebhookOutcome::AlreadyProcessed, None));
        }
        if !payment.status.is_open() {
            warn!(
                intent_id,
                status = %payment.status,
                "Success webhook for a settled payment ignored"
            );
            return Ok((WebhookOutcome::Ignored, None));
        }

        let charge_id = payload
            .pointer("/data/object/latest_charge")
            .and_then(Value::as_str)
            .map(str::to_string);

        let payment = self.settle_success(conn, payment, charge_id).await?;
        Ok((
            WebhookOutcome::Processed,
            Some(Event::PaymentSucceeded(payment.id)),
        ))
    }

    async fn apply_intent_failed<C: ConnectionTrait>(
        &self,
        conn: &C,
        payload: &Value,
    ) -> Result<(WebhookOutcome, Option<Event>), ServiceError> {
        let intent_id = intent_id_from(payload)?;

        let Some(payment) = self.find_by_intent(conn, intent_id).await? else {
            warn!(intent_id, "Webhook for unknown payment intent");
            return Ok((WebhookOutcome::Ignored, None));
        };

        if !payment.status.is_open() {
            return Ok((WebhookOutcome::AlreadyProcessed, None));
        }

        let failure_reason = payload
            .pointer("/data/object/last_payment_error/message")
            .and_then(Value::as_str)
            .map(str::to_string);

        let order_id = payment.order_id;
        let payment_id = payment.id;
        let mut active: payment::ActiveModel = payment.into();
        active.status = Set(PaymentStatus::Failed);
        active.failure_reason = Set(failure_reason);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?;

        let order = Order::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        // Failed is only reachable from pending; a paid order (e.g. via a
        // second successful attempt) stays paid.
        if order
            .payment_status
            .can_transition_to(OrderPaymentStatus::Failed)
        {
            set_payment_status(conn, order, OrderPaymentStatus::Failed).await?;
        }

        Ok((
            WebhookOutcome::Processed,
            Some(Event::PaymentFailed(payment_id)),
        ))
    }

    /// Marks an attempt succeeded and promotes its order to paid/confirmed.
    async fn settle_success<C: ConnectionTrait>(
        &self,
        conn: &C,
        payment: PaymentModel,
        charge_id: Option<String>,
    ) -> Result<PaymentModel, ServiceError> {
        let order_id = payment.order_id;

        let mut active: payment::ActiveModel = payment.into();
        active.status = Set(PaymentStatus::Succeeded);
        if charge_id.is_some() {
            active.provider_charge_id = Set(charge_id);
        }
        active.updated_at = Set(Utc::now());
        let payment = active.update(conn).await?;

        let order = Order::find_by_id(order_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        // A success landing on a settled payment status (e.g. failed, which
        // is terminal) records the attempt but leaves the order alone.
        if !order
            .payment_status
            .can_transition_to(OrderPaymentStatus::Paid)
        {
            warn!(
                order_id = %order_id,
                payment_status = %order.payment_status,
                "Successful payment for an order whose payment status is settled"
            );
            return Ok(payment);
        }

        let order = set_payment_status(conn, order, OrderPaymentStatus::Paid).await?;
        if order.status == OrderStatus::Pending {
            orders::apply_transition(
                conn,
                order,
                OrderStatus::Confirmed,
                Some("Payment received".to_string()),
            )
            .await?;
        }

        Ok(payment)
    }

    async fn find_by_intent<C: ConnectionTrait>(
        &self,
        conn: &C,
        intent_id: &str,
    ) -> Result<Option<PaymentModel>, ServiceError> {
        Ok(Payment::find()
            .filter(payment::Column::ProviderIntentId.eq(intent_id))
            .one(conn)
            .await?)
    }
}

/// Walks the order's payment machine, rejecting illegal edges.
async fn set_payment_status<C: ConnectionTrait>(
    conn: &C,
    order: OrderModel,
    new_status: OrderPaymentStatus,
) -> Result<OrderModel, ServiceError> {
    if !order.payment_status.can_transition_to(new_status) {
        return Err(ServiceError::InvalidStatus(format!(
            "Cannot transition payment status from '{}' to '{}'",
            order.payment_status, new_status
        )));
    }

    let mut active: order::ActiveModel = order.into();
    active.payment_status = Set(new_status);
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

fn intent_id_from(payload: &Value) -> Result<&str, ServiceError> {
    payload
        .pointer("/data/object/id")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ServiceError::ValidationError("Webhook payload is missing the intent id".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn intent_id_is_read_from_the_event_envelope() {
        let payload = json!({"data": {"object": {"id": "pi_123"}}});
        assert_eq!(intent_id_from(&payload).unwrap(), "pi_123");
    }

    #[test]
    fn missing_intent_id_is_a_validation_error() {
        let payload = json!({"data": {"object": {}}});
        assert!(intent_id_from(&payload).is_err());
    }
}

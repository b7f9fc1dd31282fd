use crate::{
    entities::{address, Address, AddressModel},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Which default flag an address carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultKind {
    Shipping,
    Billing,
}

/// Input for creating a customer address
#[derive(Debug, Deserialize)]
pub struct CreateAddressInput {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country_code: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub default_shipping: bool,
    #[serde(default)]
    pub default_billing: bool,
}

/// Customer addresses with the only-one-default invariant enforced in a
/// single transactional write path: setting a default clears the previous
/// one and sets the new one in the same transaction.
#[derive(Clone)]
pub struct AddressService {
    db: Arc<DatabaseConnection>,
}

impl AddressService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        customer_id: Uuid,
        input: CreateAddressInput,
    ) -> Result<AddressModel, ServiceError> {
        let txn = self.db.begin().await?;

        if input.default_shipping {
            clear_default(&txn, customer_id, DefaultKind::Shipping).await?;
        }
        if input.default_billing {
            clear_default(&txn, customer_id, DefaultKind::Billing).await?;
        }

        let address = address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            line1: Set(input.line1),
            line2: Set(input.line2),
            city: Set(input.city),
            postal_code: Set(input.postal_code),
            country_code: Set(input.country_code.to_uppercase()),
            phone: Set(input.phone),
            is_default_shipping: Set(input.default_shipping),
            is_default_billing: Set(input.default_billing),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        let address = address.insert(&txn).await?;

        txn.commit().await?;
        Ok(address)
    }

    pub async fn list(&self, customer_id: Uuid) -> Result<Vec<AddressModel>, ServiceError> {
        Ok(Address::find()
            .filter(address::Column::CustomerId.eq(customer_id))
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// Makes `address_id` the customer's default for `kind`, clearing the
    /// previous default in the same transaction.
    #[instrument(skip(self))]
    pub async fn set_default(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
        kind: DefaultKind,
    ) -> Result<AddressModel, ServiceError> {
        let txn = self.db.begin().await?;

        let address = Address::find_by_id(address_id)
            .filter(address::Column::CustomerId.eq(customer_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))?;

        clear_default(&txn, customer_id, kind).await?;

        let mut active: address::ActiveModel = address.into();
        match kind {
            DefaultKind::Shipping => active.is_default_shipping = Set(true),
            DefaultKind::Billing => active.is_default_billing = Set(true),
        }
        active.updated_at = Set(Utc::now());
        let address = active.update(&txn).await?;

        txn.commit().await?;
        Ok(address)
    }
}

async fn clear_default<C: sea_orm::ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    kind: DefaultKind,
) -> Result<(), ServiceError> {
    let column = match kind {
        DefaultKind::Shipping => address::Column::IsDefaultShipping,
        DefaultKind::Billing => address::Column::IsDefaultBilling,
    };

    Address::update_many()
        .col_expr(column, Expr::value(false))
        .col_expr(address::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(address::Column::CustomerId.eq(customer_id))
        .filter(column.eq(true))
        .exec(conn)
        .await?;

    Ok(())
}

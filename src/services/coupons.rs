use crate::{
    entities::{
        coupon::{self, CouponKind},
        Coupon, CouponModel,
    },
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Why a coupon was rejected. Checks run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    Inactive,
    NotStarted,
    Expired,
    Exhausted,
    NotEligible,
    BelowMinimum,
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CouponRejection::Inactive => "coupon is inactive",
            CouponRejection::NotStarted => "coupon is not yet valid",
            CouponRejection::Expired => "coupon has expired",
            CouponRejection::Exhausted => "coupon usage limit reached",
            CouponRejection::NotEligible => "coupon is not available for this customer",
            CouponRejection::BelowMinimum => "order amount is below the coupon minimum",
        };
        f.write_str(s)
    }
}

/// Decides coupon applicability. Pure: reads only its arguments, mutates
/// nothing. `used_count` is only ever advanced by [`CouponService::consume`].
pub fn validate(
    coupon: &CouponModel,
    now: DateTime<Utc>,
    customer_id: Uuid,
    order_amount: Decimal,
) -> Result<(), CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if now < coupon.valid_from {
        return Err(CouponRejection::NotStarted);
    }
    if now > coupon.valid_until {
        return Err(CouponRejection::Expired);
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(CouponRejection::Exhausted);
        }
    }
    let eligible = coupon.eligible_customers();
    if !eligible.is_empty() && !eligible.contains(&customer_id) {
        return Err(CouponRejection::NotEligible);
    }
    if let Some(minimum) = coupon.minimum_order_amount {
        if order_amount < minimum {
            return Err(CouponRejection::BelowMinimum);
        }
    }
    Ok(())
}

/// Computes the discount a coupon grants on `order_amount`. Pure and
/// idempotent. Free-shipping coupons discount shipping as a side channel,
/// not the subtotal, so they yield zero here.
pub fn discount_for(coupon: &CouponModel, order_amount: Decimal) -> Decimal {
    let raw = match coupon.kind {
        CouponKind::Percentage => order_amount * coupon.value / Decimal::from(100),
        CouponKind::Fixed => coupon.value,
        CouponKind::FreeShipping => return Decimal::ZERO,
    };

    let capped = match coupon.maximum_discount_amount {
        Some(max) => raw.min(max),
        None => raw,
    };

    capped.min(order_amount).max(Decimal::ZERO)
}

/// Successful validation of a coupon code against an order amount.
#[derive(Debug, Serialize)]
pub struct CouponQuote {
    pub coupon: CouponModel,
    pub discount_amount: Decimal,
    pub free_shipping: bool,
}

/// Coupon lookup and consumption on top of the pure rule functions.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Normalizes a user-supplied code the way codes are stored.
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Finds a coupon by code, case-insensitively.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        self.find_by_code_on(&*self.db, code).await
    }

    pub(crate) async fn find_by_code_on<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
    ) -> Result<Option<CouponModel>, ServiceError> {
        let normalized = Self::normalize_code(code);
        Ok(Coupon::find()
            .filter(coupon::Column::Code.eq(normalized))
            .one(conn)
            .await?)
    }

    /// Validates a code for the dedicated validation endpoint: unknown codes
    /// are 404s, rejections are 400s carrying the reason, anything else
    /// returns the quoted discount.
    #[instrument(skip(self))]
    pub async fn validate_code(
        &self,
        code: &str,
        customer_id: Uuid,
        order_amount: Decimal,
    ) -> Result<CouponQuote, ServiceError> {
        let coupon = self
            .find_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", code)))?;

        validate(&coupon, Utc::now(), customer_id, order_amount)
            .map_err(|reason| ServiceError::ValidationError(reason.to_string()))?;

        let discount_amount = discount_for(&coupon, order_amount);
        let free_shipping = coupon.kind == CouponKind::FreeShipping;

        Ok(CouponQuote {
            coupon,
            discount_amount,
            free_shipping,
        })
    }

    /// Consumes one use of the coupon with a guarded atomic increment:
    /// `used_count` only advances while it is below `usage_limit`, so the
    /// counter can never exceed the limit under concurrent checkouts.
    /// Returns whether this caller won the increment.
    pub async fn consume<C: ConnectionTrait>(
        &self,
        conn: &C,
        coupon_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coupon(kind: CouponKind, value: Decimal) -> CouponModel {
        let now = Utc::now();
        CouponModel {
            id: Uuid::new_v4(),
            code: "WELCOME10".to_string(),
            description: None,
            kind,
            value,
            minimum_order_amount: None,
            maximum_discount_amount: None,
            usage_limit: None,
            used_count: 0,
            applicable_customers: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn valid_coupon_passes_all_checks() {
        let c = coupon(CouponKind::Percentage, dec!(10));
        assert_eq!(
            validate(&c, Utc::now(), Uuid::new_v4(), dec!(100.00)),
            Ok(())
        );
    }

    #[test]
    fn inactive_coupon_is_rejected_first() {
        let mut c = coupon(CouponKind::Percentage, dec!(10));
        c.is_active = false;
        // Also expired, but inactive wins the check order.
        c.valid_until = Utc::now() - Duration::days(1);
        assert_eq!(
            validate(&c, Utc::now(), Uuid::new_v4(), dec!(100.00)),
            Err(CouponRejection::Inactive)
        );
    }

    #[test]
    fn validity_window_is_enforced() {
        let mut c = coupon(CouponKind::Percentage, dec!(10));
        c.valid_from = Utc::now() + Duration::days(1);
        c.valid_until = Utc::now() + Duration::days(2);
        assert_eq!(
            validate(&c, Utc::now(), Uuid::new_v4(), dec!(100.00)),
            Err(CouponRejection::NotStarted)
        );

        c.valid_from = Utc::now() - Duration::days(2);
        c.valid_until = Utc::now() - Duration::days(1);
        assert_eq!(
            validate(&c, Utc::now(), Uuid::new_v4(), dec!(100.00)),
            Err(CouponRejection::Expired)
        );
    }

    #[test]
    fn exhausted_coupon_is_rejected_regardless_of_other_conditions() {
        let mut c = coupon(CouponKind::Percentage, dec!(10));
        c.usage_limit = Some(1);
        c.used_count = 1;
        assert_eq!(
            validate(&c, Utc::now(), Uuid::new_v4(), dec!(100.00)),
            Err(CouponRejection::Exhausted)
        );
    }

    #[test]
    fn customer_restriction_applies_only_when_set() {
        let allowed = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut c = coupon(CouponKind::Percentage, dec!(10));
        c.applicable_customers = Some(serde_json::json!([allowed]));

        assert_eq!(validate(&c, Utc::now(), allowed, dec!(100.00)), Ok(()));
        assert_eq!(
            validate(&c, Utc::now(), other, dec!(100.00)),
            Err(CouponRejection::NotEligible)
        );

        c.applicable_customers = Some(serde_json::json!([]));
        assert_eq!(validate(&c, Utc::now(), other, dec!(100.00)), Ok(()));
    }

    #[test]
    fn minimum_order_amount_is_enforced() {
        let mut c = coupon(CouponKind::Percentage, dec!(10));
        c.minimum_order_amount = Some(dec!(20.00));
        assert_eq!(
            validate(&c, Utc::now(), Uuid::new_v4(), dec!(19.99)),
            Err(CouponRejection::BelowMinimum)
        );
        assert_eq!(
            validate(&c, Utc::now(), Uuid::new_v4(), dec!(20.00)),
            Ok(())
        );
    }

    #[test]
    fn percentage_discount_math() {
        let c = coupon(CouponKind::Percentage, dec!(10));
        assert_eq!(discount_for(&c, dec!(25.00)), dec!(2.50));
        assert_eq!(discount_for(&c, dec!(100.00)), dec!(10.00));
    }

    #[test]
    fn fixed_discount_never_exceeds_order_amount() {
        let c = coupon(CouponKind::Fixed, dec!(15.00));
        assert_eq!(discount_for(&c, dec!(100.00)), dec!(15.00));
        assert_eq!(discount_for(&c, dec!(10.00)), dec!(10.00));
    }

    #[test]
    fn maximum_discount_caps_percentage() {
        let mut c = coupon(CouponKind::Percentage, dec!(50));
        c.maximum_discount_amount = Some(dec!(20.00));
        assert_eq!(discount_for(&c, dec!(100.00)), dec!(20.00));
        assert_eq!(discount_for(&c, dec!(30.00)), dec!(15.00));
    }

    #[test]
    fn free_shipping_grants_no_subtotal_discount() {
        let c = coupon(CouponKind::FreeShipping, dec!(0));
        assert_eq!(discount_for(&c, dec!(100.00)), Decimal::ZERO);
    }

    #[test]
    fn discount_is_deterministic_and_pure() {
        let c = coupon(CouponKind::Percentage, dec!(10));
        let before = c.used_count;
        let a = discount_for(&c, dec!(42.00));
        let b = discount_for(&c, dec!(42.00));
        assert_eq!(a, b);
        assert_eq!(c.used_count, before);
    }

    #[test]
    fn code_normalization() {
        assert_eq!(CouponService::normalize_code("  welcome10 "), "WELCOME10");
    }
}

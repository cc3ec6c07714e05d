use crate::{
    entities::{
        promo_code::{self, Entity as PromoCode},
        PromoKind,
    },
    errors::ServiceError,
    services::pricing,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Launch promotion honored even without a `promo_codes` row.
/// A row with the same code takes precedence, including a deactivated one.
pub const RESERVED_PROMO_CODE: &str = "FIRST10";
pub const RESERVED_PROMO_PERCENT: i64 = 10;
pub const RESERVED_PROMO_MIN_TOTAL: i64 = 100_000;

/// Trimmed, upper-cased form used for storage and lookup.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// The part of a promo code that drives the discount math.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromoRule {
    pub code: String,
    pub kind: PromoKind,
    pub value: i64,
    pub min_total: i64,
}

impl PromoRule {
    pub fn reserved() -> Self {
        Self {
            code: RESERVED_PROMO_CODE.to_string(),
            kind: PromoKind::Percent,
            value: RESERVED_PROMO_PERCENT,
            min_total: RESERVED_PROMO_MIN_TOTAL,
        }
    }

    pub fn discount_for(&self, subtotal: i64) -> i64 {
        match self.kind {
            PromoKind::Percent => pricing::percent_discount(subtotal, self.value),
            PromoKind::Fixed => pricing::fixed_discount(subtotal, self.value),
        }
    }

    /// Eligibility check and discount computation for one cart subtotal.
    pub fn evaluate(&self, subtotal: i64) -> PromoDecision {
        if subtotal < self.min_total {
            return PromoDecision::Rejected(PromoRejection::BelowMinimum {
                min_total: self.min_total,
            });
        }
        let discount = self.discount_for(subtotal);
        PromoDecision::Applied {
            code: self.code.clone(),
            discount,
            total: pricing::total(subtotal, discount),
        }
    }
}

impl From<promo_code::Model> for PromoRule {
    fn from(model: promo_code::Model) -> Self {
        Self {
            code: model.code,
            kind: model.kind,
            value: model.value,
            min_total: model.min_total.max(0),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromoRejection {
    NotFound,
    BelowMinimum { min_total: i64 },
}

impl fmt::Display for PromoRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromoRejection::NotFound => write!(f, "Promo code not found"),
            PromoRejection::BelowMinimum { min_total } => write!(
                f,
                "Minimum order amount for this promo code is {}",
                pricing::format_major_units(*min_total)
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromoDecision {
    Applied {
        code: String,
        discount: i64,
        total: i64,
    },
    Rejected(PromoRejection),
}

/// Wire shape of a promo check: `{valid, discount?, total?, code?, error?}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromoValidationResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<PromoDecision> for PromoValidationResponse {
    fn from(decision: PromoDecision) -> Self {
        match decision {
            PromoDecision::Applied {
                code,
                discount,
                total,
            } => Self {
                valid: true,
                discount: Some(discount),
                total: Some(total),
                code: Some(code),
                error: None,
            },
            PromoDecision::Rejected(reason) => Self {
                valid: false,
                discount: None,
                total: None,
                code: None,
                error: Some(reason.to_string()),
            },
        }
    }
}

#[derive(Clone)]
pub struct PromotionService {
    db: DatabaseConnection,
}

impl PromotionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Finds the rule for a code: the table first, then the reserved fallback.
    pub async fn find_rule(&self, code: &str) -> Result<Option<PromoRule>, ServiceError> {
        let normalized = normalize_code(code);
        if normalized.is_empty() {
            return Ok(None);
        }

        let row = PromoCode::find()
            .filter(promo_code::Column::Code.eq(normalized.as_str()))
            .one(&self.db)
            .await?;

        match row {
            Some(model) if model.is_active => Ok(Some(model.into())),
            Some(_) => {
                debug!(code = %normalized, "Promo code is inactive");
                Ok(None)
            }
            None if normalized == RESERVED_PROMO_CODE => Ok(Some(PromoRule::reserved())),
            None => Ok(None),
        }
    }

    /// Validates a code against a cart subtotal.
    #[instrument(skip(self))]
    pub async fn validate(&self, code: &str, subtotal: i64) -> Result<PromoDecision, ServiceError> {
        let decision = match self.find_rule(code).await? {
            Some(rule) => rule.evaluate(subtotal),
            None => PromoDecision::Rejected(PromoRejection::NotFound),
        };
        debug!(?decision, "Promo code evaluated");
        Ok(decision)
    }

    /// Inserts an active promo code unless one with the same code exists.
    /// Returns whether a row was inserted.
    pub async fn ensure_code(&self, rule: &PromoRule) -> Result<bool, ServiceError> {
        let code = normalize_code(&rule.code);
        if code.is_empty() {
            return Err(ServiceError::ValidationError(
                "Promo code cannot be empty".to_string(),
            ));
        }
        if rule.kind == PromoKind::Percent && !(0..=100).contains(&rule.value) {
            return Err(ServiceError::ValidationError(format!(
                "Percent promo {} must be within 0..=100",
                code
            )));
        }

        let existing = PromoCode::find()
            .filter(promo_code::Column::Code.eq(code.as_str()))
            .one(&self.db)
            .await?;
        if existing.is_some() {
            debug!(%code, "Promo code already present");
            return Ok(false);
        }

        promo_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            kind: Set(rule.kind),
            value: Set(rule.value.max(0)),
            min_total: Set(rule.min_total.max(0)),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&self.db)
        .await?;
        info!(%code, kind = %rule.kind, "Promo code created");
        Ok(true)
    }
}

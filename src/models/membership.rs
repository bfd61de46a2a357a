//! Membership (borrowing plan) model and loan terms

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Terms a plan grants for each loan.
///
/// Subscriptions hold their own copy of these values, taken when the
/// subscription is created. Later edits to the membership never reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanTerms {
    /// Fine charged per full day a borrowing is late
    pub fine_per_day: Decimal,
    /// Loan period in days
    pub loan_period: i32,
    /// Maximum number of unreturned borrowings at any instant
    pub active_loan_limit: i32,
}

/// Fines are stored as NUMERIC(12, 2)
const FINE_SCALE: u32 = 2;
const FINE_BOUND: i64 = 10_000_000_000;

/// Accept only fines the database stores without rounding
pub fn check_fine_per_day(fine: Decimal) -> AppResult<()> {
    if fine.is_sign_negative() {
        return Err(AppError::Validation(
            "fine_per_day must not be negative".to_string(),
        ));
    }
    if fine.normalize().scale() > FINE_SCALE {
        return Err(AppError::Validation(format!(
            "fine_per_day allows at most {} decimal places",
            FINE_SCALE
        )));
    }
    if fine >= Decimal::from(FINE_BOUND) {
        return Err(AppError::Validation(format!(
            "fine_per_day must be below {}",
            FINE_BOUND
        )));
    }
    Ok(())
}

impl LoanTerms {
    /// Reject terms no borrowing could be computed from
    pub fn check(&self) -> AppResult<()> {
        check_fine_per_day(self.fine_per_day)?;
        if self.loan_period < 1 {
            return Err(AppError::Validation(
                "loan_period must be at least one day".to_string(),
            ));
        }
        if self.active_loan_limit < 0 {
            return Err(AppError::Validation(
                "active_loan_limit must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Membership record from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Membership {
    pub id: Uuid,
    pub library_id: Uuid,
    pub name: String,
    /// Subscription duration in days
    pub duration: i32,
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub terms: LoanTerms,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create membership request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateMembership {
    pub library_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: String,
    #[validate(range(min = 1, message = "duration must be at least one day"))]
    pub duration: i32,
    pub fine_per_day: Decimal,
    #[validate(range(min = 1, message = "loan_period must be at least one day"))]
    pub loan_period: i32,
    #[validate(range(min = 0, message = "active_loan_limit must not be negative"))]
    pub active_loan_limit: i32,
}

impl CreateMembership {
    pub fn into_membership(self, id: Uuid, now: DateTime<Utc>) -> AppResult<Membership> {
        self.validate()?;
        let terms = LoanTerms {
            fine_per_day: self.fine_per_day,
            loan_period: self.loan_period,
            active_loan_limit: self.active_loan_limit,
        };
        terms.check()?;

        Ok(Membership {
            id,
            library_id: self.library_id,
            name: self.name,
            duration: self.duration,
            terms,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Update membership request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateMembership {
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: Option<String>,
    #[validate(range(min = 1, message = "duration must be at least one day"))]
    pub duration: Option<i32>,
    pub fine_per_day: Option<Decimal>,
    #[validate(range(min = 1, message = "loan_period must be at least one day"))]
    pub loan_period: Option<i32>,
    #[validate(range(min = 0, message = "active_loan_limit must not be negative"))]
    pub active_loan_limit: Option<i32>,
}

impl UpdateMembership {
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;
        if let Some(fine) = self.fine_per_day {
            check_fine_per_day(fine)?;
        }
        Ok(())
    }
}

impl Membership {
    /// Overwrite the supplied fields in place
    pub fn apply(&mut self, update: &UpdateMembership, now: DateTime<Utc>) {
        if let Some(ref name) = update.name {
            self.name = name.clone();
        }
        if let Some(duration) = update.duration {
            self.duration = duration;
        }
        if let Some(fine) = update.fine_per_day {
            self.terms.fine_per_day = fine;
        }
        if let Some(period) = update.loan_period {
            self.terms.loan_period = period;
        }
        if let Some(limit) = update.active_loan_limit {
            self.terms.active_loan_limit = limit;
        }
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateMembership {
        CreateMembership {
            library_id: Uuid::new_v4(),
            name: "Standard".to_string(),
            duration: 365,
            fine_per_day: Decimal::new(50, 2),
            loan_period: 14,
            active_loan_limit: 3,
        }
    }

    #[test]
    fn test_into_membership() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let membership = request().into_membership(id, now).unwrap();
        assert_eq!(membership.id, id);
        assert_eq!(membership.terms.loan_period, 14);
        assert_eq!(membership.created_at, now);
    }

    #[test]
    fn test_negative_fine_rejected() {
        let mut req = request();
        req.fine_per_day = Decimal::new(-1, 0);
        assert!(matches!(
            req.into_membership(Uuid::new_v4(), Utc::now()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_fine_must_fit_storage_column() {
        let mut req = request();
        req.fine_per_day = Decimal::new(125, 3);
        assert!(matches!(
            req.into_membership(Uuid::new_v4(), Utc::now()),
            Err(AppError::Validation(_))
        ));

        let mut req = request();
        req.fine_per_day = Decimal::MAX;
        assert!(matches!(
            req.into_membership(Uuid::new_v4(), Utc::now()),
            Err(AppError::Validation(_))
        ));

        // Trailing zeros beyond two places are still exact
        assert!(check_fine_per_day(Decimal::new(2500, 3)).is_ok());
        assert!(check_fine_per_day(Decimal::new(999_999_999_999, 2)).is_ok());

        let update = UpdateMembership {
            fine_per_day: Some(Decimal::new(1, 3)),
            ..Default::default()
        };
        assert!(matches!(update.check(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_zero_loan_period_rejected() {
        let mut req = request();
        req.loan_period = 0;
        assert!(matches!(
            req.into_membership(Uuid::new_v4(), Utc::now()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_apply_partial_update() {
        let now = Utc::now();
        let mut membership = request().into_membership(Uuid::new_v4(), now).unwrap();
        membership.apply(
            &UpdateMembership {
                loan_period: Some(7),
                ..Default::default()
            },
            now,
        );
        assert_eq!(membership.terms.loan_period, 7);
        assert_eq!(membership.terms.active_loan_limit, 3);
        assert_eq!(membership.name, "Standard");
    }
}

//! Subscription model: a user's enrollment in a membership with frozen terms

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::membership::{check_fine_per_day, LoanTerms, Membership};
use crate::{
    error::{AppError, AppResult},
    query::{PageRequest, SortDirection},
};

/// Subscription record from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub membership_id: Uuid,
    pub expires_at: DateTime<Utc>,
    /// Terms copied from the membership at creation
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub terms: LoanTerms,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Enroll a user, taking a value copy of the membership's current terms
    pub fn from_membership(
        id: Uuid,
        user_id: Uuid,
        membership: &Membership,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let expires_at = now
            .checked_add_signed(Duration::days(i64::from(membership.duration)))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Membership {} duration of {} days puts expiry out of range",
                    membership.id, membership.duration
                ))
            })?;

        Ok(Self {
            id,
            user_id,
            membership_id: membership.id,
            expires_at,
            terms: membership.terms.clone(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Expired once the expiry instant has been reached
    pub fn is_expired(&self, at: DateTime<Utc>) -> bool {
        self.expires_at <= at
    }

    /// Overwrite the supplied fields in place
    pub fn apply(&mut self, update: &UpdateSubscription, now: DateTime<Utc>) {
        if let Some(user_id) = update.user_id {
            self.user_id = user_id;
        }
        if let Some(membership_id) = update.membership_id {
            self.membership_id = membership_id;
        }
        if let Some(expires_at) = update.expires_at {
            self.expires_at = expires_at;
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

/// Subscription as reported to callers, with expiry evaluated at request time
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SubscriptionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub membership_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub fine_per_day: Decimal,
    pub loan_period: i32,
    pub active_loan_limit: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_expired: bool,
}

impl SubscriptionView {
    pub fn at(subscription: Subscription, now: DateTime<Utc>) -> Self {
        Self {
            is_expired: subscription.is_expired(now),
            id: subscription.id,
            user_id: subscription.user_id,
            membership_id: subscription.membership_id,
            expires_at: subscription.expires_at,
            fine_per_day: subscription.terms.fine_per_day,
            loan_period: subscription.terms.loan_period,
            active_loan_limit: subscription.terms.active_loan_limit,
            created_at: subscription.created_at,
            updated_at: subscription.updated_at,
        }
    }
}

/// Create subscription request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateSubscription {
    pub user_id: Uuid,
    pub membership_id: Uuid,
}

/// Staff renewal or adjustment; omitted fields stay unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateSubscription {
    pub user_id: Option<Uuid>,
    pub membership_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub fine_per_day: Option<Decimal>,
    #[validate(range(min = 1, message = "loan_period must be at least one day"))]
    pub loan_period: Option<i32>,
    #[validate(range(min = 0, message = "active_loan_limit must not be negative"))]
    pub active_loan_limit: Option<i32>,
}

impl UpdateSubscription {
    pub fn check(&self) -> AppResult<()> {
        self.validate()?;
        if let Some(fine) = self.fine_per_day {
            check_fine_per_day(fine)?;
        }
        Ok(())
    }
}

/// Sortable subscription columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    ExpiresAt,
}

impl SubscriptionSort {
    pub fn column(self) -> &'static str {
        match self {
            SubscriptionSort::CreatedAt => "s.created_at",
            SubscriptionSort::UpdatedAt => "s.updated_at",
            SubscriptionSort::ExpiresAt => "s.expires_at",
        }
    }

    pub fn key(self, subscription: &Subscription) -> (DateTime<Utc>, Uuid) {
        let value = match self {
            SubscriptionSort::CreatedAt => subscription.created_at,
            SubscriptionSort::UpdatedAt => subscription.updated_at,
            SubscriptionSort::ExpiresAt => subscription.expires_at,
        };
        (value, subscription.id)
    }
}

/// Query parameters for subscription listings
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct SubscriptionQuery {
    /// Rows to skip
    #[serde(default)]
    pub skip: i64,
    /// Page size (1-100)
    pub limit: i64,
    pub sort_by: Option<SubscriptionSort>,
    pub sort_dir: Option<SortDirection>,
    pub user_id: Option<Uuid>,
    pub membership_id: Option<Uuid>,
    /// Library owning the membership
    pub library_id: Option<Uuid>,
}

/// Validated subscription listing filter
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionFilter {
    pub page: PageRequest,
    pub sort: SubscriptionSort,
    pub direction: SortDirection,
    pub user_id: Option<Uuid>,
    pub membership_id: Option<Uuid>,
    pub library_id: Option<Uuid>,
}

impl SubscriptionQuery {
    pub fn resolve(&self) -> AppResult<SubscriptionFilter> {
        Ok(SubscriptionFilter {
            page: PageRequest::new(self.skip, self.limit)?,
            sort: self.sort_by.unwrap_or_default(),
            direction: self.sort_dir.unwrap_or_default(),
            user_id: self.user_id,
            membership_id: self.membership_id,
            library_id: self.library_id,
        })
    }
}

impl SubscriptionFilter {
    /// In-memory match; `library_id` is the owning membership's library
    pub fn matches(&self, subscription: &Subscription, library_id: Option<Uuid>) -> bool {
        self.user_id.map_or(true, |id| subscription.user_id == id)
            && self.membership_id.map_or(true, |id| subscription.membership_id == id)
            && self.library_id.map_or(true, |id| library_id == Some(id))
    }
}

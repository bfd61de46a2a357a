//! Borrowing model: loan lifecycle, admission rules and fines
//!
//! `overdue`, `returned` and the fine are never stored. They are pure functions
//! of the stored timestamps and the evaluation instant of the current request.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::subscription::Subscription;
use crate::{
    error::{AppError, AppResult},
    query::{PageRequest, SortDirection, TimeRange},
};

/// Borrowing record from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Borrowing {
    pub id: Uuid,
    pub book_id: Uuid,
    pub subscription_id: Uuid,
    pub staff_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    /// Fixed at creation from the subscription's loan period
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of a borrowing at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BorrowingStatus {
    Active,
    Overdue,
    Returned,
}

/// Due date for a loan starting at `borrowed_at`
pub fn due_date(borrowed_at: DateTime<Utc>, loan_period: i32) -> AppResult<DateTime<Utc>> {
    borrowed_at
        .checked_add_signed(Duration::days(i64::from(loan_period)))
        .ok_or_else(|| {
            AppError::Validation(format!(
                "loan_period of {} days puts the due date out of range",
                loan_period
            ))
        })
}

/// Whole days late; partial days are truncated and early returns count as zero
pub fn days_late(due_at: DateTime<Utc>, until: DateTime<Utc>) -> i64 {
    (until - due_at).num_days().max(0)
}

impl Borrowing {
    pub fn is_returned(&self) -> bool {
        self.returned_at.is_some()
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> BorrowingStatus {
        match self.returned_at {
            Some(_) => BorrowingStatus::Returned,
            None if self.due_at < now => BorrowingStatus::Overdue,
            None => BorrowingStatus::Active,
        }
    }

    /// Fine owed as of `now`; a returned loan stops accruing at its return
    pub fn fine_at(&self, fine_per_day: Decimal, now: DateTime<Utc>) -> Decimal {
        let until = self.returned_at.unwrap_or(now);
        Decimal::from(days_late(self.due_at, until)).saturating_mul(fine_per_day)
    }

    /// Overwrite the supplied fields in place
    pub fn apply(&mut self, update: &UpdateBorrowing, now: DateTime<Utc>) {
        if let Some(book_id) = update.book_id {
            self.book_id = book_id;
        }
        if let Some(subscription_id) = update.subscription_id {
            self.subscription_id = subscription_id;
        }
        if let Some(staff_id) = update.staff_id {
            self.staff_id = staff_id;
        }
        if let Some(borrowed_at) = update.borrowed_at {
            self.borrowed_at = borrowed_at;
        }
        if let Some(due_at) = update.due_at {
            self.due_at = due_at;
        }
        if let Some(returned_at) = update.returned_at {
            self.returned_at = Some(returned_at);
        }
        self.updated_at = now;
    }

    /// Active or overdue to returned; returned is terminal
    pub fn mark_returned(&mut self, returned_at: DateTime<Utc>, now: DateTime<Utc>) -> AppResult<()> {
        if let Some(previous) = self.returned_at {
            return Err(AppError::InvalidTransition(format!(
                "Borrowing {} was already returned at {}",
                self.id, previous
            )));
        }
        if returned_at < self.borrowed_at {
            return Err(AppError::Validation(
                "returned_at must not be before borrowed_at".to_string(),
            ));
        }
        self.returned_at = Some(returned_at);
        self.updated_at = now;
        Ok(())
    }

    /// Due and return instants may not precede the borrow instant
    pub fn check_timeline(&self) -> AppResult<()> {
        if self.due_at < self.borrowed_at {
            return Err(AppError::Validation(
                "due_at must not be before borrowed_at".to_string(),
            ));
        }
        if self.returned_at.map_or(false, |r| r < self.borrowed_at) {
            return Err(AppError::Validation(
                "returned_at must not be before borrowed_at".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which unreturned borrowings occupy an active-loan slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanCountScope {
    /// Everything not yet returned, overdue included
    AllUnreturned,
    /// Unreturned and not yet past due
    WithinTerm,
}

impl LoanCountScope {
    pub fn counts(self, borrowing: &Borrowing, at: DateTime<Utc>) -> bool {
        if borrowing.deleted_at.is_some() || borrowing.is_returned() {
            return false;
        }
        match self {
            LoanCountScope::AllUnreturned => true,
            LoanCountScope::WithinTerm => borrowing.due_at >= at,
        }
    }
}

/// A borrow request with its evaluation instant resolved
#[derive(Debug, Clone, PartialEq)]
pub struct BorrowRequest {
    pub book_id: Uuid,
    pub subscription_id: Uuid,
    pub staff_id: Uuid,
    /// Loan start, also the instant expiry and the limit are evaluated at
    pub borrowed_at: DateTime<Utc>,
}

impl BorrowRequest {
    /// Admission decision against a locked subscription and its outstanding count.
    ///
    /// Returns the borrowing to insert or the reason it was refused.
    pub fn admit(
        &self,
        subscription: &Subscription,
        outstanding: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Borrowing> {
        if subscription.is_expired(self.borrowed_at) {
            return Err(AppError::SubscriptionExpired(format!(
                "Subscription {} expired at {}",
                subscription.id, subscription.expires_at
            )));
        }

        let limit = i64::from(subscription.terms.active_loan_limit);
        if outstanding >= limit {
            return Err(AppError::LoanLimitExceeded(format!(
                "Maximum active loans reached ({}/{})",
                outstanding, limit
            )));
        }

        Ok(Borrowing {
            id: Uuid::new_v4(),
            book_id: self.book_id,
            subscription_id: subscription.id,
            staff_id: self.staff_id,
            borrowed_at: self.borrowed_at,
            due_at: due_date(self.borrowed_at, subscription.terms.loan_period)?,
            returned_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }
}

/// Borrowing joined with the subscription context it is displayed and filtered by
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct BorrowingDetails {
    #[sqlx(flatten)]
    pub borrowing: Borrowing,
    pub user_id: Uuid,
    pub membership_id: Uuid,
    pub library_id: Uuid,
    pub fine_per_day: Decimal,
    pub subscription_expires_at: DateTime<Utc>,
}

impl BorrowingDetails {
    pub fn new(borrowing: Borrowing, subscription: &Subscription, library_id: Uuid) -> Self {
        Self {
            borrowing,
            user_id: subscription.user_id,
            membership_id: subscription.membership_id,
            library_id,
            fine_per_day: subscription.terms.fine_per_day,
            subscription_expires_at: subscription.expires_at,
        }
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> BorrowingStatus {
        self.borrowing.status_at(now)
    }

    pub fn fine_at(&self, now: DateTime<Utc>) -> Decimal {
        self.borrowing.fine_at(self.fine_per_day, now)
    }

    pub fn is_subscription_expired(&self, now: DateTime<Utc>) -> bool {
        self.subscription_expires_at <= now
    }
}

/// Borrowing as reported to callers, with state and fine evaluated at request time
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BorrowingView {
    pub id: Uuid,
    pub book_id: Uuid,
    pub subscription_id: Uuid,
    pub staff_id: Uuid,
    pub user_id: Uuid,
    pub membership_id: Uuid,
    pub library_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: BorrowingStatus,
    /// Fine accrued so far, or final fine once returned
    pub fine: Decimal,
}

impl BorrowingView {
    pub fn at(details: BorrowingDetails, now: DateTime<Utc>) -> Self {
        let status = details.status_at(now);
        let fine = details.fine_at(now);
        let b = details.borrowing;
        Self {
            id: b.id,
            book_id: b.book_id,
            subscription_id: b.subscription_id,
            staff_id: b.staff_id,
            user_id: details.user_id,
            membership_id: details.membership_id,
            library_id: details.library_id,
            borrowed_at: b.borrowed_at,
            due_at: b.due_at,
            returned_at: b.returned_at,
            created_at: b.created_at,
            updated_at: b.updated_at,
            status,
            fine,
        }
    }
}

/// Create borrowing request
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateBorrowing {
    pub book_id: Uuid,
    pub subscription_id: Uuid,
    pub staff_id: Uuid,
    /// Defaults to the request time
    pub borrowed_at: Option<DateTime<Utc>>,
}

/// Administrative correction; no admission checks are re-run
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateBorrowing {
    pub book_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub borrowed_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub returned_at: Option<DateTime<Utc>>,
}

/// Return request
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReturnBorrowing {
    /// Defaults to the request time
    pub returned_at: Option<DateTime<Utc>>,
}

/// Sortable borrowing columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BorrowingSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    BorrowedAt,
    DueAt,
    ReturnedAt,
}

impl BorrowingSort {
    pub fn column(self) -> &'static str {
        match self {
            BorrowingSort::CreatedAt => "b.created_at",
            BorrowingSort::UpdatedAt => "b.updated_at",
            BorrowingSort::BorrowedAt => "b.borrowed_at",
            BorrowingSort::DueAt => "b.due_at",
            BorrowingSort::ReturnedAt => "b.returned_at",
        }
    }

    pub fn key(self, details: &BorrowingDetails) -> (Option<DateTime<Utc>>, Uuid) {
        let b = &details.borrowing;
        let value = match self {
            BorrowingSort::CreatedAt => Some(b.created_at),
            BorrowingSort::UpdatedAt => Some(b.updated_at),
            BorrowingSort::BorrowedAt => Some(b.borrowed_at),
            BorrowingSort::DueAt => Some(b.due_at),
            BorrowingSort::ReturnedAt => b.returned_at,
        };
        (value, b.id)
    }
}

/// Query parameters for borrowing listings
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct BorrowingQuery {
    /// Rows to skip
    #[serde(default)]
    pub skip: i64,
    /// Page size (1-100)
    pub limit: i64,
    pub sort_by: Option<BorrowingSort>,
    pub sort_dir: Option<SortDirection>,
    pub book_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub membership_id: Option<Uuid>,
    pub library_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    /// Exact borrow instant
    pub borrowed_at: Option<DateTime<Utc>>,
    pub borrowed_from: Option<DateTime<Utc>>,
    pub borrowed_to: Option<DateTime<Utc>>,
    /// Exact due instant
    pub due_at: Option<DateTime<Utc>>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    /// Exact return instant
    pub returned_at: Option<DateTime<Utc>>,
    pub returned_from: Option<DateTime<Utc>>,
    pub returned_to: Option<DateTime<Utc>>,
    /// Unreturned and not past due
    pub is_active: Option<bool>,
    /// Unreturned and past due
    pub is_overdue: Option<bool>,
    pub is_returned: Option<bool>,
    /// Owning subscription has expired
    pub is_expired: Option<bool>,
}

/// Validated borrowing listing filter
#[derive(Debug, Clone, PartialEq)]
pub struct BorrowingFilter {
    pub page: PageRequest,
    pub sort: BorrowingSort,
    pub direction: SortDirection,
    pub book_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub membership_id: Option<Uuid>,
    pub library_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub borrowed: TimeRange,
    pub due: TimeRange,
    pub returned: TimeRange,
    pub is_active: Option<bool>,
    pub is_overdue: Option<bool>,
    pub is_returned: Option<bool>,
    pub is_expired: Option<bool>,
}

impl BorrowingQuery {
    pub fn resolve(&self) -> AppResult<BorrowingFilter> {
        Ok(BorrowingFilter {
            page: PageRequest::new(self.skip, self.limit)?,
            sort: self.sort_by.unwrap_or_default(),
            direction: self.sort_dir.unwrap_or_default(),
            book_id: self.book_id,
            subscription_id: self.subscription_id,
            staff_id: self.staff_id,
            membership_id: self.membership_id,
            library_id: self.library_id,
            user_id: self.user_id,
            borrowed: TimeRange::new(self.borrowed_at, self.borrowed_from, self.borrowed_to)?,
            due: TimeRange::new(self.due_at, self.due_from, self.due_to)?,
            returned: TimeRange::new(self.returned_at, self.returned_from, self.returned_to)?,
            is_active: self.is_active,
            is_overdue: self.is_overdue,
            is_returned: self.is_returned,
            is_expired: self.is_expired,
        })
    }
}

impl BorrowingFilter {
    /// In-memory match evaluated at the request instant `now`
    pub fn matches(&self, details: &BorrowingDetails, now: DateTime<Utc>) -> bool {
        let b = &details.borrowing;
        let status = b.status_at(now);

        self.book_id.map_or(true, |id| b.book_id == id)
            && self.subscription_id.map_or(true, |id| b.subscription_id == id)
            && self.staff_id.map_or(true, |id| b.staff_id == id)
            && self.membership_id.map_or(true, |id| details.membership_id == id)
            && self.library_id.map_or(true, |id| details.library_id == id)
            && self.user_id.map_or(true, |id| details.user_id == id)
            && self.borrowed.contains(b.borrowed_at)
            && self.due.contains(b.due_at)
            && self.returned.matches(b.returned_at)
            && self
                .is_active
                .map_or(true, |want| (status == BorrowingStatus::Active) == want)
            && self
                .is_overdue
                .map_or(true, |want| (status == BorrowingStatus::Overdue) == want)
            && self
                .is_returned
                .map_or(true, |want| (status == BorrowingStatus::Returned) == want)
            && self
                .is_expired
                .map_or(true, |want| details.is_subscription_expired(now) == want)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::membership::LoanTerms;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn subscription(limit: i32) -> Subscription {
        Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            membership_id: Uuid::new_v4(),
            expires_at: t0() + Duration::days(30),
            terms: LoanTerms {
                fine_per_day: Decimal::ONE,
                loan_period: 14,
                active_loan_limit: limit,
            },
            created_at: t0(),
            updated_at: t0(),
            deleted_at: None,
        }
    }

    fn request(sub: &Subscription, at: DateTime<Utc>) -> BorrowRequest {
        BorrowRequest {
            book_id: Uuid::new_v4(),
            subscription_id: sub.id,
            staff_id: Uuid::new_v4(),
            borrowed_at: at,
        }
    }

    fn loan(due_at: DateTime<Utc>, returned_at: Option<DateTime<Utc>>) -> Borrowing {
        Borrowing {
            id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            staff_id: Uuid::new_v4(),
            borrowed_at: due_at - Duration::days(14),
            due_at,
            returned_at,
            created_at: t0(),
            updated_at: t0(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_admit_computes_due_date() {
        let sub = subscription(2);
        let borrowing = request(&sub, t0()).admit(&sub, 0, t0()).unwrap();
        assert_eq!(borrowing.due_at, t0() + Duration::days(14));
        assert_eq!(borrowing.subscription_id, sub.id);
        assert_eq!(borrowing.status_at(t0()), BorrowingStatus::Active);
    }

    #[test]
    fn test_admit_rejects_at_limit() {
        let sub = subscription(2);
        assert!(request(&sub, t0()).admit(&sub, 1, t0()).is_ok());
        assert!(matches!(
            request(&sub, t0()).admit(&sub, 2, t0()),
            Err(AppError::LoanLimitExceeded(_))
        ));
    }

    #[test]
    fn test_zero_limit_admits_nothing() {
        let sub = subscription(0);
        assert!(matches!(
            request(&sub, t0()).admit(&sub, 0, t0()),
            Err(AppError::LoanLimitExceeded(_))
        ));
    }

    #[test]
    fn test_admit_evaluates_expiry_at_borrow_instant() {
        let sub = subscription(2);
        let at_expiry = sub.expires_at;
        assert!(matches!(
            request(&sub, at_expiry).admit(&sub, 0, t0()),
            Err(AppError::SubscriptionExpired(_))
        ));
        // A back-dated borrow inside the subscription window is admitted
        let before = sub.expires_at - Duration::days(1);
        assert!(request(&sub, before).admit(&sub, 0, sub.expires_at + Duration::days(5)).is_ok());
    }

    #[test]
    fn test_status_transitions() {
        let due = t0();
        let open = loan(due, None);
        assert_eq!(open.status_at(due), BorrowingStatus::Active);
        assert_eq!(open.status_at(due + Duration::seconds(1)), BorrowingStatus::Overdue);

        let returned_late = loan(due, Some(due + Duration::days(3)));
        assert_eq!(returned_late.status_at(due - Duration::days(1)), BorrowingStatus::Returned);
        assert_eq!(returned_late.status_at(due + Duration::days(9)), BorrowingStatus::Returned);
    }

    #[test]
    fn test_fine_zero_when_returned_on_due_date() {
        let due = t0();
        let fine = Decimal::new(150, 2);
        assert_eq!(loan(due, Some(due)).fine_at(fine, due + Duration::days(10)), Decimal::ZERO);
        assert_eq!(
            loan(due, Some(due - Duration::days(2))).fine_at(fine, due),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_fine_one_full_day() {
        let due = t0();
        let fine = Decimal::new(150, 2);
        assert_eq!(
            loan(due, Some(due + Duration::days(1))).fine_at(fine, due),
            Decimal::new(150, 2)
        );
    }

    #[test]
    fn test_fine_truncates_partial_days() {
        let due = t0();
        let late = loan(due, Some(due + Duration::hours(47)));
        assert_eq!(late.fine_at(Decimal::ONE, due), Decimal::ONE);

        let open = loan(due, None);
        assert_eq!(open.fine_at(Decimal::ONE, due + Duration::hours(23)), Decimal::ZERO);
        assert_eq!(open.fine_at(Decimal::ONE, due + Duration::hours(24)), Decimal::ONE);
    }

    #[test]
    fn test_fine_monotonic_in_lateness() {
        let due = t0();
        let mut previous = Decimal::ZERO;
        for hours in (-48..=24 * 20).step_by(7) {
            let fine = loan(due, Some(due + Duration::hours(hours))).fine_at(Decimal::new(25, 2), due);
            assert!(fine >= previous);
            previous = fine;
        }
    }

    #[test]
    fn test_count_scope() {
        let now = t0();
        let overdue = loan(now - Duration::days(1), None);
        let current = loan(now + Duration::days(1), None);
        let returned = loan(now + Duration::days(1), Some(now));

        assert!(LoanCountScope::AllUnreturned.counts(&overdue, now));
        assert!(LoanCountScope::AllUnreturned.counts(&current, now));
        assert!(!LoanCountScope::AllUnreturned.counts(&returned, now));

        assert!(!LoanCountScope::WithinTerm.counts(&overdue, now));
        assert!(LoanCountScope::WithinTerm.counts(&current, now));

        let mut voided = current.clone();
        voided.deleted_at = Some(now);
        assert!(!LoanCountScope::AllUnreturned.counts(&voided, now));
    }

    #[test]
    fn test_check_timeline() {
        let mut b = loan(t0(), None);
        assert!(b.check_timeline().is_ok());
        b.apply(
            &UpdateBorrowing {
                returned_at: Some(b.borrowed_at - Duration::days(1)),
                ..Default::default()
            },
            t0(),
        );
        assert!(matches!(b.check_timeline(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_mark_returned_is_terminal() {
        let due = t0();
        let mut b = loan(due, None);
        b.mark_returned(due + Duration::days(1), due + Duration::days(1)).unwrap();
        assert_eq!(b.returned_at, Some(due + Duration::days(1)));

        let again = b.mark_returned(due + Duration::days(20), due + Duration::days(20));
        assert!(matches!(again, Err(AppError::InvalidTransition(_))));
        assert_eq!(b.returned_at, Some(due + Duration::days(1)));
    }

    #[test]
    fn test_mark_returned_before_borrow_rejected() {
        let mut b = loan(t0(), None);
        let early = b.borrowed_at - Duration::hours(1);
        assert!(matches!(b.mark_returned(early, t0()), Err(AppError::Validation(_))));
        assert!(b.returned_at.is_none());
    }

    #[test]
    fn test_out_of_range_loan_period_is_rejected() {
        let mut sub = subscription(2);
        sub.terms.loan_period = i32::MAX;
        assert!(matches!(
            request(&sub, t0()).admit(&sub, 0, t0()),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_fine_saturates_instead_of_overflowing() {
        let due = t0();
        let late = loan(due, Some(due + Duration::days(2)));
        assert_eq!(late.fine_at(Decimal::MAX, due), Decimal::MAX);
    }

    #[test]
    fn test_filter_active_and_expired_are_independent() {
        let now = t0();
        let sub = subscription(5);
        let mut details = BorrowingDetails::new(loan(now + Duration::days(3), None), &sub, Uuid::new_v4());
        details.subscription_expires_at = now - Duration::days(1);

        let query = BorrowingQuery {
            limit: 10,
            is_active: Some(true),
            is_expired: Some(true),
            ..Default::default()
        };
        let filter = query.resolve().unwrap();
        assert!(filter.matches(&details, now));
        // Same row after the due date is no longer active
        assert!(!filter.matches(&details, now + Duration::days(4)));
    }

    #[test]
    fn test_filter_returned_range_skips_open_loans() {
        let now = t0();
        let sub = subscription(5);
        let details = BorrowingDetails::new(loan(now, None), &sub, Uuid::new_v4());
        let query = BorrowingQuery {
            limit: 10,
            returned_from: Some(now - Duration::days(30)),
            ..Default::default()
        };
        assert!(!query.resolve().unwrap().matches(&details, now));
    }
}

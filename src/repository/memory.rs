//! Process-local store used by the test-suite and `storage.backend = "memory"`
//!
//! All three entity maps sit behind one async mutex, so a borrowing admission
//! holds the lock across its count and its insert.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BorrowingStore, MembershipStore, SubscriptionStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::{Borrowing, BorrowingDetails, BorrowingFilter, LoanCountScope, UpdateBorrowing},
        membership::{Membership, UpdateMembership},
        subscription::{Subscription, SubscriptionFilter, UpdateSubscription},
    },
    query::{paginate, Page},
};

#[derive(Default)]
struct MemoryState {
    memberships: HashMap<Uuid, Membership>,
    subscriptions: HashMap<Uuid, Subscription>,
    borrowings: HashMap<Uuid, Borrowing>,
}

impl MemoryState {
    fn live_subscription(&self, id: Uuid) -> AppResult<&Subscription> {
        self.subscriptions
            .get(&id)
            .filter(|s| s.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", id)))
    }

    fn library_of(&self, membership_id: Uuid) -> Option<Uuid> {
        self.memberships.get(&membership_id).map(|m| m.library_id)
    }

    /// Join a borrowing with its subscription, deleted subscriptions included
    fn details(&self, borrowing: &Borrowing) -> AppResult<BorrowingDetails> {
        let subscription = self.subscriptions.get(&borrowing.subscription_id).ok_or_else(|| {
            AppError::Internal(format!(
                "Borrowing {} references missing subscription {}",
                borrowing.id, borrowing.subscription_id
            ))
        })?;
        let library_id = self.library_of(subscription.membership_id).ok_or_else(|| {
            AppError::Internal(format!(
                "Subscription {} references missing membership {}",
                subscription.id, subscription.membership_id
            ))
        })?;
        Ok(BorrowingDetails::new(borrowing.clone(), subscription, library_id))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Membership> {
        let state = self.state.lock().await;
        state
            .memberships
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Membership {} not found", id)))
    }

    async fn create(&self, membership: &Membership) -> AppResult<Membership> {
        let mut state = self.state.lock().await;
        state.memberships.insert(membership.id, membership.clone());
        Ok(membership.clone())
    }

    async fn update(
        &self,
        id: Uuid,
        data: &UpdateMembership,
        now: DateTime<Utc>,
    ) -> AppResult<Membership> {
        let mut state = self.state.lock().await;
        let membership = state
            .memberships
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Membership {} not found", id)))?;
        membership.apply(data, now);
        Ok(membership.clone())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn create(&self, subscription: &Subscription) -> AppResult<Subscription> {
        let mut state = self.state.lock().await;
        state
            .subscriptions
            .insert(subscription.id, subscription.clone());
        Ok(subscription.clone())
    }

    async fn update(
        &self,
        id: Uuid,
        data: &UpdateSubscription,
        now: DateTime<Utc>,
    ) -> AppResult<Subscription> {
        let mut state = self.state.lock().await;
        let subscription = state
            .subscriptions
            .get_mut(&id)
            .filter(|s| s.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", id)))?;
        subscription.apply(data, now);
        Ok(subscription.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Subscription> {
        let state = self.state.lock().await;
        state.live_subscription(id).cloned()
    }

    async fn list(&self, filter: &SubscriptionFilter) -> AppResult<Page<Subscription>> {
        let state = self.state.lock().await;
        let rows: Vec<Subscription> = state
            .subscriptions
            .values()
            .filter(|s| s.deleted_at.is_none())
            .filter(|s| filter.matches(s, state.library_of(s.membership_id)))
            .cloned()
            .collect();

        let sort = filter.sort;
        Ok(paginate(rows, filter.page, filter.direction, |s| sort.key(s)))
    }

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let subscription = state
            .subscriptions
            .get_mut(&id)
            .filter(|s| s.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", id)))?;
        subscription.deleted_at = Some(now);
        subscription.updated_at = now;
        Ok(())
    }
}

#[async_trait]
impl BorrowingStore for MemoryStore {
    async fn create_admitted(
        &self,
        subscription_id: Uuid,
        evaluated_at: DateTime<Utc>,
        scope: LoanCountScope,
        admit: &(dyn for<'s> Fn(&'s Subscription, i64) -> AppResult<Borrowing> + Send + Sync),
    ) -> AppResult<BorrowingDetails> {
        let mut state = self.state.lock().await;

        let subscription = state.live_subscription(subscription_id)?;
        let outstanding = state
            .borrowings
            .values()
            .filter(|b| b.subscription_id == subscription_id && scope.counts(b, evaluated_at))
            .count() as i64;

        let borrowing = admit(subscription, outstanding)?;
        let details = state.details(&borrowing)?;
        state.borrowings.insert(borrowing.id, borrowing);
        Ok(details)
    }

    async fn update(
        &self,
        id: Uuid,
        data: &UpdateBorrowing,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowingDetails> {
        let mut state = self.state.lock().await;
        let mut updated = state
            .borrowings
            .get(&id)
            .filter(|b| b.deleted_at.is_none())
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))?;
        updated.apply(data, now);
        updated.check_timeline()?;
        if let Some(subscription_id) = data.subscription_id {
            state.live_subscription(subscription_id)?;
        }

        let details = state.details(&updated)?;
        state.borrowings.insert(id, updated);
        Ok(details)
    }

    async fn mark_returned(
        &self,
        id: Uuid,
        returned_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowingDetails> {
        let mut state = self.state.lock().await;
        let borrowing = state
            .borrowings
            .get_mut(&id)
            .filter(|b| b.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))?;
        borrowing.mark_returned(returned_at, now)?;
        let returned = borrowing.clone();
        state.details(&returned)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<BorrowingDetails> {
        let state = self.state.lock().await;
        let borrowing = state
            .borrowings
            .get(&id)
            .filter(|b| b.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))?;
        state.details(borrowing)
    }

    async fn list(
        &self,
        filter: &BorrowingFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Page<BorrowingDetails>> {
        let state = self.state.lock().await;
        let mut rows = Vec::new();
        for borrowing in state.borrowings.values().filter(|b| b.deleted_at.is_none()) {
            let details = state.details(borrowing)?;
            if filter.matches(&details, now) {
                rows.push(details);
            }
        }

        let sort = filter.sort;
        Ok(paginate(rows, filter.page, filter.direction, |d| sort.key(d)))
    }

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let borrowing = state
            .borrowings
            .get_mut(&id)
            .filter(|b| b.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))?;
        borrowing.deleted_at = Some(now);
        borrowing.updated_at = now;
        Ok(())
    }
}

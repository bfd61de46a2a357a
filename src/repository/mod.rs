//! Repository layer: persistence interfaces and their backends
//!
//! Services only see the store traits below. `Repository::new` wires the
//! PostgreSQL repositories, `Repository::in_memory` the process-local store.

pub mod borrowings;
pub mod memberships;
pub mod memory;
pub mod subscriptions;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        borrowing::{Borrowing, BorrowingDetails, BorrowingFilter, LoanCountScope, UpdateBorrowing},
        membership::{Membership, UpdateMembership},
        subscription::{Subscription, SubscriptionFilter, UpdateSubscription},
    },
    query::Page,
};

/// Membership catalog lookups and edits
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Membership>;

    async fn create(&self, membership: &Membership) -> AppResult<Membership>;

    async fn update(
        &self,
        id: Uuid,
        data: &UpdateMembership,
        now: DateTime<Utc>,
    ) -> AppResult<Membership>;
}

/// Subscription persistence; soft-deleted rows are invisible to every read
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn create(&self, subscription: &Subscription) -> AppResult<Subscription>;

    async fn update(
        &self,
        id: Uuid,
        data: &UpdateSubscription,
        now: DateTime<Utc>,
    ) -> AppResult<Subscription>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Subscription>;

    async fn list(&self, filter: &SubscriptionFilter) -> AppResult<Page<Subscription>>;

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()>;
}

/// Borrowing persistence
#[async_trait]
pub trait BorrowingStore: Send + Sync {
    /// Atomic count-and-insert.
    ///
    /// Locks the subscription, counts its borrowings that occupy a slot under
    /// `scope` at `evaluated_at`, and inserts whatever `admit` returns. An error
    /// from `admit` leaves nothing written. No other admission against the same
    /// subscription may interleave between the count and the insert.
    async fn create_admitted(
        &self,
        subscription_id: Uuid,
        evaluated_at: DateTime<Utc>,
        scope: LoanCountScope,
        admit: &(dyn for<'s> Fn(&'s Subscription, i64) -> AppResult<Borrowing> + Send + Sync),
    ) -> AppResult<BorrowingDetails>;

    /// Administrative overwrite.
    ///
    /// The patched row is checked against its own timeline, and against a live
    /// target subscription when it moves, under the same lock as the write.
    async fn update(
        &self,
        id: Uuid,
        data: &UpdateBorrowing,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowingDetails>;

    /// Check-and-set of `returned_at`; a second return fails with
    /// `InvalidTransition` however the calls interleave.
    async fn mark_returned(
        &self,
        id: Uuid,
        returned_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowingDetails>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<BorrowingDetails>;

    /// Derived filters are evaluated against `now`
    async fn list(
        &self,
        filter: &BorrowingFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Page<BorrowingDetails>>;

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()>;
}

/// Main repository struct holding the store backends
#[derive(Clone)]
pub struct Repository {
    pub pool: Option<Pool<Postgres>>,
    pub memberships: Arc<dyn MembershipStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
    pub borrowings: Arc<dyn BorrowingStore>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            memberships: Arc::new(memberships::MembershipsRepository::new(pool.clone())),
            subscriptions: Arc::new(subscriptions::SubscriptionsRepository::new(pool.clone())),
            borrowings: Arc::new(borrowings::BorrowingsRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Repository backed by a single process-local store
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Self {
            pool: None,
            memberships: store.clone(),
            subscriptions: store.clone(),
            borrowings: store,
        }
    }

    /// Check that the backend is reachable
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

//! Subscription management service

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppResult,
    models::subscription::{
        CreateSubscription, Subscription, SubscriptionQuery, SubscriptionView, UpdateSubscription,
    },
    query::Page,
    repository::Repository,
};

#[derive(Clone)]
pub struct SubscriptionsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl SubscriptionsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Enroll a user in a membership, freezing the membership's current terms
    pub async fn create(&self, data: CreateSubscription) -> AppResult<SubscriptionView> {
        let now = self.clock.now();
        let membership = self
            .repository
            .memberships
            .get_by_id(data.membership_id)
            .await?;

        let subscription =
            Subscription::from_membership(Uuid::new_v4(), data.user_id, &membership, now)?;
        let created = self.repository.subscriptions.create(&subscription).await?;

        tracing::info!(
            "Created subscription {} for user {} under membership {} (expires {})",
            created.id,
            created.user_id,
            created.membership_id,
            created.expires_at
        );

        Ok(SubscriptionView::at(created, now))
    }

    /// Explicit staff overwrite of the supplied fields; borrowings are not recomputed
    pub async fn update(&self, id: Uuid, data: &UpdateSubscription) -> AppResult<SubscriptionView> {
        data.check()?;
        if let Some(membership_id) = data.membership_id {
            self.repository.memberships.get_by_id(membership_id).await?;
        }

        let now = self.clock.now();
        let updated = self.repository.subscriptions.update(id, data, now).await?;
        tracing::info!("Updated subscription {}", id);
        Ok(SubscriptionView::at(updated, now))
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<SubscriptionView> {
        let now = self.clock.now();
        let subscription = self.repository.subscriptions.get_by_id(id).await?;
        Ok(SubscriptionView::at(subscription, now))
    }

    pub async fn list(&self, query: &SubscriptionQuery) -> AppResult<Page<SubscriptionView>> {
        let filter = query.resolve()?;
        let now = self.clock.now();
        tracing::debug!("Listing subscriptions: {:?}", filter);
        let page = self.repository.subscriptions.list(&filter).await?;
        Ok(page.map(|s| SubscriptionView::at(s, now)))
    }

    /// Soft delete; borrowings keep pointing at the subscription
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.repository
            .subscriptions
            .soft_delete(id, self.clock.now())
            .await?;
        tracing::info!("Deleted subscription {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        error::AppError,
        models::membership::{LoanTerms, Membership},
        repository::{memory::MemoryStore, MockMembershipStore, MockSubscriptionStore},
    };
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap(),
        ))
    }

    fn repository(memberships: MockMembershipStore, subscriptions: MockSubscriptionStore) -> Repository {
        Repository {
            pool: None,
            memberships: Arc::new(memberships),
            subscriptions: Arc::new(subscriptions),
            borrowings: Arc::new(MemoryStore::default()),
        }
    }

    fn plan(id: Uuid) -> Membership {
        let at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        Membership {
            id,
            library_id: Uuid::new_v4(),
            name: "Reader".to_string(),
            duration: 30,
            terms: LoanTerms {
                fine_per_day: Decimal::new(75, 2),
                loan_period: 21,
                active_loan_limit: 4,
            },
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_create_with_unknown_membership_writes_nothing() {
        let mut memberships = MockMembershipStore::new();
        memberships
            .expect_get_by_id()
            .returning(|id| Err(AppError::NotFound(format!("Membership {} not found", id))));
        let mut subscriptions = MockSubscriptionStore::new();
        subscriptions.expect_create().times(0);

        let service = SubscriptionsService::new(repository(memberships, subscriptions), clock());
        let result = service
            .create(CreateSubscription {
                user_id: Uuid::new_v4(),
                membership_id: Uuid::new_v4(),
            })
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_snapshots_membership_terms() {
        let membership_id = Uuid::new_v4();
        let mut memberships = MockMembershipStore::new();
        memberships
            .expect_get_by_id()
            .withf(move |id| *id == membership_id)
            .returning(|id| Ok(plan(id)));
        let mut subscriptions = MockSubscriptionStore::new();
        subscriptions
            .expect_create()
            .times(1)
            .returning(|s| Ok(s.clone()));

        let clock = clock();
        let service =
            SubscriptionsService::new(repository(memberships, subscriptions), clock.clone());
        let view = service
            .create(CreateSubscription {
                user_id: Uuid::new_v4(),
                membership_id,
            })
            .await
            .unwrap();

        assert_eq!(view.expires_at, clock.now() + Duration::days(30));
        assert_eq!(view.fine_per_day, Decimal::new(75, 2));
        assert_eq!(view.loan_period, 21);
        assert_eq!(view.active_loan_limit, 4);
        assert!(!view.is_expired);
    }

    #[tokio::test]
    async fn test_update_to_unknown_membership_rejected() {
        let mut memberships = MockMembershipStore::new();
        memberships
            .expect_get_by_id()
            .returning(|id| Err(AppError::NotFound(format!("Membership {} not found", id))));
        let mut subscriptions = MockSubscriptionStore::new();
        subscriptions.expect_update().times(0);

        let service = SubscriptionsService::new(repository(memberships, subscriptions), clock());
        let result = service
            .update(
                Uuid::new_v4(),
                &UpdateSubscription {
                    membership_id: Some(Uuid::new_v4()),
                    ..Default::default()
                },
            )
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_rejects_negative_fine() {
        let service = SubscriptionsService::new(
            repository(MockMembershipStore::new(), MockSubscriptionStore::new()),
            clock(),
        );
        let result = service
            .update(
                Uuid::new_v4(),
                &UpdateSubscription {
                    fine_per_day: Some(Decimal::new(-5, 1)),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_rejects_out_of_range_limit() {
        let mut subscriptions = MockSubscriptionStore::new();
        subscriptions.expect_list().times(0);
        let service = SubscriptionsService::new(
            repository(MockMembershipStore::new(), subscriptions),
            clock(),
        );

        let result = service
            .list(&SubscriptionQuery {
                limit: 500,
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}

//! Business logic services

pub mod borrowings;
pub mod memberships;
pub mod subscriptions;

use std::sync::Arc;

use crate::{clock::Clock, config::LendingConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub memberships: memberships::MembershipsService,
    pub subscriptions: subscriptions::SubscriptionsService,
    pub borrowings: borrowings::BorrowingsService,
    pub repository: Repository,
}

impl Services {
    /// Create all services with the given repository and clock
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, lending: LendingConfig) -> Self {
        Self {
            memberships: memberships::MembershipsService::new(repository.clone(), clock.clone()),
            subscriptions: subscriptions::SubscriptionsService::new(
                repository.clone(),
                clock.clone(),
            ),
            borrowings: borrowings::BorrowingsService::new(
                repository.clone(),
                clock,
                lending.loan_count_scope(),
            ),
            repository,
        }
    }
}

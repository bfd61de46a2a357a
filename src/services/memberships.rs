//! Membership catalog service

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    clock::Clock,
    error::AppResult,
    models::membership::{CreateMembership, Membership, UpdateMembership},
    repository::Repository,
};

#[derive(Clone)]
pub struct MembershipsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl MembershipsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Membership> {
        self.repository.memberships.get_by_id(id).await
    }

    pub async fn create(&self, data: CreateMembership) -> AppResult<Membership> {
        let membership = data.into_membership(Uuid::new_v4(), self.clock.now())?;
        let membership = self.repository.memberships.create(&membership).await?;
        tracing::info!(
            "Created membership {} for library {}",
            membership.id,
            membership.library_id
        );
        Ok(membership)
    }

    /// Edit a plan; subscriptions already taken out keep their terms
    pub async fn update(&self, id: Uuid, data: &UpdateMembership) -> AppResult<Membership> {
        data.check()?;
        self.repository
            .memberships
            .update(id, data, self.clock.now())
            .await
    }
}

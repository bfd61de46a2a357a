//! Memberships repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::MembershipStore;
use crate::{
    error::{AppError, AppResult},
    models::membership::{Membership, UpdateMembership},
};

#[derive(Clone)]
pub struct MembershipsRepository {
    pool: Pool<Postgres>,
}

impl MembershipsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for MembershipsRepository {
    /// Get membership by ID
    async fn get_by_id(&self, id: Uuid) -> AppResult<Membership> {
        sqlx::query_as::<_, Membership>("SELECT * FROM memberships WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Membership {} not found", id)))
    }

    /// Create a membership
    async fn create(&self, membership: &Membership) -> AppResult<Membership> {
        let row = sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO memberships (
                id, library_id, name, duration,
                fine_per_day, loan_period, active_loan_limit,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(membership.id)
        .bind(membership.library_id)
        .bind(&membership.name)
        .bind(membership.duration)
        .bind(membership.terms.fine_per_day)
        .bind(membership.terms.loan_period)
        .bind(membership.terms.active_loan_limit)
        .bind(membership.created_at)
        .bind(membership.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Update a membership; existing subscriptions keep their own terms
    async fn update(
        &self,
        id: Uuid,
        data: &UpdateMembership,
        now: DateTime<Utc>,
    ) -> AppResult<Membership> {
        sqlx::query_as::<_, Membership>(
            r#"
            UPDATE memberships SET
                name = COALESCE($2, name),
                duration = COALESCE($3, duration),
                fine_per_day = COALESCE($4, fine_per_day),
                loan_period = COALESCE($5, loan_period),
                active_loan_limit = COALESCE($6, active_loan_limit),
                updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&data.name)
        .bind(data.duration)
        .bind(data.fine_per_day)
        .bind(data.loan_period)
        .bind(data.active_loan_limit)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Membership {} not found", id)))
    }
}

//! Subscriptions repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::SubscriptionStore;
use crate::{
    error::{AppError, AppResult},
    models::subscription::{Subscription, SubscriptionFilter, UpdateSubscription},
    query::{push_order_and_page, Page},
};

#[derive(Clone)]
pub struct SubscriptionsRepository {
    pool: Pool<Postgres>,
}

impl SubscriptionsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// `SELECT <head>` over live subscriptions joined to their membership, with filters
fn filtered_query<'a>(head: &str, filter: &SubscriptionFilter) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM subscriptions s \
         JOIN memberships m ON m.id = s.membership_id \
         WHERE s.deleted_at IS NULL",
        head
    ));

    if let Some(id) = filter.user_id {
        qb.push(" AND s.user_id = ").push_bind(id);
    }
    if let Some(id) = filter.membership_id {
        qb.push(" AND s.membership_id = ").push_bind(id);
    }
    if let Some(id) = filter.library_id {
        qb.push(" AND m.library_id = ").push_bind(id);
    }

    qb
}

#[async_trait]
impl SubscriptionStore for SubscriptionsRepository {
    async fn create(&self, subscription: &Subscription) -> AppResult<Subscription> {
        let row = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (
                id, user_id, membership_id, expires_at,
                fine_per_day, loan_period, active_loan_limit,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.user_id)
        .bind(subscription.membership_id)
        .bind(subscription.expires_at)
        .bind(subscription.terms.fine_per_day)
        .bind(subscription.terms.loan_period)
        .bind(subscription.terms.active_loan_limit)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update(
        &self,
        id: Uuid,
        data: &UpdateSubscription,
        now: DateTime<Utc>,
    ) -> AppResult<Subscription> {
        sqlx::query_as::<_, Subscription>(
            r#"
            UPDATE subscriptions SET
                user_id = COALESCE($2, user_id),
                membership_id = COALESCE($3, membership_id),
                expires_at = COALESCE($4, expires_at),
                fine_per_day = COALESCE($5, fine_per_day),
                loan_period = COALESCE($6, loan_period),
                active_loan_limit = COALESCE($7, active_loan_limit),
                updated_at = $8
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(data.user_id)
        .bind(data.membership_id)
        .bind(data.expires_at)
        .bind(data.fine_per_day)
        .bind(data.loan_period)
        .bind(data.active_loan_limit)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", id)))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Subscription> {
        sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", id)))
    }

    async fn list(&self, filter: &SubscriptionFilter) -> AppResult<Page<Subscription>> {
        let total = filtered_query("COUNT(*)", filter)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = filtered_query("s.*", filter);
        push_order_and_page(
            &mut qb,
            filter.sort.column(),
            "s.id",
            filter.direction,
            filter.page,
        );
        let items = qb
            .build_query_as::<Subscription>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page {
            items,
            total,
            skip: filter.page.skip,
            limit: filter.page.limit,
        })
    }

    async fn soft_delete(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE subscriptions SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Subscription {} not found", id)));
        }
        Ok(())
    }
}

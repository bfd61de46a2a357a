//! Borrowings repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::BorrowingStore;
use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::{Borrowing, BorrowingDetails, BorrowingFilter, LoanCountScope, UpdateBorrowing},
        subscription::Subscription,
    },
    query::{push_order_and_page, Page},
};

/// Borrowing columns plus the subscription context used for display and filters
const DETAILS_COLUMNS: &str = "b.*, s.user_id, s.membership_id, s.fine_per_day, \
     s.expires_at AS subscription_expires_at, m.library_id";

const DETAILS_FROM: &str = " FROM borrowings b \
     JOIN subscriptions s ON s.id = b.subscription_id \
     JOIN memberships m ON m.id = s.membership_id";

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Postgres>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// Push `AND [NOT] (predicate)` for a tri-state flag
fn push_flag<'a>(
    qb: &mut QueryBuilder<'a, Postgres>,
    flag: Option<bool>,
    predicate: impl FnOnce(&mut QueryBuilder<'a, Postgres>),
) {
    if let Some(want) = flag {
        qb.push(if want { " AND (" } else { " AND NOT (" });
        predicate(qb);
        qb.push(")");
    }
}

/// `SELECT <head>` over live borrowings with every filter applied at `now`
fn filtered_query<'a>(
    head: &str,
    filter: &BorrowingFilter,
    now: DateTime<Utc>,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {}{} WHERE b.deleted_at IS NULL", head, DETAILS_FROM));

    if let Some(id) = filter.book_id {
        qb.push(" AND b.book_id = ").push_bind(id);
    }
    if let Some(id) = filter.subscription_id {
        qb.push(" AND b.subscription_id = ").push_bind(id);
    }
    if let Some(id) = filter.staff_id {
        qb.push(" AND b.staff_id = ").push_bind(id);
    }
    if let Some(id) = filter.membership_id {
        qb.push(" AND s.membership_id = ").push_bind(id);
    }
    if let Some(id) = filter.library_id {
        qb.push(" AND m.library_id = ").push_bind(id);
    }
    if let Some(id) = filter.user_id {
        qb.push(" AND s.user_id = ").push_bind(id);
    }

    filter.borrowed.push_sql(&mut qb, "b.borrowed_at");
    filter.due.push_sql(&mut qb, "b.due_at");
    filter.returned.push_sql(&mut qb, "b.returned_at");

    push_flag(&mut qb, filter.is_active, |qb| {
        qb.push("b.returned_at IS NULL AND b.due_at >= ").push_bind(now);
    });
    push_flag(&mut qb, filter.is_overdue, |qb| {
        qb.push("b.returned_at IS NULL AND b.due_at < ").push_bind(now);
    });
    push_flag(&mut qb, filter.is_returned, |qb| {
        qb.push("b.returned_at IS NOT NULL");
    });
    push_flag(&mut qb, filter.is_expired, |qb| {
        qb.push("s.expires_at <= ").push_bind(now);
    });

    qb
}

/// Live borrowing row, locked until the transaction ends
async fn lock_borrowing(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> AppResult<Borrowing> {
    sqlx::query_as::<_, Borrowing>(
        "SELECT * FROM borrowings WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))
}

/// Write back every mutable column of a locked row
async fn write_borrowing(tx: &mut Transaction<'_, Postgres>, borrowing: &Borrowing) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE borrowings SET
            book_id = $2,
            subscription_id = $3,
            staff_id = $4,
            borrowed_at = $5,
            due_at = $6,
            returned_at = $7,
            updated_at = $8
        WHERE id = $1
        "#,
    )
    .bind(borrowing.id)
    .bind(borrowing.book_id)
    .bind(borrowing.subscription_id)
    .bind(borrowing.staff_id)
    .bind(borrowing.borrowed_at)
    .bind(borrowing.due_at)
    .bind(borrowing.returned_at)
    .bind(borrowing.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl BorrowingStore for BorrowingsRepository {
    async fn create_admitted(
        &self,
        subscription_id: Uuid,
        evaluated_at: DateTime<Utc>,
        scope: LoanCountScope,
        admit: &(dyn for<'s> Fn(&'s Subscription, i64) -> AppResult<Borrowing> + Send + Sync),
    ) -> AppResult<BorrowingDetails> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes admissions against the same subscription
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(subscription_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Subscription {} not found", subscription_id)))?;

        let outstanding: i64 = match scope {
            LoanCountScope::AllUnreturned => {
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM borrowings
                    WHERE subscription_id = $1 AND returned_at IS NULL AND deleted_at IS NULL
                    "#,
                )
                .bind(subscription_id)
                .fetch_one(&mut *tx)
                .await?
            }
            LoanCountScope::WithinTerm => {
                sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM borrowings
                    WHERE subscription_id = $1 AND returned_at IS NULL AND deleted_at IS NULL
                      AND due_at >= $2
                    "#,
                )
                .bind(subscription_id)
                .bind(evaluated_at)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        // Dropping `tx` on a refusal rolls the unit of work back
        let draft = admit(&subscription, outstanding)?;

        let borrowing = sqlx::query_as::<_, Borrowing>(
            r#"
            INSERT INTO borrowings (
                id, book_id, subscription_id, staff_id,
                borrowed_at, due_at, returned_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(draft.id)
        .bind(draft.book_id)
        .bind(draft.subscription_id)
        .bind(draft.staff_id)
        .bind(draft.borrowed_at)
        .bind(draft.due_at)
        .bind(draft.returned_at)
        .bind(draft.created_at)
        .bind(draft.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        let library_id: Uuid = sqlx::query_scalar("SELECT library_id FROM memberships WHERE id = $1")
            .bind(subscription.membership_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(BorrowingDetails::new(borrowing, &subscription, library_id))
    }

    async fn update(
        &self,
        id: Uuid,
        data: &UpdateBorrowing,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowingDetails> {
        let mut tx = self.pool.begin().await?;

        let mut updated = lock_borrowing(&mut tx, id).await?;
        updated.apply(data, now);
        updated.check_timeline()?;

        if let Some(subscription_id) = data.subscription_id {
            sqlx::query_scalar::<_, Uuid>(
                "SELECT id FROM subscriptions WHERE id = $1 AND deleted_at IS NULL FOR SHARE",
            )
            .bind(subscription_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Subscription {} not found", subscription_id))
            })?;
        }

        write_borrowing(&mut tx, &updated).await?;
        tx.commit().await?;

        self.get_by_id(id).await
    }

    async fn mark_returned(
        &self,
        id: Uuid,
        returned_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<BorrowingDetails> {
        let mut tx = self.pool.begin().await?;

        let mut borrowing = lock_borrowing(&mut tx, id).await?;
        borrowing.mark_returned(returned_at, now)?;
        write_borrowing(&mut tx, &borrowing).await?;
        tx.commit().await?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<BorrowingDetails> {
        let query = format!(
            "SELECT {}{} WHERE b.id = $1 AND b.deleted_at IS NULL",
            DETAILS_COLUMNS, DETAILS_FROM
        );
        sqlx::query_as::<_, BorrowingDetails>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing {} not found", id)))
    }

    async fn list(
        &self,
        filter: &BorrowingFilter,
        now: DateTime<Utc>,
    ) -> AppResult<Page<BorrowingDetails>> {
        let total = filtered_query("COUNT(*)", filter, now)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = filtered_query(DETAILS_COLUMNS, filter, now);
        push_order_and_page(
            &mut qb,
            filter.sort.column(),
            "b.id",
            filter.direction,
            filter.page,
        );
        let items = qb
            .build_query_as::<BorrowingDetails>()
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
            "UPDATE borrowings SET deleted_at = $2, updated_at = $2 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Borrowing {} not found", id)));
        }
        Ok(())
    }
}

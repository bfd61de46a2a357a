//! Borrowing ledger service: admissions, returns and corrections

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        borrowing::{
            BorrowRequest, BorrowingQuery, BorrowingView, CreateBorrowing, LoanCountScope,
            ReturnBorrowing, UpdateBorrowing,
        },
        subscription::Subscription,
    },
    query::Page,
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowingsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    scope: LoanCountScope,
}

impl BorrowingsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, scope: LoanCountScope) -> Self {
        Self {
            repository,
            clock,
            scope,
        }
    }

    /// Lend a book against a subscription.
    ///
    /// Expiry and the active-loan limit are evaluated at the borrow instant,
    /// inside the same unit of work that inserts the borrowing.
    pub async fn create(&self, data: CreateBorrowing) -> AppResult<BorrowingView> {
        let now = self.clock.now();
        let request = BorrowRequest {
            book_id: data.book_id,
            subscription_id: data.subscription_id,
            staff_id: data.staff_id,
            borrowed_at: data.borrowed_at.unwrap_or(now),
        };

        let admit = |subscription: &Subscription, outstanding: i64| {
            request.admit(subscription, outstanding, now)
        };

        let result = self
            .repository
            .borrowings
            .create_admitted(request.subscription_id, request.borrowed_at, self.scope, &admit)
            .await;

        match result {
            Ok(details) => {
                tracing::info!(
                    "Borrowing {} created: book {} on subscription {}, due {}",
                    details.borrowing.id,
                    details.borrowing.book_id,
                    details.borrowing.subscription_id,
                    details.borrowing.due_at
                );
                Ok(BorrowingView::at(details, now))
            }
            Err(e) => {
                if matches!(
                    e,
                    AppError::SubscriptionExpired(_)
                        | AppError::LoanLimitExceeded(_)
                        | AppError::ConflictRetryable(_)
                ) {
                    tracing::warn!(
                        "Borrowing refused on subscription {}: {}",
                        request.subscription_id,
                        e
                    );
                }
                Err(e)
            }
        }
    }

    /// Administrative overwrite; admission rules are not re-applied
    pub async fn update(&self, id: Uuid, data: &UpdateBorrowing) -> AppResult<BorrowingView> {
        let now = self.clock.now();
        let details = self.repository.borrowings.update(id, data, now).await?;
        tracing::info!("Updated borrowing {}", id);
        Ok(BorrowingView::at(details, now))
    }

    /// Active or overdue to returned; returned borrowings are terminal
    pub async fn return_borrowing(
        &self,
        id: Uuid,
        data: &ReturnBorrowing,
    ) -> AppResult<BorrowingView> {
        let now = self.clock.now();
        let returned_at = data.returned_at.unwrap_or(now);

        let details = self
            .repository
            .borrowings
            .mark_returned(id, returned_at, now)
            .await?;
        let view = BorrowingView::at(details, now);
        tracing::info!("Borrowing {} returned, fine {}", id, view.fine);
        Ok(view)
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<BorrowingView> {
        let now = self.clock.now();
        let details = self.repository.borrowings.get_by_id(id).await?;
        Ok(BorrowingView::at(details, now))
    }

    /// One `now` for the whole request: filters, status and fines agree
    pub async fn list(&self, query: &BorrowingQuery) -> AppResult<Page<BorrowingView>> {
        let filter = query.resolve()?;
        let now = self.clock.now();
        tracing::debug!("Listing borrowings at {}: {:?}", now, filter);
        let page = self.repository.borrowings.list(&filter, now).await?;
        Ok(page.map(|d| BorrowingView::at(d, now)))
    }

    /// Void a borrowing; it stops occupying a loan slot
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.repository
            .borrowings
            .soft_delete(id, self.clock.now())
            .await?;
        tracing::info!("Deleted borrowing {}", id);
        Ok(())
    }
}

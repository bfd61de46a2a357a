//! Borrowing endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::borrowing::{
        BorrowingQuery, BorrowingView, CreateBorrowing, ReturnBorrowing, UpdateBorrowing,
    },
};

/// Paginated borrowings response
#[derive(Serialize, ToSchema)]
pub struct BorrowingsListResponse {
    pub borrowings: Vec<BorrowingView>,
    /// Size of the whole filtered set
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

/// List borrowings with filters and pagination
#[utoipa::path(
    get,
    path = "/borrowings",
    tag = "borrowings",
    params(BorrowingQuery),
    responses(
        (status = 200, description = "Borrowings list", body = BorrowingsListResponse),
        (status = 400, description = "Invalid filters", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_borrowings(
    State(state): State<crate::AppState>,
    Query(query): Query<BorrowingQuery>,
) -> AppResult<Json<BorrowingsListResponse>> {
    let page = state.services.borrowings.list(&query).await?;
    Ok(Json(BorrowingsListResponse {
        borrowings: page.items,
        total: page.total,
        skip: page.skip,
        limit: page.limit,
    }))
}

/// Get borrowing by ID
#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Borrowing details", body = BorrowingView),
        (status = 404, description = "Borrowing not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_borrowing(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowingView>> {
    let borrowing = state.services.borrowings.get_by_id(id).await?;
    Ok(Json(borrowing))
}

/// Lend a book against a subscription
#[utoipa::path(
    post,
    path = "/borrowings",
    tag = "borrowings",
    request_body = CreateBorrowing,
    responses(
        (status = 201, description = "Borrowing created", body = BorrowingView),
        (status = 404, description = "Subscription not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Concurrent admission, retry", body = crate::error::ErrorResponse),
        (status = 422, description = "Subscription expired or loan limit reached", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_borrowing(
    State(state): State<crate::AppState>,
    Json(data): Json<CreateBorrowing>,
) -> AppResult<(StatusCode, Json<BorrowingView>)> {
    let borrowing = state.services.borrowings.create(data).await?;
    Ok((StatusCode::CREATED, Json(borrowing)))
}

/// Administrative correction of a borrowing
#[utoipa::path(
    put,
    path = "/borrowings/{id}",
    tag = "borrowings",
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    request_body = UpdateBorrowing,
    responses(
        (status = 200, description = "Borrowing updated", body = BorrowingView),
        (status = 404, description = "Borrowing not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_borrowing(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateBorrowing>,
) -> AppResult<Json<BorrowingView>> {
    let borrowing = state.services.borrowings.update(id, &data).await?;
    Ok(Json(borrowing))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrowings/{id}/return",
    tag = "borrowings",
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    request_body = ReturnBorrowing,
    responses(
        (status = 200, description = "Borrowing returned", body = BorrowingView),
        (status = 404, description = "Borrowing not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already returned", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_borrowing(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
    Json(data): Json<ReturnBorrowing>,
) -> AppResult<Json<BorrowingView>> {
    let borrowing = state.services.borrowings.return_borrowing(id, &data).await?;
    Ok(Json(borrowing))
}

/// Void a borrowing
#[utoipa::path(
    delete,
    path = "/borrowings/{id}",
    tag = "borrowings",
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    responses(
        (status = 204, description = "Borrowing deleted"),
        (status = 404, description = "Borrowing not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_borrowing(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.services.borrowings.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Subscription endpoints

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
    models::subscription::{
        CreateSubscription, SubscriptionQuery, SubscriptionView, UpdateSubscription,
    },
};

/// Paginated subscriptions response
#[derive(Serialize, ToSchema)]
pub struct SubscriptionsListResponse {
    pub subscriptions: Vec<SubscriptionView>,
    /// Size of the whole filtered set
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

/// List subscriptions with filters and pagination
#[utoipa::path(
    get,
    path = "/subscriptions",
    tag = "subscriptions",
    params(SubscriptionQuery),
    responses(
        (status = 200, description = "Subscriptions list", body = SubscriptionsListResponse),
        (status = 400, description = "Invalid pagination", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_subscriptions(
    State(state): State<crate::AppState>,
    Query(query): Query<SubscriptionQuery>,
) -> AppResult<Json<SubscriptionsListResponse>> {
    let page = state.services.subscriptions.list(&query).await?;
    Ok(Json(SubscriptionsListResponse {
        subscriptions: page.items,
        total: page.total,
        skip: page.skip,
        limit: page.limit,
    }))
}

/// Get subscription by ID
#[utoipa::path(
    get,
    path = "/subscriptions/{id}",
    tag = "subscriptions",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 200, description = "Subscription details", body = SubscriptionView),
        (status = 404, description = "Subscription not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_subscription(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SubscriptionView>> {
    let subscription = state.services.subscriptions.get_by_id(id).await?;
    Ok(Json(subscription))
}

/// Subscribe a user to a membership
#[utoipa::path(
    post,
    path = "/subscriptions",
    tag = "subscriptions",
    request_body = CreateSubscription,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionView),
        (status = 404, description = "Membership not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_subscription(
    State(state): State<crate::AppState>,
    Json(data): Json<CreateSubscription>,
) -> AppResult<(StatusCode, Json<SubscriptionView>)> {
    let subscription = state.services.subscriptions.create(data).await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// Renew or adjust a subscription
#[utoipa::path(
    put,
    path = "/subscriptions/{id}",
    tag = "subscriptions",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    request_body = UpdateSubscription,
    responses(
        (status = 200, description = "Subscription updated", body = SubscriptionView),
        (status = 404, description = "Subscription not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_subscription(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateSubscription>,
) -> AppResult<Json<SubscriptionView>> {
    let subscription = state.services.subscriptions.update(id, &data).await?;
    Ok(Json(subscription))
}

/// Delete a subscription
#[utoipa::path(
    delete,
    path = "/subscriptions/{id}",
    tag = "subscriptions",
    params(("id" = Uuid, Path, description = "Subscription ID")),
    responses(
        (status = 204, description = "Subscription deleted"),
        (status = 404, description = "Subscription not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_subscription(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.services.subscriptions.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

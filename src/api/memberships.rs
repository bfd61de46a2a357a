//! Membership catalog endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::membership::{CreateMembership, Membership, UpdateMembership},
};

/// Get membership by ID
#[utoipa::path(
    get,
    path = "/memberships/{id}",
    tag = "memberships",
    params(("id" = Uuid, Path, description = "Membership ID")),
    responses(
        (status = 200, description = "Membership details", body = Membership),
        (status = 404, description = "Membership not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_membership(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Membership>> {
    let membership = state.services.memberships.get_by_id(id).await?;
    Ok(Json(membership))
}

/// Create a membership plan
#[utoipa::path(
    post,
    path = "/memberships",
    tag = "memberships",
    request_body = CreateMembership,
    responses(
        (status = 201, description = "Membership created", body = Membership),
        (status = 400, description = "Invalid terms", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_membership(
    State(state): State<crate::AppState>,
    Json(data): Json<CreateMembership>,
) -> AppResult<(StatusCode, Json<Membership>)> {
    let membership = state.services.memberships.create(data).await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

/// Update a membership plan; existing subscriptions keep their terms
#[utoipa::path(
    put,
    path = "/memberships/{id}",
    tag = "memberships",
    params(("id" = Uuid, Path, description = "Membership ID")),
    request_body = UpdateMembership,
    responses(
        (status = 200, description = "Membership updated", body = Membership),
        (status = 404, description = "Membership not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_membership(
    State(state): State<crate::AppState>,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateMembership>,
) -> AppResult<Json<Membership>> {
    let membership = state.services.memberships.update(id, &data).await?;
    Ok(Json(membership))
}

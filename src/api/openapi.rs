//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{borrowings, health, memberships, subscriptions};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lending API",
        version = "1.0.0",
        description = "Library lending back office REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Memberships
        memberships::get_membership,
        memberships::create_membership,
        memberships::update_membership,
        // Subscriptions
        subscriptions::list_subscriptions,
        subscriptions::get_subscription,
        subscriptions::create_subscription,
        subscriptions::update_subscription,
        subscriptions::delete_subscription,
        // Borrowings
        borrowings::list_borrowings,
        borrowings::get_borrowing,
        borrowings::create_borrowing,
        borrowings::update_borrowing,
        borrowings::return_borrowing,
        borrowings::delete_borrowing,
    ),
    components(
        schemas(
            // Memberships
            crate::models::membership::Membership,
            crate::models::membership::LoanTerms,
            crate::models::membership::CreateMembership,
            crate::models::membership::UpdateMembership,
            // Subscriptions
            crate::models::subscription::SubscriptionView,
            crate::models::subscription::CreateSubscription,
            crate::models::subscription::UpdateSubscription,
            crate::models::subscription::SubscriptionSort,
            subscriptions::SubscriptionsListResponse,
            // Borrowings
            crate::models::borrowing::BorrowingView,
            crate::models::borrowing::BorrowingStatus,
            crate::models::borrowing::CreateBorrowing,
            crate::models::borrowing::UpdateBorrowing,
            crate::models::borrowing::ReturnBorrowing,
            crate::models::borrowing::BorrowingSort,
            borrowings::BorrowingsListResponse,
            // Listing
            crate::query::SortDirection,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "memberships", description = "Membership plans"),
        (name = "subscriptions", description = "User subscriptions"),
        (name = "borrowings", description = "Borrowing ledger")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

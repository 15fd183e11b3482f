//! Defines the routes of the REST server and glues together the feature modules.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    AppState,
    api_response::ApiError,
    auth::log_in,
    category::{create_user_category, get_categories},
    endpoints,
    logging::logging_middleware,
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, get_summary_by_category_endpoint,
        get_summary_endpoint, get_transactions_endpoint, update_transaction_endpoint,
    },
    user::register,
};

/// Return a router with all the app's routes.
///
/// Routes other than [endpoints::REGISTER] and [endpoints::LOG_IN] require a
/// valid bearer token, enforced by the [crate::auth::Claims] extractor on each
/// handler.
pub fn build_router(state: AppState) -> Router {
    let unprotected_routes = Router::new()
        .route(endpoints::REGISTER, post(register))
        .route(endpoints::LOG_IN, post(log_in));

    // The summary routes use static segments, so axum matches them ahead of
    // the dynamic transaction route.
    let protected_routes = Router::new()
        .route(endpoints::CATEGORIES, get(get_categories))
        .route(endpoints::USER_CATEGORIES, post(create_user_category))
        .route(
            endpoints::TRANSACTIONS,
            get(get_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            put(update_transaction_endpoint).delete(delete_transaction_endpoint),
        )
        .route(endpoints::TRANSACTIONS_SUMMARY, get(get_summary_endpoint))
        .route(
            endpoints::TRANSACTIONS_SUMMARY_CATEGORY,
            get(get_summary_by_category_endpoint),
        );

    protected_routes
        .merge(unprotected_routes)
        .fallback(not_found)
        .layer(middleware::from_fn(logging_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Handler for requests that do not match any route.
async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(ApiError::new("Not found."))).into_response()
}

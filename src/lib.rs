//! Tallier is a REST API for tracking personal income and expenses.
//!
//! This library provides a JSON API backed by SQLite, with bearer-token
//! authentication, shared and per-user categories, and paginated transaction
//! listings with income/expense summaries.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use tokio::signal;

mod api_response;
mod app_state;
mod auth;
mod category;
mod database_id;
mod db;
mod endpoints;
mod logging;
mod pagination;
mod password;
mod routing;
mod transaction;
mod transaction_queries;
mod user;

pub use app_state::AppState;
pub use category::seed_global_categories;
pub use db::initialize_db;
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use pagination::PaginationConfig;
pub use password::{PasswordHash, ValidatedPassword};
pub use routing::build_router;
pub use transaction::{NewTransaction, TransactionType, create_transaction};
pub use user::{User, UserID, create_user};

use crate::api_response::ApiError;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The page or pageSize query parameters could not be parsed as positive
    /// integers.
    #[error("invalid page or pageSize params")]
    InvalidPageParams,

    /// A date string was not a valid calendar date in `YYYY-MM-DD` form.
    #[error("invalid date")]
    InvalidDate,

    /// The request body was missing, malformed or failed field validation.
    ///
    /// Holds one message per failure so the client can show them all at once.
    #[error("invalid body fields: {errors:?}")]
    InvalidBody {
        /// The per-field validation messages.
        errors: Vec<String>,
    },

    /// A registration request left the name, email or password empty.
    #[error("name, email and password are required fields")]
    MissingRegistrationFields,

    /// The supplied email address could not be parsed.
    #[error("invalid email address")]
    InvalidEmail,

    /// The user provided a password that is too easy to guess.
    #[error("password is too weak: {0}")]
    PasswordTooWeak(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server.
    /// When communicating with the application client this error should be
    /// replaced with a general error type indicating an internal server error.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// Signing the auth token failed.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("could not create auth token: {0}")]
    TokenCreation(String),

    /// The email used to register already belongs to a user.
    #[error("the email address is already in use")]
    DuplicateEmail,

    /// The value used to create a category is already taken.
    #[error("the category value is already in use")]
    DuplicateCategory,

    /// The category ID on a transaction did not match a category the user can
    /// see.
    #[error("the category ID does not refer to a valid category")]
    InvalidCategoryId,

    /// The email and password combination did not match a user.
    #[error("wrong credentials")]
    WrongCredentials,

    /// The requested resource was not found.
    ///
    /// For HTTP request handlers, the client should check that the parameters
    /// (e.g., ID) are correct and that the resource has been created.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("user.email") =>
            {
                Error::DuplicateEmail
            }
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.ends_with("category.value") =>
            {
                Error::DuplicateCategory
            }
            // Code 787 occurs when a FOREIGN KEY constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, _) if sql_error.extended_code == 787 => {
                Error::InvalidCategoryId
            }
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, envelope) = match self {
            Error::InvalidPageParams => (
                StatusCode::BAD_REQUEST,
                ApiError::new("Invalid page or pageSize params."),
            ),
            Error::InvalidDate => (StatusCode::BAD_REQUEST, ApiError::new("Invalid date.")),
            Error::InvalidBody { errors } => (
                StatusCode::BAD_REQUEST,
                ApiError::with_errors("Invalid body fields.", errors),
            ),
            Error::MissingRegistrationFields => (
                StatusCode::BAD_REQUEST,
                ApiError::new("name, email and password are required fields."),
            ),
            Error::InvalidEmail => (
                StatusCode::BAD_REQUEST,
                ApiError::new("Invalid email address field."),
            ),
            Error::PasswordTooWeak(feedback) => (
                StatusCode::BAD_REQUEST,
                ApiError::with_errors("Password is too weak.", vec![feedback]),
            ),
            Error::DuplicateEmail => {
                (StatusCode::BAD_REQUEST, ApiError::new("User already exists."))
            }
            Error::DuplicateCategory => (
                StatusCode::BAD_REQUEST,
                ApiError::new("Category already exists."),
            ),
            Error::InvalidCategoryId => (
                StatusCode::BAD_REQUEST,
                ApiError::new("Invalid category_id."),
            ),
            Error::WrongCredentials => {
                (StatusCode::UNAUTHORIZED, ApiError::new("Wrong credentials."))
            }
            Error::NotFound => (
                StatusCode::NOT_FOUND,
                ApiError::new("Transaction not found."),
            ),
            // Any errors that are not handled above are not intended to be
            // shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {error}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::new("Internal server error."),
                )
            }
        };

        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use axum::{http::StatusCode, response::IntoResponse};
    use rusqlite::{Connection, ffi};

    use crate::{Error, db::initialize_db};

    #[test]
    fn unique_email_violation_maps_to_duplicate_email() {
        let connection = Connection::open_in_memory().expect("Could not open database.");
        initialize_db(&connection).expect("Could not initialize database.");

        connection
            .execute(
                "INSERT INTO user (name, email, password, created_at) VALUES ('a', 'a@b.c', 'x', 'now')",
                (),
            )
            .expect("Could not insert first user.");

        let result = connection.execute(
            "INSERT INTO user (name, email, password, created_at) VALUES ('b', 'a@b.c', 'x', 'now')",
            (),
        );

        let error = result.expect_err("want UNIQUE constraint violation");

        assert_eq!(Error::from(error), Error::DuplicateEmail);
    }

    #[test]
    fn foreign_key_violation_maps_to_invalid_category() {
        let error = rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::ConstraintViolation,
                extended_code: 787,
            },
            Some("FOREIGN KEY constraint failed".to_string()),
        );

        assert_eq!(Error::from(error), Error::InvalidCategoryId);
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        assert_eq!(
            Error::from(rusqlite::Error::QueryReturnedNoRows),
            Error::NotFound
        );
    }

    #[test]
    fn not_found_renders_404() {
        let response = Error::NotFound.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn sql_error_renders_500() {
        let response = Error::SqlError(rusqlite::Error::InvalidQuery).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

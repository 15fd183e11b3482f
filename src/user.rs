//! Registration and the user table.
//!
//! This module contains the `User` model, the route handler for registering a
//! new user and the database functions for storing and fetching users.

use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};

use axum::extract::{FromRef, State};
use email_address::EmailAddress;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error, PasswordHash,
    api_response::{ApiJson, ApiSuccess},
};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserID(i64);

impl UserID {
    /// Create a new user ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A user of the application.
///
/// Field names match the database columns and the JSON the API serves.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    /// The user's ID in the application database.
    pub user_id: UserID,
    /// The user's display name.
    pub name: String,
    /// The email address the user signed up with.
    pub email: String,
    /// When the user registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// The user's password hash. Never sent to clients.
    #[serde(skip_serializing)]
    pub password_hash: PasswordHash,
}

/// The state needed for registering a new user.
#[derive(Debug, Clone)]
pub struct RegistrationState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for RegistrationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The request body for registering a new user.
///
/// Fields missing from the JSON deserialize as empty strings so the handler
/// can report them with the required-fields message instead of a serde error.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// The response body for a successful registration.
#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub user: User,
}

/// A route handler for registering a new user.
///
/// # Errors
///
/// This function will return an error if:
/// - any of `name`, `email` or `password` is empty ([Error::MissingRegistrationFields]).
/// - `email` is not a valid email address ([Error::InvalidEmail]).
/// - `password` is too weak ([Error::PasswordTooWeak]).
/// - `email` is already registered ([Error::DuplicateEmail]).
pub async fn register(
    State(state): State<RegistrationState>,
    ApiJson(data): ApiJson<RegisterData>,
) -> Result<ApiSuccess<RegisteredUser>, Error> {
    if data.name.trim().is_empty() || data.email.trim().is_empty() || data.password.is_empty() {
        return Err(Error::MissingRegistrationFields);
    }

    if !EmailAddress::is_valid(&data.email) {
        return Err(Error::InvalidEmail);
    }

    let password_hash =
        PasswordHash::from_raw_password(&data.password, PasswordHash::DEFAULT_COST)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let user = create_user(&data.name, &data.email, password_hash, &connection)?;

    Ok(ApiSuccess::new(RegisteredUser { user }))
}

/// Create the user table.
///
/// # Errors
///
/// This function will return an error if the SQL query failed.
pub fn create_user_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS user (
                user_id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

/// Create and insert a new user into the database.
///
/// # Errors
///
/// This function will return an error if:
/// - `email` is already taken by another user ([Error::DuplicateEmail]).
/// - an SQL related error occurred ([Error::SqlError]).
pub fn create_user(
    name: &str,
    email: &str,
    password_hash: PasswordHash,
    connection: &Connection,
) -> Result<User, Error> {
    let created_at = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO user (name, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
        (name, email, password_hash.as_ref(), created_at),
    )?;

    let user_id = UserID::new(connection.last_insert_rowid());

    Ok(User {
        user_id,
        name: name.to_string(),
        email: email.to_string(),
        created_at,
        password_hash,
    })
}

/// Get the user from the database with an email equal to `email`.
///
/// # Errors
///
/// This function will return an error if:
/// - `email` does not belong to a registered user ([Error::NotFound]).
/// - there was an error trying to access the database.
pub fn get_user_by_email(email: &str, db_connection: &Connection) -> Result<User, Error> {
    db_connection
        .prepare("SELECT user_id, name, email, password, created_at FROM user WHERE email = :email")?
        .query_row(&[(":email", email)], |row| {
            let raw_id = row.get(0)?;
            let name = row.get(1)?;
            let email = row.get(2)?;
            let raw_password_hash: String = row.get(3)?;
            let created_at = row.get(4)?;

            Ok(User {
                user_id: UserID::new(raw_id),
                name,
                email,
                created_at,
                password_hash: PasswordHash::new_unchecked(&raw_password_hash),
            })
        })
        .map_err(|error| error.into())
}


#[cfg(test)]
mod register_endpoint_tests {
    use std::sync::{Arc, Mutex};

    use axum::{Router, http::StatusCode, routing::post};
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::Value;

    use crate::{
        endpoints,
        user::{RegisterData, create_user_table, register},
    };

    use super::RegistrationState;

    fn get_test_server() -> TestServer {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        create_user_table(&connection).expect("Could not create user table");

        let app = Router::new()
            .route(endpoints::REGISTER, post(register))
            .with_state(RegistrationState {
                db_connection: Arc::new(Mutex::new(connection)),
            });

        TestServer::new(app)
    }

    fn register_data(name: &str, email: &str, password: &str) -> RegisterData {
        RegisterData {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn register_succeeds_with_valid_data() {
        let server = get_test_server();

        let response = server
            .post(endpoints::REGISTER)
            .json(&register_data(
                "Alice",
                "alice@example.com",
                "averystrongandsecurepassword",
            ))
            .await;

        response.assert_status_ok();

        let body = response.json::<Value>();
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["user"]["name"], "Alice");
        assert_eq!(body["data"]["user"]["email"], "alice@example.com");
        assert!(
            body["data"]["user"].get("password").is_none()
                && body["data"]["user"].get("password_hash").is_none(),
            "the password hash must not be serialized, got {body}"
        );
    }

    #[tokio::test]
    async fn register_fails_with_missing_fields() {
        let server = get_test_server();

        let response = server
            .post(endpoints::REGISTER)
            .json(&register_data("", "alice@example.com", "somepassword"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);

        let body = response.json::<Value>();
        assert_eq!(body["status"], "error");
        assert_eq!(
            body["message"],
            "name, email and password are required fields."
        );
    }

    #[tokio::test]
    async fn register_fails_with_invalid_email() {
        let server = get_test_server();

        let response = server
            .post(endpoints::REGISTER)
            .json(&register_data(
                "Alice",
                "not-an-email",
                "averystrongandsecurepassword",
            ))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);

        let body = response.json::<Value>();
        assert_eq!(body["message"], "Invalid email address field.");
    }

    #[tokio::test]
    async fn register_fails_with_weak_password() {
        let server = get_test_server();

        let response = server
            .post(endpoints::REGISTER)
            .json(&register_data("Alice", "alice@example.com", "password1234"))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);

        let body = response.json::<Value>();
        assert_eq!(body["message"], "Password is too weak.");
        assert!(
            body["errors"].is_array(),
            "want password feedback in errors, got {body}"
        );
    }

    #[tokio::test]
    async fn register_fails_with_duplicate_email() {
        let server = get_test_server();
        let data = register_data(
            "Alice",
            "alice@example.com",
            "averystrongandsecurepassword",
        );

        server
            .post(endpoints::REGISTER)
            .json(&data)
            .await
            .assert_status_ok();

        let response = server.post(endpoints::REGISTER).json(&data).await;

        response.assert_status(StatusCode::BAD_REQUEST);

        let body = response.json::<Value>();
        assert_eq!(body["message"], "User already exists.");
    }
}

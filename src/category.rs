//! This file defines the `Category` type, the types needed to create a category and the API routes for the category type.
//! A category labels a transaction as a particular kind of income or expense.
//! Global categories have no owner and are visible to every user; user
//! categories are visible only to the user that created them.

use std::sync::{Arc, Mutex};

use axum::extract::{FromRef, State};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error,
    api_response::{ApiJson, ApiSuccess},
    auth::Claims,
    database_id::DatabaseID,
    transaction::TransactionType,
    user::UserID,
};

/// A category for expenses and income, e.g., 'Groceries', 'Rent', 'Salary'.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    /// The ID of the category.
    pub category_id: DatabaseID,
    /// The unique label for the category.
    pub value: String,
    /// The human readable description shown alongside transactions.
    pub description: String,
    /// Whether transactions in this category are income or expenses.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// 'A' for active, 'I' for inactive.
    pub status: String,
    /// The owning user, or `None` for a globally shared category.
    pub user_id: Option<UserID>,
    /// When the category was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the category was last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The globally shared categories seeded into new databases.
///
/// Each entry is the category's value, description and type.
pub const GLOBAL_CATEGORIES: [(&str, &str, TransactionType); 7] = [
    ("groceries", "Groceries", TransactionType::Expense),
    ("rent", "Rent", TransactionType::Expense),
    ("utilities", "Utilities", TransactionType::Expense),
    ("transport", "Transport", TransactionType::Expense),
    ("entertainment", "Entertainment", TransactionType::Expense),
    ("salary", "Salary", TransactionType::Income),
    ("other", "Other", TransactionType::Expense),
];

/// The state needed for the category routes.
#[derive(Debug, Clone)]
pub struct CategoryState {
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CategoryState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// The request body for creating a user category.
#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryData {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub description: String,
    /// The wire representation of [TransactionType], validated by the handler.
    #[serde(rename = "type", default)]
    pub transaction_type: String,
}

/// The response body for listing categories.
#[derive(Debug, Serialize)]
pub struct CategoryList {
    pub categories: Vec<Category>,
}

/// The response body for creating a category.
#[derive(Debug, Serialize)]
pub struct CreatedCategory {
    pub category: Category,
}

/// A route handler for listing the categories visible to the current user.
pub async fn get_categories(
    claims: Claims,
    State(state): State<CategoryState>,
) -> Result<ApiSuccess<CategoryList>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let categories = get_categories_for_user(claims.user_id, &connection)?;

    Ok(ApiSuccess::new(CategoryList { categories }))
}

/// A route handler for creating a new category owned by the current user.
///
/// # Errors
///
/// This function will return an error if:
/// - any payload field fails validation ([Error::InvalidBody]).
/// - the category value is already taken ([Error::DuplicateCategory]).
pub async fn create_user_category(
    claims: Claims,
    State(state): State<CategoryState>,
    ApiJson(data): ApiJson<CategoryData>,
) -> Result<ApiSuccess<CreatedCategory>, Error> {
    let transaction_type = validate_category_data(&data)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let category = create_category(
        &data.value,
        &data.description,
        transaction_type,
        Some(claims.user_id),
        &connection,
    )?;

    Ok(ApiSuccess::new(CreatedCategory { category }))
}

/// Check a category payload, collecting every field failure into one error.
fn validate_category_data(data: &CategoryData) -> Result<TransactionType, Error> {
    let mut errors = Vec::new();

    if data.value.trim().is_empty() {
        errors.push("value must not be empty.".to_string());
    }

    if data.description.trim().is_empty() {
        errors.push("description must not be empty.".to_string());
    }

    let transaction_type = match data.transaction_type.parse::<TransactionType>() {
        Ok(transaction_type) => Some(transaction_type),
        Err(_) => {
            errors.push("Invalid type value.".to_string());
            None
        }
    };

    match (errors.is_empty(), transaction_type) {
        (true, Some(transaction_type)) => Ok(transaction_type),
        _ => Err(Error::InvalidBody { errors }),
    }
}

/// Create a category in the database.
///
/// Pass `None` for `user_id` to create a globally shared category.
///
/// # Errors
///
/// This function will return an error if:
/// - `value` is already taken by another category ([Error::DuplicateCategory]).
/// - there is an SQL error ([Error::SqlError]).
pub fn create_category(
    value: &str,
    description: &str,
    transaction_type: TransactionType,
    user_id: Option<UserID>,
    connection: &Connection,
) -> Result<Category, Error> {
    let now = OffsetDateTime::now_utc();

    connection
        .prepare(
            "INSERT INTO category (value, description, type, status, user_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'A', ?4, ?5, ?5)
             RETURNING category_id, value, description, type, status, user_id, created_at, updated_at",
        )?
        .query_row(
            (
                value,
                description,
                transaction_type,
                user_id.map(|user_id| user_id.as_i64()),
                now,
            ),
            map_category_row,
        )
        .map_err(|error| error.into())
}

/// Retrieve the categories visible to `user_id`, i.e. their own categories
/// plus the globally shared ones.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn get_categories_for_user(
    user_id: UserID,
    connection: &Connection,
) -> Result<Vec<Category>, Error> {
    connection
        .prepare(
            "SELECT category_id, value, description, type, status, user_id, created_at, updated_at
             FROM category
             WHERE user_id = :user_id OR user_id IS NULL
             ORDER BY category_id ASC",
        )?
        .query_map(&[(":user_id", &user_id.as_i64())], map_category_row)?
        .map(|maybe_category| maybe_category.map_err(|error| error.into()))
        .collect()
}

/// Check whether `category_id` refers to a category that `user_id` may attach
/// transactions to, i.e. a global category or one of their own.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn category_is_visible(
    category_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<bool, Error> {
    connection
        .query_row(
            "SELECT EXISTS (
                SELECT 1 FROM category
                WHERE category_id = :category_id AND (user_id = :user_id OR user_id IS NULL)
            )",
            &[(":category_id", &category_id), (":user_id", &user_id.as_i64())],
            |row| row.get(0),
        )
        .map_err(|error| error.into())
}

/// Insert the [GLOBAL_CATEGORIES] seed set, skipping any that already exist.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn seed_global_categories(connection: &Connection) -> Result<(), Error> {
    let now = OffsetDateTime::now_utc();
    let mut statement = connection.prepare(
        "INSERT OR IGNORE INTO category (value, description, type, status, user_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'A', NULL, ?4, ?4)",
    )?;

    for (value, description, transaction_type) in GLOBAL_CATEGORIES {
        statement.execute((value, description, transaction_type, now))?;
    }

    Ok(())
}

/// Create the category table.
///
/// # Errors
/// This function will return an error if the SQL query failed.
pub fn create_category_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS category (
                category_id INTEGER PRIMARY KEY,
                value TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'A',
                user_id INTEGER REFERENCES user(user_id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_category_row(row: &Row) -> Result<Category, rusqlite::Error> {
    let category_id = row.get(0)?;
    let value = row.get(1)?;
    let description = row.get(2)?;
    let transaction_type = row.get(3)?;
    let status = row.get(4)?;
    let user_id: Option<i64> = row.get(5)?;
    let created_at = row.get(6)?;
    let updated_at = row.get(7)?;

    Ok(Category {
        category_id,
        value,
        description,
        transaction_type,
        status,
        user_id: user_id.map(UserID::new),
        created_at,
        updated_at,
    })
}


#[cfg(test)]
mod category_endpoint_tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use rusqlite::Connection;

    use crate::{
        Error, PasswordHash,
        api_response::ApiJson,
        auth::Claims,
        category::{CategoryData, create_category, create_user_category, get_categories},
        db::initialize_db,
        transaction::TransactionType,
        user::create_user,
    };

    use super::CategoryState;

    fn get_category_state() -> CategoryState {
        let connection =
            Connection::open_in_memory().expect("Could not open in-memory SQLite database");
        initialize_db(&connection).expect("Could not initialize database");

        CategoryState {
            db_connection: Arc::new(Mutex::new(connection)),
        }
    }

    fn create_test_user(email: &str, connection: &Connection) -> Claims {
        let user = create_user(
            "Test User",
            email,
            PasswordHash::new_unchecked("hunter2"),
            connection,
        )
        .expect("Could not create test user");

        Claims::new(&user)
    }

    #[tokio::test]
    async fn get_categories_returns_visible_categories() {
        let state = get_category_state();
        let claims = {
            let connection = state.db_connection.lock().unwrap();
            let claims = create_test_user("alice@example.com", &connection);
            create_category(
                "books",
                "Books",
                TransactionType::Expense,
                Some(claims.user_id),
                &connection,
            )
            .expect("Could not create category");
            create_category("rent", "Rent", TransactionType::Expense, None, &connection)
                .expect("Could not create category");
            claims
        };

        let response = get_categories(claims, State(state))
            .await
            .expect("Could not get categories");

        let categories = response.into_data().categories;
        assert_eq!(
            categories.len(),
            2,
            "want 2 categories, got {}",
            categories.len()
        );
    }

    #[tokio::test]
    async fn create_user_category_succeeds() {
        let state = get_category_state();
        let claims = {
            let connection = state.db_connection.lock().unwrap();
            create_test_user("alice@example.com", &connection)
        };

        let data = CategoryData {
            value: "books".to_string(),
            description: "Books".to_string(),
            transaction_type: "expense".to_string(),
        };

        let response = create_user_category(claims.clone(), State(state), ApiJson(data))
            .await
            .expect("Could not create category");

        let category = response.into_data().category;
        assert_eq!(category.value, "books");
        assert_eq!(category.user_id, Some(claims.user_id));
    }

    #[tokio::test]
    async fn create_user_category_collects_field_errors() {
        let state = get_category_state();
        let claims = {
            let connection = state.db_connection.lock().unwrap();
            create_test_user("alice@example.com", &connection)
        };

        let data = CategoryData {
            value: "".to_string(),
            description: "Books".to_string(),
            transaction_type: "sideways".to_string(),
        };

        let result = create_user_category(claims, State(state), ApiJson(data)).await;

        match result {
            Err(Error::InvalidBody { errors }) => {
                assert_eq!(errors.len(), 2, "want 2 field errors, got {errors:?}");
            }
            Err(other) => panic!("want InvalidBody error, got {other:?}"),
            Ok(_) => panic!("want InvalidBody error, got success"),
        }
    }
}
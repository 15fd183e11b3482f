//! Transaction management for the finance tracker.
//!
//! This module contains everything related to transactions:
//! - The `Transaction` model and the income/expense type enum
//! - Route handlers for the transaction endpoints, including the summaries
//! - Database functions for creating, updating and deleting transactions
//!
//! Read-side queries (listing, counting, aggregating) live in
//! [crate::transaction_queries].

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use axum::extract::{FromRef, Path, Query, State};
use rusqlite::{
    Connection, Row, ToSql, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef},
};
use serde::{Deserialize, Serialize};
use time::{
    Date, OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description,
};

use crate::{
    AppState, Error,
    api_response::{ApiJson, ApiSuccess},
    auth::Claims,
    category::category_is_visible,
    database_id::DatabaseID,
    pagination::{self, PaginationConfig},
    transaction_queries::{
        CategorizedTransaction, CategorySummary, Summary, TransactionFilter, count_transactions,
        query_summary, query_summary_by_category, query_transactions_page,
    },
    user::UserID,
};

// ============================================================================
// MODELS
// ============================================================================

/// Whether a transaction brings money in or takes money out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money coming in, e.g. salary.
    Income,
    /// Money going out, e.g. rent.
    Expense,
}

impl TransactionType {
    /// The wire and database representation of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(Error::InvalidBody {
                errors: vec!["Invalid type value.".to_string()],
            }),
        }
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// An expense or income on a user's ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub transaction_id: DatabaseID,
    /// The amount of money spent or earned.
    pub amount: f64,
    /// An optional note on what the transaction was for.
    pub note: Option<String>,
    /// Whether the amount is income or an expense.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// When the transaction happened.
    pub date: Date,
    /// The user that owns the transaction.
    pub user_id: UserID,
    /// The category the transaction belongs to.
    pub category_id: DatabaseID,
    /// When the transaction was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the transaction was last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// The data needed to insert a transaction row once validation has passed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// The amount of money spent or earned.
    pub amount: f64,
    /// An optional note on what the transaction was for.
    pub note: Option<String>,
    /// Whether the amount is income or an expense.
    pub transaction_type: TransactionType,
    /// When the transaction happened.
    pub date: Date,
    /// The user that will own the transaction.
    pub user_id: UserID,
    /// The category the transaction belongs to.
    pub category_id: DatabaseID,
}

/// A validated partial update. Unset fields keep their stored values.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TransactionChanges {
    pub amount: Option<f64>,
    pub note: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub date: Option<Date>,
    pub category_id: Option<DatabaseID>,
}

/// The date format used in query parameters and request bodies.
const DATE_FORMAT: &[BorrowedFormatItem<'_>] = format_description!("[year]-[month]-[day]");

/// Parse a `YYYY-MM-DD` date.
///
/// # Errors
/// Returns [Error::InvalidDate] if `string` is not a calendar date in that
/// format.
pub fn parse_date(string: &str) -> Result<Date, Error> {
    Date::parse(string, DATE_FORMAT).map_err(|_| Error::InvalidDate)
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// The state needed for the transaction routes.
#[derive(Debug, Clone)]
pub struct TransactionState {
    pub db_connection: Arc<Mutex<Connection>>,
    pub pagination_config: PaginationConfig,
}

impl FromRef<AppState> for TransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            pagination_config: state.pagination_config.clone(),
        }
    }
}

/// The query parameters accepted by the transaction list endpoint.
///
/// Values arrive as raw strings so that a bad value produces this API's
/// validation errors instead of a generic extractor rejection.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
}

/// The query parameters accepted by the summary endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct DateRangeParams {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
}

/// The request body for creating a transaction.
///
/// Fields that need validation beyond what the deserializer can express
/// arrive loosely typed and are checked by the handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTransactionData {
    pub amount: Option<f64>,
    pub note: Option<String>,
    #[serde(rename = "type", default)]
    pub transaction_type: String,
    pub category_id: Option<DatabaseID>,
    #[serde(default)]
    pub date: String,
}

/// The request body for updating a transaction.
///
/// Only these fields can be changed. Anything else in the request body is
/// dropped during deserialization, so ownership and timestamps cannot be
/// overwritten.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateTransactionData {
    pub amount: Option<f64>,
    pub note: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub category_id: Option<DatabaseID>,
    pub date: Option<String>,
}

/// The response body for the transaction list endpoint.
///
/// The paging keys are camelCase and the summary keys snake_case to stay
/// wire-compatible with existing clients.
#[derive(Debug, Serialize)]
pub struct TransactionListData {
    pub total: u64,
    #[serde(rename = "pageSize")]
    pub page_size: u64,
    #[serde(rename = "currentPage")]
    pub current_page: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
    pub transactions: Vec<CategorizedTransaction>,
}

/// The response body for endpoints returning a single transaction.
#[derive(Debug, Serialize)]
pub struct TransactionData {
    pub transaction: Transaction,
}

/// The response body for the per-category summary endpoint.
#[derive(Debug, Serialize)]
pub struct CategorySummaryData {
    pub income: Vec<CategorySummary>,
    pub expenses: Vec<CategorySummary>,
}

/// A route handler for listing the current user's transactions.
///
/// Returns one page of transactions together with the totals over the whole
/// filtered set, so a client can render a ledger page in one request.
///
/// # Errors
///
/// This function will return an error if:
/// - `page` or `pageSize` is not a positive integer ([Error::InvalidPageParams]).
/// - `startDate` or `endDate` is not a `YYYY-MM-DD` date ([Error::InvalidDate]).
pub async fn get_transactions_endpoint(
    claims: Claims,
    State(state): State<TransactionState>,
    Query(params): Query<ListParams>,
) -> Result<ApiSuccess<TransactionListData>, Error> {
    let config = &state.pagination_config;
    let page = parse_page_or_default(params.page.as_deref(), config.default_page)?;
    let requested_page_size =
        parse_page_or_default(params.page_size.as_deref(), config.default_page_size)?;
    let page_size = config.clamp_page_size(requested_page_size);
    let filter = parse_filter(
        claims.user_id,
        params.start_date.as_deref(),
        params.end_date.as_deref(),
    )?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transactions = query_transactions_page(&filter, page, page_size, config, &connection)?;
    let total = count_transactions(&filter, &connection)?;
    let summary = query_summary(&filter, &connection)?;

    Ok(ApiSuccess::new(TransactionListData {
        total,
        page_size,
        current_page: page,
        total_pages: pagination::total_pages(total, page_size),
        total_income: summary.total_income,
        total_expenses: summary.total_expenses,
        balance: summary.balance,
        transactions,
    }))
}

/// A route handler for creating a new transaction owned by the current user.
///
/// # Errors
///
/// This function will return an error if:
/// - any payload field fails validation ([Error::InvalidBody]).
/// - `category_id` does not refer to a category the user can see
///   ([Error::InvalidCategoryId]).
pub async fn create_transaction_endpoint(
    claims: Claims,
    State(state): State<TransactionState>,
    ApiJson(data): ApiJson<CreateTransactionData>,
) -> Result<ApiSuccess<TransactionData>, Error> {
    let new_transaction = validate_create_data(data, claims.user_id)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    if !category_is_visible(new_transaction.category_id, claims.user_id, &connection)? {
        return Err(Error::InvalidCategoryId);
    }

    let transaction = create_transaction(&new_transaction, &connection)?;

    Ok(ApiSuccess::new(TransactionData { transaction }))
}

/// A route handler for updating a transaction owned by the current user.
///
/// A body naming none of the updatable fields returns the record unchanged.
///
/// # Errors
///
/// This function will return an error if:
/// - any payload field fails validation ([Error::InvalidBody]).
/// - `category_id` does not refer to a category the user can see
///   ([Error::InvalidCategoryId]).
/// - the transaction does not exist or belongs to another user
///   ([Error::NotFound]).
pub async fn update_transaction_endpoint(
    claims: Claims,
    State(state): State<TransactionState>,
    Path(transaction_id): Path<DatabaseID>,
    ApiJson(data): ApiJson<UpdateTransactionData>,
) -> Result<ApiSuccess<TransactionData>, Error> {
    let changes = validate_update_data(data)?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    if let Some(category_id) = changes.category_id
        && !category_is_visible(category_id, claims.user_id, &connection)?
    {
        return Err(Error::InvalidCategoryId);
    }

    let transaction = update_transaction(transaction_id, claims.user_id, &changes, &connection)?;

    Ok(ApiSuccess::new(TransactionData { transaction }))
}

/// A route handler for deleting a transaction owned by the current user.
///
/// Responds with the removed record's last state.
///
/// # Errors
///
/// This function will return an error if the transaction does not exist or
/// belongs to another user ([Error::NotFound]).
pub async fn delete_transaction_endpoint(
    claims: Claims,
    State(state): State<TransactionState>,
    Path(transaction_id): Path<DatabaseID>,
) -> Result<ApiSuccess<TransactionData>, Error> {
    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let transaction = delete_transaction(transaction_id, claims.user_id, &connection)?;

    Ok(ApiSuccess::new(TransactionData { transaction }))
}

/// A route handler for the income and expense totals of the current user.
///
/// # Errors
///
/// This function will return an error if `startDate` or `endDate` is not a
/// `YYYY-MM-DD` date ([Error::InvalidDate]).
pub async fn get_summary_endpoint(
    claims: Claims,
    State(state): State<TransactionState>,
    Query(params): Query<DateRangeParams>,
) -> Result<ApiSuccess<Summary>, Error> {
    let filter = parse_filter(
        claims.user_id,
        params.start_date.as_deref(),
        params.end_date.as_deref(),
    )?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let summary = query_summary(&filter, &connection)?;

    Ok(ApiSuccess::new(summary))
}

/// A route handler for the current user's totals broken down by category,
/// split into income and expense groups.
///
/// # Errors
///
/// This function will return an error if `startDate` or `endDate` is not a
/// `YYYY-MM-DD` date ([Error::InvalidDate]).
pub async fn get_summary_by_category_endpoint(
    claims: Claims,
    State(state): State<TransactionState>,
    Query(params): Query<DateRangeParams>,
) -> Result<ApiSuccess<CategorySummaryData>, Error> {
    let filter = parse_filter(
        claims.user_id,
        params.start_date.as_deref(),
        params.end_date.as_deref(),
    )?;

    let connection = state
        .db_connection
        .lock()
        .inspect_err(|error| tracing::error!("could not acquire database lock: {error}"))
        .map_err(|_| Error::DatabaseLockError)?;

    let income = query_summary_by_category(&filter, TransactionType::Income, &connection)?;
    let expenses = query_summary_by_category(&filter, TransactionType::Expense, &connection)?;

    Ok(ApiSuccess::new(CategorySummaryData { income, expenses }))
}

/// Parse an optional page number or page size, falling back to `default`.
fn parse_page_or_default(raw: Option<&str>, default: u64) -> Result<u64, Error> {
    match raw {
        None => Ok(default),
        Some(raw) => pagination::parse_page_param(raw).ok_or(Error::InvalidPageParams),
    }
}

/// Build the row filter for `user_id` from optional date strings.
fn parse_filter(
    user_id: UserID,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<TransactionFilter, Error> {
    let start_date = start_date.map(parse_date).transpose()?;
    let end_date = end_date.map(parse_date).transpose()?;

    Ok(TransactionFilter {
        user_id,
        start_date,
        end_date,
    })
}

/// Check a create payload, collecting every field failure into one error.
fn validate_create_data(
    data: CreateTransactionData,
    user_id: UserID,
) -> Result<NewTransaction, Error> {
    let mut errors = Vec::new();

    if data.amount.is_none() {
        errors.push("amount must be a number.".to_string());
    }

    let transaction_type = match data.transaction_type.parse::<TransactionType>() {
        Ok(transaction_type) => Some(transaction_type),
        Err(_) => {
            errors.push("Invalid type value.".to_string());
            None
        }
    };

    if data.category_id.is_none() {
        errors.push("category_id is required.".to_string());
    }

    let date = match parse_date(&data.date) {
        Ok(date) => Some(date),
        Err(_) => {
            errors.push("Invalid date value.".to_string());
            None
        }
    };

    match (data.amount, transaction_type, data.category_id, date) {
        (Some(amount), Some(transaction_type), Some(category_id), Some(date))
            if errors.is_empty() =>
        {
            Ok(NewTransaction {
                amount,
                note: data.note,
                transaction_type,
                date,
                user_id,
                category_id,
            })
        }
        _ => Err(Error::InvalidBody { errors }),
    }
}

/// Check an update payload, collecting every field failure into one error.
fn validate_update_data(data: UpdateTransactionData) -> Result<TransactionChanges, Error> {
    let mut errors = Vec::new();

    let transaction_type = match data.transaction_type.as_deref() {
        None => None,
        Some(raw) => match raw.parse::<TransactionType>() {
            Ok(transaction_type) => Some(transaction_type),
            Err(_) => {
                errors.push("Invalid type value.".to_string());
                None
            }
        },
    };

    let date = match data.date.as_deref() {
        None => None,
        Some(raw) => match parse_date(raw) {
            Ok(date) => Some(date),
            Err(_) => {
                errors.push("Invalid date value.".to_string());
                None
            }
        },
    };

    if errors.is_empty() {
        Ok(TransactionChanges {
            amount: data.amount,
            note: data.note,
            transaction_type,
            date,
            category_id: data.category_id,
        })
    } else {
        Err(Error::InvalidBody { errors })
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create a new transaction in the database.
///
/// # Errors
/// This function will return an error if:
/// - `category_id` does not exist ([Error::InvalidCategoryId]),
/// - or there is some other SQL error ([Error::SqlError]).
pub fn create_transaction(
    new_transaction: &NewTransaction,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let now = OffsetDateTime::now_utc();

    let transaction = connection
        .prepare(
            "INSERT INTO \"transaction\" (amount, note, type, date, user_id, category_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             RETURNING transaction_id, amount, note, type, date, user_id, category_id, created_at, updated_at",
        )?
        .query_row(
            (
                new_transaction.amount,
                new_transaction.note.as_deref(),
                new_transaction.transaction_type,
                new_transaction.date,
                new_transaction.user_id.as_i64(),
                new_transaction.category_id,
                now,
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Retrieve the transaction with `transaction_id` owned by `user_id`.
///
/// # Errors
/// This function will return an error if:
/// - the transaction does not exist or belongs to another user
///   ([Error::NotFound]),
/// - or there is some other SQL error ([Error::SqlError]).
pub fn get_transaction(
    transaction_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let user_id = user_id.as_i64();
    let transaction = connection
        .prepare(
            "SELECT transaction_id, amount, note, type, date, user_id, category_id, created_at, updated_at
             FROM \"transaction\"
             WHERE transaction_id = :transaction_id AND user_id = :user_id",
        )?
        .query_row(
            &[(":transaction_id", &transaction_id), (":user_id", &user_id)],
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Apply `changes` to the transaction with `transaction_id` owned by
/// `user_id`, stamping `updated_at`.
///
/// The statement is scoped by both the transaction ID and the owner, so a row
/// that exists but belongs to someone else reports [Error::NotFound] exactly
/// like a missing row. An empty set of changes returns the current record
/// without touching `updated_at`.
///
/// # Errors
/// This function will return an error if:
/// - the transaction does not exist or belongs to another user
///   ([Error::NotFound]),
/// - `changes.category_id` does not exist ([Error::InvalidCategoryId]),
/// - or there is some other SQL error ([Error::SqlError]).
pub fn update_transaction(
    transaction_id: DatabaseID,
    user_id: UserID,
    changes: &TransactionChanges,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let mut set_clause_parts: Vec<&str> = vec![];
    let mut query_parameters: Vec<&dyn ToSql> = vec![];

    if let Some(amount) = &changes.amount {
        set_clause_parts.push("amount = ?");
        query_parameters.push(amount);
    }

    if let Some(note) = &changes.note {
        set_clause_parts.push("note = ?");
        query_parameters.push(note);
    }

    if let Some(transaction_type) = &changes.transaction_type {
        set_clause_parts.push("type = ?");
        query_parameters.push(transaction_type);
    }

    if let Some(date) = &changes.date {
        set_clause_parts.push("date = ?");
        query_parameters.push(date);
    }

    if let Some(category_id) = &changes.category_id {
        set_clause_parts.push("category_id = ?");
        query_parameters.push(category_id);
    }

    if set_clause_parts.is_empty() {
        return get_transaction(transaction_id, user_id, connection);
    }

    let now = OffsetDateTime::now_utc();
    set_clause_parts.push("updated_at = ?");
    query_parameters.push(&now);

    let user_id = user_id.as_i64();
    query_parameters.push(&transaction_id);
    query_parameters.push(&user_id);

    let query_string = format!(
        "UPDATE \"transaction\" SET {}
         WHERE transaction_id = ? AND user_id = ?
         RETURNING transaction_id, amount, note, type, date, user_id, category_id, created_at, updated_at",
        set_clause_parts.join(", ")
    );

    connection
        .prepare(&query_string)?
        .query_row(params_from_iter(query_parameters), map_transaction_row)
        .map_err(|error| error.into())
}

/// Delete the transaction with `transaction_id` owned by `user_id`, returning
/// its last state.
///
/// # Errors
/// This function will return an error if:
/// - the transaction does not exist or belongs to another user
///   ([Error::NotFound]),
/// - or there is some other SQL error ([Error::SqlError]).
pub fn delete_transaction(
    transaction_id: DatabaseID,
    user_id: UserID,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let user_id = user_id.as_i64();
    let transaction = connection
        .prepare(
            "DELETE FROM \"transaction\"
             WHERE transaction_id = :transaction_id AND user_id = :user_id
             RETURNING transaction_id, amount, note, type, date, user_id, category_id, created_at, updated_at",
        )?
        .query_row(
            &[(":transaction_id", &transaction_id), (":user_id", &user_id)],
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
                transaction_id INTEGER PRIMARY KEY AUTOINCREMENT,
                amount REAL NOT NULL,
                note TEXT,
                type TEXT NOT NULL,
                date TEXT NOT NULL,
                user_id INTEGER NOT NULL REFERENCES user(user_id),
                category_id INTEGER NOT NULL REFERENCES category(category_id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    // Ensure the sequence starts at 1
    connection.execute(
        "INSERT OR IGNORE INTO sqlite_sequence (name, seq) VALUES ('transaction', 0)",
        (),
    )?;

    Ok(())
}

/// Map a database row to a [Transaction].
pub(crate) fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let transaction_id = row.get(0)?;
    let amount = row.get(1)?;
    let note = row.get(2)?;
    let transaction_type = row.get(3)?;
    let date = row.get(4)?;
    let user_id: i64 = row.get(5)?;
    let category_id = row.get(6)?;
    let created_at = row.get(7)?;
    let updated_at = row.get(8)?;

    Ok(Transaction {
        transaction_id,
        amount,
        note,
        transaction_type,
        date,
        user_id: UserID::new(user_id),
        category_id,
        created_at,
        updated_at,
    })
}

// ============================================================================
// TESTS
// ============================================================================



#[cfg(test)]
mod payload_tests {
    use serde_json::json;

    use super::UpdateTransactionData;

    #[test]
    fn update_payload_drops_fields_outside_the_allow_list() {
        let data: UpdateTransactionData = serde_json::from_value(json!({
            "amount": 5.0,
            "user_id": 999,
            "transaction_id": 42,
            "created_at": "2020-01-01T00:00:00Z"
        }))
        .expect("Could not deserialize update payload");

        assert_eq!(data.amount, Some(5.0));
        assert_eq!(data.note, None);
        assert_eq!(data.transaction_type, None);
        assert_eq!(data.category_id, None);
        assert_eq!(data.date, None);
    }
}

//! Read-side queries over the transaction table.
//!
//! Every function takes a [TransactionFilter], so a caller cannot forget the
//! owner: listing, counting and the summary aggregates only ever see one
//! user's rows. Page sizes are clamped here as well, the route layer is not
//! trusted to have done it.

use rusqlite::{Connection, Row, params_from_iter, types::Value};
use serde::Serialize;
use time::Date;

use crate::{
    Error,
    database_id::DatabaseID,
    pagination::{self, PaginationConfig},
    transaction::{Transaction, TransactionType, map_transaction_row},
    user::UserID,
};

/// Scopes a transaction query to one user's rows, optionally bounded by an
/// inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransactionFilter {
    pub user_id: UserID,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
}

impl TransactionFilter {
    /// Create a filter matching all of `user_id`'s transactions.
    pub fn new(user_id: UserID) -> Self {
        Self {
            user_id,
            start_date: None,
            end_date: None,
        }
    }
}

/// A transaction annotated with its category's description for list views.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorizedTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    /// The description of the transaction's category.
    pub category: Option<String>,
}

/// Income and expense totals for a set of transactions.
///
/// An empty set sums to zero on every field, the totals are never absent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub balance: f64,
}

/// One category's share of a summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category_id: DatabaseID,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub total: f64,
    /// The most recent transaction date among the rows in this group, i.e.
    /// within the owner, type and date window of the query.
    pub last_transaction_date: Date,
}

/// Retrieve one page of the transactions matching `filter`, newest first.
///
/// Rows are ordered by date descending with the transaction ID as an
/// ascending tie-break, so paging over a fixed data set is deterministic.
/// `page_size` is clamped to [PaginationConfig::max_page_size] of the given
/// `config`.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn query_transactions_page(
    filter: &TransactionFilter,
    page: u64,
    page_size: u64,
    config: &PaginationConfig,
    connection: &Connection,
) -> Result<Vec<CategorizedTransaction>, Error> {
    let page_size = config.clamp_page_size(page_size);
    let offset = pagination::page_offset(page.max(1), page_size);

    let (where_clause, mut query_parameters) = filter_clause(filter);
    let query_string = format!(
        "SELECT t.transaction_id, t.amount, t.note, t.type, t.date, t.user_id, t.category_id, \
                t.created_at, t.updated_at, c.description \
         FROM \"transaction\" t \
         LEFT JOIN category c ON c.category_id = t.category_id \
         {where_clause} \
         ORDER BY t.date DESC, t.transaction_id ASC \
         LIMIT ? OFFSET ?"
    );
    query_parameters.push(Value::from(page_size as i64));
    query_parameters.push(Value::from(i64::try_from(offset).unwrap_or(i64::MAX)));

    connection
        .prepare(&query_string)?
        .query_map(params_from_iter(query_parameters), map_categorized_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Count the transactions matching `filter`, ignoring pagination.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn count_transactions(
    filter: &TransactionFilter,
    connection: &Connection,
) -> Result<u64, Error> {
    let (where_clause, query_parameters) = filter_clause(filter);
    let query_string = format!("SELECT COUNT(*) FROM \"transaction\" t {where_clause}");

    // SQLite reports COUNT(*) as a signed 64-bit integer.
    let count: i64 =
        connection.query_row(&query_string, params_from_iter(query_parameters), |row| {
            row.get(0)
        })?;

    Ok(count as u64)
}

/// Compute the income and expense totals for the transactions matching
/// `filter`.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn query_summary(filter: &TransactionFilter, connection: &Connection) -> Result<Summary, Error> {
    let (where_clause, query_parameters) = filter_clause(filter);
    let query_string = format!(
        "SELECT \
            COALESCE(SUM(CASE WHEN t.type = 'income' THEN t.amount ELSE 0 END), 0), \
            COALESCE(SUM(CASE WHEN t.type = 'expense' THEN t.amount ELSE 0 END), 0) \
         FROM \"transaction\" t {where_clause}"
    );

    connection
        .query_row(&query_string, params_from_iter(query_parameters), |row| {
            let total_income: f64 = row.get(0)?;
            let total_expenses: f64 = row.get(1)?;

            Ok(Summary {
                total_income,
                total_expenses,
                balance: total_income - total_expenses,
            })
        })
        .map_err(|error| error.into())
}

/// Compute per-category totals for the transactions of `transaction_type`
/// matching `filter`.
///
/// Each group's `last_transaction_date` is the latest date among the grouped
/// rows themselves, so it honours the same owner, type and date window as the
/// total. Groups are ordered by category ID.
///
/// # Errors
/// This function will return an error if there is an SQL error.
pub fn query_summary_by_category(
    filter: &TransactionFilter,
    transaction_type: TransactionType,
    connection: &Connection,
) -> Result<Vec<CategorySummary>, Error> {
    let (where_clause, mut query_parameters) = filter_clause(filter);
    let query_string = format!(
        "SELECT t.category_id, c.description, t.type, SUM(t.amount), MAX(t.date) \
         FROM \"transaction\" t \
         LEFT JOIN category c ON c.category_id = t.category_id \
         {where_clause} AND t.type = ? \
         GROUP BY t.category_id \
         ORDER BY t.category_id ASC"
    );
    query_parameters.push(Value::from(transaction_type.as_str().to_string()));

    connection
        .prepare(&query_string)?
        .query_map(params_from_iter(query_parameters), map_category_summary_row)?
        .map(|maybe_summary| maybe_summary.map_err(|error| error.into()))
        .collect()
}

/// The WHERE clause selecting the rows that match `filter`, and its bound
/// parameters. The clause always constrains the owner.
fn filter_clause(filter: &TransactionFilter) -> (String, Vec<Value>) {
    let mut where_clause_parts = vec!["t.user_id = ?".to_string()];
    let mut query_parameters = vec![Value::from(filter.user_id.as_i64())];

    if let Some(start_date) = filter.start_date {
        where_clause_parts.push("t.date >= ?".to_string());
        query_parameters.push(Value::from(start_date.to_string()));
    }

    if let Some(end_date) = filter.end_date {
        where_clause_parts.push("t.date <= ?".to_string());
        query_parameters.push(Value::from(end_date.to_string()));
    }

    (
        format!("WHERE {}", where_clause_parts.join(" AND ")),
        query_parameters,
    )
}

fn map_categorized_row(row: &Row) -> Result<CategorizedTransaction, rusqlite::Error> {
    let transaction = map_transaction_row(row)?;
    let category = row.get(9)?;

    Ok(CategorizedTransaction {
        transaction,
        category,
    })
}

fn map_category_summary_row(row: &Row) -> Result<CategorySummary, rusqlite::Error> {
    Ok(CategorySummary {
        category_id: row.get(0)?,
        description: row.get(1)?,
        transaction_type: row.get(2)?,
        total: row.get(3)?,
        last_transaction_date: row.get(4)?,
    })
}

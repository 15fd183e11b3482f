//! Database schema initialization.

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{
    Error, category::create_category_table, transaction::create_transaction_table,
    user::create_user_table,
};

/// Set up the application schema on `connection`.
///
/// Enables foreign key enforcement for the connection and creates the user,
/// category and transaction tables if they do not exist. Safe to call on a
/// database that already has the schema.
///
/// # Errors
/// Returns an error if the schema could not be created.
pub fn initialize_db(connection: &Connection) -> Result<(), Error> {
    // Foreign keys are enforced per connection and the pragma is a no-op
    // inside a transaction.
    connection.pragma_update(None, "foreign_keys", true)?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_user_table(&transaction)?;
    create_category_table(&transaction)?;
    create_transaction_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

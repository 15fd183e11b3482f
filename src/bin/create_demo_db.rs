use std::error::Error;
use std::path::Path;
use std::process::exit;

use clap::Parser;
use rusqlite::Connection;
use time::{Duration, OffsetDateTime};

use tallier_rs::{
    NewTransaction, PasswordHash, TransactionType, ValidatedPassword, create_transaction,
    create_user, initialize_db, seed_global_categories,
};

/// A utility for creating a demo database for the REST API server of tallier_rs.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to save the SQLite database to.
    #[arg(long, short)]
    output_path: String,
}

/// Create and populate a database for manual testing.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let output_path = Path::new(&args.output_path);

    match output_path.extension() {
        None => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        Some(extension) if extension.is_empty() => {
            eprintln!("Output path must include a file extension (e.g., 'my_database.db').");
            exit(1);
        }
        _ => {}
    }

    if output_path.is_file() {
        eprintln!("File already exists at {output_path:#?}!");
        exit(1);
    }

    println!("Creating database at {output_path:#?}");
    let conn = Connection::open(output_path)?;

    initialize_db(&conn)?;
    seed_global_categories(&conn)?;

    println!("Creating demo user...");

    let password_hash = PasswordHash::new(
        ValidatedPassword::new_unchecked("demo"),
        PasswordHash::DEFAULT_COST,
    )?;

    let user = create_user("Demo User", "demo@example.com", password_hash, &conn)?;

    println!("Creating sample transactions...");

    let today = OffsetDateTime::now_utc().date();

    let sample_rows: [(i64, f64, TransactionType, &str, Option<&str>); 12] = [
        (28, 2750.0, TransactionType::Income, "salary", Some("Monthly pay")),
        (27, 850.0, TransactionType::Expense, "rent", None),
        (26, 92.40, TransactionType::Expense, "groceries", None),
        (24, 61.35, TransactionType::Expense, "utilities", Some("Power bill")),
        (21, 18.50, TransactionType::Expense, "transport", Some("Bus card top up")),
        (19, 74.10, TransactionType::Expense, "groceries", None),
        (16, 45.00, TransactionType::Expense, "entertainment", Some("Movie night")),
        (12, 88.25, TransactionType::Expense, "groceries", None),
        (9, 120.0, TransactionType::Income, "other", Some("Sold old bike")),
        (7, 32.80, TransactionType::Expense, "transport", Some("Fuel")),
        (4, 66.95, TransactionType::Expense, "groceries", None),
        (1, 25.00, TransactionType::Expense, "entertainment", None),
    ];

    for (days_ago, amount, transaction_type, category_value, note) in sample_rows {
        let category_id: i64 = conn.query_row(
            "SELECT category_id FROM category WHERE value = ?1",
            (category_value,),
            |row| row.get(0),
        )?;

        create_transaction(
            &NewTransaction {
                amount,
                note: note.map(String::from),
                transaction_type,
                date: today - Duration::days(days_ago),
                user_id: user.user_id,
                category_id,
            },
            &conn,
        )?;
    }

    println!("Success!");

    Ok(())
}

// Database layer — SQLite storage behind a backend-agnostic trait.
//
// We use rusqlite with the "bundled" feature so there's no system SQLite
// dependency. The database file lives wherever PRISM_DB_PATH points
// (defaults to ./prism.db). An optional PostgreSQL backend is available
// behind the `postgres` cargo feature.

pub mod models;
pub mod queries;
pub mod schema;
pub mod sqlite;
pub mod traits;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;

pub use traits::Database;

/// Open (or create) the SQLite database, run migrations, and wrap it in
/// the Database trait.
///
/// This is the main entry point — called by `prism init` and by any
/// command that needs database access.
pub fn initialize_sqlite(db_path: &str) -> Result<Arc<dyn Database>> {
    // Create parent directories if needed
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory for database: {}", db_path))?;
        }
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::create_tables(&conn)?;

    Ok(Arc::new(sqlite::SqliteDatabase::new(conn)))
}

/// Open an existing SQLite database (fails if it doesn't exist yet).
pub fn open_sqlite(db_path: &str) -> Result<Arc<dyn Database>> {
    if !Path::new(db_path).exists() {
        anyhow::bail!(
            "Database not found at {}. Run `prism init` first.",
            db_path
        );
    }

    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    schema::create_tables(&conn)?;

    Ok(Arc::new(sqlite::SqliteDatabase::new(conn)))
}

/// Connect to PostgreSQL and run migrations.
#[cfg(feature = "postgres")]
pub async fn connect_postgres(database_url: &str) -> Result<Arc<dyn Database>> {
    let db = postgres::PgDatabase::connect(database_url).await?;
    Ok(Arc::new(db))
}

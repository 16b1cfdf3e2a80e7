//! Message persistence.
//!
//! SQLite via sqlx. Timestamps are stored as `INTEGER` Unix epoch
//! milliseconds (UTC).

mod repository;
mod search;
pub mod time;

pub use repository::{MessageRepository, SqliteMessageRepository, StoredMessage};
pub use search::SearchParams;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::info;

pub type DbPool = Pool<Sqlite>;

/// Connections for a file database. Ingestion is the only writer.
const DEFAULT_POOL_SIZE: u32 = 4;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

fn is_memory_url(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Open a pool. File databases use WAL.
///
/// An in-memory database lives only as long as its connection, so it gets a
/// single connection that is never recycled, whatever `max_connections` is.
pub async fn init_pool_with_size(
    database_url: &str,
    max_connections: u32,
) -> Result<DbPool, sqlx::Error> {
    let memory = is_memory_url(database_url);

    let mut options = SqliteConnectOptions::from_str(database_url)?
        .busy_timeout(BUSY_TIMEOUT)
        .create_if_missing(true);
    if !memory {
        options = options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
    }

    let mut pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(30));
    pool_options = if memory {
        pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(max_connections.max(1))
    };

    let pool = pool_options.connect_with(options).await?;
    info!(
        memory,
        max_connections = pool.options().get_max_connections(),
        "Database opened"
    );
    Ok(pool)
}

pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    init_pool_with_size(database_url, DEFAULT_POOL_SIZE).await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

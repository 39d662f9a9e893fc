//! Journal database module - SQLite-backed namespaced document store, users and change feed
pub mod schema;
pub mod migration;
pub mod change_feed;
pub mod document_store;
pub mod user_store;
pub mod live;
pub use schema::*;
pub use migration::MigrationManager;
pub use change_feed::{ChangeEvent, ChangeFeed, ChangeKind};
pub use document_store::DocumentStore;
pub use user_store::UserStore;
pub use live::{LiveSnapshot, SnapshotDiff};
use std::path::Path;
use std::sync::Arc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;
use uuid::Uuid;

const DEFAULT_CHANGE_CAPACITY: usize = 256;

pub struct JournalDatabase {
    pub documents: DocumentStore,
    pub users: UserStore,
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl JournalDatabase {
    pub fn new(db_path: &Path, change_capacity: usize) -> anyhow::Result<Self> {
        info!("Opening journal database at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;
                     PRAGMA busy_timeout = 5000;",
                )
            });
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        Self::from_pool(pool, change_capacity)
    }

    /// Private in-memory database. Shared-cache mode reports table locks as
    /// SQLITE_LOCKED without consulting the busy handler, so the pool holds a
    /// single connection that serialises access and is never recycled.
    pub fn new_in_memory() -> anyhow::Result<Self> {
        let uri = format!("file:dream-journal-{}?mode=memory&cache=shared", Uuid::new_v4());
        let manager = SqliteConnectionManager::file(uri)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
            )
            .with_init(|conn| conn.execute_batch("PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .max_lifetime(None)
            .idle_timeout(None)
            .build(manager)?;

        Self::from_pool(pool, DEFAULT_CHANGE_CAPACITY)
    }

    fn from_pool(pool: Pool<SqliteConnectionManager>, change_capacity: usize) -> anyhow::Result<Self> {
        {
            let mut conn = pool.get()?;
            let mut migrator = migration::MigrationManager::new(&mut conn);
            migrator.initialize_database()?;
        }
        let pool = Arc::new(pool);
        let changes = ChangeFeed::new(change_capacity);
        info!("Journal database initialized successfully");
        Ok(Self {
            documents: DocumentStore::new(Arc::clone(&pool), changes),
            users: UserStore::new(Arc::clone(&pool)),
            pool,
        })
    }

    pub fn changes(&self) -> &ChangeFeed {
        self.documents.changes()
    }

    pub fn get_stats(&self) -> anyhow::Result<DatabaseStats> {
        let conn = self.pool.get()?;
        Ok(migration::get_database_stats(&conn)?)
    }
}

use crate::{SqliteConnection, connection::SqliteLocation};
use anyhow::Context as _;
use multitxn_core::{Error, Result};
use std::{
    fmt::{self, Debug},
    mem,
    ops::{Deref, DerefMut},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub const DEFAULT_POOL_SIZE: usize = 3;

static NEXT_MEMORY_POOL: AtomicU64 = AtomicU64::new(1);

struct PoolShared {
    url: String,
    size: usize,
    /// Database file, or a name unique to the pool for in-memory databases.
    resource: String,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<SqliteConnection>>,
}

/// Bounded set of connections to one database.
///
/// At most `size` connections exist at any time, acquiring waits for one to be released.
/// Connections are opened lazily and reused after release. An in-memory database exists only inside
/// the connection that created it, so such a pool holds exactly one connection.
#[derive(Clone)]
pub struct SqlitePool(Arc<PoolShared>);

impl SqlitePool {
    /// Check the url by opening the first connection, then keep it idle.
    pub async fn connect(url: impl Into<String>, size: usize) -> Result<SqlitePool> {
        let url = url.into();
        if size == 0 {
            return Err(Error::msg("The pool size must be at least 1"));
        }
        let location = SqliteLocation::parse(&url)?;
        let (size, resource) = if location.is_file() {
            (size, location.path.clone())
        } else {
            if size > 1 {
                log::warn!(
                    "The in-memory database `{}` is private to one connection, the pool size is reduced from {} to 1",
                    url,
                    size
                );
            }
            let id = NEXT_MEMORY_POOL.fetch_add(1, Ordering::Relaxed);
            (1, format!("{}#{}", location.path, id))
        };
        let first = SqliteConnection::connect(&url).await?;
        log::debug!("Sqlite pool of {} connections on `{}`", size, url);
        Ok(Self(Arc::new(PoolShared {
            url,
            size,
            resource,
            permits: Arc::new(Semaphore::new(size)),
            idle: Mutex::new(vec![first]),
        })))
    }

    pub fn url(&self) -> &str {
        &self.0.url
    }

    pub fn size(&self) -> usize {
        self.0.size
    }

    /// Identifies the database, two pools on the same file share it.
    pub fn resource(&self) -> &str {
        &self.0.resource
    }

    /// Connections currently opened and not in use.
    pub fn idle(&self) -> usize {
        self.idle_connections().len()
    }

    pub async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .0
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("The sqlite pool is closed")?;
        let reused = self.idle_connections().pop();
        let connection = match reused {
            Some(mut connection) => {
                if !connection.is_autocommit() {
                    log::warn!(
                        "A connection to `{}` was released inside a transaction, rolling it back",
                        self.0.url
                    );
                    connection.batch("ROLLBACK;").await?;
                }
                connection
            }
            None => SqliteConnection::connect(&self.0.url).await?,
        };
        Ok(PooledConnection {
            connection,
            pool: self.0.clone(),
            _permit: permit,
        })
    }

    /// Refuse new acquisitions and close the idle connections, busy ones close on release.
    pub fn close(&self) {
        self.0.permits.close();
        self.idle_connections().clear();
        log::debug!("Sqlite pool on `{}` closed", self.0.url);
    }

    pub fn is_closed(&self) -> bool {
        self.0.permits.is_closed()
    }

    fn idle_connections(&self) -> std::sync::MutexGuard<'_, Vec<SqliteConnection>> {
        self.0.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Debug for SqlitePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlitePool")
            .field("url", &self.0.url)
            .field("size", &self.0.size)
            .field("available", &self.0.permits.available_permits())
            .finish()
    }
}

/// Connection on loan from a [`SqlitePool`], it goes back to the pool when dropped.
pub struct PooledConnection {
    connection: SqliteConnection,
    pool: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let connection = mem::replace(&mut self.connection, SqliteConnection::detached());
        if !self.pool.permits.is_closed() {
            self.pool
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(connection);
        }
    }
}

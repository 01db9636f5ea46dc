use anyhow::Context as _;
use multitxn_core::{Error, FunctionContext, Result};
use multitxn_docstore::{DocumentContext, DocumentStore};
use multitxn_kv::{KvContext, KvStore};
use multitxn_sqlite::{
    DEFAULT_POOL_SIZE, Orm, OrmContext, SqlContext, SqliteConnection, SqlitePool,
};
use std::env;

pub const SQLITE_URL_VAR: &str = "MULTITXN_SQLITE_URL";
pub const POOL_SIZE_VAR: &str = "MULTITXN_POOL_SIZE";

/// Where the shared backends live and how many relational connections may be open at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcesConfig {
    pub sqlite_url: String,
    pub pool_size: usize,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            sqlite_url: "sqlite://multitxn.sqlite?mode=rwc".into(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl ResourcesConfig {
    /// Defaults overridden by `MULTITXN_SQLITE_URL` and `MULTITXN_POOL_SIZE` when set.
    pub fn from_env() -> Result<Self> {
        let mut result = Self::default();
        if let Ok(url) = env::var(SQLITE_URL_VAR) {
            result.sqlite_url = url;
        }
        if let Ok(size) = env::var(POOL_SIZE_VAR) {
            result.pool_size = size
                .parse()
                .with_context(|| format!("{} must be a positive integer, found `{}`", POOL_SIZE_VAR, size))?;
        }
        result.validate()?;
        Ok(result)
    }

    pub fn validate(&self) -> Result<()> {
        SqliteConnection::validate_url(&self.sqlite_url)
            .with_context(|| format!("Invalid relational database url `{}`", self.sqlite_url))?;
        if self.pool_size == 0 {
            return Err(Error::msg("The pool size must be at least 1"));
        }
        Ok(())
    }
}

/// Process wide handles of every backend, created once and lent to the code building managers.
#[derive(Debug, Clone)]
pub struct Resources {
    pool: SqlitePool,
    orm: Orm,
    documents: DocumentStore,
    kv: KvStore,
}

impl Resources {
    pub async fn connect(config: &ResourcesConfig) -> Result<Self> {
        config.validate()?;
        let pool = SqlitePool::connect(&config.sqlite_url, config.pool_size).await?;
        log::info!(
            "Resources ready: sqlite `{}` ({} connections), document store, key-value store",
            config.sqlite_url,
            pool.size()
        );
        Ok(Self {
            orm: Orm::new(pool.clone()),
            pool,
            documents: DocumentStore::new(),
            kv: KvStore::new(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn orm(&self) -> &Orm {
        &self.orm
    }

    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    pub fn kv(&self) -> &KvStore {
        &self.kv
    }

    pub fn sql_context(&self) -> SqlContext {
        SqlContext::new(self.pool.clone())
    }

    pub fn orm_context(&self) -> OrmContext {
        OrmContext::new(self.orm.clone())
    }

    pub fn document_context(&self) -> DocumentContext {
        DocumentContext::new(self.documents.clone())
    }

    pub fn kv_context(&self) -> KvContext {
        KvContext::new(self.kv.clone())
    }

    pub fn function_context(&self) -> FunctionContext {
        FunctionContext::default()
    }

    /// Stop handing out relational connections, the idle ones are closed.
    pub fn close(&self) {
        self.pool.close();
        log::debug!("Resources closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        assert!(ResourcesConfig::default().validate().is_ok());
        let config = ResourcesConfig {
            sqlite_url: "mysql://localhost/bank".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = ResourcesConfig {
            sqlite_url: "not a url".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        for url in ["sqlite://:memory:", "sqlite://bank?mode=memory"] {
            let config = ResourcesConfig {
                sqlite_url: url.into(),
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "{}", url);
        }
        let config = ResourcesConfig {
            pool_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

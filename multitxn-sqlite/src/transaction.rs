use crate::{PooledConnection, SqliteConnection, SqlitePool, SqliteSqlWriter};
use multitxn_core::{Backend, QueryOutput, Result, Statement, StatementBackend, Value};
use std::future::Future;

/// Open `BEGIN IMMEDIATE` transaction on a pooled connection.
///
/// The connection returns to the pool once the transaction is committed or rolled back.
pub struct SqliteTransaction {
    connection: PooledConnection,
}

impl SqliteTransaction {
    pub async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut connection = pool.acquire().await?;
        let mut sql = String::new();
        SqliteSqlWriter::default().write_transaction_begin(&mut sql);
        connection.batch(&sql).await?;
        Ok(Self { connection })
    }

    pub async fn execute(&mut self, statement: &Statement) -> Result<QueryOutput> {
        self.connection.execute(statement).await
    }

    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.connection
    }

    /// On failure the transaction is rolled back before returning the error.
    pub async fn commit(mut self) -> Result<()> {
        let mut sql = String::new();
        SqliteSqlWriter::default().write_transaction_commit(&mut sql);
        let result = self.connection.batch(&sql).await;
        if result.is_err() && !self.connection.is_autocommit() {
            if let Err(e) = self.rollback_in_place().await {
                log::warn!("Could not roll back after a failed commit: {:#}", e);
            }
        }
        result
    }

    pub async fn rollback(mut self) -> Result<()> {
        self.rollback_in_place().await
    }

    async fn rollback_in_place(&mut self) -> Result<()> {
        let mut sql = String::new();
        SqliteSqlWriter::default().write_transaction_rollback(&mut sql);
        self.connection.batch(&sql).await
    }
}

impl Backend for SqlitePool {
    type Transaction = SqliteTransaction;

    const KIND: &'static str = "sql";

    fn begin(&self) -> impl Future<Output = Result<SqliteTransaction>> + Send {
        SqliteTransaction::begin(self)
    }

    fn commit(&self, transaction: SqliteTransaction) -> impl Future<Output = Result<()>> + Send {
        transaction.commit()
    }

    fn rollback(
        &self,
        transaction: SqliteTransaction,
    ) -> impl Future<Output = Result<()>> + Send {
        transaction.rollback()
    }

    /// `BEGIN IMMEDIATE` takes the database write lock, a second transaction on the same database
    /// inside one manager would wait for the first one until the busy timeout.
    fn exclusive_resource(&self) -> Option<String> {
        Some(format!("sqlite:{}", self.resource()))
    }
}

impl StatementBackend for SqlitePool {
    fn run_statement<'t>(
        &'t self,
        transaction: &'t mut SqliteTransaction,
        statement: &'t Statement,
    ) -> impl Future<Output = Result<Value>> + Send + 't {
        async move { transaction.execute(statement).await.map(Value::from) }
    }
}

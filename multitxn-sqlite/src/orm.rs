use crate::{
    Entity, Filter, Order, SqlitePool, SqliteSqlWriter, SqliteTransaction, entity::validate_column,
};
use multitxn_core::{
    Backend, Params, QueryOutput, Result, RowsAffected, Statement, StatementBackend, Value,
};
use std::future::Future;

/// Entity layer over a [`SqlitePool`].
///
/// Writes are validated against the column definitions before reaching the database, the same
/// rules are enforced by the `CHECK` constraints created by [`OrmSession::sync`].
#[derive(Debug, Clone)]
pub struct Orm {
    pool: SqlitePool,
}

impl Orm {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the table of `E` if missing, outside of any transaction.
    pub async fn sync<E: Entity>(&self) -> Result<()> {
        let mut sql = String::new();
        SqliteSqlWriter::default().write_create_table::<E>(&mut sql, true);
        self.pool.acquire().await?.batch(&sql).await
    }
}

/// Open transaction of an [`Orm`] context.
pub struct OrmSession {
    transaction: SqliteTransaction,
}

impl OrmSession {
    pub fn transaction(&mut self) -> &mut SqliteTransaction {
        &mut self.transaction
    }

    pub async fn sync<E: Entity>(&mut self) -> Result<()> {
        let mut sql = String::new();
        SqliteSqlWriter::default().write_create_table::<E>(&mut sql, true);
        self.transaction.execute(&Statement::new(sql)).await?;
        Ok(())
    }

    pub async fn insert<E: Entity>(&mut self, entity: &E) -> Result<RowsAffected> {
        entity.validate()?;
        let mut sql = String::new();
        let mut params = Params::new();
        SqliteSqlWriter::default().write_insert::<E>(&mut sql, &mut params, &entity.row());
        let output = self
            .transaction
            .execute(&Statement::with_params(sql, params))
            .await?;
        Ok(output.affected)
    }

    pub async fn find_one<E: Entity>(&mut self, filter: &Filter) -> Result<Option<E>> {
        let mut found = self.select::<E>(filter, None, Some(1)).await?;
        Ok(found.pop())
    }

    pub async fn find_many<E: Entity>(
        &mut self,
        filter: &Filter,
        order: Option<&Order>,
    ) -> Result<Vec<E>> {
        self.select(filter, order, None).await
    }

    /// Assign `values` to every row matching `filter`, returns the number of updated rows.
    pub async fn update<E: Entity>(
        &mut self,
        values: &[(&str, Value)],
        filter: &Filter,
    ) -> Result<u64> {
        for (name, value) in values {
            validate_column::<E>(name, value)?;
        }
        let mut sql = String::new();
        let mut params = Params::new();
        SqliteSqlWriter::default().write_update::<E>(&mut sql, &mut params, values, filter);
        let output = self
            .transaction
            .execute(&Statement::with_params(sql, params))
            .await?;
        Ok(output.affected.rows_affected)
    }

    pub async fn delete<E: Entity>(&mut self, filter: &Filter) -> Result<u64> {
        let mut sql = String::new();
        let mut params = Params::new();
        SqliteSqlWriter::default().write_delete::<E>(&mut sql, &mut params, filter);
        let output = self
            .transaction
            .execute(&Statement::with_params(sql, params))
            .await?;
        Ok(output.affected.rows_affected)
    }

    /// Raw statement inside the same transaction.
    pub async fn query(&mut self, statement: &Statement) -> Result<QueryOutput> {
        self.transaction.execute(statement).await
    }

    async fn select<E: Entity>(
        &mut self,
        filter: &Filter,
        order: Option<&Order>,
        limit: Option<u32>,
    ) -> Result<Vec<E>> {
        let mut sql = String::new();
        let mut params = Params::new();
        SqliteSqlWriter::default().write_select::<E>(&mut sql, &mut params, filter, order, limit);
        let output = self
            .transaction
            .execute(&Statement::with_params(sql, params))
            .await?;
        output.rows.iter().map(E::from_row).collect()
    }
}

impl Backend for Orm {
    type Transaction = OrmSession;

    const KIND: &'static str = "orm";

    async fn begin(&self) -> Result<OrmSession> {
        Ok(OrmSession {
            transaction: self.pool.begin().await?,
        })
    }

    async fn commit(&self, session: OrmSession) -> Result<()> {
        self.pool.commit(session.transaction).await
    }

    async fn rollback(&self, session: OrmSession) -> Result<()> {
        self.pool.rollback(session.transaction).await
    }

    fn exclusive_resource(&self) -> Option<String> {
        self.pool.exclusive_resource()
    }
}

impl StatementBackend for Orm {
    fn run_statement<'t>(
        &'t self,
        session: &'t mut OrmSession,
        statement: &'t Statement,
    ) -> impl Future<Output = Result<Value>> + Send + 't {
        async move { session.query(statement).await.map(Value::from) }
    }
}

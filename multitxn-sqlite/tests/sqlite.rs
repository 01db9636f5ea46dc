#[cfg(test)]
mod tests {
    use multitxn_core::{
        Error, FunctionContext, FutureExt, Statement, TransactionManager, TxnError, Value,
    };
    use multitxn_sqlite::{Filter, Orm, OrmContext, Order, SqlContext, SqlitePool};
    use std::time::{Duration, Instant};
    use multitxn_tests::{Account, init_logs, silent_logs};
    use tempfile::TempDir;

    async fn pool(size: usize) -> (TempDir, SqlitePool) {
        init_logs();
        let dir = tempfile::tempdir().expect("Could not create a temporary directory");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("tests.sqlite").display());
        let pool = SqlitePool::connect(url, size)
            .await
            .expect("Could not open the database");
        Orm::new(pool.clone())
            .sync::<Account>()
            .await
            .expect("Could not create the Accounts table");
        (dir, pool)
    }

    async fn count(pool: &SqlitePool) -> usize {
        pool.acquire()
            .await
            .unwrap()
            .execute(&Statement::new("SELECT * FROM Accounts"))
            .await
            .unwrap()
            .rows
            .len()
    }

    fn insert(id: &str, balance: i64) -> Statement {
        Statement::new("INSERT INTO Accounts (accountId, balance) VALUES (:accountId, :balance)")
            .bind("accountId", id)
            .bind("balance", balance)
    }

    #[tokio::test]
    async fn sql_context_commit_and_rollback() {
        let (_dir, pool) = pool(3).await;

        let mut manager = TransactionManager::new();
        let sql = SqlContext::new(pool.clone());
        manager.register_context(&sql).unwrap();
        sql.add_statement_task(insert("a1", 10)).unwrap();
        let listed = sql
            .add_statement_task("SELECT * FROM Accounts ORDER BY accountId")
            .unwrap();
        manager.execute().await.unwrap();
        let rows = listed.get_result().unwrap();
        assert_eq!(rows.rows().len(), 1);
        assert_eq!(count(&pool).await, 1);

        let mut manager = TransactionManager::new();
        let sql = SqlContext::new(pool.clone());
        let function = FunctionContext::default();
        manager.register_context(&sql).unwrap();
        manager.register_context(&function).unwrap();
        let inserted = sql.add_statement_task(insert("a2", 20)).unwrap();
        function
            .add_function_task(|_, _, _| async move { Err(Error::msg("stop")) }.boxed())
            .unwrap();
        let error = silent_logs! { manager.execute().await.unwrap_err() };
        assert!(matches!(error, TxnError::TaskFailed { .. }));
        assert!(inserted.get_result().is_ok());
        assert_eq!(count(&pool).await, 1);
        assert!(pool.idle() >= 1);
    }

    #[tokio::test]
    async fn orm_operations() {
        let (_dir, pool) = pool(3).await;
        let mut manager = TransactionManager::new();
        let orm = OrmContext::new(Orm::new(pool.clone()));
        manager.register_context(&orm).unwrap();
        let found = orm
            .add_function_task(|_, session, _| {
                async move {
                    for account in [Account::new("a1", 10), Account::new("a2", 20), Account::new("a3", 30)] {
                        session.insert(&account).await?;
                    }
                    let updated = session
                        .update::<Account>(&[("balance", Value::from(25))], &Filter::eq("accountId", "a1"))
                        .await?;
                    assert_eq!(updated, 1);
                    let deleted = session
                        .delete::<Account>(&Filter::eq("accountId", "a3"))
                        .await?;
                    assert_eq!(deleted, 1);
                    let accounts = session
                        .find_many::<Account>(&Filter::all(), Some(&Order::desc("balance")))
                        .await?;
                    Ok(Value::from(
                        accounts.into_iter().map(|v| v.account_id).collect::<Vec<_>>(),
                    ))
                }
                .boxed()
            })
            .unwrap();
        manager.execute().await.unwrap();
        assert_eq!(
            found.get_result().unwrap(),
            Value::from(vec!["a1", "a2"])
        );
        assert_eq!(count(&pool).await, 2);
    }

    #[tokio::test]
    async fn negative_balance_is_rejected_twice() {
        let (_dir, pool) = pool(3).await;
        let orm = Orm::new(pool.clone());

        let mut manager = TransactionManager::new();
        let context = OrmContext::new(orm.clone());
        manager.register_context(&context).unwrap();
        context
            .add_function_task(|_, session, _| {
                async move {
                    session.insert(&Account::new("a1", -5)).await?;
                    Ok(Value::Null)
                }
                .boxed()
            })
            .unwrap();
        let error = silent_logs! { manager.execute().await.unwrap_err() };
        assert!(
            error
                .to_string()
                .contains("Validation min on balance failed: -5 is lower than 0"),
            "{}",
            error
        );

        let mut manager = TransactionManager::new();
        let context = OrmContext::new(orm);
        manager.register_context(&context).unwrap();
        context.add_statement_task(insert("a1", -5)).unwrap();
        let error = silent_logs! { manager.execute().await.unwrap_err() };
        assert!(error.to_string().contains("CHECK constraint failed"), "{}", error);
        assert_eq!(count(&pool).await, 0);
    }

    #[tokio::test]
    async fn concurrent_managers_serialize() {
        let (_dir, pool) = pool(2).await;
        let mut manager = TransactionManager::new();
        let sql = SqlContext::new(pool.clone());
        manager.register_context(&sql).unwrap();
        sql.add_statement_task(insert("a1", 0)).unwrap();
        manager.execute().await.unwrap();

        let deposit = |amount: i64| {
            let pool = pool.clone();
            async move {
                let mut manager = TransactionManager::new();
                let sql = SqlContext::new(pool);
                manager.register_context(&sql).unwrap();
                sql.add_statement_task(
                    Statement::new(
                        "UPDATE Accounts SET balance = balance + :amount WHERE accountId = 'a1'",
                    )
                    .bind("amount", amount),
                )
                .unwrap();
                manager.execute().await
            }
        };
        let (a, b, c) = tokio::join!(deposit(1), deposit(10), deposit(100));
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let rows = pool
            .acquire()
            .await
            .unwrap()
            .execute(&Statement::new("SELECT balance FROM Accounts"))
            .await
            .unwrap();
        assert_eq!(rows.rows[0].get_column("balance"), Some(&Value::Int64(111)));
    }

    #[tokio::test]
    async fn raw_and_entity_contexts_on_one_database_are_refused() {
        let (dir, pool) = pool(3).await;
        let mut manager = TransactionManager::new();
        let sql = SqlContext::new(pool.clone());
        let orm = OrmContext::new(Orm::new(pool.clone()));
        manager.register_context(&sql).unwrap();
        let error = manager.register_context(&orm).unwrap_err();
        assert!(matches!(error, TxnError::ResourceConflict { .. }), "{:?}", error);

        let url = format!("sqlite://{}?mode=rw", dir.path().join("tests.sqlite").display());
        let same_file = SqlitePool::connect(url, 1).await.unwrap();
        assert_eq!(same_file.resource(), pool.resource());
        assert!(matches!(
            manager.register_context(&SqlContext::new(same_file)),
            Err(TxnError::ResourceConflict { .. })
        ));

        let (_other_dir, other) = self::pool(1).await;
        let elsewhere = OrmContext::new(Orm::new(other.clone()));
        manager.register_context(&elsewhere).unwrap();
        sql.add_statement_task(insert("a1", 1)).unwrap();
        elsewhere.add_statement_task(insert("b1", 2)).unwrap();
        let started = Instant::now();
        manager.execute().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(count(&pool).await, 1);
        assert_eq!(count(&other).await, 1);

        let mut manager = TransactionManager::new();
        let orm = OrmContext::new(Orm::new(pool.clone()));
        manager.register_context(&orm).unwrap();
        orm.add_statement_task(insert("a2", 3)).unwrap();
        manager.execute().await.unwrap();
        assert_eq!(count(&pool).await, 2);
    }

    #[tokio::test]
    async fn in_memory_pool_keeps_one_database() {
        init_logs();
        let pool = silent_logs! { SqlitePool::connect("sqlite://:memory:", 3).await.unwrap() };
        assert_eq!(pool.size(), 1);
        let other = SqlitePool::connect("sqlite://:memory:", 1).await.unwrap();
        assert_ne!(pool.resource(), other.resource());
        Orm::new(pool.clone()).sync::<Account>().await.unwrap();

        let mut manager = TransactionManager::new();
        let sql = SqlContext::new(pool.clone());
        manager.register_context(&sql).unwrap();
        sql.add_statement_task(insert("a1", 10)).unwrap();
        manager.execute().await.unwrap();
        assert_eq!(count(&pool).await, 1);
        let mut connection = other.acquire().await.unwrap();
        silent_logs! {
            assert!(
                connection
                    .execute(&Statement::new("SELECT * FROM Accounts"))
                    .await
                    .is_err()
            );
        };
    }
}

#[cfg(test)]
mod tests {
    use multitxn::{
        FutureExt, Resources, ResourcesConfig, Statement, TransactionManager, TxnError, Value,
        docstore::Filter as DocumentFilter,
    };
    use multitxn_tests::{
        ACTIVITY, Account, create_account, credit_queue, delete_account, get_account, init_logs,
        list_accounts, setup, silent_logs, update_account,
    };
    use serde_json::json;
    use tempfile::TempDir;

    async fn resources() -> (TempDir, Resources) {
        init_logs();
        let dir = tempfile::tempdir().expect("Could not create a temporary directory");
        let config = ResourcesConfig {
            sqlite_url: format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("bank.sqlite").display()
            ),
            pool_size: 3,
        };
        let resources = Resources::connect(&config)
            .await
            .expect("Could not connect the resources");
        setup(&resources).await.expect("Could not create the tables");
        (dir, resources)
    }

    fn balances(accounts: &Value) -> Vec<(String, i64)> {
        accounts
            .as_list()
            .expect("Expected a list of accounts")
            .iter()
            .map(|v| {
                (
                    v.get("accountId").and_then(Value::as_str).unwrap().to_string(),
                    v.get("balance").and_then(Value::as_i64).unwrap(),
                )
            })
            .collect()
    }

    fn descriptions(resources: &Resources, id: &str) -> Vec<String> {
        resources
            .documents()
            .find(
                ACTIVITY,
                &DocumentFilter::eq("accountId", id),
                &Default::default(),
            )
            .into_iter()
            .map(|v| v["desc"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn create_and_read_back() {
        let (_dir, resources) = resources().await;
        let accounts = create_account(&resources, Account::new("a1", 100), "Alice")
            .await
            .unwrap();
        assert_eq!(balances(&accounts), [("a1".to_string(), 100)]);
        create_account(&resources, Account::new("a0", 5), "Bob")
            .await
            .unwrap();
        assert_eq!(
            balances(&list_accounts(&resources).await.unwrap()),
            [("a0".to_string(), 5), ("a1".to_string(), 100)]
        );

        let detail = get_account(&resources, "a1").await.unwrap();
        assert_eq!(
            balances(detail.get("account").unwrap()),
            [("a1".to_string(), 100)]
        );
        let activities = detail.get("activities").and_then(Value::as_list).unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(
            activities[0].get("desc").and_then(Value::as_str),
            Some("Account Alice is created.")
        );
        resources.close();
    }

    #[tokio::test]
    async fn update_logs_the_difference() {
        let (_dir, resources) = resources().await;
        create_account(&resources, Account::new("a1", 100), "Alice")
            .await
            .unwrap();
        let accounts = update_account(&resources, "a1", 70).await.unwrap();
        assert_eq!(balances(&accounts), [("a1".to_string(), 70)]);
        update_account(&resources, "a1", 95).await.unwrap();
        assert_eq!(
            descriptions(&resources, "a1"),
            [
                "Account Alice is created.",
                "Account updated. Withdraw amount: -30",
                "Account updated. Deposit amount: 25",
            ]
        );
        assert_eq!(credit_queue(&resources).await.unwrap(), Value::List(vec![]));
    }

    #[tokio::test]
    async fn zero_balance_pushes_one_credit_lead() {
        let (_dir, resources) = resources().await;
        create_account(&resources, Account::new("a1", 100), "Alice")
            .await
            .unwrap();
        update_account(&resources, "a1", 0).await.unwrap();
        update_account(&resources, "a1", 10).await.unwrap();
        let queue = credit_queue(&resources).await.unwrap();
        let queue = queue.as_list().unwrap();
        assert_eq!(queue.len(), 1);
        assert!(
            queue[0]
                .as_str()
                .unwrap()
                .starts_with("Credit lead for account with id a1 at ")
        );
    }

    #[tokio::test]
    async fn negative_balance_changes_nothing() {
        let (_dir, resources) = resources().await;
        create_account(&resources, Account::new("a1", 100), "Alice")
            .await
            .unwrap();
        let error = silent_logs! { update_account(&resources, "a1", -5).await.unwrap_err() };
        assert!(matches!(error, TxnError::TaskFailed { .. }), "{:?}", error);
        assert_eq!(error.to_json()["kind"], json!("TaskFailed"));
        assert_eq!(
            balances(&list_accounts(&resources).await.unwrap()),
            [("a1".to_string(), 100)]
        );
        assert_eq!(descriptions(&resources, "a1"), ["Account Alice is created."]);
        assert_eq!(credit_queue(&resources).await.unwrap(), Value::List(vec![]));
    }

    #[tokio::test]
    async fn database_check_rolls_back_the_activity() {
        let (_dir, resources) = resources().await;
        create_account(&resources, Account::new("a1", 100), "Alice")
            .await
            .unwrap();
        let mut manager = TransactionManager::new();
        let documents = resources.document_context();
        let sql = resources.sql_context();
        manager.register_context(&documents).unwrap();
        manager.register_context(&sql).unwrap();
        documents
            .add_function_task(|_, session, _| {
                async move {
                    session.insert_one(ACTIVITY, json!({"accountId": "a1", "desc": "bypass"}))?;
                    Ok(Value::Null)
                }
                .boxed()
            })
            .unwrap();
        sql.add_statement_task(
            Statement::new("UPDATE Accounts SET balance=:balance WHERE accountId=:accountId")
                .bind("balance", -5)
                .bind("accountId", "a1"),
        )
        .unwrap();

        let error = silent_logs! { manager.execute().await.unwrap_err() };
        let cause = format!("{:#}", error.cause().unwrap());
        assert!(cause.contains("CHECK constraint failed"), "{}", cause);
        assert_eq!(descriptions(&resources, "a1"), ["Account Alice is created."]);
        assert_eq!(
            balances(&list_accounts(&resources).await.unwrap()),
            [("a1".to_string(), 100)]
        );
    }

    #[tokio::test]
    async fn invalid_accounts_are_rejected() {
        let (_dir, resources) = resources().await;
        create_account(&resources, Account::new("a1", 100), "Alice")
            .await
            .unwrap();
        silent_logs! {
            let duplicate = create_account(&resources, Account::new("a1", 1), "Again").await;
            assert!(matches!(duplicate, Err(TxnError::TaskFailed { .. })));
            let empty = create_account(&resources, Account::new("", 1), "Nobody").await;
            assert!(matches!(empty, Err(TxnError::TaskFailed { .. })));
            let missing = update_account(&resources, "zz", 1).await;
            assert!(matches!(missing, Err(TxnError::TaskFailed { .. })));
        };
        assert_eq!(descriptions(&resources, "a1"), ["Account Alice is created."]);
        assert_eq!(resources.documents().count(ACTIVITY, &DocumentFilter::all()), 1);
    }

    #[tokio::test]
    async fn delete_removes_the_account() {
        let (_dir, resources) = resources().await;
        create_account(&resources, Account::new("a1", 100), "Alice")
            .await
            .unwrap();
        create_account(&resources, Account::new("a2", 20), "Bob")
            .await
            .unwrap();
        let accounts = delete_account(&resources, "a1").await.unwrap();
        assert_eq!(balances(&accounts), [("a2".to_string(), 20)]);
        assert_eq!(
            descriptions(&resources, "a1"),
            ["Account Alice is created.", "Account deleted"]
        );
        let detail = get_account(&resources, "a1").await.unwrap();
        assert_eq!(detail.get("account"), Some(&Value::List(vec![])));
    }

    #[tokio::test]
    async fn one_relational_context_per_manager() {
        let (_dir, resources) = resources().await;
        let mut manager = TransactionManager::new();
        manager.register_context(&resources.sql_context()).unwrap();
        manager.register_context(&resources.document_context()).unwrap();
        let error = manager
            .register_context(&resources.orm_context())
            .unwrap_err();
        assert_eq!(error.to_json()["kind"], json!("ResourceConflict"));
        assert_eq!(manager.contexts().len(), 2);
    }

    #[tokio::test]
    async fn in_memory_database() {
        init_logs();
        let config = ResourcesConfig {
            sqlite_url: "sqlite://:memory:".into(),
            pool_size: 3,
        };
        let resources = silent_logs! { Resources::connect(&config).await.unwrap() };
        assert_eq!(resources.pool().size(), 1);
        setup(&resources).await.unwrap();
        create_account(&resources, Account::new("a1", 100), "Alice")
            .await
            .unwrap();
        update_account(&resources, "a1", 0).await.unwrap();
        assert_eq!(
            balances(&list_accounts(&resources).await.unwrap()),
            [("a1".to_string(), 0)]
        );
        let queue = credit_queue(&resources).await.unwrap();
        assert_eq!(queue.as_list().map(|v| v.len()), Some(1));
    }
}

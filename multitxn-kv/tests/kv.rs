#[cfg(test)]
mod tests {
    use multitxn_core::{Error, FunctionContext, FutureExt, TransactionManager, TxnError, Value};
    use multitxn_kv::{KvContext, KvStore};
    use multitxn_tests::{init_logs, silent_logs};

    const QUEUE: &str = "CREDIT_PROMOTION_QUEUE";

    #[tokio::test]
    async fn pipeline_applies_on_commit() {
        init_logs();
        let store = KvStore::new();
        let context = KvContext::new(store.clone());
        let mut manager = TransactionManager::new();
        manager.register_context(&context).unwrap();
        let position = context
            .add_function_task(|_, pipeline, _| {
                async move {
                    pipeline.rpush(QUEUE, ["first"]);
                    let position = pipeline.rpush(QUEUE, ["second"]);
                    assert!(!pipeline.store().exists(QUEUE));
                    Ok(Value::from(position as u32))
                }
                .boxed()
            })
            .unwrap();
        manager.execute().await.unwrap();
        assert_eq!(position.get_result().unwrap(), Value::Int64(1));
        assert_eq!(store.lrange(QUEUE, 0, -1).unwrap(), ["first", "second"]);
    }

    #[tokio::test]
    async fn failure_elsewhere_discards_the_pipeline() {
        init_logs();
        let store = KvStore::new();
        let kv = KvContext::new(store.clone());
        let function = FunctionContext::default();
        let mut manager = TransactionManager::new();
        manager.register_context(&kv).unwrap();
        manager.register_context(&function).unwrap();
        kv.add_function_task(|_, pipeline, _| {
            async move {
                pipeline.rpush(QUEUE, ["lead"]);
                pipeline.set("last", "lead");
                Ok(Value::Null)
            }
            .boxed()
        })
        .unwrap();
        function
            .add_function_task(|_, _, _| async move { Err(Error::msg("rejected")) }.boxed())
            .unwrap();

        let error = silent_logs! { manager.execute().await.unwrap_err() };
        assert!(matches!(error, TxnError::TaskFailed { .. }));
        assert!(!store.exists(QUEUE));
        assert!(!store.exists("last"));
    }

    #[tokio::test]
    async fn type_error_rejects_the_whole_batch() {
        init_logs();
        let store = KvStore::new();
        let context = KvContext::new(store.clone());
        let mut manager = TransactionManager::new();
        manager.register_context(&context).unwrap();
        context
            .add_function_task(|_, pipeline, _| {
                async move {
                    pipeline.set("counter", "1");
                    pipeline.rpush("counter", ["x"]);
                    Ok(Value::Null)
                }
                .boxed()
            })
            .unwrap();

        let error = silent_logs! { manager.execute().await.unwrap_err() };
        assert!(matches!(error, TxnError::CommitFailed { .. }));
        assert!(format!("{}", error).contains("WRONGTYPE"));
        assert!(!store.exists("counter"));
    }
}

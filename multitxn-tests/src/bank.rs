use crate::Account;
use multitxn::Resources;
use multitxn_core::{
    Error, FutureExt, Result, RowLabeled, Statement, Task, TransactionManager, TxnError, Value,
};
use multitxn_docstore::{Filter as DocumentFilter, FindOptions, Sort, documents_value};
use multitxn_sqlite::{Entity, Filter};
use serde_json::{Value as Json, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Collection logging what happened to every account.
pub const ACTIVITY: &str = "Activity";
/// List receiving a lead whenever an account is left without money.
pub const CREDIT_PROMOTION_QUEUE: &str = "CREDIT_PROMOTION_QUEUE";

const LIST_ACCOUNTS: &str = "SELECT * FROM Accounts ORDER BY accountId";

/// Create the tables the scenarios rely on.
pub async fn setup(resources: &Resources) -> Result<()> {
    resources.orm().sync::<Account>().await
}

pub fn now() -> Result<String> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}

/// Rows of a statement task as a list of column maps.
pub fn rows(task: &Task) -> Result<Value, TxnError> {
    task.with_result(|v| Value::List(v.rows().iter().map(RowLabeled::to_value).collect()))
}

fn activity(account_id: &str, desc: impl Into<String>) -> Result<Json> {
    Ok(json!({
        "accountId": account_id,
        "date": now()?,
        "desc": desc.into(),
    }))
}

/// Every account ordered by id.
pub async fn list_accounts(resources: &Resources) -> Result<Value, TxnError> {
    let mut manager = TransactionManager::new();
    let sql = resources.sql_context();
    manager.register_context(&sql)?;
    let accounts = sql.add_statement_task(LIST_ACCOUNTS)?;
    manager.execute().await?;
    rows(&accounts)
}

/// The account rows matching `id` and its activities, oldest first.
pub async fn get_account(resources: &Resources, id: &str) -> Result<Value, TxnError> {
    let mut manager = TransactionManager::new();
    let sql = resources.sql_context();
    let documents = resources.document_context();
    manager.register_context(&sql)?;
    manager.register_context(&documents)?;
    let account = sql.add_statement_task(
        Statement::new("SELECT * FROM Accounts WHERE accountId=:accountId").bind("accountId", id),
    )?;
    let filter = DocumentFilter::eq("accountId", id);
    let activities = documents.add_function_task(move |_, session, _| {
        async move {
            Ok(documents_value(session.find(
                ACTIVITY,
                &filter,
                &FindOptions::default().sort(Sort::asc("date")),
            )))
        }
        .boxed()
    })?;
    manager.execute().await?;
    Ok(Value::Map(
        [
            ("account".to_string(), rows(&account)?),
            ("activities".to_string(), activities.get_result()?),
        ]
        .into(),
    ))
}

/// Insert the account, log its creation and return the account list.
pub async fn create_account(
    resources: &Resources,
    account: Account,
    account_name: &str,
) -> Result<Value, TxnError> {
    let mut manager = TransactionManager::new();
    let orm = resources.orm_context();
    let documents = resources.document_context();
    manager.register_context(&orm)?;
    manager.register_context(&documents)?;
    let created = orm.add_function_task(move |_, session, _| {
        async move {
            session.insert(&account).await?;
            Ok(account.to_value())
        }
        .boxed()
    })?;
    let accounts = orm.add_statement_task(LIST_ACCOUNTS)?;
    let desc = format!("Account {} is created.", account_name);
    documents.add_function_task(move |_, session, _| {
        async move {
            let account = created.get_result()?;
            let id = account
                .get("accountId")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::msg("The created account has no id"))?;
            let document = session.insert_one(ACTIVITY, activity(id, desc)?)?;
            Ok(Json::Object(document).into())
        }
        .boxed()
    })?;
    manager.execute().await?;
    rows(&accounts)
}

/// Set the balance of an account, log the difference and return the account list.
///
/// An account left at zero gets a credit lead pushed on [`CREDIT_PROMOTION_QUEUE`].
pub async fn update_account(
    resources: &Resources,
    id: &str,
    balance: i64,
) -> Result<Value, TxnError> {
    let mut manager = TransactionManager::new();
    let orm = resources.orm_context();
    let documents = resources.document_context();
    let kv = resources.kv_context();
    manager.register_context(&orm)?;
    manager.register_context(&documents)?;
    manager.register_context(&kv)?;

    let filter = Filter::eq("accountId", id);
    let initial = {
        let filter = filter.clone();
        let id = id.to_string();
        orm.add_function_task(move |_, session, _| {
            async move {
                match session.find_one::<Account>(&filter).await? {
                    Some(account) => Ok(account.to_value()),
                    None => Err(Error::msg(format!("Account `{}` does not exist", id))),
                }
            }
            .boxed()
        })?
    };
    orm.add_function_task(move |_, session, _| {
        async move {
            let updated = session
                .update::<Account>(&[("balance", balance.into())], &filter)
                .await?;
            Ok(Value::Int64(updated as i64))
        }
        .boxed()
    })?;
    let accounts = orm.add_statement_task(LIST_ACCOUNTS)?;
    {
        let id = id.to_string();
        documents.add_function_task(move |_, session, _| {
            async move {
                let initial = initial
                    .with_result(|v| v.get("balance").and_then(Value::as_i64))?
                    .ok_or_else(|| Error::msg("The initial account has no balance"))?;
                let diff = balance - initial;
                let desc = format!(
                    "Account updated. {} amount: {}",
                    if diff < 0 { "Withdraw" } else { "Deposit" },
                    diff
                );
                let document = session.insert_one(ACTIVITY, activity(&id, desc)?)?;
                Ok(Json::Object(document).into())
            }
            .boxed()
        })?;
    }
    {
        let id = id.to_string();
        manager.add_deferred_hook(move |_| {
            if balance != 0 {
                return Ok(Vec::new());
            }
            let lead = kv.add_function_task(move |_, pipeline, _| {
                async move {
                    let position = pipeline.rpush(
                        CREDIT_PROMOTION_QUEUE,
                        [format!("Credit lead for account with id {} at {}", id, now()?)],
                    );
                    Ok(Value::Int64(position as i64))
                }
                .boxed()
            })?;
            Ok(vec![lead])
        })?;
    }

    manager.execute().await?;
    rows(&accounts)
}

/// Delete the account, log it and return the account list.
pub async fn delete_account(resources: &Resources, id: &str) -> Result<Value, TxnError> {
    let mut manager = TransactionManager::new();
    let sql = resources.sql_context();
    let documents = resources.document_context();
    manager.register_context(&sql)?;
    manager.register_context(&documents)?;
    sql.add_statement_task(
        Statement::new("DELETE FROM Accounts WHERE accountId=:accountId").bind("accountId", id),
    )?;
    let accounts = sql.add_statement_task(LIST_ACCOUNTS)?;
    let id = id.to_string();
    documents.add_function_task(move |_, session, _| {
        async move {
            let document = session.insert_one(ACTIVITY, activity(&id, "Account deleted")?)?;
            Ok(Json::Object(document).into())
        }
        .boxed()
    })?;
    manager.execute().await?;
    rows(&accounts)
}

/// Content of the credit promotion queue.
pub async fn credit_queue(resources: &Resources) -> Result<Value, TxnError> {
    let mut manager = TransactionManager::new();
    let kv = resources.kv_context();
    manager.register_context(&kv)?;
    let queue = kv.add_function_task(|_, pipeline, _| {
        async move {
            Ok(Value::from(
                pipeline.store().lrange(CREDIT_PROMOTION_QUEUE, 0, -1)?,
            ))
        }
        .boxed()
    })?;
    manager.execute().await?;
    queue.get_result()
}

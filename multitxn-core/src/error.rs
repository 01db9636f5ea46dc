use crate::{Error, TaskId};
use serde::Serialize;
use serde_json::json;
use std::{
    fmt::{self, Display},
    sync::Arc,
};

/// Outcome of the commit phase for one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommitStatus {
    Committed,
    Failed,
    /// Did not commit because an earlier context failed, rolled back instead.
    RolledBack,
    /// Neither committed nor rolled back (the rollback attempt failed too).
    NotCommitted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextCommitStatus {
    pub context: String,
    pub status: CommitStatus,
}

impl Display for ContextCommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.context, self.status)
    }
}

pub(crate) struct StatusList<'a>(pub &'a [ContextCommitStatus]);

impl Display for StatusList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, status) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", status)?;
        }
        Ok(())
    }
}

/// Failures of the coordinator itself.
///
/// Backend errors travel inside as `Arc<anyhow::Error>` so the same cause can be handed out more
/// than once (a failed task reports it on every `get_result` call).
#[derive(Debug, Clone, thiserror::Error)]
pub enum TxnError {
    #[error("Context `{context}` could not begin its transaction: {cause:#}")]
    BeginFailed { context: String, cause: Arc<Error> },
    #[error("Task {task} on context `{context}` failed: {cause:#}")]
    TaskFailed {
        task: TaskId,
        context: String,
        cause: Arc<Error>,
    },
    #[error("The result of task {0} is not ready")]
    ResultNotReady(TaskId),
    #[error(
        "Context `{context}` failed to commit after all tasks succeeded, the commit is partial [{}]: {cause:#}",
        StatusList(.statuses)
    )]
    CommitFailed {
        context: String,
        cause: Arc<Error>,
        statuses: Vec<ContextCommitStatus>,
    },
    #[error("Context `{context}` failed to roll back: {cause:#}")]
    RollbackError { context: String, cause: Arc<Error> },
    #[error("The transaction manager was already executed")]
    AlreadyExecuted,
    #[error("The transaction manager is already running")]
    AlreadyRunning,
    #[error("Context `{0}` is already registered on a transaction manager")]
    ContextAlreadyRegistered(String),
    #[error(
        "Context `{context}` cannot join a manager where `{other}` already holds the transaction on `{resource}`"
    )]
    ResourceConflict {
        context: String,
        other: String,
        resource: String,
    },
    #[error("A deferred hook is already registered")]
    HookAlreadyRegistered,
    #[error("The deferred hook failed: {0:#}")]
    HookFailed(Arc<Error>),
    #[error("Task {0} returned by the deferred hook was not created by it on a registered context")]
    ForeignTask(TaskId),
}

impl TxnError {
    pub fn kind(&self) -> &'static str {
        match self {
            TxnError::BeginFailed { .. } => "BeginFailed",
            TxnError::TaskFailed { .. } => "TaskFailed",
            TxnError::ResultNotReady(..) => "ResultNotReady",
            TxnError::CommitFailed { .. } => "CommitFailed",
            TxnError::RollbackError { .. } => "RollbackError",
            TxnError::AlreadyExecuted => "AlreadyExecuted",
            TxnError::AlreadyRunning => "AlreadyRunning",
            TxnError::ContextAlreadyRegistered(..) => "ContextAlreadyRegistered",
            TxnError::ResourceConflict { .. } => "ResourceConflict",
            TxnError::HookAlreadyRegistered => "HookAlreadyRegistered",
            TxnError::HookFailed(..) => "HookFailed",
            TxnError::ForeignTask(..) => "ForeignTask",
        }
    }

    /// The backend error at the origin of this failure, if any.
    pub fn cause(&self) -> Option<&Error> {
        match self {
            TxnError::BeginFailed { cause, .. }
            | TxnError::TaskFailed { cause, .. }
            | TxnError::CommitFailed { cause, .. }
            | TxnError::RollbackError { cause, .. }
            | TxnError::HookFailed(cause) => Some(&**cause),
            _ => None,
        }
    }

    /// Serialized form handed to the caller's error response.
    pub fn to_json(&self) -> serde_json::Value {
        let mut result = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        match self {
            TxnError::BeginFailed { context, .. } | TxnError::RollbackError { context, .. } => {
                result["context"] = json!(context);
            }
            TxnError::TaskFailed { task, context, .. } => {
                result["context"] = json!(context);
                result["task"] = json!(task.0);
            }
            TxnError::CommitFailed {
                context, statuses, ..
            } => {
                result["context"] = json!(context);
                result["statuses"] = json!(statuses);
            }
            TxnError::ResultNotReady(task) | TxnError::ForeignTask(task) => {
                result["task"] = json!(task.0);
            }
            TxnError::ContextAlreadyRegistered(context) => {
                result["context"] = json!(context);
            }
            TxnError::ResourceConflict {
                context,
                other,
                resource,
            } => {
                result["context"] = json!(context);
                result["other"] = json!(other);
                result["resource"] = json!(resource);
            }
            _ => {}
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commit_failed_message() {
        let error = TxnError::CommitFailed {
            context: "docstore#2".into(),
            cause: Arc::new(Error::msg("write conflict")),
            statuses: vec![
                ContextCommitStatus {
                    context: "sqlite#1".into(),
                    status: CommitStatus::Committed,
                },
                ContextCommitStatus {
                    context: "docstore#2".into(),
                    status: CommitStatus::Failed,
                },
            ],
        };
        let message = error.to_string();
        assert!(message.contains("sqlite#1: Committed, docstore#2: Failed"));
        assert!(message.ends_with("write conflict"));
        let json = error.to_json();
        assert_eq!(json["kind"], json!("CommitFailed"));
        assert_eq!(json["statuses"][1]["status"], json!("Failed"));
    }

    #[test]
    fn cause_is_shared() {
        let cause = Arc::new(Error::msg("balance must not be negative"));
        let error = TxnError::TaskFailed {
            task: TaskId(4),
            context: "orm#1".into(),
            cause: cause.clone(),
        };
        let cloned = error.clone();
        assert!(Arc::ptr_eq(
            &cause,
            match &cloned {
                TxnError::TaskFailed { cause, .. } => cause,
                _ => unreachable!(),
            }
        ));
        assert_eq!(
            error.cause().map(|v| v.to_string()).as_deref(),
            Some("balance must not be negative")
        );
        assert_eq!(error.to_json()["task"], json!(4));
    }
}

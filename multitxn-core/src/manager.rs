use crate::{
    Admission, CommitStatus, Context, ContextCommitStatus, ContextState, DeferredHook, Result,
    Task, TaskId, TxnError,
};
use std::{
    collections::HashSet,
    fmt::{self, Debug},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Running,
    AwaitingHook,
    Committing,
    RollingBack,
    Committed,
    Failed,
}

/// Runs the tasks of several contexts as one best-effort atomic unit.
///
/// Single use: register the contexts, populate them, optionally add a deferred hook, then call
/// [`TransactionManager::execute`] once. Tasks run one at a time, contexts in registration order
/// and tasks in append order, so a task can read the result of any task that precedes it.
///
/// ```rust,ignore
/// let mut manager = TransactionManager::new();
/// let sql = SqlContext::new(resources.sql().clone());
/// manager.register_context(&sql)?;
/// let accounts = sql.add_statement_task("SELECT * FROM Accounts ORDER BY accountId")?;
/// manager.execute().await?;
/// let rows = accounts.get_result()?;
/// ```
pub struct TransactionManager {
    id: u64,
    state: ManagerState,
    contexts: Vec<Box<dyn Context>>,
    hook: Option<Box<dyn DeferredHook>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            state: ManagerState::Idle,
            contexts: Vec::new(),
            hook: None,
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Registered contexts in registration order.
    pub fn contexts(&self) -> impl ExactSizeIterator<Item = &dyn Context> {
        self.contexts.iter().map(|v| v.as_ref())
    }

    /// Attach a context, it will be opened, run and committed in registration order.
    pub fn register_context<C: Context + Clone + 'static>(
        &mut self,
        context: &C,
    ) -> Result<(), TxnError> {
        if self.state != ManagerState::Idle {
            return Err(TxnError::AlreadyRunning);
        }
        if let Some(resource) = context.exclusive_resource()
            && let Some(other) = self
                .contexts
                .iter()
                .find(|v| v.exclusive_resource().as_ref() == Some(&resource))
        {
            return Err(TxnError::ResourceConflict {
                context: context.name().into(),
                other: other.name().into(),
                resource,
            });
        }
        context.attach()?;
        log::trace!(
            "Context `{}` registered on transaction manager #{}",
            context.name(),
            self.id
        );
        self.contexts.push(Box::new(context.clone()));
        Ok(())
    }

    /// Register the deferred hook, there can be only one per manager.
    pub fn add_deferred_hook<F>(&mut self, hook: F) -> Result<(), TxnError>
    where
        F: FnOnce(&[Task]) -> Result<Vec<Task>> + Send + 'static,
    {
        self.set_deferred_hook(hook)
    }

    pub fn set_deferred_hook(&mut self, hook: impl DeferredHook) -> Result<(), TxnError> {
        if self.state != ManagerState::Idle {
            return Err(TxnError::AlreadyRunning);
        }
        if self.hook.is_some() {
            return Err(TxnError::HookAlreadyRegistered);
        }
        self.hook = Some(Box::new(hook));
        Ok(())
    }

    /// Begin, run, invoke the deferred hook, commit. Rolls everything back on the first failure.
    ///
    /// Returns every executed task in run order. A commit failure is not undone: the contexts
    /// committed before it stay committed and the error lists the status of each context.
    pub async fn execute(&mut self) -> Result<Vec<Task>, TxnError> {
        if self.state != ManagerState::Idle {
            return Err(TxnError::AlreadyExecuted);
        }
        self.state = ManagerState::Running;
        self.admit(Admission::Sealed);
        log::debug!(
            "Transaction manager #{} executing {} contexts",
            self.id,
            self.contexts.len()
        );
        let result = self.run().await;
        self.admit(Admission::Closed);
        match result {
            Ok(tasks) => {
                self.state = ManagerState::Committed;
                log::debug!(
                    "Transaction manager #{} committed {} tasks",
                    self.id,
                    tasks.len()
                );
                Ok(tasks)
            }
            Err(error) => {
                self.state = ManagerState::Failed;
                log::error!("Transaction manager #{} failed: {}", self.id, error);
                Err(error)
            }
        }
    }

    async fn run(&mut self) -> Result<Vec<Task>, TxnError> {
        let mut begin_error = None;
        for context in &self.contexts {
            if let Err(error) = context.begin().await {
                begin_error = Some(TxnError::BeginFailed {
                    context: context.name().into(),
                    cause: Arc::new(error),
                });
                break;
            }
        }
        if let Some(error) = begin_error {
            log::error!("{}", error);
            self.rollback_opened().await;
            return Err(error);
        }

        let mut executed = Vec::new();
        if let Err(error) = self.run_queued(&mut executed).await {
            self.rollback_opened().await;
            return Err(error);
        }

        if let Some(hook) = self.hook.take() {
            self.state = ManagerState::AwaitingHook;
            self.admit(Admission::Deferred);
            let returned = hook.invoke(&executed);
            self.admit(Admission::Sealed);
            let confirmed = match returned {
                Ok(tasks) => self.confirm_deferred(&tasks),
                Err(error) => {
                    self.confirm_deferred(&[]).ok();
                    Err(TxnError::HookFailed(Arc::new(error)))
                }
            };
            if let Err(error) = confirmed {
                log::error!("{}", error);
                self.rollback_opened().await;
                return Err(error);
            }
            self.state = ManagerState::Running;
            if let Err(error) = self.run_queued(&mut executed).await {
                self.rollback_opened().await;
                return Err(error);
            }
        }

        self.state = ManagerState::Committing;
        self.commit_all().await?;
        Ok(executed)
    }

    async fn run_queued(&mut self, executed: &mut Vec<Task>) -> Result<(), TxnError> {
        for context in &self.contexts {
            context.run_pending(executed).await?;
        }
        Ok(())
    }

    fn confirm_deferred(&self, tasks: &[Task]) -> Result<(), TxnError> {
        let keep = tasks.iter().map(Task::id).collect::<HashSet<_>>();
        let confirmed = self
            .contexts
            .iter()
            .flat_map(|context| context.confirm_deferred(&keep))
            .collect::<HashSet<TaskId>>();
        match tasks.iter().find(|v| !confirmed.contains(&v.id())) {
            Some(foreign) => Err(TxnError::ForeignTask(foreign.id())),
            None => {
                log::debug!(
                    "Deferred hook of transaction manager #{} appended {} tasks",
                    self.id,
                    confirmed.len()
                );
                Ok(())
            }
        }
    }

    async fn commit_all(&mut self) -> Result<(), TxnError> {
        let mut statuses = self
            .contexts
            .iter()
            .map(|v| ContextCommitStatus {
                context: v.name().into(),
                status: CommitStatus::NotCommitted,
            })
            .collect::<Vec<_>>();
        for (i, context) in self.contexts.iter().enumerate() {
            match context.commit().await {
                Ok(()) => {
                    log::debug!("Context `{}` committed", context.name());
                    statuses[i].status = CommitStatus::Committed;
                }
                Err(error) => {
                    statuses[i].status = CommitStatus::Failed;
                    self.state = ManagerState::RollingBack;
                    for (j, later) in self.contexts.iter().enumerate().skip(i + 1).rev() {
                        match later.rollback().await {
                            Ok(()) => statuses[j].status = CommitStatus::RolledBack,
                            Err(cause) => log_rollback_error(later.as_ref(), cause),
                        }
                    }
                    return Err(TxnError::CommitFailed {
                        context: context.name().into(),
                        cause: Arc::new(error),
                        statuses,
                    });
                }
            }
        }
        Ok(())
    }

    /// Roll back every open context in reverse registration order, failures are only logged.
    async fn rollback_opened(&mut self) {
        self.state = ManagerState::RollingBack;
        for context in self.contexts.iter().rev() {
            if context.state() != ContextState::Open {
                continue;
            }
            match context.rollback().await {
                Ok(()) => log::debug!("Context `{}` rolled back", context.name()),
                Err(cause) => log_rollback_error(context.as_ref(), cause),
            }
        }
    }

    fn admit(&self, admission: Admission) {
        for context in &self.contexts {
            context.set_admission(admission);
        }
    }
}

fn log_rollback_error(context: &dyn Context, cause: crate::Error) {
    let error = TxnError::RollbackError {
        context: context.name().into(),
        cause: Arc::new(cause),
    };
    log::warn!("{}", error);
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("id", &self.id)
            .field("state", &self.state)
            .field(
                "contexts",
                &self.contexts.iter().map(|v| v.name()).collect::<Vec<_>>(),
            )
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

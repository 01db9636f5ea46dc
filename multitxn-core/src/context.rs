use crate::{Error, Result, Statement, Task, TaskId, TxnError, Value};
use futures::{FutureExt, future::BoxFuture};
use std::{
    collections::{HashSet, VecDeque},
    fmt::{self, Debug, Display},
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub u64);

impl Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Unopened,
    Open,
    Committed,
    RolledBack,
}

/// Who may append tasks to a context right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Any caller, the owning manager did not start yet.
    Open,
    /// Nobody, the owning manager is running.
    Sealed,
    /// Only the deferred hook, during its single invocation.
    Deferred,
    /// Nobody, the owning manager finished.
    Closed,
}

/// A transactional data source a context can drive.
///
/// Implementors are cheap handles (a pool, a client, a store) and `Transaction` is the session
/// that exists between `begin` and `commit`/`rollback`.
pub trait Backend: Send + Sync + 'static {
    type Transaction: Send + 'static;

    /// Short label used to name contexts in logs and errors.
    const KIND: &'static str;

    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;

    /// Make the transaction's effects durable.
    ///
    /// On error nothing must remain half applied and the session must be released.
    fn commit(&self, transaction: Self::Transaction) -> impl Future<Output = Result<()>> + Send;

    fn rollback(&self, transaction: Self::Transaction)
    -> impl Future<Output = Result<()>> + Send;

    /// Resource that tolerates a single open transaction at a time.
    ///
    /// Two contexts reporting the same resource would wait on each other inside one manager, so
    /// the manager refuses to register the second one.
    fn exclusive_resource(&self) -> Option<String> {
        None
    }
}

/// Backends that understand declarative statements with named parameters.
pub trait StatementBackend: Backend {
    fn run_statement<'t>(
        &'t self,
        transaction: &'t mut Self::Transaction,
        statement: &'t Statement,
    ) -> impl Future<Output = Result<Value>> + Send + 't;
}

/// Executable task payload.
///
/// Receives the backend native handle, the open transaction and the task itself. Dependencies on
/// other tasks are expressed by holding their [`Task`] handles.
pub trait TaskFunction<B: Backend>: Send + 'static {
    fn execute<'a>(
        self: Box<Self>,
        backend: &'a B,
        transaction: &'a mut B::Transaction,
        task: &'a Task,
    ) -> BoxFuture<'a, Result<Value>>;
}

impl<B, F> TaskFunction<B> for F
where
    B: Backend,
    F: for<'a> FnOnce(&'a B, &'a mut B::Transaction, &'a Task) -> BoxFuture<'a, Result<Value>>
        + Send
        + 'static,
{
    fn execute<'a>(
        self: Box<Self>,
        backend: &'a B,
        transaction: &'a mut B::Transaction,
        task: &'a Task,
    ) -> BoxFuture<'a, Result<Value>> {
        (*self)(backend, transaction, task)
    }
}

type StatementRunner<B> = for<'a> fn(
    &'a B,
    &'a mut <B as Backend>::Transaction,
    &'a Statement,
) -> BoxFuture<'a, Result<Value>>;

fn run_statement<'a, B: StatementBackend>(
    backend: &'a B,
    transaction: &'a mut B::Transaction,
    statement: &'a Statement,
) -> BoxFuture<'a, Result<Value>> {
    backend.run_statement(transaction, statement).boxed()
}

enum Payload<B: Backend> {
    Statement {
        statement: Statement,
        runner: StatementRunner<B>,
    },
    Function(Box<dyn TaskFunction<B>>),
}

struct Entry<B: Backend> {
    task: Task,
    payload: Payload<B>,
    /// Appended by the deferred hook and not yet confirmed by its return value.
    deferred: bool,
}

struct Gate<B: Backend> {
    state: ContextState,
    admission: Admission,
    registered: bool,
    queue: VecDeque<Entry<B>>,
}

struct ContextShared<B: Backend> {
    id: ContextId,
    name: Arc<str>,
    backend: B,
    gate: Mutex<Gate<B>>,
    transaction: tokio::sync::Mutex<Option<B::Transaction>>,
}

/// Context over any [`Backend`]: owns the ordered task queue and the backend session.
///
/// Clones share the same queue, register one clone on a manager and keep another to append tasks.
pub struct TxnContext<B: Backend>(Arc<ContextShared<B>>);

impl<B: Backend> TxnContext<B> {
    pub fn new(backend: B) -> Self {
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        Self::with_id(id, format!("{}#{}", B::KIND, id.0), backend)
    }

    pub fn named(name: impl Into<String>, backend: B) -> Self {
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        Self::with_id(id, name.into(), backend)
    }

    fn with_id(id: ContextId, name: String, backend: B) -> Self {
        Self(Arc::new(ContextShared {
            id,
            name: name.into(),
            backend,
            gate: Mutex::new(Gate {
                state: ContextState::Unopened,
                admission: Admission::Open,
                registered: false,
                queue: VecDeque::new(),
            }),
            transaction: tokio::sync::Mutex::new(None),
        }))
    }

    pub fn backend(&self) -> &B {
        &self.0.backend
    }

    /// Append a task whose payload is a closure, the usual shape is
    /// `|backend, transaction, task| async move { ... }.boxed()`.
    pub fn add_function_task<F>(&self, function: F) -> Result<Task, TxnError>
    where
        F: for<'a> FnOnce(&'a B, &'a mut B::Transaction, &'a Task) -> BoxFuture<'a, Result<Value>>
            + Send
            + 'static,
    {
        self.push(Payload::Function(Box::new(function)))
    }

    /// Append a task whose payload is a type implementing [`TaskFunction`].
    pub fn add_task_function(&self, function: impl TaskFunction<B>) -> Result<Task, TxnError> {
        self.push(Payload::Function(Box::new(function)))
    }

    fn push(&self, payload: Payload<B>) -> Result<Task, TxnError> {
        let mut gate = self.gate();
        match gate.admission {
            Admission::Open | Admission::Deferred => {}
            Admission::Sealed => return Err(TxnError::AlreadyRunning),
            Admission::Closed => return Err(TxnError::AlreadyExecuted),
        }
        let task = Task::new(self.0.id, self.0.name.clone());
        let deferred = gate.admission == Admission::Deferred;
        gate.queue.push_back(Entry {
            task: task.clone(),
            payload,
            deferred,
        });
        log::trace!(
            "Task {} appended to context `{}`{}",
            task.id(),
            self.0.name,
            if deferred { " by the deferred hook" } else { "" }
        );
        Ok(task)
    }

    fn gate(&self) -> MutexGuard<'_, Gate<B>> {
        self.0.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ContextState) {
        self.gate().state = state;
    }
}

impl<B: StatementBackend> TxnContext<B> {
    /// Append a declarative statement, its placeholders are bound by the backend.
    pub fn add_statement_task(&self, statement: impl Into<Statement>) -> Result<Task, TxnError> {
        self.push(Payload::Statement {
            statement: statement.into(),
            runner: run_statement::<B>,
        })
    }
}

impl<B: Backend> Clone for TxnContext<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: Backend> Debug for TxnContext<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxnContext")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("state", &self.state())
            .field("pending", &self.pending_tasks())
            .finish()
    }
}

/// A context as seen by the [`TransactionManager`](crate::TransactionManager).
pub trait Context: Send + Sync + lifecycle::Lifecycle {
    fn id(&self) -> ContextId;
    fn name(&self) -> &str;
    fn kind(&self) -> &'static str;
    fn state(&self) -> ContextState;
    /// Tasks appended and not yet executed.
    fn pending_tasks(&self) -> usize;
    fn exclusive_resource(&self) -> Option<String>;
}

impl<B: Backend> Context for TxnContext<B> {
    fn id(&self) -> ContextId {
        self.0.id
    }
    fn name(&self) -> &str {
        &self.0.name
    }
    fn kind(&self) -> &'static str {
        B::KIND
    }
    fn state(&self) -> ContextState {
        self.gate().state
    }
    fn pending_tasks(&self) -> usize {
        self.gate().queue.len()
    }
    fn exclusive_resource(&self) -> Option<String> {
        self.0.backend.exclusive_resource()
    }
}

pub(crate) mod lifecycle {
    use super::*;

    /// Operations reserved to the manager.
    pub trait Lifecycle {
        fn attach(&self) -> Result<(), TxnError>;
        fn set_admission(&self, admission: Admission);
        /// Keep the hook-appended tasks listed in `keep`, discard the others.
        fn confirm_deferred(&self, keep: &HashSet<TaskId>) -> Vec<TaskId>;
        fn begin(&self) -> BoxFuture<'_, Result<()>>;
        /// Run the queued tasks in append order, stopping at the first failure.
        fn run_pending<'a>(&'a self, executed: &'a mut Vec<Task>)
        -> BoxFuture<'a, Result<(), TxnError>>;
        fn commit(&self) -> BoxFuture<'_, Result<()>>;
        fn rollback(&self) -> BoxFuture<'_, Result<()>>;
    }
}

impl<B: Backend> lifecycle::Lifecycle for TxnContext<B> {
    fn attach(&self) -> Result<(), TxnError> {
        let mut gate = self.gate();
        if gate.registered {
            return Err(TxnError::ContextAlreadyRegistered(self.0.name.to_string()));
        }
        gate.registered = true;
        Ok(())
    }

    fn set_admission(&self, admission: Admission) {
        self.gate().admission = admission;
    }

    fn confirm_deferred(&self, keep: &HashSet<TaskId>) -> Vec<TaskId> {
        let mut confirmed = Vec::new();
        self.gate().queue.retain_mut(|entry| {
            if !entry.deferred {
                return true;
            }
            let id = entry.task.id();
            if keep.contains(&id) {
                entry.deferred = false;
                confirmed.push(id);
                true
            } else {
                log::warn!(
                    "Task {} was created on `{}` by the deferred hook but not returned by it, it will not run",
                    id,
                    self.0.name
                );
                false
            }
        });
        confirmed
    }

    fn begin(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let mut transaction = self.0.transaction.lock().await;
            let state = self.state();
            if state != ContextState::Unopened {
                return Err(Error::msg(format!(
                    "Context `{}` cannot begin from state {:?}",
                    self.0.name, state
                )));
            }
            *transaction = Some(self.0.backend.begin().await?);
            self.set_state(ContextState::Open);
            log::debug!("Context `{}` opened its transaction", self.0.name);
            Ok(())
        }
        .boxed()
    }

    fn run_pending<'a>(
        &'a self,
        executed: &'a mut Vec<Task>,
    ) -> BoxFuture<'a, Result<(), TxnError>> {
        async move {
            let mut guard = self.0.transaction.lock().await;
            loop {
                let entry = self.gate().queue.pop_front();
                let Some(Entry { task, payload, .. }) = entry else {
                    break;
                };
                executed.push(task.clone());
                task.start();
                log::trace!("Task {} started on `{}`", task.id(), self.0.name);
                let result = match guard.as_mut() {
                    None => Err(Error::msg(format!(
                        "Context `{}` has no open transaction",
                        self.0.name
                    ))),
                    Some(transaction) => match payload {
                        Payload::Statement { statement, runner } => {
                            runner(&self.0.backend, transaction, &statement).await
                        }
                        Payload::Function(function) => {
                            function.execute(&self.0.backend, transaction, &task).await
                        }
                    },
                };
                match result {
                    Ok(value) => {
                        log::trace!("Task {} succeeded", task.id());
                        task.succeed(value);
                    }
                    Err(error) => {
                        log::error!(
                            "Task {} on `{}` failed: {:#}",
                            task.id(),
                            self.0.name,
                            error
                        );
                        let cause = Arc::new(error);
                        task.fail(cause.clone());
                        return Err(TxnError::TaskFailed {
                            task: task.id(),
                            context: self.0.name.to_string(),
                            cause,
                        });
                    }
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn commit(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let Some(transaction) = self.0.transaction.lock().await.take() else {
                return Err(Error::msg(format!(
                    "Context `{}` has no open transaction to commit",
                    self.0.name
                )));
            };
            let result = self.0.backend.commit(transaction).await;
            self.set_state(if result.is_ok() {
                ContextState::Committed
            } else {
                ContextState::RolledBack
            });
            result
        }
        .boxed()
    }

    fn rollback(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let Some(transaction) = self.0.transaction.lock().await.take() else {
                return Ok(());
            };
            let result = self.0.backend.rollback(transaction).await;
            self.set_state(ContextState::RolledBack);
            result
        }
        .boxed()
    }
}

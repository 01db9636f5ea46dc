use crate::{ContextId, Error, TxnError, Value};
use serde::Serialize;
use std::{
    fmt::{self, Debug, Display},
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId(pub u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

enum Resolution {
    Pending,
    Running,
    Succeeded(Value),
    Failed(Arc<Error>),
}

struct TaskShared {
    id: TaskId,
    context: ContextId,
    context_name: Arc<str>,
    resolution: RwLock<Resolution>,
}

/// Handle to one unit of work bound to a context.
///
/// Cloning the handle is cheap and every clone observes the same resolution. The handle is the
/// only way to read the task's result: capture it in a later task's payload to depend on it.
#[derive(Clone)]
pub struct Task(Arc<TaskShared>);

impl Task {
    pub(crate) fn new(context: ContextId, context_name: Arc<str>) -> Self {
        Self(Arc::new(TaskShared {
            id: TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed)),
            context,
            context_name,
            resolution: RwLock::new(Resolution::Pending),
        }))
    }

    pub fn id(&self) -> TaskId {
        self.0.id
    }

    pub fn context_id(&self) -> ContextId {
        self.0.context
    }

    pub fn context_name(&self) -> &str {
        &self.0.context_name
    }

    pub fn state(&self) -> TaskState {
        match &*self.0.resolution.read().unwrap_or_else(PoisonError::into_inner) {
            Resolution::Pending => TaskState::Pending,
            Resolution::Running => TaskState::Running,
            Resolution::Succeeded(..) => TaskState::Succeeded,
            Resolution::Failed(..) => TaskState::Failed,
        }
    }

    /// Resolved value of the task.
    ///
    /// Fails with [`TxnError::ResultNotReady`] until the task succeeded and with
    /// [`TxnError::TaskFailed`] carrying the original cause if it failed. Once succeeded, every
    /// call returns the same value.
    pub fn get_result(&self) -> Result<Value, TxnError> {
        match &*self.0.resolution.read().unwrap_or_else(PoisonError::into_inner) {
            Resolution::Succeeded(value) => Ok(value.clone()),
            Resolution::Failed(cause) => Err(TxnError::TaskFailed {
                task: self.id(),
                context: self.context_name().into(),
                cause: cause.clone(),
            }),
            Resolution::Pending | Resolution::Running => Err(TxnError::ResultNotReady(self.id())),
        }
    }

    /// Borrowing variant of [`Task::get_result`], avoids cloning large results.
    pub fn with_result<R>(&self, f: impl FnOnce(&Value) -> R) -> Result<R, TxnError> {
        {
            let resolution = self.0.resolution.read().unwrap_or_else(PoisonError::into_inner);
            if let Resolution::Succeeded(value) = &*resolution {
                return Ok(f(value));
            }
        }
        self.get_result().map(|v| f(&v))
    }

    pub(crate) fn start(&self) {
        let mut resolution = self.0.resolution.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(*resolution, Resolution::Pending) {
            *resolution = Resolution::Running;
        } else {
            log::error!("Task {} was started twice", self.id());
        }
    }

    pub(crate) fn succeed(&self, value: Value) {
        self.resolve(Resolution::Succeeded(value));
    }

    pub(crate) fn fail(&self, cause: Arc<Error>) {
        self.resolve(Resolution::Failed(cause));
    }

    fn resolve(&self, outcome: Resolution) {
        let mut resolution = self.0.resolution.write().unwrap_or_else(PoisonError::into_inner);
        if matches!(*resolution, Resolution::Running) {
            *resolution = outcome;
        } else {
            log::error!(
                "Task {} can be resolved only once and only while running",
                self.id()
            );
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Task {}

impl Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("context", &self.context_name())
            .field("state", &self.state())
            .finish()
    }
}

use crate::{Result, Task};

/// Late-binding callback run once between a successful run phase and the commit phase.
///
/// It receives every task executed so far and returns the tasks it created (through the usual
/// `add_*_task` methods of registered contexts) that must run before committing.
pub trait DeferredHook: Send + 'static {
    fn invoke(self: Box<Self>, executed: &[Task]) -> Result<Vec<Task>>;
}

impl<F> DeferredHook for F
where
    F: FnOnce(&[Task]) -> Result<Vec<Task>> + Send + 'static,
{
    fn invoke(self: Box<Self>, executed: &[Task]) -> Result<Vec<Task>> {
        (*self)(executed)
    }
}

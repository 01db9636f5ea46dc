use crate::{Backend, Result, TxnContext};

/// Backend without any data source: tasks are plain computations taking part in the run order.
#[derive(Default, Debug, Clone, Copy)]
pub struct Functions;

impl Backend for Functions {
    type Transaction = ();

    const KIND: &'static str = "function";

    async fn begin(&self) -> Result<()> {
        Ok(())
    }

    async fn commit(&self, _transaction: ()) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self, _transaction: ()) -> Result<()> {
        Ok(())
    }
}

pub type FunctionContext = TxnContext<Functions>;

impl Default for FunctionContext {
    fn default() -> Self {
        TxnContext::new(Functions)
    }
}

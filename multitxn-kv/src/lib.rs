mod command;
mod pipeline;
mod store;

use multitxn_core::TxnContext;

pub use command::*;
pub use pipeline::*;
pub use store::*;

/// Context over a [`KvStore`], function tasks receive the [`Pipeline`].
pub type KvContext = TxnContext<KvStore>;

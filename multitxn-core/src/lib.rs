mod context;
mod error;
mod function;
mod hook;
mod manager;
mod statement;
mod task;
mod util;
mod value;

pub use ::anyhow::Context as _;
pub use context::*;
pub use error::*;
pub use function::*;
pub use hook::*;
pub use manager::*;
pub use statement::*;
pub use task::*;
pub use util::*;
pub use value::*;
pub use ::futures::future::{self, BoxFuture, FutureExt};

pub type Result<T, E = Error> = std::result::Result<T, E>;
pub type Error = anyhow::Error;

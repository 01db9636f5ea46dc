mod cbox;
mod connection;
mod entity;
mod extract;
mod orm;
mod pool;
mod prepared;
mod sql_writer;
mod transaction;

use multitxn_core::TxnContext;
use std::{
    ffi::{CStr, c_char},
    ptr,
};

pub(crate) use cbox::*;
pub use connection::*;
pub use entity::*;
pub use orm::*;
pub use pool::*;
pub use prepared::*;
pub use sql_writer::*;
pub use transaction::*;

/// Context running raw statements on a sqlite pool.
pub type SqlContext = TxnContext<SqlitePool>;

/// Context running entity operations and raw statements on a sqlite pool.
pub type OrmContext = TxnContext<Orm>;

pub(crate) fn error_message_from_ptr(ptr: &'_ *const c_char) -> &'_ str {
    unsafe {
        if *ptr != ptr::null() {
            CStr::from_ptr(*ptr)
                .to_str()
                .unwrap_or("Unknown error (the error message was not a valid C string)")
        } else {
            "Unknown error (could not extract the error message)"
        }
    }
}

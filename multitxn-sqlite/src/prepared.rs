use crate::{CBox, error_message_from_ptr};
use libsqlite3_sys::*;
use multitxn_core::{Error, Params, Result, Value, truncate_long};
use std::{
    ffi::{CStr, c_int},
    os::raw::{c_char, c_void},
};

pub struct SqlitePrepared {
    pub(crate) statement: CBox<*mut sqlite3_stmt>,
}

impl SqlitePrepared {
    pub(crate) fn new(prepared: CBox<*mut sqlite3_stmt>) -> Self {
        unsafe {
            sqlite3_clear_bindings(*prepared);
        }
        Self {
            statement: prepared,
        }
    }

    /// Bind every placeholder of the statement by name.
    ///
    /// Each `:name`, `@name` or `$name` placeholder must have a value in `params`, positional `?`
    /// placeholders are rejected.
    pub fn bind_params(&mut self, params: &Params) -> Result<&mut Self> {
        let count = unsafe { sqlite3_bind_parameter_count(*self.statement) };
        for index in 1..=count {
            let name = unsafe {
                let name = sqlite3_bind_parameter_name(*self.statement, index);
                if name.is_null() {
                    None
                } else {
                    Some(CStr::from_ptr(name).to_string_lossy().into_owned())
                }
            };
            let Some(name) = name.filter(|v| !v.starts_with('?')) else {
                let error = Error::msg(format!(
                    "Parameter {} of query `{}` is positional, only named parameters are supported",
                    index,
                    self.sql()
                ));
                log::error!("{:#}", error);
                return Err(error);
            };
            let Some(value) = params.get(&name[1..]) else {
                let error = Error::msg(format!(
                    "Missing value for parameter `{}` of query `{}`",
                    name,
                    self.sql()
                ));
                log::error!("{:#}", error);
                return Err(error);
            };
            self.bind_index(value, index)?;
        }
        Ok(self)
    }

    pub fn bind_index(&mut self, value: &Value, index: c_int) -> Result<&mut Self> {
        unsafe {
            let rc = match value {
                Value::Null => sqlite3_bind_null(*self.statement, index),
                Value::Boolean(v) => sqlite3_bind_int(*self.statement, index, *v as c_int),
                Value::Int64(v) => sqlite3_bind_int64(*self.statement, index, *v),
                Value::Float64(v) => sqlite3_bind_double(*self.statement, index, *v),
                Value::Varchar(v) => sqlite3_bind_text(
                    *self.statement,
                    index,
                    v.as_ptr() as *const c_char,
                    v.len() as c_int,
                    SQLITE_TRANSIENT(),
                ),
                Value::Blob(v) => sqlite3_bind_blob(
                    *self.statement,
                    index,
                    v.as_ptr() as *const c_void,
                    v.len() as c_int,
                    SQLITE_TRANSIENT(),
                ),
                _ => {
                    let error =
                        Error::msg(format!("Cannot use a {:?} as a query parameter", value));
                    log::error!("{:#}", error);
                    return Err(error);
                }
            };
            if rc != SQLITE_OK {
                let db = sqlite3_db_handle(*self.statement);
                let error = Error::msg(error_message_from_ptr(&sqlite3_errmsg(db)).to_string())
                    .context(format!(
                        "Cannot bind parameter {} to query:\n{}",
                        index,
                        self.sql()
                    ));
                log::error!("{:#}", error);
                return Err(error);
            }
            Ok(self)
        }
    }

    fn sql(&self) -> String {
        unsafe {
            let query = sqlite3_sql(*self.statement);
            if query.is_null() {
                return String::new();
            }
            let query = CStr::from_ptr(query).to_string_lossy();
            truncate_long!(query).to_string()
        }
    }
}


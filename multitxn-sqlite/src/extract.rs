use libsqlite3_sys::*;
use multitxn_core::{Error, Result, Value};
use std::ffi::{CStr, c_int};

pub(crate) fn extract_value(statement: *mut sqlite3_stmt, index: c_int) -> Result<Value> {
    unsafe {
        let column_type = sqlite3_column_type(statement, index);
        Ok(match column_type {
            SQLITE_NULL => Value::Null,
            SQLITE_INTEGER => Value::Int64(sqlite3_column_int64(statement, index)),
            SQLITE_FLOAT => Value::Float64(sqlite3_column_double(statement, index)),
            SQLITE_BLOB => {
                let ptr = sqlite3_column_blob(statement, index) as *const u8;
                let len = sqlite3_column_bytes(statement, index) as usize;
                if ptr.is_null() {
                    Value::Blob(Box::default())
                } else {
                    Value::Blob(std::slice::from_raw_parts(ptr, len).into())
                }
            }
            SQLITE_TEXT => {
                let ptr = sqlite3_column_text(statement, index);
                let len = sqlite3_column_bytes(statement, index) as usize;
                if ptr.is_null() {
                    Value::Varchar(String::new())
                } else {
                    Value::Varchar(
                        String::from_utf8_lossy(std::slice::from_raw_parts(ptr, len)).into_owned(),
                    )
                }
            }
            _ => {
                return Err(Error::msg(format!(
                    "Unexpected column type {}",
                    column_type
                )));
            }
        })
    }
}

pub(crate) fn extract_name(statement: *mut sqlite3_stmt, index: c_int) -> Result<String> {
    unsafe {
        let name = sqlite3_column_name(statement, index);
        if name.is_null() {
            return Err(Error::msg(format!("Column {} has no name", index)));
        }
        Ok(CStr::from_ptr(name).to_str()?.into())
    }
}

use crate::{
    CBox, SqlitePrepared, error_message_from_ptr,
    extract::{extract_name, extract_value},
};
use libsqlite3_sys::{
    SQLITE_DONE, SQLITE_OK, SQLITE_OPEN_CREATE, SQLITE_OPEN_READWRITE, SQLITE_OPEN_URI, SQLITE_ROW,
    sqlite3, sqlite3_busy_timeout, sqlite3_changes64, sqlite3_close, sqlite3_column_count,
    sqlite3_errmsg, sqlite3_finalize, sqlite3_get_autocommit, sqlite3_last_insert_rowid, sqlite3_open_v2,
    sqlite3_prepare_v2, sqlite3_step,
};
use anyhow::Context as _;
use multitxn_core::{
    Error, QueryOutput, Result, Row, RowLabeled, RowNames, RowsAffected, Statement, truncate_long,
};
use std::{
    ffi::{CStr, CString, c_int},
    ptr,
    time::Duration,
};
use tokio::task::spawn_blocking;

pub const SQLITE_PREFIX: &str = "sqlite://";

/// How long a statement waits for a lock held by another connection before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Single SQLite database handle.
///
/// Every call into sqlite runs on the blocking thread pool, the handle is used by one call at a
/// time because each method takes `&mut self`.
pub struct SqliteConnection {
    pub(crate) connection: CBox<*mut sqlite3>,
}

impl SqliteConnection {
    /// Open `sqlite://<path>[?mode=ro|rw|rwc|memory]`.
    ///
    /// File databases get a busy timeout and the WAL journal so that readers do not block the
    /// single writer.
    pub async fn connect(url: &str) -> Result<SqliteConnection> {
        let location = SqliteLocation::parse(url)?;
        let uri = CString::new(location.uri())
            .with_context(|| format!("Error while decoding connection URL: `{}`", url))?;
        let connection = spawn_blocking(move || unsafe {
            let mut connection = CBox::new(ptr::null_mut(), |p| {
                sqlite3_close(p);
            });
            let rc = sqlite3_open_v2(
                uri.as_ptr(),
                &mut *connection,
                SQLITE_OPEN_READWRITE | SQLITE_OPEN_CREATE | SQLITE_OPEN_URI,
                ptr::null(),
            );
            if rc != SQLITE_OK {
                return Err(Error::msg(
                    error_message_from_ptr(&sqlite3_errmsg(*connection)).to_string(),
                ));
            }
            sqlite3_busy_timeout(*connection, BUSY_TIMEOUT.as_millis() as c_int);
            Ok(connection)
        })
        .await?
        .with_context(|| format!("Could not open the sqlite database `{}`", url))
        .inspect_err(|e| log::error!("{:#}", e))?;
        let mut result = Self { connection };
        if location.is_file() && !location.read_only() {
            result.batch("PRAGMA journal_mode=WAL").await?;
        }
        log::debug!("Connected to `{}`", url);
        Ok(result)
    }

    /// Check that `url` is a sqlite url [`SqliteConnection::connect`] accepts, without opening it.
    pub fn validate_url(url: &str) -> Result<()> {
        SqliteLocation::parse(url).map(|_| ())
    }

    /// Placeholder without a database, dropping it does nothing.
    pub(crate) fn detached() -> Self {
        Self {
            connection: CBox::new(ptr::null_mut(), |_| {}),
        }
    }

    /// False while a transaction is open on this connection.
    pub fn is_autocommit(&self) -> bool {
        unsafe { sqlite3_get_autocommit(*self.connection) != 0 }
    }

    /// Prepare, bind and run a single statement, collecting every row it returns.
    pub async fn execute(&mut self, statement: &Statement) -> Result<QueryOutput> {
        let connection = self.connection.borrowed();
        let statement = statement.clone();
        spawn_blocking(move || run(*connection, &statement)).await?
    }

    /// Run a statement without parameters and discard its output.
    pub async fn batch(&mut self, sql: &str) -> Result<()> {
        self.execute(&Statement::new(sql)).await.map(|_| ())
    }
}

fn prepare(connection: *mut sqlite3, sql: &str) -> Result<SqlitePrepared> {
    let query =
        CString::new(sql.as_bytes()).context("Could not create a CString from the query String")?;
    let mut statement = CBox::new(ptr::null_mut(), |p| unsafe {
        sqlite3_finalize(p);
    });
    let mut tail = ptr::null();
    unsafe {
        let rc = sqlite3_prepare_v2(
            connection,
            query.as_ptr(),
            -1,
            &mut *statement,
            &mut tail,
        );
        if rc != SQLITE_OK {
            return Err(Error::msg(
                error_message_from_ptr(&sqlite3_errmsg(connection)).to_string(),
            ));
        }
        if statement.is_null() {
            return Err(Error::msg("The query does not contain any statement"));
        }
        if !tail.is_null()
            && CStr::from_ptr(tail)
                .to_bytes()
                .iter()
                .any(|c| !c.is_ascii_whitespace() && *c != b';')
        {
            return Err(Error::msg(
                "Cannot prepare more than one statement at a time",
            ));
        }
    }
    Ok(SqlitePrepared::new(statement))
}

fn run(connection: *mut sqlite3, statement: &Statement) -> Result<QueryOutput> {
    collect(connection, statement)
        .with_context(|| {
            format!(
                "While running the query:\n{}",
                truncate_long!(statement.text)
            )
        })
        .inspect_err(|e| log::error!("{:#}", e))
}

fn collect(connection: *mut sqlite3, statement: &Statement) -> Result<QueryOutput> {
    let mut prepared = prepare(connection, &statement.text)?;
    prepared.bind_params(&statement.params)?;
    let raw = *prepared.statement;
    unsafe {
        let count = sqlite3_column_count(raw);
        let labels = (0..count)
            .map(|i| extract_name(raw, i))
            .collect::<Result<RowNames>>()?;
        let mut rows = Vec::new();
        loop {
            match sqlite3_step(raw) {
                SQLITE_ROW => rows.push(RowLabeled::new(
                    labels.clone(),
                    (0..count)
                        .map(|i| extract_value(raw, i))
                        .collect::<Result<Row>>()?,
                )),
                SQLITE_DONE => break,
                _ => {
                    return Err(Error::msg(
                        error_message_from_ptr(&sqlite3_errmsg(connection)).to_string(),
                    ));
                }
            }
        }
        let rows_affected = if count == 0 {
            sqlite3_changes64(connection) as u64
        } else {
            0
        };
        Ok(QueryOutput {
            rows,
            affected: RowsAffected {
                rows_affected,
                last_affected_id: (rows_affected > 0)
                    .then(|| sqlite3_last_insert_rowid(connection)),
            },
        })
    }
}

/// Database location decoded from a `sqlite://` url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SqliteLocation {
    pub(crate) path: String,
    pub(crate) mode: Option<String>,
    pub(crate) query: String,
}

impl SqliteLocation {
    pub(crate) fn parse(url: &str) -> Result<Self> {
        let Some(rest) = url.strip_prefix(SQLITE_PREFIX) else {
            let error = Error::msg(format!(
                "Expected sqlite connection url to start with `{}`, found `{}`",
                SQLITE_PREFIX, url
            ));
            log::error!("{:#}", error);
            return Err(error);
        };
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));
        if path.is_empty() {
            return Err(Error::msg(format!("Missing database path in `{}`", url)));
        }
        let mode = url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "mode")
            .map(|(_, v)| v.into_owned());
        if let Some(mode) = &mode
            && !matches!(mode.as_str(), "ro" | "rw" | "rwc" | "memory")
        {
            return Err(Error::msg(format!(
                "Unsupported sqlite open mode `{}`, expected one of ro, rw, rwc, memory",
                mode
            )));
        }
        Ok(Self {
            path: path.into(),
            mode,
            query: query.into(),
        })
    }

    pub(crate) fn uri(&self) -> String {
        if self.query.is_empty() {
            format!("file:{}", self.path)
        } else {
            format!("file:{}?{}", self.path, self.query)
        }
    }

    pub(crate) fn is_file(&self) -> bool {
        self.path != ":memory:" && self.mode.as_deref() != Some("memory")
    }

    pub(crate) fn read_only(&self) -> bool {
        self.mode.as_deref() == Some("ro")
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteLocation;

    #[test]
    fn parse_location() {
        let location = SqliteLocation::parse("sqlite:///tmp/bank.db?mode=rwc").unwrap();
        assert_eq!(location.path, "/tmp/bank.db");
        assert_eq!(location.mode.as_deref(), Some("rwc"));
        assert_eq!(location.uri(), "file:/tmp/bank.db?mode=rwc");
        assert!(location.is_file());

        let memory = SqliteLocation::parse("sqlite://:memory:").unwrap();
        assert_eq!(memory.uri(), "file::memory:");
        assert!(!memory.is_file());

        assert!(SqliteLocation::parse("mysql://localhost/bank").is_err());
        assert!(SqliteLocation::parse("sqlite://bank.db?mode=append").is_err());
        assert!(SqliteLocation::parse("sqlite://").is_err());
    }
}

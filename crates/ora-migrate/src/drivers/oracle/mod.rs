//! Oracle driver.
//!
//! Built on the `oracle` crate (ODPI-C), whose calls block, so every
//! database call runs on the blocking thread pool. Connections come from
//! an r2d2 pool per endpoint.
//!
//! - [`OracleSource`]: catalog queries and streaming cursors
//! - [`OracleTarget`]: transactional batched inserts

mod reader;
mod writer;

pub use reader::OracleSource;
pub use writer::{OracleInsertSession, OracleTarget};

use std::fmt;
use std::time::Duration;

use oracle::Connection;
use r2d2::{ManageConnection, Pool};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::{MigrateError, Result};

/// Probe used by the connection tester. Oracle needs a FROM clause.
pub const PROBE_SQL: &str = "SELECT 1 FROM DUAL";

/// Fixed session formats, so values that cross as text (NUMBER decimals and
/// character-form opaque values) read and parse the same on both ends
/// regardless of server locale.
pub const SESSION_SETUP_SQL: &str = "ALTER SESSION SET \
     NLS_NUMERIC_CHARACTERS = '.,' \
     NLS_DATE_FORMAT = 'YYYY-MM-DD HH24:MI:SS' \
     NLS_TIMESTAMP_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF' \
     NLS_TIMESTAMP_TZ_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF TZH:TZM'";

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

pub type OraclePool = Pool<OracleConnectionManager>;

/// r2d2 connection manager that also prepares each new session.
pub struct OracleConnectionManager {
    user: String,
    password: String,
    connect_string: String,
    schema: Option<String>,
}

impl OracleConnectionManager {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            user: config.user.clone(),
            password: config.password.clone(),
            connect_string: config.connect_string.clone(),
            schema: config.schema.clone(),
        }
    }
}

impl fmt::Debug for OracleConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConnectionManager")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("connect_string", &self.connect_string)
            .field("schema", &self.schema)
            .finish()
    }
}

impl ManageConnection for OracleConnectionManager {
    type Connection = Connection;
    type Error = oracle::Error;

    fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let conn = Connection::connect(&self.user, &self.password, &self.connect_string)?;
        conn.execute(SESSION_SETUP_SQL, &[])?;
        if let Some(schema) = &self.schema {
            conn.execute(&format!("ALTER SESSION SET CURRENT_SCHEMA = {}", schema), &[])?;
        }
        debug!("Opened Oracle session on {}", self.connect_string);
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.ping()
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// Build a lazily-connecting pool; nothing is opened until first use.
pub fn build_pool(config: &DatabaseConfig) -> OraclePool {
    Pool::builder()
        .max_size(config.max_connections)
        .min_idle(Some(0))
        .connection_timeout(CONNECTION_TIMEOUT)
        .build_unchecked(OracleConnectionManager::new(config))
}

/// Check out a connection and run `f` on the blocking pool.
pub(crate) async fn with_connection<T, F>(
    pool: &OraclePool,
    context: &'static str,
    f: F,
) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| MigrateError::connectivity(e.to_string(), context))?;
        f(&conn)
    })
    .await
    .map_err(|e| MigrateError::Read(format!("{} task failed: {}", context, e)))?
}

/// Rewrite `?` placeholders to Oracle's positional `:1, :2, ...`.
///
/// Question marks inside quoted literals or quoted identifiers are left alone.
pub fn positional_binds(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut next = 1;
    for c in sql.chars() {
        match (quote, c) {
            (None, '\'' | '"') => {
                quote = Some(c);
                out.push(c);
            }
            (Some(q), _) if q == c => {
                quote = None;
                out.push(c);
            }
            (None, '?') => {
                out.push(':');
                out.push_str(&next.to_string());
                next += 1;
            }
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn read_err(e: oracle::Error) -> MigrateError {
    MigrateError::Read(e.to_string())
}

pub(crate) fn write_err(e: oracle::Error) -> MigrateError {
    MigrateError::Write(e.to_string())
}

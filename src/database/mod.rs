//! Database layer — connection handle, query builder and record mapper.
//!
//! [`Database`] wraps one rusqlite connection. It is opened by whoever handles a
//! request, passed down explicitly, and dropped when the request ends; there is
//! no process-wide connection.
//!
//! Statement failures do not surface as `Err`: [`Database::query`] records them
//! in an error flag that callers check with [`Database::error`] before trusting
//! [`results`](Database::results) or [`count`](Database::count). Opening the
//! connection, migrating, and transaction control do return [`DbError`].
//!
//! ```
//! use captacion::database::{Database, Value};
//!
//! let mut db = Database::open_in_memory().unwrap();
//! db.migrate().unwrap();
//!
//! let id = db.insert("zonas", &[("nombre", Value::from("Norte"))]).unwrap();
//! assert!(!db.query("SELECT * FROM zonas WHERE id = ?", &[Value::from(id)]).error());
//! assert_eq!(db.count(), 1);
//! ```

pub mod query;
pub mod record;
pub mod value;

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{Connection, params_from_iter};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use query::{Connector, Direction, JoinKind, Operator, Page, QueryBuilder};
pub use record::{Accessor, Model, Record, RecordState};
pub use value::Value;

/// A fetched row: column name to value.
pub type Row = BTreeMap<String, Value>;

/// Errors raised outside the statement error flag.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Pragmas applied to every new connection.
///
/// - A busy timeout so concurrent request workers wait on the write lock instead
///   of failing immediately.
/// - Foreign-key enforcement, off by default in SQLite.
const INITIAL_SQL: &str = r#"
PRAGMA busy_timeout = 1000;
PRAGMA foreign_keys = 1;
"#;

/// DDL for every table the application reads, plus the default roles.
const SCHEMA_SQL: &str = include_str!("schema.sql");

// What a prepared statement produced.
enum Outcome {
    Rows(Vec<Row>),
    Changed(usize),
}

/// A single database connection plus the outcome of the last statement.
pub struct Database {
    conn: Connection,
    results: Vec<Row>,
    count: usize,
    error: bool,
    last_error: Option<String>,
    executed: usize,
}

impl Database {
    /// Opens (or creates) the SQLite database at `path`.
    ///
    /// # Errors
    ///
    /// [`DbError::Open`] if the file cannot be opened, [`DbError::Sqlite`] if the
    /// connection pragmas fail.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening database");
        let conn = Connection::open(path).map_err(|source| DbError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory().map_err(|source| DbError::Open {
            path: ":memory:".to_owned(),
            source,
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, DbError> {
        conn.execute_batch(INITIAL_SQL)?;
        Ok(Self {
            conn,
            results: Vec::new(),
            count: 0,
            error: false,
            last_error: None,
            executed: 0,
        })
    }

    /// Creates any missing tables and seeds the default roles.
    pub fn migrate(&self) -> Result<(), DbError> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        info!("database schema is up to date");
        Ok(())
    }

    /// Prepares `sql`, binds `params` positionally and runs it.
    ///
    /// Statements that produce columns replace [`results`](Self::results) and set
    /// [`count`](Self::count) to the number of rows fetched; other statements
    /// clear the results and set the count to the number of rows changed. On
    /// failure the error flag is raised and both are left untouched.
    pub fn query(&mut self, sql: &str, params: &[Value]) -> &mut Self {
        self.error = false;
        self.executed += 1;
        debug!(sql, bindings = params.len(), "executing statement");

        match run(&self.conn, sql, params) {
            Ok(Outcome::Rows(rows)) => {
                self.count = rows.len();
                self.results = rows;
            }
            Ok(Outcome::Changed(changed)) => {
                self.results.clear();
                self.count = changed;
            }
            Err(e) => {
                warn!(sql, error = %e, "statement failed");
                self.error = true;
                self.last_error = Some(e.to_string());
            }
        }

        self
    }

    // `SELECT *` / `DELETE` with an optional single `field op ?` filter.
    fn action(&mut self, action: &str, table: &str, filter: Option<(&str, Operator, Value)>) -> bool {
        match filter {
            Some((field, operator, value)) => {
                let sql = format!("{action} FROM {table} WHERE {field} {} ?", operator.as_sql());
                !self.query(&sql, &[value]).error()
            }
            None => !self.query(&format!("{action} FROM {table}"), &[]).error(),
        }
    }

    /// Fetches every row of `table`, optionally filtered by one predicate.
    pub fn get(&mut self, table: &str, filter: Option<(&str, Operator, Value)>) -> bool {
        self.action("SELECT *", table, filter)
    }

    /// Deletes rows of `table`, optionally filtered by one predicate.
    pub fn delete(&mut self, table: &str, filter: Option<(&str, Operator, Value)>) -> bool {
        self.action("DELETE", table, filter)
    }

    /// Inserts one row and returns its generated id.
    pub fn insert(&mut self, table: &str, fields: &[(&str, Value)]) -> Option<i64> {
        if fields.is_empty() {
            let sql = format!("INSERT INTO {table} DEFAULT VALUES");
            return (!self.query(&sql, &[]).error()).then(|| self.last_insert_id());
        }

        let columns = fields
            .iter()
            .map(|(name, _)| format!("\"{name}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; fields.len()].join(", ");
        let values: Vec<Value> = fields.iter().map(|(_, v)| v.clone()).collect();

        let sql = format!("INSERT INTO {table} ({columns}) VALUES ({placeholders})");
        if self.query(&sql, &values).error() {
            return None;
        }
        Some(self.last_insert_id())
    }

    /// Updates the row of `table` whose `id` column equals `id`.
    pub fn update(&mut self, table: &str, id: i64, fields: &[(&str, Value)]) -> bool {
        let set = fields
            .iter()
            .map(|(name, _)| format!("{name} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut values: Vec<Value> = fields.iter().map(|(_, v)| v.clone()).collect();
        values.push(Value::Integer(id));

        let sql = format!("UPDATE {table} SET {set} WHERE id = ?");
        !self.query(&sql, &values).error()
    }

    /// Rows fetched by the last successful row-producing statement.
    pub fn results(&self) -> &[Row] {
        &self.results
    }

    pub fn first(&self) -> Option<&Row> {
        self.results.first()
    }

    /// Rows fetched or changed by the last successful statement.
    pub fn count(&self) -> usize {
        self.count
    }

    /// `true` if the last statement failed.
    pub fn error(&self) -> bool {
        self.error
    }

    /// Message of the most recent statement failure, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Number of statements issued through [`query`](Self::query) on this handle.
    pub fn statements_executed(&self) -> usize {
        self.executed
    }

    pub fn begin_transaction(&self) -> Result<(), DbError> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    pub fn commit(&self) -> Result<(), DbError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    pub fn rollback(&self) -> Result<(), DbError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

fn run(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<Outcome> {
    let mut stmt = conn.prepare(sql)?;

    if stmt.column_count() == 0 {
        let changed = stmt.execute(params_from_iter(params.iter()))?;
        return Ok(Outcome::Changed(changed));
    }

    let names: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        let mut map = Row::new();
        for (i, name) in names.iter().enumerate() {
            map.insert(name.clone(), Value::from(row.get_ref(i)?));
        }
        out.push(map);
    }

    Ok(Outcome::Rows(out))
}

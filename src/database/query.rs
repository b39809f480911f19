//! Fluent SELECT builder compiled to positional-parameter SQL.
//!
//! A [`QueryBuilder`] collects clauses for one model's table and compiles them
//! in a fixed section order:
//!
//! ```text
//! SELECT cols FROM table [JOIN ...]* [WHERE 1 = 1 <conn> <pred> ...]
//!     [GROUP BY ...] [ORDER BY ...] [LIMIT n] [OFFSET n]
//! ```
//!
//! Empty sections are omitted. Values never appear in the SQL text: each
//! value-bearing predicate emits one `?` per value and pushes the value onto the
//! binding list at the moment its placeholder is written, so the bindings are
//! always in placeholder order. Identifiers (tables, columns) are interpolated
//! as given and must be trusted constants.
//!
//! # Examples
//!
//! ```
//! use captacion::database::{Direction, Operator};
//! use captacion::models::atleta::ATLETA;
//!
//! let (sql, bindings) = ATLETA
//!     .query()
//!     .where_eq("evaluador_id", 7)
//!     .where_op("altura", Operator::Gte, 150)
//!     .order_by("apellido", Direction::Asc)
//!     .for_page(2, 20)
//!     .compile();
//!
//! assert_eq!(
//!     sql,
//!     "SELECT * FROM atletas WHERE 1 = 1 and evaluador_id = ? and altura >= ? \
//!      ORDER BY apellido asc LIMIT 20 OFFSET 20"
//! );
//! assert_eq!(bindings.len(), 2);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use super::record::{Model, Record};
use super::{Database, Value};

/// Comparison operators accepted in predicates and join conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    /// `<>`, kept distinct from `!=` so compiled SQL reads as written.
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Returned when parsing an operator outside the supported set.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported comparison operator: {0:?}")]
pub struct UnknownOperator(pub String);

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "=" => Self::Eq,
            "!=" => Self::NotEq,
            "<>" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Lte,
            ">" => Self::Gt,
            ">=" => Self::Gte,
            "LIKE" => Self::Like,
            "NOT LIKE" => Self::NotLike,
            _ => return Err(UnknownOperator(s.to_owned())),
        })
    }
}

/// Boolean connector joining a predicate to the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Sort direction for `ORDER BY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// `asc` in any case sorts ascending; anything else sorts descending.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("asc") {
            Self::Asc
        } else {
            Self::Desc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
        }
    }
}

// One WHERE fragment, dispatched on kind at compile time.
#[derive(Debug, Clone)]
enum Predicate {
    Basic {
        column: String,
        operator: Operator,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
        not: bool,
    },
    Null {
        column: String,
        not: bool,
    },
    Raw {
        sql: String,
        bindings: Vec<Value>,
    },
    Nested(Vec<Where>),
}

#[derive(Debug, Clone)]
struct Where {
    predicate: Predicate,
    connector: Connector,
}

#[derive(Debug, Clone)]
struct Join {
    table: String,
    first: String,
    operator: Operator,
    second: String,
    kind: JoinKind,
}

#[derive(Debug, Clone)]
struct Order {
    column: String,
    direction: Direction,
}

/// One page of hydrated records plus the unpaginated total.
#[derive(Debug, Serialize)]
pub struct Page {
    pub items: Vec<Record>,
    pub total: i64,
    pub page: u64,
    pub per_page: u64,
    pub last_page: u64,
}

/// Fluent builder for a SELECT over one model's table.
///
/// Obtain one with [`Model::query`]. Clause methods take and return the builder
/// by value; the terminal methods ([`get`](Self::get), [`first`](Self::first),
/// [`find`](Self::find), [`count`](Self::count), [`paginate`](Self::paginate))
/// consume it.
#[derive(Debug, Clone)]
#[must_use]
pub struct QueryBuilder {
    model: &'static Model,
    columns: Vec<String>,
    wheres: Vec<Where>,
    joins: Vec<Join>,
    orders: Vec<Order>,
    groups: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl QueryBuilder {
    pub fn new(model: &'static Model) -> Self {
        Self {
            model,
            columns: Vec::new(),
            wheres: Vec::new(),
            joins: Vec::new(),
            orders: Vec::new(),
            groups: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Replaces the selected columns. An empty list selects `*`.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    fn push(mut self, predicate: Predicate, connector: Connector) -> Self {
        self.wheres.push(Where {
            predicate,
            connector,
        });
        self
    }

    /// `column = ?` — the two-argument form of a basic predicate.
    pub fn where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.where_op(column, Operator::Eq, value)
    }

    /// `column <op> ?`.
    pub fn where_op(self, column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push(basic(column, operator, value), Connector::And)
    }

    pub fn or_where_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.or_where_op(column, Operator::Eq, value)
    }

    pub fn or_where_op(self, column: &str, operator: Operator, value: impl Into<Value>) -> Self {
        self.push(basic(column, operator, value), Connector::Or)
    }

    /// One equality predicate per entry, conjoined and grouped in parentheses.
    pub fn where_map<K, V>(self, entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let group: Vec<Where> = entries
            .into_iter()
            .map(|(k, v)| Where {
                predicate: basic(k.as_ref(), Operator::Eq, v),
                connector: Connector::And,
            })
            .collect();
        self.push_group(group, Connector::And)
    }

    /// Parenthesized group built by `build` on a fresh builder for the same model.
    ///
    /// ```
    /// use captacion::models::sesion::SESION;
    ///
    /// let sql = SESION
    ///     .query()
    ///     .where_eq("evaluador_id", 3)
    ///     .where_nested(|q| q.where_eq("estado", "pendiente").or_where_eq("estado", "completada"))
    ///     .to_sql();
    /// assert_eq!(
    ///     sql,
    ///     "SELECT * FROM sesiones_evaluacion WHERE 1 = 1 and evaluador_id = ? \
    ///      and (estado = ? or estado = ?)"
    /// );
    /// ```
    pub fn where_nested(self, build: impl FnOnce(QueryBuilder) -> QueryBuilder) -> Self {
        let inner = build(QueryBuilder::new(self.model));
        self.push_group(inner.wheres, Connector::And)
    }

    fn push_group(self, group: Vec<Where>, connector: Connector) -> Self {
        if group.is_empty() {
            return self;
        }
        self.push(Predicate::Nested(group), connector)
    }

    /// `column IN (?, ?, ...)`, one placeholder per value.
    pub fn where_in<V: Into<Value>>(self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.push(membership(column, values, false), Connector::And)
    }

    pub fn where_not_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(membership(column, values, true), Connector::And)
    }

    pub fn or_where_in<V: Into<Value>>(
        self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.push(membership(column, values, false), Connector::Or)
    }

    pub fn where_null(self, column: &str) -> Self {
        self.push(nullability(column, false), Connector::And)
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.push(nullability(column, true), Connector::And)
    }

    pub fn or_where_null(self, column: &str) -> Self {
        self.push(nullability(column, false), Connector::Or)
    }

    /// Appends `sql` verbatim with its own bindings.
    ///
    /// The caller is responsible for `sql` containing exactly `bindings.len()`
    /// placeholders and nothing untrusted.
    pub fn where_raw(self, sql: &str, bindings: Vec<Value>) -> Self {
        self.push(
            Predicate::Raw {
                sql: sql.to_owned(),
                bindings,
            },
            Connector::And,
        )
    }

    pub fn join(self, table: &str, first: &str, operator: Operator, second: &str) -> Self {
        self.add_join(table, first, operator, second, JoinKind::Inner)
    }

    pub fn left_join(self, table: &str, first: &str, operator: Operator, second: &str) -> Self {
        self.add_join(table, first, operator, second, JoinKind::Left)
    }

    pub fn right_join(self, table: &str, first: &str, operator: Operator, second: &str) -> Self {
        self.add_join(table, first, operator, second, JoinKind::Right)
    }

    fn add_join(
        mut self,
        table: &str,
        first: &str,
        operator: Operator,
        second: &str,
        kind: JoinKind,
    ) -> Self {
        self.joins.push(Join {
            table: table.to_owned(),
            first: first.to_owned(),
            operator,
            second: second.to_owned(),
            kind,
        });
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.orders.push(Order {
            column: column.to_owned(),
            direction,
        });
        self
    }

    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.groups.extend(columns.iter().map(|c| (*c).to_owned()));
        self
    }

    pub fn limit(mut self, value: u64) -> Self {
        self.limit = Some(value);
        self
    }

    pub fn offset(mut self, value: u64) -> Self {
        self.offset = Some(value);
        self
    }

    /// Alias for [`limit`](Self::limit).
    pub fn take(self, value: u64) -> Self {
        self.limit(value)
    }

    /// Alias for [`offset`](Self::offset).
    pub fn skip(self, value: u64) -> Self {
        self.offset(value)
    }

    /// Limit and offset for the 1-based `page` of `per_page` rows.
    ///
    /// Pages below 1 are treated as page 1.
    pub fn for_page(self, page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        self.skip((page - 1).saturating_mul(per_page)).take(per_page)
    }

    /// Compiled SQL text.
    pub fn to_sql(&self) -> String {
        self.compile().0
    }

    /// Bindings in placeholder order.
    pub fn bindings(&self) -> Vec<Value> {
        self.compile().1
    }

    /// Compiles the statement into SQL text and its positional bindings.
    ///
    /// The WHERE section opens with `1 = 1` and each predicate follows its
    /// stored connector, except the first, which is always joined with `and`
    /// so a leading `or_where*` narrows instead of matching every row.
    pub fn compile(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT {} FROM {}", self.compile_columns(), self.model.table());
        let mut bindings = Vec::new();

        self.compile_body(&mut sql, &mut bindings);

        if !self.groups.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.groups.join(", "));
        }

        if !self.orders.is_empty() {
            let orders: Vec<String> = self
                .orders
                .iter()
                .map(|o| format!("{} {}", o.column, o.direction.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        (sql, bindings)
    }

    // JOIN and WHERE sections, shared by the select and the count statements.
    fn compile_body(&self, sql: &mut String, bindings: &mut Vec<Value>) {
        for join in &self.joins {
            sql.push_str(&format!(
                " {} JOIN {} ON {} {} {}",
                join.kind.as_sql(),
                join.table,
                join.first,
                join.operator.as_sql(),
                join.second
            ));
        }

        if !self.wheres.is_empty() {
            sql.push_str(" WHERE 1 = 1");
            for (i, w) in self.wheres.iter().enumerate() {
                // The first predicate always conjoins with the tautology; `1 = 1 or p`
                // would match every row.
                let connector = if i == 0 { Connector::And } else { w.connector };
                sql.push(' ');
                sql.push_str(connector.as_sql());
                sql.push(' ');
                compile_predicate(&w.predicate, sql, bindings);
            }
        }
    }

    fn compile_columns(&self) -> String {
        if self.columns.is_empty() {
            "*".to_owned()
        } else {
            self.columns.join(", ")
        }
    }

    /// Statement counting the rows the query would return, ignoring order and
    /// pagination.
    pub fn compile_count(&self) -> (String, Vec<Value>) {
        let mut bindings = Vec::new();

        if self.groups.is_empty() {
            let mut sql = format!("SELECT COUNT(*) AS aggregate FROM {}", self.model.table());
            self.compile_body(&mut sql, &mut bindings);
            return (sql, bindings);
        }

        let mut inner = format!("SELECT {} FROM {}", self.compile_columns(), self.model.table());
        self.compile_body(&mut inner, &mut bindings);
        inner.push_str(" GROUP BY ");
        inner.push_str(&self.groups.join(", "));
        (
            format!("SELECT COUNT(*) AS aggregate FROM ({inner}) AS grouped"),
            bindings,
        )
    }

    /// Runs the query and hydrates every row.
    ///
    /// Returns an empty list when the statement fails; check
    /// [`Database::error`] to tell failure from no rows.
    pub fn get(self, db: &mut Database) -> Vec<Record> {
        let (sql, bindings) = self.compile();
        if db.query(&sql, &bindings).error() {
            return Vec::new();
        }
        debug!(table = self.model.table(), rows = db.count(), "query hydrated");
        db.results()
            .iter()
            .map(|row| Record::hydrate(self.model, row.clone()))
            .collect()
    }

    /// First matching record, with an implicit `LIMIT 1`.
    pub fn first(self, db: &mut Database) -> Option<Record> {
        self.limit(1).get(db).into_iter().next()
    }

    /// Record whose primary key equals `id`.
    pub fn find(self, db: &mut Database, id: impl Into<Value>) -> Option<Record> {
        let key = self.model.primary_key();
        self.where_eq(key, id).first(db)
    }

    /// Number of rows the query matches. `0` on failure.
    pub fn count(self, db: &mut Database) -> i64 {
        let (sql, bindings) = self.compile_count();
        if db.query(&sql, &bindings).error() {
            return 0;
        }
        db.first()
            .and_then(|row| row.get("aggregate"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }

    /// Runs the count and the page query.
    pub fn paginate(self, db: &mut Database, page: u64, per_page: u64) -> Page {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total = self.clone().count(db);
        let items = self.for_page(page, per_page).get(db);
        let last_page = (total.max(0) as u64).div_ceil(per_page).max(1);
        Page {
            items,
            total,
            page,
            per_page,
            last_page,
        }
    }
}

fn basic(column: &str, operator: Operator, value: impl Into<Value>) -> Predicate {
    Predicate::Basic {
        column: column.to_owned(),
        operator,
        value: value.into(),
    }
}

fn membership<V: Into<Value>>(
    column: &str,
    values: impl IntoIterator<Item = V>,
    not: bool,
) -> Predicate {
    Predicate::In {
        column: column.to_owned(),
        values: values.into_iter().map(Into::into).collect(),
        not,
    }
}

fn nullability(column: &str, not: bool) -> Predicate {
    Predicate::Null {
        column: column.to_owned(),
        not,
    }
}

fn compile_predicate(predicate: &Predicate, sql: &mut String, bindings: &mut Vec<Value>) {
    match predicate {
        Predicate::Basic {
            column,
            operator,
            value,
        } => {
            sql.push_str(&format!("{column} {} ?", operator.as_sql()));
            bindings.push(value.clone());
        }
        Predicate::In { values, not, .. } if values.is_empty() => {
            // Nothing is in the empty set; everything is outside it.
            sql.push_str(if *not { "1 = 1" } else { "0 = 1" });
        }
        Predicate::In {
            column,
            values,
            not,
        } => {
            let placeholders = vec!["?"; values.len()].join(", ");
            let keyword = if *not { "NOT IN" } else { "IN" };
            sql.push_str(&format!("{column} {keyword} ({placeholders})"));
            bindings.extend(values.iter().cloned());
        }
        Predicate::Null { column, not } => {
            sql.push_str(column);
            sql.push_str(if *not { " IS NOT NULL" } else { " IS NULL" });
        }
        Predicate::Raw {
            sql: raw,
            bindings: raw_bindings,
        } => {
            sql.push_str(raw);
            bindings.extend(raw_bindings.iter().cloned());
        }
        Predicate::Nested(group) => {
            sql.push('(');
            for (i, w) in group.iter().enumerate() {
                if i > 0 {
                    sql.push(' ');
                    sql.push_str(w.connector.as_sql());
                    sql.push(' ');
                }
                compile_predicate(&w.predicate, sql, bindings);
            }
            sql.push(')');
        }
    }
}

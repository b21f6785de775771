//! Datastore gateway: filtered/sorted queries, id lookups and atomic write
//! batches over the entity tables.
//!
//! Every read goes through [`Gateway::find_by_filter`] or
//! [`Gateway::find_by_ids`]; every write happens inside
//! [`Gateway::run_in_transaction`], so a failed batch never leaves half of its
//! rows behind.

use std::future::Future;
use std::pin::Pin;

use libsql::{Connection, Row, Value};

use crate::Db;

/// Errors surfaced by the datastore gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Table '{0}' doesn't exist")]
    MissingTable(String),

    #[error("unknown column '{column}' for table '{table}'")]
    UnknownColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("query failed: {0}")]
    Query(#[source] libsql::Error),

    #[error("write failed: {0}")]
    Write(#[source] libsql::Error),

    #[error("failed to begin transaction: {0}")]
    Begin(#[source] libsql::Error),

    #[error("failed to commit transaction: {0}")]
    Commit(#[source] libsql::Error),

    #[error("invalid {table} row: {message}")]
    InvalidRow {
        table: &'static str,
        message: String,
    },

    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Extended SQLite result code for a failed UNIQUE constraint.
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

impl GatewayError {
    /// A write rejected because it would duplicate a UNIQUE column.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            GatewayError::Write(libsql::Error::SqliteFailure(SQLITE_CONSTRAINT_UNIQUE, _)) => true,
            GatewayError::Write(e) => e.to_string().contains("UNIQUE constraint failed"),
            _ => false,
        }
    }
}

/// A persisted entity the gateway knows how to read and write.
pub trait Record: Sized {
    const TABLE: &'static str;
    /// Column names in the order `from_row` reads and `values` writes them.
    /// The first column is the primary key.
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &Row) -> Result<Self, GatewayError>;

    fn id(&self) -> &str;

    fn values(&self) -> Result<Vec<Value>, GatewayError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Gte,
    Lte,
}

impl Op {
    fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone)]
struct Clause {
    column: &'static str,
    op: Op,
    value: Value,
}

/// A parameterized conjunction of column comparisons.
///
/// ```ignore
/// let filter = Filter::new()
///     .eq("owner", user_id)
///     .gte("processed_at", start_date);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Eq, value)
    }

    pub fn gt(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Gt, value)
    }

    pub fn gte(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Gte, value)
    }

    pub fn lte(self, column: &'static str, value: impl Into<Value>) -> Self {
        self.with(column, Op::Lte, value)
    }

    fn with(mut self, column: &'static str, op: Op, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause {
            column,
            op,
            value: value.into(),
        });
        self
    }

    /// Renders the `WHERE` body and its positional parameters. An empty
    /// filter matches every row.
    fn to_sql(
        &self,
        table: &'static str,
        columns: &[&str],
    ) -> Result<(String, Vec<Value>), GatewayError> {
        if self.clauses.is_empty() {
            return Ok(("1 = 1".to_string(), Vec::new()));
        }

        let mut parts = Vec::with_capacity(self.clauses.len());
        let mut params = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            check_column(table, columns, clause.column)?;
            parts.push(format!("{} {} ?", clause.column, clause.op.as_sql()));
            params.push(clause.value.clone());
        }

        Ok((parts.join(" AND "), params))
    }
}

/// Sort order expressed the way callers write it: a column name, optionally
/// prefixed with `-` for descending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub column: &'static str,
    pub descending: bool,
}

impl Sort {
    pub fn parse(expr: &'static str) -> Self {
        match expr.strip_prefix('-') {
            Some(column) => Sort {
                column,
                descending: true,
            },
            None => Sort {
                column: expr.strip_prefix('+').unwrap_or(expr),
                descending: false,
            },
        }
    }

    fn to_sql(self, table: &'static str, columns: &[&str]) -> Result<String, GatewayError> {
        check_column(table, columns, self.column)?;
        let direction = if self.descending { "DESC" } else { "ASC" };
        Ok(format!("{} {}", self.column, direction))
    }
}

fn check_column(
    table: &'static str,
    columns: &[&str],
    column: &'static str,
) -> Result<(), GatewayError> {
    if columns.contains(&column) {
        Ok(())
    } else {
        Err(GatewayError::UnknownColumn { table, column })
    }
}

/// Shared handle to the datastore.
#[derive(Clone)]
pub struct Gateway {
    db: Db,
}

impl Gateway {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool, GatewayError> {
        let conn = self.db.read().await;
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
                [table],
            )
            .await
            .map_err(GatewayError::Query)?;

        Ok(rows.next().await.map_err(GatewayError::Query)?.is_some())
    }

    /// Fails with [`GatewayError::MissingTable`] when `table` is absent.
    pub async fn require_table(&self, table: &str) -> Result<(), GatewayError> {
        if self.table_exists(table).await? {
            Ok(())
        } else {
            Err(GatewayError::MissingTable(table.to_string()))
        }
    }

    /// Rows of `R` matching `filter`, ordered by `sort`. `limit = None`
    /// returns every match.
    pub async fn find_by_filter<R: Record>(
        &self,
        filter: &Filter,
        sort: Sort,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<R>, GatewayError> {
        let (condition, mut params) = filter.to_sql(R::TABLE, R::COLUMNS)?;
        let order = sort.to_sql(R::TABLE, R::COLUMNS)?;

        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(i64::from).unwrap_or(-1);
        params.push(Value::Integer(limit));
        params.push(Value::Integer(i64::from(offset)));

        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            R::COLUMNS.join(", "),
            R::TABLE,
            condition,
            order
        );

        let conn = self.db.read().await;
        collect_rows(&conn, &sql, params).await
    }

    /// Rows of `R` whose primary key is in `ids`. Unknown ids are skipped.
    pub async fn find_by_ids<R: Record>(&self, ids: &[String]) -> Result<Vec<R>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE {} IN ({})",
            R::COLUMNS.join(", "),
            R::TABLE,
            R::COLUMNS[0],
            placeholders
        );
        let params = ids.iter().cloned().map(Value::Text).collect();

        let conn = self.db.read().await;
        collect_rows(&conn, &sql, params).await
    }

    /// Runs `f` inside a database transaction. Every write made through the
    /// [`Tx`] handle commits together, or none of them do when `f` fails.
    ///
    /// The closure returns a boxed future to tie it to the borrowed handle:
    /// ```ignore
    /// gateway.run_in_transaction(|tx| Box::pin(async move {
    ///     tx.save(&transaction).await?;
    ///     Ok(())
    /// })).await?;
    /// ```
    pub async fn run_in_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'a> FnOnce(Tx<'a>) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>,
        E: From<GatewayError>,
    {
        // Exclusive access for the whole transaction
        let conn = self.db.write().await;

        conn.execute("BEGIN TRANSACTION", ())
            .await
            .map_err(GatewayError::Begin)?;

        match f(Tx { conn: &*conn }).await {
            Ok(result) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    if let Err(rollback_error) = conn.execute("ROLLBACK", ()).await {
                        tracing::error!(
                            error = %rollback_error,
                            "rollback after failed commit failed"
                        );
                    }
                    return Err(GatewayError::Commit(e).into());
                }
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_error) = conn.execute("ROLLBACK", ()).await {
                    tracing::error!(error = %rollback_error, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// Write handle valid for the duration of one [`Gateway::run_in_transaction`] call.
#[derive(Clone, Copy)]
pub struct Tx<'a> {
    conn: &'a Connection,
}

impl Tx<'_> {
    /// Inserts `record`, replacing any row with the same primary key or the
    /// same value in a UNIQUE column.
    pub async fn save<R: Record>(&self, record: &R) -> Result<(), GatewayError> {
        self.write("INSERT OR REPLACE", record).await
    }

    /// Inserts a new `record`; fails when it collides with an existing row.
    pub async fn insert<R: Record>(&self, record: &R) -> Result<(), GatewayError> {
        self.write("INSERT", record).await
    }

    async fn write<R: Record>(&self, verb: &str, record: &R) -> Result<(), GatewayError> {
        let placeholders = vec!["?"; R::COLUMNS.len()].join(", ");
        let sql = format!(
            "{} INTO {} ({}) VALUES ({})",
            verb,
            R::TABLE,
            R::COLUMNS.join(", "),
            placeholders
        );

        self.conn
            .execute(&sql, record.values()?)
            .await
            .map_err(GatewayError::Write)?;
        Ok(())
    }

    pub async fn delete<R: Record>(&self, record: &R) -> Result<(), GatewayError> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", R::TABLE, R::COLUMNS[0]);

        self.conn
            .execute(&sql, [record.id()])
            .await
            .map_err(GatewayError::Write)?;
        Ok(())
    }
}

async fn collect_rows<R: Record>(
    conn: &Connection,
    sql: &str,
    params: Vec<Value>,
) -> Result<Vec<R>, GatewayError> {
    let mut rows = conn.query(sql, params).await.map_err(GatewayError::Query)?;

    let mut records = Vec::new();
    while let Some(row) = rows.next().await.map_err(GatewayError::Query)? {
        records.push(R::from_row(&row)?);
    }
    Ok(records)
}

/// Column readers shared by the `Record` implementations.
pub(crate) mod column {
    use libsql::{Row, Value};

    use super::GatewayError;

    fn invalid(table: &'static str, index: i32, e: impl std::fmt::Display) -> GatewayError {
        GatewayError::InvalidRow {
            table,
            message: format!("column {}: {}", index, e),
        }
    }

    pub fn text(table: &'static str, row: &Row, index: i32) -> Result<String, GatewayError> {
        match optional_text(table, row, index)? {
            Some(value) => Ok(value),
            None => Ok(String::new()),
        }
    }

    /// NULL and the empty string both read as `None`.
    pub fn optional_text(
        table: &'static str,
        row: &Row,
        index: i32,
    ) -> Result<Option<String>, GatewayError> {
        match row.get_value(index).map_err(|e| invalid(table, index, e))? {
            Value::Null => Ok(None),
            Value::Text(value) if value.is_empty() => Ok(None),
            Value::Text(value) => Ok(Some(value)),
            other => Err(invalid(table, index, format!("expected text, got {:?}", other))),
        }
    }

    pub fn real(table: &'static str, row: &Row, index: i32) -> Result<f64, GatewayError> {
        match row.get_value(index).map_err(|e| invalid(table, index, e))? {
            Value::Real(value) => Ok(value),
            Value::Integer(value) => Ok(value as f64),
            other => Err(invalid(table, index, format!("expected number, got {:?}", other))),
        }
    }

    pub fn integer(table: &'static str, row: &Row, index: i32) -> Result<i64, GatewayError> {
        match row.get_value(index).map_err(|e| invalid(table, index, e))? {
            Value::Integer(value) => Ok(value),
            other => Err(invalid(table, index, format!("expected integer, got {:?}", other))),
        }
    }

    pub fn optional(value: Option<&str>) -> Value {
        match value {
            Some(value) => Value::Text(value.to_string()),
            None => Value::Null,
        }
    }
}

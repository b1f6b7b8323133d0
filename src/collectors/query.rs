//! Query execution against the shared pool and failure classification.

use sqlx::postgres::{PgPool, PgRow};
use sqlx::FromRow;
use std::time::Duration;
use thiserror::Error;
use tracing::info_span;
use tracing_futures::Instrument as _;

/// SQLSTATE codes meaning an optional relation, function or extension is
/// not there. These are environment-dependent absences, not defects.
const UNDEFINED_TABLE: &str = "42P01";
const UNDEFINED_FUNCTION: &str = "42883";
const UNDEFINED_OBJECT: &str = "42704";
const INVALID_SCHEMA_NAME: &str = "3F000";

/// How a failed cycle is treated by the poll loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// Unreachable server, pool exhaustion or a query past its deadline.
    Connectivity,
    /// Result shape did not match the row type.
    Decode,
    /// The server rejected the query for any other reason.
    Query,
    /// A relation or extension the query needs is not installed.
    ExpectedAbsence,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failure: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("unexpected result shape: {0}")]
    Decode(#[source] sqlx::Error),

    #[error("could not publish samples: {0}")]
    Publish(#[from] prometheus::Error),

    #[error("{message} (SQLSTATE {code})")]
    Missing { code: String, message: String },

    #[error("{message} (SQLSTATE {})", .code.as_deref().unwrap_or("unknown"))]
    Database {
        code: Option<String>,
        message: String,
    },
}

impl QueryError {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) | Self::Connection(_) => FailureKind::Connectivity,
            Self::Decode(_) | Self::Publish(_) => FailureKind::Decode,
            Self::Missing { .. } => FailureKind::ExpectedAbsence,
            Self::Database { .. } => FailureKind::Query,
        }
    }

    #[must_use]
    pub const fn is_expected_absence(&self) -> bool {
        matches!(self.kind(), FailureKind::ExpectedAbsence)
    }
}

/// Whether a SQLSTATE code reports a missing relation, function or extension.
#[must_use]
pub fn is_missing_object(code: Option<&str>) -> bool {
    matches!(
        code,
        Some(UNDEFINED_TABLE | UNDEFINED_FUNCTION | UNDEFINED_OBJECT | INVALID_SCHEMA_NAME)
    )
}

impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                let code = db.code().map(|c| c.into_owned());
                let message = db.message().to_string();
                if is_missing_object(code.as_deref()) {
                    Self::Missing {
                        code: code.unwrap_or_default(),
                        message,
                    }
                } else {
                    Self::Database { code, message }
                }
            }
            err @ (sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::RowNotFound) => Self::Decode(err),
            err => Self::Connection(err),
        }
    }
}

/// Positional query parameter, bound as `$1`, `$2`, ...
#[derive(Clone, Copy, Debug)]
pub enum Param<'a> {
    Text(&'a str),
    Int(i64),
    Float(f64),
}

/// Runs static diagnostic queries on the shared pool under a deadline.
#[derive(Clone, Debug)]
pub struct QueryExecutor {
    pool: PgPool,
    timeout: Duration,
}

impl QueryExecutor {
    #[must_use]
    pub const fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute `sql` and decode every row into `T` by column name.
    ///
    /// # Errors
    ///
    /// Returns a classified [`QueryError`] on timeout, connection, server or
    /// decode failure.
    pub async fn fetch_all<T>(
        &self,
        sql: &'static str,
        params: &[Param<'_>],
    ) -> Result<Vec<T>, QueryError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = sql,
            otel.kind = "client"
        );

        let mut query = sqlx::query_as::<_, T>(sql);
        for param in params {
            query = match *param {
                Param::Text(value) => query.bind(value),
                Param::Int(value) => query.bind(value),
                Param::Float(value) => query.bind(value),
            };
        }

        let rows = tokio::time::timeout(self.timeout, query.fetch_all(&self.pool))
            .instrument(span)
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))??;

        Ok(rows)
    }

    /// Check that the server answers at all.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] if the round trip fails or times out.
    pub async fn ping(&self) -> Result<(), QueryError> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = "SELECT 1",
            otel.kind = "client"
        );

        tokio::time::timeout(self.timeout, sqlx::query("SELECT 1").execute(&self.pool))
            .instrument(span)
            .await
            .map_err(|_| QueryError::Timeout(self.timeout))??;

        Ok(())
    }
}

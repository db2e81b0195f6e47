//! Error types for pgscratch.
//!
//! Every failure in the provisioning path is terminal for the operation that
//! raised it. Errors that an operator can fix by hand (a missing role, a
//! missing `CREATEDB` grant) carry the commands that fix them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScratchError {
    #[error("Failed to generate database identifier: {source}")]
    Generation { source: rand::Error },

    #[error(
        "Connection to Postgres failed ({target}): {source}{}",
        remediation_suffix(.remediation)
    )]
    Connection {
        /// Redacted connection target, e.g. `postgres://user@localhost:5432/postgres`
        target: String,
        source: sqlx::Error,
        /// Operator commands, present for administrative connections only.
        remediation: Option<String>,
    },

    #[error("Failed to {operation} database {database}: {source}")]
    Provisioning {
        operation: &'static str,
        database: String,
        source: sqlx::Error,
    },

    #[error("Failed to create table {table}: {source}")]
    Schema { table: String, source: sqlx::Error },

    #[error("Catalog query '{query}' failed: {source}")]
    Catalog {
        query: &'static str,
        source: sqlx::Error,
    },

    #[error("Invalid database name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Teardown failed: {}", .failures.join("; "))]
    Teardown { failures: Vec<String> },
}

fn remediation_suffix(remediation: &Option<String>) -> String {
    match remediation {
        Some(text) => format!("\n{text}"),
        None => String::new(),
    }
}

impl ScratchError {
    /// Create an identifier generation error.
    pub fn generation(source: rand::Error) -> Self {
        Self::Generation { source }
    }

    /// Create a connection error carrying operator remediation text.
    pub fn admin_connection(
        target: impl Into<String>,
        source: sqlx::Error,
        remediation: impl Into<String>,
    ) -> Self {
        Self::Connection {
            target: target.into(),
            source,
            remediation: Some(remediation.into()),
        }
    }

    /// Create a connection error for a scoped (per-test) connection.
    pub fn scoped_connection(target: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Connection {
            target: target.into(),
            source,
            remediation: None,
        }
    }

    /// Create a provisioning error for a create/drop statement.
    pub fn provisioning(
        operation: &'static str,
        database: impl Into<String>,
        source: sqlx::Error,
    ) -> Self {
        Self::Provisioning {
            operation,
            database: database.into(),
            source,
        }
    }

    /// Create a schema application error.
    pub fn schema(table: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Schema {
            table: table.into(),
            source,
        }
    }

    /// Create a catalog query error.
    pub fn catalog(query: &'static str, source: sqlx::Error) -> Self {
        Self::Catalog { query, source }
    }

    /// Create an invalid name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Get the operator remediation text, if this error carries one.
    pub fn remediation(&self) -> Option<&str> {
        match self {
            Self::Connection { remediation, .. } => remediation.as_deref(),
            _ => None,
        }
    }

    /// One-line description without remediation text, for log fields.
    ///
    /// The remediation embeds the configured password, so it belongs in the
    /// error shown to the operator and never in structured logs.
    pub fn summary(&self) -> String {
        match self {
            Self::Connection { target, source, .. } => {
                format!("Connection to Postgres failed ({target}): {source}")
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for pgscratch operations.
pub type ScratchResult<T> = Result<T, ScratchError>;

//! Table definitions.
//!
//! Deliberately minimal: a table is a name and an ordered list of typed
//! columns. No constraints, defaults, indexes, or foreign keys.

use crate::error::{ScratchError, ScratchResult};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;
use std::fmt;
use tracing::debug;

/// Column types supported by [`Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Text,
    Boolean,
}

impl ColumnType {
    /// Type name as declared in DDL and reported by `information_schema`.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Text => "text",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Boolean)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.column_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Append a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Append columns in iteration order.
    pub fn columns(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Render the `CREATE TABLE` statement, one column per line in declaration order.
    pub fn create_statement(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| format!("\n{c}")).collect();
        format!("CREATE TABLE {} ({})\n", self.name, columns.join(","))
    }

    /// Create the table through `executor`.
    pub async fn apply<'c, E>(&self, executor: E) -> ScratchResult<()>
    where
        E: PgExecutor<'c>,
    {
        let ddl = self.create_statement();
        debug!(table = %self.name, columns = self.columns.len(), "Applying table definition");
        sqlx::query(&ddl)
            .execute(executor)
            .await
            .map_err(|e| ScratchError::schema(&self.name, e))?;
        Ok(())
    }
}

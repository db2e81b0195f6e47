//! Data models.
//!
//! - Table and column definitions

pub mod table;

pub use table::{Column, ColumnType, Table};

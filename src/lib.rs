//! pgscratch
//!
//! Disposable PostgreSQL databases for tests. Each test gets a freshly created
//! database with a unique name; when the test passes the database is dropped,
//! when it fails the database is kept so its contents can be inspected.

pub mod config;
pub mod db;
pub mod error;
pub mod harness;
pub mod ident;
pub mod models;

pub use config::Credentials;
pub use db::{EphemeralDatabase, Provisioner};
pub use error::{ScratchError, ScratchResult};
pub use harness::TestScope;

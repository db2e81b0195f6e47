//! Database layer.
//!
//! - Administrative connections to the bootstrap database
//! - Scratch database provisioning and teardown
//! - Catalog queries for listing and verification

pub mod admin;
pub mod catalog;
pub mod provision;

pub use admin::AdminConnector;
pub use catalog::ScratchDatabase;
pub use provision::{EphemeralDatabase, Provisioner};

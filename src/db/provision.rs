//! Scratch database provisioning.
//!
//! [`Provisioner::provision`] creates a uniquely named database, opens a pool
//! scoped to it, and registers a teardown on the owning [`TestScope`]. The
//! teardown decides at the last moment whether to drop the database (test
//! passed) or leave it for inspection (test failed).

use crate::config::Credentials;
use crate::db::admin::AdminConnector;
use crate::db::catalog::{self, ScratchDatabase};
use crate::error::{ScratchError, ScratchResult};
use crate::harness::TestScope;
use crate::ident::DatabaseName;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Quote `value` as a Postgres string literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A live pool scoped to one scratch database, owned by one test.
///
/// The pool is closed by the teardown, which also closes every clone of it.
#[derive(Debug, Clone)]
pub struct EphemeralDatabase {
    name: DatabaseName,
    pool: PgPool,
}

impl EphemeralDatabase {
    pub fn name(&self) -> &DatabaseName {
        &self.name
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Creates and destroys scratch databases on one server.
#[derive(Debug, Clone)]
pub struct Provisioner {
    connector: AdminConnector,
}

impl Provisioner {
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self {
            connector: AdminConnector::new(credentials),
        }
    }

    pub fn connector(&self) -> &AdminConnector {
        &self.connector
    }

    /// Provision a scratch database for `owner`.
    ///
    /// Every step runs in order and any failure ends the attempt. The teardown
    /// is registered only once the database exists and answers.
    pub async fn provision(&self, owner: &TestScope) -> ScratchResult<EphemeralDatabase> {
        let mut admin = self.connector.connect().await?;
        let created = self.create_database(&mut admin, owner).await;
        self.connector.release(admin, Some(owner)).await;
        let name = created?;

        let pool = match self.open_scoped(&name).await {
            Ok(pool) => pool,
            Err(err) => {
                // Nothing references the new database yet.
                if let Err(drop_err) = self.drop_for(&name, Some(owner)).await {
                    owner.warn(format!(
                        "Scratch database {name} could not be dropped: {}",
                        drop_err.summary()
                    ));
                }
                return Err(err);
            }
        };

        self.register_teardown(owner, name.clone(), pool.clone());
        info!(test = %owner, database = %name, "Provisioned scratch database");

        Ok(EphemeralDatabase { name, pool })
    }

    async fn create_database(
        &self,
        admin: &mut PgConnection,
        owner: &TestScope,
    ) -> ScratchResult<DatabaseName> {
        let name = DatabaseName::generate()?;

        let create = format!("CREATE DATABASE {name}");
        sqlx::query(&create)
            .execute(&mut *admin)
            .await
            .map_err(|e| ScratchError::provisioning("create", name.as_str(), e))?;
        debug!(database = %name, "Created scratch database");

        let comment = format!(
            "COMMENT ON DATABASE {name} IS {}",
            quote_literal(&format!("pgscratch: {}", owner.name()))
        );
        if let Err(e) = sqlx::query(&comment).execute(&mut *admin).await {
            owner.warn(format!("Could not comment scratch database {name}: {e}"));
        }

        Ok(name)
    }

    /// Open a pool scoped to `name` and confirm it answers a query.
    async fn open_scoped(&self, name: &DatabaseName) -> ScratchResult<PgPool> {
        let credentials = self.connector.credentials();
        let url = credentials.redacted_url(name.as_str());

        let pool = PgPoolOptions::new()
            .max_connections(credentials.max_connections.max(1))
            .connect_with(credentials.connect_options(name.as_str()))
            .await
            .map_err(|e| ScratchError::scoped_connection(&url, e))?;

        if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
            pool.close().await;
            return Err(ScratchError::scoped_connection(url, e));
        }

        Ok(pool)
    }

    fn register_teardown(&self, owner: &TestScope, name: DatabaseName, pool: PgPool) {
        let provisioner = self.clone();
        owner.cleanup(move |scope| async move {
            pool.close().await;

            // Read the outcome now: the test may have failed after provisioning.
            if scope.failed() {
                scope.log(format!("Database left intact: {name}"));
                return Ok(());
            }

            provisioner.drop_for(&name, Some(&scope)).await
        });
    }

    /// Drop a scratch database over a fresh administrative connection.
    pub async fn drop_database(&self, name: &DatabaseName) -> ScratchResult<()> {
        self.drop_for(name, None).await
    }

    /// Drop each of `names`, continuing past failures.
    pub async fn drop_databases(&self, names: &[DatabaseName]) -> DropReport {
        let mut report = DropReport::default();
        for name in names {
            match self.drop_database(name).await {
                Ok(()) => report.dropped.push(name.clone()),
                Err(err) => {
                    warn!(
                        database = %name,
                        error = %err.summary(),
                        "Failed to drop scratch database"
                    );
                    report.failed.push((name.clone(), err));
                }
            }
        }
        report
    }

    async fn drop_for(
        &self,
        name: &DatabaseName,
        scope: Option<&TestScope>,
    ) -> ScratchResult<()> {
        let mut admin = self.connector.connect().await?;
        let drop = format!("DROP DATABASE {name}");
        let result = sqlx::query(&drop).execute(&mut admin).await;
        self.connector.release(admin, scope).await;

        result.map_err(|e| ScratchError::provisioning("drop", name.as_str(), e))?;
        info!(database = %name, "Dropped scratch database");
        Ok(())
    }

    /// Every scratch database on the server.
    ///
    /// This includes databases kept by failing tests and databases of tests
    /// that are still running; the catalog cannot tell them apart.
    pub async fn list_scratch_databases(&self) -> ScratchResult<Vec<ScratchDatabase>> {
        let mut admin = self.connector.connect().await?;
        let result = catalog::list_scratch_databases(&mut admin).await;
        self.connector.release(admin, None).await;
        result
    }

    /// Whether the scratch database `name` still exists.
    pub async fn exists(&self, name: &DatabaseName) -> ScratchResult<bool> {
        let mut admin = self.connector.connect().await?;
        let result = catalog::database_exists(&mut admin, name.as_str()).await;
        self.connector.release(admin, None).await;
        result
    }
}

/// Result of [`Provisioner::drop_databases`].
#[derive(Debug, Default)]
pub struct DropReport {
    pub dropped: Vec<DatabaseName>,
    pub failed: Vec<(DatabaseName, ScratchError)>,
}

impl DropReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

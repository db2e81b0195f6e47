//! Administrative connections.
//!
//! The administrative connection targets the server's bootstrap database and
//! is the only connection allowed to create and drop scratch databases. It is
//! opened per operation and closed right after, never held for a test's
//! lifetime.

use crate::config::Credentials;
use crate::error::{ScratchError, ScratchResult};
use crate::harness::TestScope;
use sqlx::{Connection, PgConnection};
use std::sync::Arc;
use tracing::{debug, warn};

/// Opens liveness-checked connections to the bootstrap database.
#[derive(Debug, Clone)]
pub struct AdminConnector {
    credentials: Arc<Credentials>,
}

impl AdminConnector {
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Commands an operator runs to create the configured role with CREATEDB.
    pub fn remediation(&self) -> String {
        remediation_for(&self.credentials)
    }

    /// Open an administrative connection and confirm the server answers.
    ///
    /// Both failures carry [`AdminConnector::remediation`]. If the server
    /// accepted the connection but did not answer the ping, the connection is
    /// closed before the error is returned.
    pub async fn connect(&self) -> ScratchResult<PgConnection> {
        let database = &self.credentials.admin_database;
        let url = self.credentials.redacted_url(database);
        debug!(url = %url, "Opening administrative connection");

        let options = self.credentials.connect_options(database);
        let mut conn = PgConnection::connect_with(&options)
            .await
            .map_err(|e| ScratchError::admin_connection(&url, e, self.remediation()))?;

        if let Err(e) = conn.ping().await {
            self.release(conn, None).await;
            return Err(ScratchError::admin_connection(url, e, self.remediation()));
        }

        Ok(conn)
    }

    /// Close an administrative connection. Failures are logged, not returned.
    ///
    /// With a `scope`, a close failure is also recorded as a warning on it,
    /// leaving the test's outcome unchanged.
    pub async fn release(&self, conn: PgConnection, scope: Option<&TestScope>) {
        if let Err(e) = conn.close().await {
            report_close_failure(&e, scope);
        }
    }
}

fn report_close_failure(error: &sqlx::Error, scope: Option<&TestScope>) {
    match scope {
        Some(scope) => {
            scope.warn(format!("Failed to close administrative connection: {error}"));
        }
        None => warn!(error = %error, "Failed to close administrative connection"),
    }
}

/// Remediation text for a server that rejects `credentials`.
pub fn remediation_for(credentials: &Credentials) -> String {
    let username = &credentials.username;
    let password = credentials.password.replace('\'', "''");
    format!(
        "Please run the following commands to create the necessary user and grant permissions:\n\
         \tsudo -u postgres createuser --createdb --pwprompt {username}\n\
         \tsudo -u postgres psql -c \"ALTER USER {username} WITH PASSWORD '{password}' CREATEDB;\""
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remediation_names_configured_role() {
        let creds = Credentials::new("ci_runner", "s3cret");
        let text = remediation_for(&creds);
        assert!(text.contains("createuser --createdb --pwprompt ci_runner"));
        assert!(text.contains("ALTER USER ci_runner WITH PASSWORD 's3cret' CREATEDB;"));
    }

    #[test]
    fn test_remediation_escapes_quotes_in_password() {
        let creds = Credentials::new("ci_runner", "it's");
        let text = remediation_for(&creds);
        assert!(text.contains("PASSWORD 'it''s'"));
    }

    #[test]
    fn test_close_failure_is_a_scope_warning() {
        let scope = TestScope::new("close_failure");
        report_close_failure(&sqlx::Error::PoolClosed, Some(&scope));

        assert!(!scope.failed());
        let logs = scope.logs();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].starts_with("Failed to close administrative connection"));
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_remediation() {
        let creds = Credentials {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Credentials::new("nobody_here", "wrong")
        };
        let connector = AdminConnector::new(Arc::new(creds));
        let err = connector.connect().await.unwrap_err();

        assert!(matches!(err, ScratchError::Connection { .. }));
        let text = err.to_string();
        assert!(text.contains("createuser --createdb --pwprompt nobody_here"));
        assert!(text.contains("ALTER USER nobody_here"));
        assert!(err.remediation().is_some());
    }
}

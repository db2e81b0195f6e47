//! pgscratch - janitor for scratch databases.
//!
//! Failing tests leave their scratch databases behind for inspection. This
//! binary lists them and drops them once they are no longer needed.

use clap::Parser;
use pgscratch::config::{Command, Config};
use pgscratch::db::Provisioner;
use pgscratch::db::catalog::{ScratchDatabase, format_size};
use pgscratch::error::{ScratchError, ScratchResult};
use pgscratch::ident::DatabaseName;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn print_table(databases: &[ScratchDatabase]) {
    if databases.is_empty() {
        println!("No scratch databases found.");
        return;
    }

    println!("{:<41} {:>10}  OWNER", "NAME", "SIZE");
    for db in databases {
        let size = db.size_bytes.map(format_size).unwrap_or_else(|| "-".to_string());
        let owner = db.comment.as_deref().unwrap_or("-");
        println!("{:<41} {:>10}  {}", db.name, size, owner);
    }
}

type CommandResult = Result<(), Box<dyn std::error::Error>>;

async fn list(provisioner: &Provisioner, json: bool) -> CommandResult {
    let databases = provisioner.list_scratch_databases().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&databases)?);
    } else {
        print_table(&databases);
    }
    Ok(())
}

/// Drop `names`, reporting each outcome. Fails if any drop failed.
async fn drop_all(provisioner: &Provisioner, names: &[DatabaseName]) -> CommandResult {
    let report = provisioner.drop_databases(names).await;
    for name in &report.dropped {
        println!("Dropped {name}");
    }
    for (name, err) in &report.failed {
        eprintln!("Failed to drop {name}: {}", err.summary());
    }

    if report.is_complete() {
        Ok(())
    } else {
        Err(format!(
            "{} of {} scratch databases could not be dropped",
            report.failed.len(),
            names.len()
        )
        .into())
    }
}

async fn drop_named(provisioner: &Provisioner, names: &[String]) -> CommandResult {
    // Validate every name before touching the server.
    let names = names
        .iter()
        .map(|name| DatabaseName::parse(name))
        .collect::<ScratchResult<Vec<_>>>()?;

    drop_all(provisioner, &names).await
}

/// Drop every scratch database. Databases of running tests fail to drop and
/// are reported without stopping the purge.
async fn purge(provisioner: &Provisioner, dry_run: bool) -> CommandResult {
    let databases = provisioner.list_scratch_databases().await?;
    info!(count = databases.len(), dry_run, "Purging scratch databases");

    let names: Vec<DatabaseName> = databases.into_iter().map(|db| db.name).collect();
    if dry_run {
        for name in &names {
            println!("Would drop {name}");
        }
        return Ok(());
    }
    drop_all(provisioner, &names).await
}

/// Log-safe rendering of a command error.
fn summarize(err: &(dyn std::error::Error + 'static)) -> String {
    match err.downcast_ref::<ScratchError>() {
        Some(err) => err.summary(),
        None => err.to_string(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::parse();

    init_tracing(&config);

    let provisioner = Provisioner::new(Arc::new(config.credentials.clone()));

    let result = match config.command {
        Command::List { json } => list(&provisioner, json).await,
        Command::Drop { ref names } => drop_named(&provisioner, names).await,
        Command::Purge { dry_run } => purge(&provisioner, dry_run).await,
    };

    if let Err(e) = result {
        error!(error = %summarize(e.as_ref()), "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_hides_remediation() {
        let err: Box<dyn std::error::Error> = Box::new(ScratchError::admin_connection(
            "postgres://ci@localhost:5432/postgres",
            sqlx::Error::PoolClosed,
            "ALTER USER ci WITH PASSWORD 'hunter2' CREATEDB;",
        ));
        assert!(!summarize(err.as_ref()).contains("hunter2"));

        let plain: Box<dyn std::error::Error> = "could not be dropped".into();
        assert_eq!(summarize(plain.as_ref()), plain.to_string());
    }

    #[tokio::test]
    async fn test_drop_all_reports_every_failure() {
        let creds = pgscratch::config::Credentials {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        };
        let provisioner = Provisioner::new(Arc::new(creds));
        let names = vec![
            DatabaseName::generate().unwrap(),
            DatabaseName::generate().unwrap(),
        ];

        let err = drop_all(&provisioner, &names).await.unwrap_err();
        assert_eq!(err.to_string(), "2 of 2 scratch databases could not be dropped");
    }
}

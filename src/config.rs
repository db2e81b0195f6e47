//! Configuration handling for pgscratch.
//!
//! Server credentials come from CLI arguments or environment variables and are
//! fixed for the life of the process. Library callers construct
//! [`Credentials`] directly or read them from the environment with
//! [`Credentials::from_env`].

use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgConnectOptions;
use url::Url;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USERNAME: &str = "pgscratch";
pub const DEFAULT_PASSWORD: &str = "pgscratch";
pub const DEFAULT_ADMIN_DATABASE: &str = "postgres";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Reported to the server so scratch sessions are recognizable in `pg_stat_activity`.
pub const APPLICATION_NAME: &str = "pgscratch";

/// Administrative credentials for the Postgres server that hosts scratch databases.
#[derive(Clone, Args)]
pub struct Credentials {
    /// Postgres server host
    #[arg(long, default_value = DEFAULT_HOST, env = "PGSCRATCH_HOST")]
    pub host: String,

    /// Postgres server port
    #[arg(long, default_value_t = DEFAULT_PORT, env = "PGSCRATCH_PORT")]
    pub port: u16,

    /// Role allowed to create and drop databases
    #[arg(long, default_value = DEFAULT_USERNAME, env = "PGSCRATCH_USERNAME")]
    pub username: String,

    /// Password for the administrative role (sensitive - not logged)
    #[arg(
        long,
        default_value = DEFAULT_PASSWORD,
        env = "PGSCRATCH_PASSWORD",
        hide_default_value = true,
        hide_env_values = true
    )]
    pub password: String,

    /// Bootstrap database used for CREATE/DROP DATABASE
    #[arg(long, default_value = DEFAULT_ADMIN_DATABASE, env = "PGSCRATCH_ADMIN_DATABASE")]
    pub admin_database: String,

    /// Maximum pool size for each scratch database
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS, env = "PGSCRATCH_MAX_CONNECTIONS")]
    pub max_connections: u32,
}

/// Parser used to read [`Credentials`] from the environment alone.
#[derive(Parser)]
#[command(no_binary_name = true)]
struct EnvCredentials {
    #[command(flatten)]
    credentials: Credentials,
}

impl Credentials {
    /// Create credentials for the given role, using defaults for everything else.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Read credentials from `PGSCRATCH_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, clap::Error> {
        EnvCredentials::try_parse_from(std::iter::empty::<String>()).map(|env| env.credentials)
    }

    /// Connection options for `database` on this server.
    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(&self.password)
            .database(database)
            .application_name(APPLICATION_NAME)
    }

    /// Connection URL for `database` with the password left out, for logs and errors.
    pub fn redacted_url(&self, database: &str) -> String {
        match Url::parse(&format!("postgres://{}:{}", self.host, self.port)) {
            Ok(mut url) => {
                // Host-based URLs always accept a username.
                let _ = url.set_username(&self.username);
                url.set_path(&format!("/{database}"));
                url.to_string()
            }
            Err(_) => format!(
                "postgres://{}@{}:{}/{}",
                self.username, self.host, self.port, database
            ),
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            admin_database: DEFAULT_ADMIN_DATABASE.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("admin_database", &self.admin_database)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Janitor for scratch databases left behind by failing tests.
#[derive(Debug, Parser)]
#[command(
    name = "pgscratch",
    about = "Inspect and clean up scratch databases preserved by failing tests",
    version,
    author
)]
pub struct Config {
    #[command(flatten)]
    pub credentials: Credentials,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "PGSCRATCH_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "PGSCRATCH_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List scratch databases still present on the server
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Drop the named scratch databases
    Drop {
        #[arg(value_name = "NAME", required = true)]
        names: Vec<String>,
    },
    /// Drop every scratch database on the server
    Purge {
        /// Only print what would be dropped
        #[arg(long)]
        dry_run: bool,
    },
}

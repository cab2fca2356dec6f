use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr};

/// 5 MiB, the largest fragment body accepted on POST/PUT.
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Which storage backend holds fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Ephemeral in-process map.
    Memory,
    /// SQLite metadata plus on-disk payloads.
    Sqlite,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        <Backend as ValueEnum>::from_str(value, true).map_err(|err| anyhow::anyhow!(err))
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub storage_dir: String,
    pub database_url: String,
    pub api_url: String,
    pub auth_file: String,
    pub max_body_bytes: usize,
}

/// What the process should do after parsing arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    Migrate,
    HashPassword(String),
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Fragments content store API")]
pub struct Args {
    /// Host to bind to (overrides FRAGMENTS_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FRAGMENTS_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides FRAGMENTS_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Directory where payloads are stored (overrides FRAGMENTS_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FRAGMENTS_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL for Location headers (overrides FRAGMENTS_API_URL)
    #[arg(long)]
    pub api_url: Option<String>,

    /// Credential file (overrides FRAGMENTS_AUTH_FILE)
    #[arg(long)]
    pub auth_file: Option<String>,

    /// Largest accepted request body in bytes (overrides FRAGMENTS_MAX_BODY_BYTES)
    #[arg(long)]
    pub max_body_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Print an argon2 hash of the given password and exit
    #[arg(long, value_name = "PASSWORD")]
    pub hash_password: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<(Self, Command)> {
        // --- Environment fallback ---
        let env_host = env::var("FRAGMENTS_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parsed::<u16>("FRAGMENTS_PORT")?.unwrap_or(8080);
        let env_backend = env_parsed::<Backend>("FRAGMENTS_BACKEND")?.unwrap_or(Backend::Memory);
        let env_storage =
            env::var("FRAGMENTS_STORAGE_DIR").unwrap_or_else(|_| "./data/fragments".into());
        let env_db = env::var("FRAGMENTS_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/fragments.db".into());
        let env_api_url = env::var("FRAGMENTS_API_URL").ok();
        let env_auth = env::var("FRAGMENTS_AUTH_FILE").unwrap_or_else(|_| "./auth.toml".into());
        let env_max_body =
            env_parsed::<usize>("FRAGMENTS_MAX_BODY_BYTES")?.unwrap_or(DEFAULT_MAX_BODY_BYTES);

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        let api_url = args
            .api_url
            .or(env_api_url)
            .unwrap_or_else(|| format!("http://localhost:{}", port));
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            api_url,
            auth_file: args.auth_file.unwrap_or(env_auth),
            max_body_bytes: args.max_body_bytes.unwrap_or(env_max_body),
        };

        let command = match (args.hash_password, args.migrate) {
            (Some(password), _) => Command::HashPassword(password),
            (None, true) => Command::Migrate,
            (None, false) => Command::Serve,
        };
        Ok((cfg, command))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an optional environment variable.
fn env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

use anyhow::{Context, Result};
use fragments::{
    AppState, AuthLayer, AuthProvider, FragmentService, FragmentStore, MemoryStore, SqliteStore,
    TypeRegistry,
    config::{AppConfig, Backend, Command},
};
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    if let Command::HashPassword(password) = &command {
        println!("{}", fragments::auth::hash_password(password)?);
        return Ok(());
    }

    tracing::info!("Starting fragments with config: {:?}", cfg);

    // --- Storage backend ---
    let store: Arc<dyn FragmentStore> = match (cfg.backend, &command) {
        (Backend::Sqlite, _) | (_, Command::Migrate) => {
            ensure_sqlite_parent(&cfg.database_url)?;
            let store = SqliteStore::connect(&cfg.database_url, &cfg.storage_dir, 5)
                .await
                .with_context(|| format!("opening database {}", cfg.database_url))?;
            tracing::info!(
                "SQLite backend ready (payloads under {})",
                cfg.storage_dir
            );
            Arc::new(store)
        }
        (Backend::Memory, _) => {
            tracing::warn!("using in-memory backend; fragments will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // --- Handle migration mode ---
    if command == Command::Migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Auth ---
    let auth = AuthProvider::load(&cfg.auth_file)
        .with_context(|| format!("loading credentials from {}", cfg.auth_file))?;
    tracing::info!("Loaded {} user credentials", auth.user_count());

    // --- Build router ---
    let service = FragmentService::new(store, Arc::new(TypeRegistry::default()));
    let state = AppState::new(service, cfg.api_url.clone());
    let app = fragments::app(state, AuthLayer::new(Arc::new(auth)), cfg.max_body_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the directory holding a file-backed SQLite database.
fn ensure_sqlite_parent(database_url: &str) -> Result<()> {
    let db_path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if db_path.starts_with(":memory:") {
        return Ok(());
    }
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    Ok(())
}

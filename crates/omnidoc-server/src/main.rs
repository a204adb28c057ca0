//! Omnidoc server binary.
//!
//! Starts an axum HTTP server with structured logging, database initialization,
//! and graceful shutdown on SIGTERM/SIGINT.

use omnidoc_identity::{hash_password, TokenIssuer};
use omnidoc_records::{users, UserInput};
use omnidoc_server::api_ws::NotificationHub;
use omnidoc_server::config::{self, Config};
use omnidoc_server::storage::DocumentStorage;
use omnidoc_server::{app, AppState};
use omnidoc_types::Role;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("OMNIDOC_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

/// Creates the configured admin account when no user exists yet.
fn bootstrap_admin(conn: &rusqlite::Connection, config: &Config) {
    let (Some(email), Some(password)) = (
        config.auth.admin_email.as_deref(),
        config.auth.admin_password.as_deref(),
    ) else {
        return;
    };

    let existing = users::count_users(conn).expect("failed to count users");
    if existing > 0 {
        return;
    }

    let hash = hash_password(password).expect("failed to hash bootstrap admin password");
    let input = UserInput {
        nom: Some("Admin".to_string()),
        prenom: Some("Omnidoc".to_string()),
        email: Some(email.to_string()),
        password: Some(password.to_string()),
        role: Some(Role::Admin),
        ..UserInput::default()
    };
    let user = users::create_user(conn, &input, &hash).expect("failed to create bootstrap admin");
    tracing::info!(user_id = user.id, email = %user.email, "created bootstrap admin");
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration: the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Initialize database
    let pool = omnidoc_db::open_database(&config.database.path, config.database.runtime_settings())
        .expect("failed to open database: check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for bootstrap");
        bootstrap_admin(&conn, &config);
    }

    std::fs::create_dir_all(&config.storage.upload_dir)
        .expect("failed to create upload directory: check storage.upload_dir in config");

    let certificate_template = config.storage.certificate_template.as_ref().map(PathBuf::from);
    if let Some(path) = &certificate_template {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "certificate template not found, certificates will use a blank page"
            );
        }
    }

    let state = AppState {
        pool,
        tokens: TokenIssuer::new(config.auth.jwt_secret.as_bytes(), config.auth.token_ttl_secs),
        hub: NotificationHub::new(),
        storage: DocumentStorage::new(
            &config.storage.upload_dir,
            config.storage.max_upload_bytes,
        ),
        certificate_template,
        notify_scope: config.notifications.scope,
        cors_origin: config.server.cors_origin.clone(),
    };

    // Build application
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting omnidoc server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address: is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("omnidoc server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}

//! CallMonitor Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use callmonitor_core::{
    api::{self, AppState},
    config::Config,
    db::{Database, DatabaseHealthMonitor},
    middleware::auth::TokenVerifier,
    rbac::{PolicyEngine, RbacContextResolver},
    security::SecurityEventLog,
    telemetry,
    tenancy::TenantGuard,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match std::env::var("CALLMONITOR_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::load()?,
    };

    let telemetry = telemetry::init_telemetry(&config.telemetry)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting CallMonitor Server"
    );

    // Connect to database
    let db = Database::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
        tracing::info!("Database migrations applied");
    }

    let health = DatabaseHealthMonitor::new(db.pool().clone());
    health.startup_validation().await?;

    // Access core
    let directory = Arc::new(db.directory());
    let resolver = Arc::new(
        RbacContextResolver::new(
            directory.clone(),
            directory.clone(),
            Arc::new(PolicyEngine::builtin()),
        )
        .with_lookup_timeout(config.rbac.lookup_timeout),
    );
    let events = Arc::new(SecurityEventLog::new(config.rbac.security_event_capacity));
    let guard = TenantGuard::new(Arc::new(db.records()), events);
    let verifier = Arc::new(TokenVerifier::new(&config.auth)?);

    let app = api::build_router(AppState {
        resolver,
        guard,
        directory,
        verifier,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    telemetry.shutdown();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

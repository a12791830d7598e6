//! Gateway server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::config::Config;
use crate::credentials::{CredentialStore, MemoryCredentialStore};
use crate::token::TokenService;
use crate::{Error, Result};

use super::forward::{Forwarder, RouteBinding};
use super::router::{AppState, create_router};

/// The edge gateway server
pub struct Gateway {
    config: Config,
    state: Arc<AppState>,
}

impl Gateway {
    /// Create a new gateway: validate config, build the token service,
    /// seed the credential store, and set up one forwarder per route.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let tokens = TokenService::new(&config.token.resolve_secret(), config.token.ttl_seconds)?;

        let users = MemoryCredentialStore::new();
        for seed in &config.users {
            match users.create(&seed.username, &seed.password, seed.role).await {
                Ok(_) => info!(username = %seed.username, role = ?seed.role, "Seeded user"),
                Err(e) => warn!(username = %seed.username, error = %e, "Skipping seed user"),
            }
        }

        let timeout = Duration::from_secs(config.proxy.timeout_seconds);
        let mut forwarders = Vec::with_capacity(config.routes.len());
        for route in &config.routes {
            forwarders.push(Forwarder::new(
                RouteBinding {
                    prefix: route.prefix.clone(),
                    backend: route.backend.clone(),
                },
                timeout,
                config.proxy.diagnostic_limit,
            )?);
            info!(prefix = %route.prefix, backend = %route.backend, "Registered route");
        }

        let state = Arc::new(AppState {
            session: config.session.clone(),
            tokens,
            users: Arc::new(users),
            forwarders,
            max_body_bytes: config.proxy.max_body_bytes,
        });

        Ok(Self { config, state })
    }

    /// Shared state, exposed for integration tests that drive the router
    /// without binding a socket.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the gateway until interrupted
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = create_router(Arc::clone(&self.state));
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("MEDIGATE v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = self.config.server.port, "Listening");
        info!(cookie = %self.config.session.cookie_name, ttl_seconds = self.config.token.ttl_seconds, "Sessions");
        for route in &self.config.routes {
            info!("  {} -> {}", route.prefix, route.backend);
        }
        info!("============================================================");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

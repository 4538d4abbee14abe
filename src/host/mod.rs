use crate::api::{create_status_router, create_sync_router, StatusAppState, SyncAppState};
use crate::config::{CorsConfig, SyncConfig};
use crate::hub::Hub;
use anyhow::{bail, Context, Result};
use axum::http::HeaderValue;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tracing::info;

const RESERVED_ROUTES: [&str; 2] = ["/api/status", "/health"];

/// Process-level owner of the hub: bind, serve, ordered shutdown.
///
/// Shutdown order: stop accepting connections, drain open sessions, then
/// release the hub's registries.
pub struct Host {
    config: SyncConfig,
    hub: Arc<Hub>,
    router: Router,
    listener: TcpListener,
}

impl Host {
    /// Build the hub and bind the listener. Failing to bind is fatal.
    pub async fn bind(config: SyncConfig) -> Result<Self> {
        let hub = Arc::new(Hub::new(&config.hub));
        let router = build_router(&config, Arc::clone(&hub))?;

        let listener = TcpListener::bind(&config.server.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;

        info!(
            addr = %listener.local_addr()?,
            route = %config.server.route,
            "State-sync hub listening"
        );

        Ok(Self {
            config,
            hub,
            router,
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("Failed to read listener address")
    }

    pub fn hub(&self) -> Arc<Hub> {
        Arc::clone(&self.hub)
    }

    /// Serve until `shutdown` resolves, then shut down in order
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Host {
            config,
            hub,
            router,
            listener,
        } = self;

        // Sessions are told to close as soon as the accept loop stops
        let signal_hub = Arc::clone(&hub);
        let signal = async move {
            shutdown.await;
            info!("Shutdown signal received, no longer accepting connections");
            signal_hub.begin_shutdown();
        };

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .context("State-sync server error")?;

        let drained = hub.drain(config.hub.drain_timeout()).await;
        hub.release();
        info!(drained = drained, "State-sync hub stopped");

        Ok(())
    }
}

/// State-sync route, status routes and CORS policy
pub fn build_router(config: &SyncConfig, hub: Arc<Hub>) -> Result<Router> {
    let route = config.server.route.as_str();
    if !route.starts_with('/') {
        bail!("route '{}' must start with '/'", route);
    }
    if RESERVED_ROUTES.contains(&route) {
        bail!("route '{}' collides with a built-in route", route);
    }

    let sync = create_sync_router(
        Arc::new(SyncAppState {
            hub: Arc::clone(&hub),
        }),
        route,
    );
    let status = create_status_router(StatusAppState { hub });

    Ok(sync.merge(status).layer(cors_layer(&config.cors)?))
}

fn cors_layer(cors: &CorsConfig) -> Result<CorsLayer> {
    if cors.allow_any_origin {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let origins = cors
        .expanded_origins()
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin '{}'", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    // Credentials cannot be combined with wildcard methods/headers
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn config_with_route(route: &str) -> SyncConfig {
        SyncConfig {
            server: ServerConfig {
                bind_addr: "127.0.0.1:0".to_string(),
                route: route.to_string(),
            },
            ..SyncConfig::default()
        }
    }

    #[test]
    fn test_build_router_rejects_relative_route() {
        let config = config_with_route("state-sync");
        let hub = Arc::new(Hub::new(&config.hub));
        assert!(build_router(&config, hub).is_err());
    }

    #[test]
    fn test_build_router_rejects_reserved_route() {
        let config = config_with_route("/health");
        let hub = Arc::new(Hub::new(&config.hub));
        assert!(build_router(&config, hub).is_err());
    }

    #[test]
    fn test_cors_origin_list() {
        let cors = CorsConfig {
            allow_any_origin: false,
            origins: vec!["game.example.com".to_string()],
        };
        assert!(cors_layer(&cors).is_ok());

        let bad = CorsConfig {
            allow_any_origin: false,
            origins: vec!["bad\norigin".to_string()],
        };
        assert!(cors_layer(&bad).is_err());
    }

    #[tokio::test]
    async fn test_bind_fails_on_invalid_address() {
        let mut config = config_with_route("/state-sync");
        config.server.bind_addr = "not-an-address".to_string();
        assert!(Host::bind(config).await.is_err());
    }

    #[tokio::test]
    async fn test_run_stops_on_signal_and_releases() {
        let host = Host::bind(config_with_route("/state-sync")).await.unwrap();
        let hub = host.hub();
        let conn = hub.connect().unwrap();
        assert!(host.local_addr().unwrap().port() > 0);

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(host.run(async move {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();

        assert!(hub.is_shutting_down());
        assert!(hub.records().is_sealed());
        assert_eq!(hub.connection_count(), 0);
        assert!(!hub.records().contains(&conn.connection_id));
    }
}

//! Web layer module
//!
//! Public routes serve token logos and health; the admin group exposes
//! synchronous registry and per-chain refresh triggers. Every response leaves
//! with the fixed CORS header set, overriding whatever a handler or an image
//! upstream put there.

use anyhow::Result;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    config::Config,
    fetch::{ResilientHttpClient, RetryPolicy},
    indexer::Indexer,
    registry::RegistryResolver,
    responder::{CORS_HEADERS, Responder},
    store::KeyValueStore,
};

pub mod handlers;
pub mod middleware;
pub mod responses;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub responder: Responder,
    pub registry: Arc<RegistryResolver>,
    pub indexer: Arc<Indexer>,
}

impl AppState {
    /// Wire the registry, indexer and responder over one store and client
    pub fn new(config: Config, store: Arc<dyn KeyValueStore>, client: ResilientHttpClient) -> Self {
        let registry = RegistryResolver::new(
            Arc::clone(&store),
            client.clone(),
            config.upstream.clone(),
            RetryPolicy::from_indexer_config(&config.indexer),
        );
        let indexer = Indexer::new(
            Arc::clone(&store),
            client.clone(),
            config.upstream.clone(),
            &config.indexer,
        );
        let responder = Responder::new(store, client, config.logos.clone());

        Self {
            config: Arc::new(config),
            responder,
            registry: Arc::new(registry),
            indexer: Arc::new(indexer),
        }
    }
}

/// Build the router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/registry/refresh", post(handlers::admin::refresh_registry))
        .route("/index/{chain_id}", post(handlers::admin::index_chain))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    let mut router = Router::new()
        .route("/", get(handlers::health::health_check))
        .route("/health", get(handlers::health::health_check))
        .route(
            "/token/{chain_id}/{address}",
            get(handlers::token::serve_token_logo),
        )
        .nest("/admin", admin)
        .fallback(handlers::token::fallback)
        .layer(axum::middleware::from_fn(middleware::preflight_middleware));

    for (name, value) in CORS_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            name,
            HeaderValue::from_static(value),
        ));
    }

    router
        .layer(axum::middleware::from_fn(middleware::request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr =
            format!("{}:{}", state.config.web.host, state.config.web.port).parse()?;
        let app = create_router(state);
        Ok(Self { app, addr })
    }

    /// Serve until SIGINT/SIGTERM, finishing in-flight requests
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Listening on {}", listener.local_addr()?);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}

use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::metrics::GatewayMetrics;
use crate::registry::CodeRegistry;
use crate::relay::RelayEngine;
use crate::rooms::RoomDirectory;

/// Composition root. Owns the registry, the room directory, and the relay,
/// and hands them to the HTTP/WebSocket layer by reference.
pub struct GatewayServer {
    config: ServerConfig,
    registry: Arc<CodeRegistry>,
    rooms: Arc<RoomDirectory>,
    relay: Arc<RelayEngine>,
    metrics: Arc<GatewayMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl GatewayServer {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let registry = Arc::new(CodeRegistry::new(config.code_ttl()));
        let rooms = Arc::new(RoomDirectory::new());
        let metrics = Arc::new(GatewayMetrics::new()?);
        let relay = Arc::new(RelayEngine::new(rooms.clone(), metrics.clone()));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            registry,
            rooms,
            relay,
            metrics,
            shutdown_tx,
        })
    }

    pub fn state(&self) -> AppState {
        AppState {
            registry: self.registry.clone(),
            rooms: self.rooms.clone(),
            relay: self.relay.clone(),
            metrics: self.metrics.clone(),
            config: self.config.clone(),
        }
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        // Start sweep task
        let registry = self.registry.clone();
        let rooms = self.rooms.clone();
        let config = self.config.clone();
        let metrics = Arc::clone(&self.metrics);
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(Self::sweep_task(registry, rooms, config, metrics, shutdown_rx));

        let app = build_router(self.state());

        let shutdown_rx = self.shutdown_tx.subscribe();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;
        info!("pairlink gateway listening on {}", self.config.bind_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(Self::shutdown_signal(shutdown_rx))
            .await?;

        Ok(())
    }

    /// Periodically expires outstanding codes and reclaims rooms that have
    /// sat empty past the idle timeout.
    async fn sweep_task(
        registry: Arc<CodeRegistry>,
        rooms: Arc<RoomDirectory>,
        config: ServerConfig,
        metrics: Arc<GatewayMetrics>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(config.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let expired = registry.evict_expired();
                    let reclaimed = rooms.reclaim_idle(config.idle_room_timeout());

                    metrics.codes_expired.inc_by(expired as f64);
                    metrics.rooms_reclaimed.inc_by(reclaimed as f64);
                    metrics.outstanding_codes.set(registry.outstanding() as f64);
                    metrics.active_rooms.set(rooms.len() as f64);

                    if expired > 0 || reclaimed > 0 {
                        info!("Expired {} codes, reclaimed {} idle rooms", expired, reclaimed);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
        #[cfg(unix)]
        let mut sigterm = {
            use tokio::signal::unix::{signal, SignalKind};
            signal(SignalKind::terminate()).ok()
        };

        tokio::select! {
            _ = async {
                #[cfg(unix)]
                {
                    if let Some(ref mut sigterm) = sigterm {
                        sigterm.recv().await;
                    }
                }
                #[cfg(not(unix))]
                {
                    std::future::pending::<()>().await;
                }
            } => {
                info!("Received SIGTERM, starting graceful shutdown");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, starting graceful shutdown");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("Shutdown requested");
                }
            }
        }

        warn!("No longer accepting connections");
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Route table plus the CORS and trace layers. Factored out of `start` so
/// tests can drive the router in-process.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/generate-code", axum::routing::get(crate::api::generate_code))
        .route("/verify-code", axum::routing::post(crate::api::verify_code))
        .route("/ws", axum::routing::get(crate::gateway::ws_handler))
        .route("/health", axum::routing::get(crate::api::get_health))
        .route("/metrics", axum::routing::get(crate::api::get_metrics))
        .fallback(crate::api::not_found)
        .layer(axum::middleware::from_fn(crate::api::cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

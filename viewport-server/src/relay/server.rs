use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use common::{DispatchError, Result};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::connection::serve_connection;
use super::Relay;
use crate::config::RelayConfig;

/// 订阅者WebSocket服务
#[derive(Clone)]
pub struct RelayServer {
    addr: SocketAddr,
    relay: Relay,
}

impl RelayServer {
    pub fn new(config: &RelayConfig, relay: Relay) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| {
                DispatchError::Config(format!(
                    "Invalid relay address '{}:{}': {}",
                    config.host, config.port, e
                ))
            })?;

        Ok(Self { addr, relay })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// 运行直到`shutdown`被取消
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let app = create_router(self.relay);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        info!("Relay listening on {}", self.addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}

pub fn create_router(relay: Relay) -> Router {
    Router::new()
        // 订阅者连接
        .route("/", get(upgrade))
        // 健康检查
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}

async fn upgrade(ws: WebSocketUpgrade, State(relay): State<Relay>) -> Response {
    ws.on_upgrade(move |socket| serve_connection(socket, relay))
}

async fn health_check() -> &'static str {
    "ok"
}

//! Switchboard HTTP 服务
//!
//! 入口：初始化日志、加载配置、装配编排器，启动 axum 服务；
//! 收到 Ctrl+C / SIGTERM 后停止接收新请求，等待进行中的指令完成，再把审计日志落盘。

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use switchboard::config::load_config;
use switchboard::core::{AuditLogCleanup, HubBuilder, ShutdownCoordinator, ShutdownManager};
use switchboard::gateway::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    switchboard::observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });

    let hub = HubBuilder::new(cfg.clone())
        .build()
        .await
        .context("Failed to build orchestrator")?;

    let manager = Arc::new(ShutdownManager::new());
    manager.install_signal_handlers();
    let mut coordinator = ShutdownCoordinator::new(manager.clone());
    coordinator.register(AuditLogCleanup::new(hub.audit.clone()));

    let host: std::net::IpAddr = cfg
        .server
        .host
        .parse()
        .with_context(|| format!("invalid server.host '{}'", cfg.server.host))?;
    let addr = SocketAddr::new(host, cfg.server.port);

    let app = router(Arc::new(
        AppState::new(cfg, hub).with_tracker(coordinator.tracker()),
    ));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Switchboard listening on http://{}", addr);

    let shutdown = manager.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.wait_for_shutdown().await })
        .await
        .context("Server error")?;

    coordinator.run_cleanup().await;
    Ok(())
}

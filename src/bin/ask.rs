//! 命令行单次调用：把一条指令交给编排器，打印聚合响应 JSON
//!
//! 用法：
//! ```bash
//! switchboard-ask --actor alice "what meetings do I have today"
//! ```
//! Ctrl+C 取消：不再启动新的子智能体，已发出的动作仍会完成并审计。

use std::sync::Arc;

use anyhow::{bail, Context};
use switchboard::audit::AuditLog;
use switchboard::config::load_config;
use switchboard::core::{ActorIdentity, HubBuilder, ShutdownManager};

struct Args {
    actor: String,
    config: Option<std::path::PathBuf>,
    instruction: String,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut actor = std::env::var("SWITCHBOARD_ACTOR").unwrap_or_else(|_| "cli".to_string());
    let mut config = None;
    let mut words = Vec::new();

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--actor" => actor = it.next().context("--actor needs a value")?,
            "--config" => config = Some(it.next().context("--config needs a value")?.into()),
            _ => words.push(arg),
        }
    }
    if words.is_empty() {
        bail!("usage: switchboard-ask [--actor ID] [--config PATH] <instruction>");
    }
    Ok(Args {
        actor,
        config,
        instruction: words.join(" "),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    switchboard::observability::init();
    let args = parse_args()?;

    let cfg = load_config(args.config).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let hub = HubBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build orchestrator")?;

    let manager = Arc::new(ShutdownManager::new());
    manager.install_signal_handlers();

    let result = hub
        .orchestrator
        .process_with_cancel(&args.instruction, &ActorIdentity::new(args.actor), manager.token())
        .await;
    hub.audit.sync().await.context("Failed to sync audit log")?;

    let response = result.context("Instruction aborted, retry it")?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

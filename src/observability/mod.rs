//! 可观测性：tracing 订阅器
//!
//! 默认 info，可通过 RUST_LOG 覆盖（如 `RUST_LOG=switchboard=debug,audit=info`）。
//! 审计条目以 target = "audit" 镜像输出，可单独过滤。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化（如测试中）时忽略
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

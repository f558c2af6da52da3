//! 重试退避策略
//!
//! 分类与可重试动作共用：首次重试前等待 base_delay，之后每次乘以 factor；最多 max_retries 次。

use std::future::Future;
use std::time::Duration;

use crate::config::RetrySection;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub factor: f64,
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            max_retries: 1,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetrySection) -> Self {
        Self {
            base_delay: Duration::from_millis(cfg.base_delay_ms),
            factor: if cfg.factor >= 1.0 { cfg.factor } else { 1.0 },
            max_retries: cfg.max_retries,
        }
    }

    /// 不重试（测试或关闭重试时使用）
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// 第 retry 次重试（从 0 开始）前的等待时间
    pub fn delay_for(&self, retry: u32) -> Duration {
        let millis = self.base_delay.as_millis() as f64 * self.factor.powi(retry as i32);
        Duration::from_millis(millis.min(u64::MAX as f64) as u64)
    }

    /// 执行 op，遇到 should_retry 为真的错误时按退避重试；返回最终结果与总尝试次数
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        should_retry: impl Fn(&E) -> bool,
    ) -> (Result<T, E>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let result = op().await;
            match &result {
                Err(e) if attempts <= self.max_retries && should_retry(e) => {
                    let delay = self.delay_for(attempts - 1);
                    tracing::debug!(attempt = attempts, delay_ms = delay.as_millis() as u64, "retrying");
                    tokio::time::sleep(delay).await;
                }
                _ => return (result, attempts),
            }
        }
    }
}

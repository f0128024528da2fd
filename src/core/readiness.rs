use crate::domain::model::{EndpointSpec, RetryPolicy};
use crate::domain::ports::{Connector, Sleeper, TokioSleeper};
use async_trait::async_trait;
use tokio::net::TcpStream;

/// 純 TCP 連線探測，不交換任何協定資料
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &EndpointSpec) -> std::io::Result<()> {
        let attempt = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        match tokio::time::timeout(endpoint.probe_timeout, attempt).await {
            // stream is dropped right away, the probe never holds a session
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("timed out after {:?}", endpoint.probe_timeout),
            )),
        }
    }
}

/// Polls an endpoint until it accepts a connection or the retry budget runs out.
pub struct ReadinessProbe<C, S = TokioSleeper> {
    connector: C,
    sleeper: S,
}

impl ReadinessProbe<TcpConnector, TokioSleeper> {
    pub fn tcp() -> Self {
        Self::new(TcpConnector, TokioSleeper)
    }
}

impl<C: Connector, S: Sleeper> ReadinessProbe<C, S> {
    pub fn new(connector: C, sleeper: S) -> Self {
        Self { connector, sleeper }
    }

    /// 等待端點可連線。耗盡重試次數時回傳 `false`，由呼叫端決定如何失敗。
    pub async fn wait_until_ready(&self, endpoint: &EndpointSpec, policy: &RetryPolicy) -> bool {
        self.wait_counting(endpoint, policy).await.is_some()
    }

    /// Same as [`wait_until_ready`](Self::wait_until_ready) but reports how many attempts the
    /// probe needed. `None` means every attempt failed.
    pub async fn wait_counting(&self, endpoint: &EndpointSpec, policy: &RetryPolicy) -> Option<u32> {
        let max_attempts = policy.max_attempts();

        for attempt in 1..=max_attempts {
            match self.connector.connect(endpoint).await {
                Ok(()) => {
                    tracing::info!("✅ Service at {} is available.", endpoint);
                    return Some(attempt);
                }
                Err(e) => {
                    tracing::info!(
                        "⏳ [{}/{}] {} not available -> {}",
                        attempt,
                        max_attempts,
                        endpoint,
                        e
                    );
                    if attempt < max_attempts {
                        self.sleeper.sleep(policy.delay()).await;
                    }
                }
            }
        }

        tracing::warn!(
            "❌ {} still unreachable after {} attempts",
            endpoint,
            max_attempts
        );
        None
    }
}

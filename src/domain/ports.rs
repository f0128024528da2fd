use crate::domain::model::{CommandSpec, EndpointSpec, ProcessOutput};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// 建立一次連線並立即關閉，只用來確認端點存活
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &EndpointSpec) -> std::io::Result<()>;
}

/// Sleep seam so retry loops can be driven without real delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &CommandSpec, check: bool) -> Result<ProcessOutput>;
}

/// 排程器的工作單元：`() -> success | failure`
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[async_trait]
impl<T: Connector + ?Sized> Connector for std::sync::Arc<T> {
    async fn connect(&self, endpoint: &EndpointSpec) -> std::io::Result<()> {
        (**self).connect(endpoint).await
    }
}

#[async_trait]
impl<T: Sleeper + ?Sized> Sleeper for std::sync::Arc<T> {
    async fn sleep(&self, duration: Duration) {
        (**self).sleep(duration).await
    }
}

#[async_trait]
impl<T: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<T> {
    async fn run(&self, command: &CommandSpec, check: bool) -> Result<ProcessOutput> {
        (**self).run(command, check).await
    }
}

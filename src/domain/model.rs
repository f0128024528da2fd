use crate::utils::error::{EltError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// 需要等待可連線的網路端點
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub host: String,
    pub port: u16,
    pub probe_timeout: Duration,
}

impl EndpointSpec {
    pub fn new(host: impl Into<String>, port: u16, probe_timeout: Duration) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(EltError::invalid_config("host", "Host cannot be empty"));
        }
        if port == 0 {
            return Err(EltError::invalid_config("port", "Port must be between 1 and 65535"));
        }
        if probe_timeout.is_zero() {
            return Err(EltError::invalid_config(
                "probe_timeout_seconds",
                "Probe timeout must be greater than zero",
            ));
        }
        Ok(Self {
            host,
            port,
            probe_timeout,
        })
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for EndpointSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Readiness 輪詢的重試策略，`max_attempts` 必須 >= 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(EltError::invalid_config(
                "readiness.max_attempts",
                "A retry policy needs at least one attempt",
            ));
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            delay: Duration::from_secs(2),
        }
    }
}

/// 單次執行期間的資料庫連線資訊，只存在記憶體中
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub database_name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl ConnectionConfig {
    /// Connection flags shared by the dump and load commands. The password is never part of these.
    pub fn connection_args(&self) -> Vec<String> {
        vec![
            "-h".to_string(),
            self.host.clone(),
            "-p".to_string(),
            self.port.to_string(),
            "-U".to_string(),
            self.user.clone(),
            "-d".to_string(),
            self.database_name.clone(),
        ]
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("database_name", &self.database_name)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

/// A database the pipeline waits for and then talks to.
#[derive(Debug, Clone)]
pub struct DatabaseTarget {
    pub connection: ConnectionConfig,
    pub probe_timeout: Duration,
}

impl DatabaseTarget {
    pub fn endpoint(&self) -> Result<EndpointSpec> {
        EndpointSpec::new(
            self.connection.host.clone(),
            self.connection.port,
            self.probe_timeout,
        )
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub path: PathBuf,
    /// 載入成功後保留 dump 檔
    pub keep: bool,
}

#[derive(Debug, Clone)]
pub struct DumpSettings {
    pub program: String,
}

#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub program: String,
    pub stop_on_error: bool,
}

/// 已驗證的 pipeline 設定
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub source: DatabaseTarget,
    pub destination: DatabaseTarget,
    pub retry: RetryPolicy,
    pub artifact: ArtifactSettings,
    pub dump: DumpSettings,
    pub load: LoadSettings,
    pub password_env: String,
}

/// 要執行的外部命令，參數以向量傳遞，不經過 shell
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Overlay merged onto the inherited environment; overlay keys win.
    pub env: HashMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Dump,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Dump => write!(f, "dump"),
            Stage::Load => write!(f, "load"),
        }
    }
}

/// 每個資料搬移階段的結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub stage: Stage,
    pub succeeded: bool,
    pub diagnostic_output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    SourceUnreachable,
    DestinationUnreachable,
    DumpFailed,
    LoadFailed,
}

impl FailureReason {
    pub fn stage_name(&self) -> &'static str {
        match self {
            FailureReason::SourceUnreachable => "source readiness",
            FailureReason::DestinationUnreachable => "destination readiness",
            FailureReason::DumpFailed => "dump",
            FailureReason::LoadFailed => "load",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureReason::SourceUnreachable => "SourceUnreachable",
            FailureReason::DestinationUnreachable => "DestinationUnreachable",
            FailureReason::DumpFailed => "DumpFailed",
            FailureReason::LoadFailed => "LoadFailed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    WaitingSource,
    WaitingDest,
    Dumping,
    Loading,
    Done,
    Failed(FailureReason),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub reason: FailureReason,
    pub diagnostic: String,
}

/// 一次 pipeline 執行的完整狀態，不放在全域變數中
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub state: PipelineState,
    pub history: Vec<PipelineState>,
    pub results: Vec<PipelineResult>,
    pub failure: Option<Failure>,
    pub probe_attempts: u32,
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Init,
            history: vec![PipelineState::Init],
            results: Vec::new(),
            failure: None,
            probe_attempts: 0,
        }
    }

    pub fn transition(&mut self, next: PipelineState) {
        tracing::debug!("🔀 {:?} -> {:?}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    pub fn fail(&mut self, reason: FailureReason, diagnostic: impl Into<String>) {
        self.failure = Some(Failure {
            reason,
            diagnostic: diagnostic.into(),
        });
        self.transition(PipelineState::Failed(reason));
    }

    pub fn record(&mut self, result: PipelineResult) {
        self.results.push(result);
    }

    pub fn succeeded(&self) -> bool {
        self.state == PipelineState::Done
    }

    pub fn result_for(&self, stage: Stage) -> Option<&PipelineResult> {
        self.results.iter().find(|r| r.stage == stage)
    }

    pub fn into_result(self) -> Result<PipelineRun> {
        match &self.failure {
            Some(failure) => Err(EltError::StageFailed {
                reason: failure.reason,
                diagnostic: failure.diagnostic.clone(),
            }),
            None => Ok(self),
        }
    }
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

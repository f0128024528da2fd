use crate::domain::model::FailureReason;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EltError {
    #[error("Endpoint {target} not reachable after {attempts} attempts")]
    UnreachableEndpoint { target: String, attempts: u32 },

    #[error("Command '{program}' exited with code {exit_code}: {stderr}")]
    ProcessFailure {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Pipeline failed ({reason}): {diagnostic}")]
    StageFailed {
        reason: FailureReason,
        diagnostic: String,
    },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, EltError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Process,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// 等待操作員介入後可重跑
    Medium,
    /// 資料搬移命令失敗
    High,
    /// 配置或系統錯誤
    Critical,
}

impl EltError {
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        EltError::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            EltError::InvalidConfiguration { .. } | EltError::ConfigParse { .. } => {
                ErrorCategory::Configuration
            }
            EltError::UnreachableEndpoint { .. } => ErrorCategory::Network,
            EltError::ProcessFailure { .. } => ErrorCategory::Process,
            EltError::StageFailed { reason, .. } => match reason {
                FailureReason::SourceUnreachable | FailureReason::DestinationUnreachable => {
                    ErrorCategory::Network
                }
                FailureReason::DumpFailed | FailureReason::LoadFailed => ErrorCategory::Process,
            },
            EltError::Io(_) | EltError::Serialization(_) | EltError::Cancelled => {
                ErrorCategory::System
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Process => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 結束碼，失敗時永遠不為 0
    pub fn exit_code(&self) -> i32 {
        match self {
            EltError::Cancelled => 130,
            EltError::Io(_) | EltError::Serialization(_) => 4,
            _ => match self.category() {
                ErrorCategory::Process => 1,
                ErrorCategory::Network => 2,
                ErrorCategory::Configuration => 3,
                ErrorCategory::System => 4,
            },
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EltError::UnreachableEndpoint { .. } => {
                "Check that the database containers are running and share a network, then rerun"
            }
            EltError::StageFailed { reason, .. } => match reason {
                FailureReason::SourceUnreachable | FailureReason::DestinationUnreachable => {
                    "Check that the database containers are running and share a network, then rerun"
                }
                FailureReason::DumpFailed => {
                    "Verify source credentials and that pg_dump matches the server version"
                }
                FailureReason::LoadFailed => {
                    "Verify destination credentials; rerunning is safe because the load drops and recreates objects"
                }
            },
            EltError::ProcessFailure { .. } => "Inspect the captured stderr above and rerun",
            EltError::InvalidConfiguration { .. } | EltError::ConfigParse { .. } => {
                "Fix the configuration file or the referenced environment variables"
            }
            EltError::Io(_) => "Check file permissions and free disk space for the dump artifact",
            EltError::Serialization(_) => "Check the report output path",
            EltError::Cancelled => "The run was interrupted; rerun to converge the destination",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EltError::StageFailed { reason, diagnostic } => {
                format!("{} stage failed: {}", reason.stage_name(), diagnostic.trim_end())
            }
            EltError::InvalidConfiguration { field, reason } => {
                format!("Configuration problem in '{}': {}", field, reason)
            }
            other => other.to_string(),
        }
    }
}

pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;

pub use crate::config::toml_config::EltConfig;
pub use crate::core::{
    pipeline::PipelineController,
    process::ProcessRunner,
    readiness::{ReadinessProbe, TcpConnector},
    transform::{TransformSettings, TransformTask},
    workflow::{EltTask, Workflow, WorkflowReport},
};
pub use crate::utils::error::{EltError, Result};

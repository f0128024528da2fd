pub mod pipeline;
pub mod process;
pub mod readiness;
pub mod transform;
pub mod workflow;

pub use crate::domain::model::{PipelineResult, PipelineRun, PipelineState};
pub use crate::domain::ports::{CommandRunner, Connector, Sleeper, Task};
pub use crate::utils::error::Result;

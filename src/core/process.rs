use crate::domain::model::{CommandSpec, ProcessOutput};
use crate::domain::ports::CommandRunner;
use crate::utils::error::{EltError, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// 執行外部程式並擷取輸出。參數以向量傳入，從不組成 shell 字串。
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec, check: bool) -> Result<ProcessOutput> {
        tracing::debug!(
            "▶️ Running {} ({} args, {} env overrides)",
            command.program,
            command.args.len(),
            command.env.len()
        );

        // envs() layers the overlay over the inherited environment without touching ours.
        // A dropped run (Ctrl-C, timeout) must not leave the child writing to the destination.
        let output = Command::new(&command.program)
            .args(&command.args)
            .envs(&command.env)
            .stdin(std::process::Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let result = ProcessOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if result.success() {
            if !result.stdout.trim().is_empty() {
                tracing::debug!("{} stdout:\n{}", command.program, result.stdout.trim_end());
            }
        } else {
            tracing::debug!(
                "{} exited with code {}",
                command.program,
                result.exit_code
            );
        }

        if check && !result.success() {
            return Err(EltError::ProcessFailure {
                program: command.program.clone(),
                exit_code: result.exit_code,
                stderr: result.stderr,
            });
        }

        Ok(result)
    }
}

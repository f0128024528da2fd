use crate::core::process::ProcessRunner;
use crate::domain::model::CommandSpec;
use crate::domain::ports::{CommandRunner, Task};
use crate::utils::error::{EltError, Result};
use async_trait::async_trait;

/// dbt 容器的執行設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformSettings {
    pub docker_program: String,
    pub image: String,
    pub network: Option<String>,
    pub project_dir: String,
    pub profiles_dir: String,
    pub full_refresh: bool,
    pub auto_remove: bool,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            docker_program: "docker".to_string(),
            image: "ghcr.io/dbt-labs/dbt-postgres:1.4.7".to_string(),
            network: Some("elt_network".to_string()),
            project_dir: "/opt/dbt".to_string(),
            profiles_dir: "/root/.dbt".to_string(),
            full_refresh: true,
            auto_remove: true,
        }
    }
}

/// Runs the transformation tool in its own container after the ELT stage.
pub struct TransformTask<R = ProcessRunner> {
    name: String,
    settings: TransformSettings,
    runner: R,
}

impl TransformTask<ProcessRunner> {
    pub fn with_defaults(settings: TransformSettings) -> Self {
        Self::new("dbt_run", settings, ProcessRunner::new())
    }
}

impl<R: CommandRunner> TransformTask<R> {
    pub fn new(name: impl Into<String>, settings: TransformSettings, runner: R) -> Self {
        Self {
            name: name.into(),
            settings,
            runner,
        }
    }

    pub fn command(&self) -> CommandSpec {
        let s = &self.settings;
        let mut command = CommandSpec::new(&s.docker_program).arg("run");
        if s.auto_remove {
            command = command.arg("--rm");
        }
        if let Some(network) = &s.network {
            command = command.args(["--network", network.as_str()]);
        }

        // 專案與 profile 目錄以相同路徑 bind mount 進容器
        command = command
            .args(["-v".to_string(), format!("{0}:{0}", s.project_dir)])
            .args(["-v".to_string(), format!("{0}:{0}", s.profiles_dir)])
            .arg(&s.image)
            .args([
                "run",
                "--profiles-dir",
                s.profiles_dir.as_str(),
                "--project-dir",
                s.project_dir.as_str(),
            ]);

        if s.full_refresh {
            command = command.arg("--full-refresh");
        }
        command
    }
}

#[async_trait]
impl<R: CommandRunner> Task for TransformTask<R> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        let command = self.command();
        tracing::info!("🔧 Running transformation image {}", self.settings.image);

        let output = self.runner.run(&command, false).await?;
        if !output.success() {
            return Err(EltError::ProcessFailure {
                program: command.program,
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        if !output.stdout.trim().is_empty() {
            tracing::info!("{}", output.stdout.trim_end());
        }
        Ok(())
    }
}

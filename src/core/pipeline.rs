use crate::core::process::ProcessRunner;
use crate::core::readiness::{ReadinessProbe, TcpConnector};
use crate::domain::model::{
    CommandSpec, ConnectionConfig, EndpointSpec, FailureReason, PipelineResult, PipelineRun,
    PipelineSettings, PipelineState, Stage,
};
use crate::domain::ports::{CommandRunner, Connector, Sleeper, TokioSleeper};
use crate::utils::error::{EltError, Result};
use std::path::Path;

/// 依序執行 readiness → dump → load 的控制器。
///
/// 每次 `run` 都建立自己的 [`PipelineRun`]，控制器本身沒有可變狀態。
/// 同一個目的資料庫一次只能有一個執行：兩個並行的執行都會 drop/recreate
/// 相同的物件，這裡不提供鎖。
pub struct PipelineController<C = TcpConnector, S = TokioSleeper, R = ProcessRunner> {
    settings: PipelineSettings,
    source: EndpointSpec,
    destination: EndpointSpec,
    probe: ReadinessProbe<C, S>,
    runner: R,
}

impl PipelineController {
    pub fn with_defaults(settings: PipelineSettings) -> Result<Self> {
        Self::new(settings, ReadinessProbe::tcp(), ProcessRunner::new())
    }
}

impl<C: Connector, S: Sleeper, R: CommandRunner> PipelineController<C, S, R> {
    pub fn new(settings: PipelineSettings, probe: ReadinessProbe<C, S>, runner: R) -> Result<Self> {
        let source = settings.source.endpoint()?;
        let destination = settings.destination.endpoint()?;
        if settings.artifact.path.as_os_str().is_empty() {
            return Err(EltError::invalid_config(
                "dump.artifact_path",
                "Artifact path cannot be empty",
            ));
        }

        Ok(Self {
            settings,
            source,
            destination,
            probe,
            runner,
        })
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn source_endpoint(&self) -> &EndpointSpec {
        &self.source
    }

    pub fn destination_endpoint(&self) -> &EndpointSpec {
        &self.destination
    }

    /// pg_dump with drop-and-recreate guards and without ownership/ACL metadata.
    pub fn dump_command(&self) -> CommandSpec {
        let source = &self.settings.source.connection;
        self.credentialed(&self.settings.dump.program, source)
            .args(["--no-owner", "--no-acl", "--if-exists", "--clean"])
            .arg("-f")
            .arg(self.artifact_arg())
    }

    pub fn load_command(&self) -> CommandSpec {
        let destination = &self.settings.destination.connection;
        let mut command = self.credentialed(&self.settings.load.program, destination);
        if self.settings.load.stop_on_error {
            command = command.args(["-v", "ON_ERROR_STOP=1"]);
        }
        command.arg("-f").arg(self.artifact_arg())
    }

    fn credentialed(&self, program: &str, connection: &ConnectionConfig) -> CommandSpec {
        // 密碼只放在環境變數中，不出現在行程列表
        CommandSpec::new(program)
            .args(connection.connection_args())
            .env(self.settings.password_env.clone(), connection.password.clone())
    }

    fn artifact_arg(&self) -> String {
        self.settings.artifact.path.to_string_lossy().into_owned()
    }

    pub async fn run(&self) -> PipelineRun {
        let mut run = PipelineRun::new();

        run.transition(PipelineState::WaitingSource);
        if !self
            .await_endpoint(&mut run, &self.source, FailureReason::SourceUnreachable)
            .await
        {
            return run;
        }

        run.transition(PipelineState::WaitingDest);
        if !self
            .await_endpoint(&mut run, &self.destination, FailureReason::DestinationUnreachable)
            .await
        {
            return run;
        }

        tracing::info!("🚀 Starting ELT process...");

        run.transition(PipelineState::Dumping);
        if !self.dump(&mut run).await {
            return run;
        }

        run.transition(PipelineState::Loading);
        if !self.load(&mut run).await {
            return run;
        }

        run.transition(PipelineState::Done);
        tracing::info!("✅ ELT process completed successfully.");
        run
    }

    async fn await_endpoint(
        &self,
        run: &mut PipelineRun,
        endpoint: &EndpointSpec,
        reason: FailureReason,
    ) -> bool {
        let policy = &self.settings.retry;
        match self.probe.wait_counting(endpoint, policy).await {
            Some(attempts) => {
                run.probe_attempts += attempts;
                true
            }
            None => {
                run.probe_attempts += policy.max_attempts();
                let error = EltError::UnreachableEndpoint {
                    target: endpoint.target(),
                    attempts: policy.max_attempts(),
                };
                tracing::error!("❌ {}", error);
                run.fail(reason, error.to_string());
                false
            }
        }
    }

    async fn dump(&self, run: &mut PipelineRun) -> bool {
        let artifact = &self.settings.artifact.path;
        if let Err(e) = prepare_artifact(artifact).await {
            return self.stage_failed(run, Stage::Dump, e.to_string());
        }

        tracing::info!(
            "📤 Dumping {} from {}",
            self.settings.source.connection.database_name,
            self.source
        );
        let output = match self.runner.run(&self.dump_command(), true).await {
            Ok(output) => output,
            Err(e) => return self.stage_failed(run, Stage::Dump, diagnostic_of(e)),
        };

        match tokio::fs::try_exists(artifact).await {
            Ok(true) => {}
            Ok(false) => {
                return self.stage_failed(
                    run,
                    Stage::Dump,
                    format!("dump produced no artifact at {}", artifact.display()),
                )
            }
            Err(e) => return self.stage_failed(run, Stage::Dump, e.to_string()),
        }

        run.record(PipelineResult {
            stage: Stage::Dump,
            succeeded: true,
            diagnostic_output: output.stderr,
        });
        true
    }

    async fn load(&self, run: &mut PipelineRun) -> bool {
        tracing::info!(
            "📥 Loading into {} at {}",
            self.settings.destination.connection.database_name,
            self.destination
        );
        let output = match self.runner.run(&self.load_command(), true).await {
            Ok(output) => output,
            Err(e) => return self.stage_failed(run, Stage::Load, diagnostic_of(e)),
        };

        run.record(PipelineResult {
            stage: Stage::Load,
            succeeded: true,
            diagnostic_output: output.stderr,
        });

        if !self.settings.artifact.keep {
            let artifact = &self.settings.artifact.path;
            if let Err(e) = tokio::fs::remove_file(artifact).await {
                tracing::warn!("Could not remove artifact {}: {}", artifact.display(), e);
            }
        }
        true
    }

    fn stage_failed(&self, run: &mut PipelineRun, stage: Stage, diagnostic: String) -> bool {
        let reason = match stage {
            Stage::Dump => FailureReason::DumpFailed,
            Stage::Load => FailureReason::LoadFailed,
        };
        tracing::error!("❌ {} stage failed: {}", stage, diagnostic.trim_end());
        run.record(PipelineResult {
            stage,
            succeeded: false,
            diagnostic_output: diagnostic.clone(),
        });
        run.fail(reason, diagnostic);
        false
    }
}

/// A stale artifact from a previous run must never be loaded.
async fn prepare_artifact(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed previous artifact {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

fn diagnostic_of(error: EltError) -> String {
    match error {
        EltError::ProcessFailure { stderr, .. } => stderr,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{
        ArtifactSettings, DatabaseTarget, DumpSettings, LoadSettings, RetryPolicy,
    };
    use std::path::PathBuf;
    use std::time::Duration;

    fn target(host: &str, db: &str, user: &str, password: &str) -> DatabaseTarget {
        DatabaseTarget {
            connection: ConnectionConfig {
                database_name: db.to_string(),
                user: user.to_string(),
                password: password.to_string(),
                host: host.to_string(),
                port: 5432,
            },
            probe_timeout: Duration::from_secs(2),
        }
    }

    fn settings(stop_on_error: bool) -> PipelineSettings {
        PipelineSettings {
            source: target("source_postgres", "source_db", "source_user", "source_password"),
            destination: target("destination_postgres", "dest_db", "dest_user", "dest_password"),
            retry: RetryPolicy::default(),
            artifact: ArtifactSettings {
                path: PathBuf::from("/tmp/dump.sql"),
                keep: false,
            },
            dump: DumpSettings {
                program: "pg_dump".to_string(),
            },
            load: LoadSettings {
                program: "psql".to_string(),
                stop_on_error,
            },
            password_env: "PGPASSWORD".to_string(),
        }
    }

    #[test]
    fn test_dump_command_requests_idempotent_replace() {
        let controller = PipelineController::with_defaults(settings(false)).unwrap();
        let dump = controller.dump_command();

        assert_eq!(
            dump.argv(),
            vec![
                "pg_dump",
                "-h",
                "source_postgres",
                "-p",
                "5432",
                "-U",
                "source_user",
                "-d",
                "source_db",
                "--no-owner",
                "--no-acl",
                "--if-exists",
                "--clean",
                "-f",
                "/tmp/dump.sql"
            ]
        );
        assert_eq!(
            dump.env.get("PGPASSWORD").map(String::as_str),
            Some("source_password")
        );
    }

    #[test]
    fn test_load_command_reads_artifact() {
        let controller = PipelineController::with_defaults(settings(false)).unwrap();
        let load = controller.load_command();

        assert_eq!(
            load.argv(),
            vec![
                "psql",
                "-h",
                "destination_postgres",
                "-p",
                "5432",
                "-U",
                "dest_user",
                "-d",
                "dest_db",
                "-f",
                "/tmp/dump.sql"
            ]
        );
        assert_eq!(
            load.env.get("PGPASSWORD").map(String::as_str),
            Some("dest_password")
        );
    }

    #[test]
    fn test_load_command_stop_on_error() {
        let controller = PipelineController::with_defaults(settings(true)).unwrap();
        let argv = controller.load_command().argv();
        let pos = argv.iter().position(|a| a == "-v").unwrap();
        assert_eq!(argv[pos + 1], "ON_ERROR_STOP=1");
    }

    #[test]
    fn test_passwords_never_in_argv() {
        let controller = PipelineController::with_defaults(settings(true)).unwrap();
        for command in [controller.dump_command(), controller.load_command()] {
            let argv = command.argv();
            assert!(!argv.iter().any(|a| a.contains("source_password")));
            assert!(!argv.iter().any(|a| a.contains("dest_password")));
        }
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let mut bad = settings(false);
        bad.destination.connection.host = String::new();
        assert!(matches!(
            PipelineController::with_defaults(bad),
            Err(EltError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn test_prepare_artifact_removes_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dump.sql");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "stale").unwrap();

        prepare_artifact(&path).await.unwrap();

        assert!(!path.exists());
        assert!(path.parent().unwrap().exists());
    }
}

#![allow(dead_code)]

use async_trait::async_trait;
use small_elt::domain::model::{
    ArtifactSettings, CommandSpec, ConnectionConfig, DatabaseTarget, DumpSettings, EndpointSpec,
    LoadSettings, PipelineSettings, ProcessOutput, RetryPolicy,
};
use small_elt::domain::ports::{CommandRunner, Connector, Sleeper};
use small_elt::{EltError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SOURCE_HOST: &str = "source_postgres";
pub const DEST_HOST: &str = "destination_postgres";
pub const SOURCE_PASSWORD: &str = "source_password";
pub const DEST_PASSWORD: &str = "dest_password";

/// Ordered record of probes and command runs shared by the fakes.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Host becomes reachable on the given attempt; `None` never.
pub struct ScriptedConnector {
    ready_on: HashMap<String, Option<u32>>,
    attempts: Mutex<HashMap<String, u32>>,
    log: EventLog,
}

impl ScriptedConnector {
    pub fn new(source_ready_on: Option<u32>, dest_ready_on: Option<u32>, log: EventLog) -> Self {
        let mut ready_on = HashMap::new();
        ready_on.insert(SOURCE_HOST.to_string(), source_ready_on);
        ready_on.insert(DEST_HOST.to_string(), dest_ready_on);
        Self {
            ready_on,
            attempts: Mutex::new(HashMap::new()),
            log,
        }
    }

    pub fn attempts(&self, host: &str) -> u32 {
        self.attempts.lock().unwrap().get(host).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, endpoint: &EndpointSpec) -> std::io::Result<()> {
        let n = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(endpoint.host.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.log.push(format!("probe {}", endpoint.host));

        match self.ready_on.get(&endpoint.host).copied().flatten() {
            Some(k) if n >= k => Ok(()),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Connection refused",
            )),
        }
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn total(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Returns scripted outputs per program and, like pg_dump, writes the `-f` target on success.
pub struct FakeRunner {
    outputs: HashMap<String, ProcessOutput>,
    write_artifact: bool,
    calls: Mutex<Vec<CommandSpec>>,
    log: EventLog,
}

impl FakeRunner {
    pub fn new(log: EventLog) -> Self {
        Self {
            outputs: HashMap::new(),
            write_artifact: true,
            calls: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn respond(mut self, program: &str, exit_code: i32, stderr: &str) -> Self {
        self.outputs.insert(
            program.to_string(),
            ProcessOutput {
                exit_code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        );
        self
    }

    pub fn without_artifact(mut self) -> Self {
        self.write_artifact = false;
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, program: &str) -> usize {
        self.calls().iter().filter(|c| c.program == program).count()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, command: &CommandSpec, check: bool) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(command.clone());
        self.log.push(format!("run {}", command.program));

        let output = self
            .outputs
            .get(&command.program)
            .cloned()
            .unwrap_or(ProcessOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            });

        if output.success() && self.write_artifact && command.program == "pg_dump" {
            if let Some(pos) = command.args.iter().position(|a| a == "-f") {
                std::fs::write(&command.args[pos + 1], "-- dump\n")?;
            }
        }

        if check && !output.success() {
            return Err(EltError::ProcessFailure {
                program: command.program.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }
}

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

pub fn settings(artifact: &Path, max_attempts: u32, delay: Duration) -> PipelineSettings {
    PipelineSettings {
        source: target(SOURCE_HOST, "source_db", "source_user", SOURCE_PASSWORD),
        destination: target(DEST_HOST, "dest_db", "dest_user", DEST_PASSWORD),
        retry: RetryPolicy::new(max_attempts, delay).unwrap(),
        artifact: ArtifactSettings {
            path: PathBuf::from(artifact),
            keep: false,
        },
        dump: DumpSettings {
            program: "pg_dump".to_string(),
        },
        load: LoadSettings {
            program: "psql".to_string(),
            stop_on_error: false,
        },
        password_env: "PGPASSWORD".to_string(),
    }
}

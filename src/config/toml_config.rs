use crate::core::transform::TransformSettings;
use crate::domain::model::{
    ArtifactSettings, ConnectionConfig, DatabaseTarget, DumpSettings, LoadSettings,
    PipelineSettings, RetryPolicy,
};
use crate::utils::error::{EltError, Result};
use crate::utils::validation::{self, Validate};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_PROBE_TIMEOUT_SECONDS: u64 = 2;
const DEFAULT_MAX_ATTEMPTS: u32 = 60;
const DEFAULT_DELAY_SECONDS: u64 = 2;
const DEFAULT_ARTIFACT_PATH: &str = "/tmp/dump.sql";
const DEFAULT_PASSWORD_ENV: &str = "PGPASSWORD";

#[derive(Debug, Clone, Deserialize)]
pub struct EltConfig {
    pub pipeline: PipelineConfig,
    pub source: DatabaseConfig,
    pub destination: DatabaseConfig,
    pub readiness: Option<ReadinessConfig>,
    pub dump: Option<DumpConfig>,
    pub load: Option<LoadConfig>,
    pub transform: Option<TransformConfig>,
    pub workflow: Option<WorkflowConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    /// 傳遞密碼給 pg_dump 與 psql 的環境變數名稱
    pub password_env: Option<String>,
}

#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: Option<u16>,
    pub database: String,
    pub user: String,
    pub password: String,
    pub probe_timeout_seconds: Option<u64>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("probe_timeout_seconds", &self.probe_timeout_seconds)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(
            self.probe_timeout_seconds
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECONDS),
        )
    }

    fn validate_as(&self, section: &str) -> Result<()> {
        validation::validate_non_empty_string(&format!("{}.host", section), &self.host)?;
        validation::validate_range(&format!("{}.port", section), self.port(), 1, u16::MAX)?;
        validation::validate_non_empty_string(&format!("{}.database", section), &self.database)?;
        validation::validate_non_empty_string(&format!("{}.user", section), &self.user)?;
        validation::validate_credential(&format!("{}.password", section), &self.password)?;
        if let Some(timeout) = self.probe_timeout_seconds {
            validation::validate_positive_number(
                &format!("{}.probe_timeout_seconds", section),
                timeout as usize,
                1,
            )?;
        }
        Ok(())
    }

    fn to_target(&self) -> DatabaseTarget {
        DatabaseTarget {
            connection: ConnectionConfig {
                database_name: self.database.clone(),
                user: self.user.clone(),
                password: self.password.clone(),
                host: self.host.clone(),
                port: self.port(),
            },
            probe_timeout: self.probe_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadinessConfig {
    pub max_attempts: Option<u32>,
    pub delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DumpConfig {
    pub program: Option<String>,
    pub artifact_path: Option<String>,
    pub keep_artifact: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadConfig {
    pub program: Option<String>,
    pub stop_on_error: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransformConfig {
    pub enabled: Option<bool>,
    pub docker_program: Option<String>,
    pub image: Option<String>,
    pub network: Option<String>,
    pub project_dir: Option<String>,
    pub profiles_dir: Option<String>,
    pub full_refresh: Option<bool>,
    pub auto_remove: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowConfig {
    pub retries: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
}

impl EltConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    ///
    /// The document is parsed before `${VAR}` substitution, so substituted values are
    /// never read as TOML syntax and never appear in parse errors.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content).map_err(|e| EltError::ConfigParse {
            message: format!("TOML parsing error: {}", e),
        })?;

        let mut value = toml::Value::Table(table);
        Self::substitute_env_vars(&mut value)?;

        value.try_into().map_err(|e| EltError::ConfigParse {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換字串值中的環境變數 (例如 ${SOURCE_PASSWORD})，找不到的變數保留原樣
    fn substitute_env_vars(value: &mut toml::Value) -> Result<()> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EltError::ConfigParse {
            message: e.to_string(),
        })?;

        substitute_in(value, &re);
        Ok(())
    }

    pub fn max_attempts(&self) -> u32 {
        self.readiness
            .as_ref()
            .and_then(|r| r.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(
            self.readiness
                .as_ref()
                .and_then(|r| r.delay_seconds)
                .unwrap_or(DEFAULT_DELAY_SECONDS),
        )
    }

    pub fn artifact_path(&self) -> PathBuf {
        PathBuf::from(
            self.dump
                .as_ref()
                .and_then(|d| d.artifact_path.clone())
                .unwrap_or_else(|| DEFAULT_ARTIFACT_PATH.to_string()),
        )
    }

    pub fn password_env(&self) -> String {
        self.pipeline
            .password_env
            .clone()
            .unwrap_or_else(|| DEFAULT_PASSWORD_ENV.to_string())
    }

    pub fn transform_enabled(&self) -> bool {
        self.transform
            .as_ref()
            .map(|t| t.enabled.unwrap_or(true))
            .unwrap_or(false)
    }

    pub fn workflow_retries(&self) -> (u32, Duration) {
        let workflow = self.workflow.clone().unwrap_or_default();
        (
            workflow.retries.unwrap_or(0),
            Duration::from_secs(workflow.retry_delay_seconds.unwrap_or(300)),
        )
    }

    /// 套用命令列覆蓋設定
    pub fn override_readiness(&mut self, max_attempts: Option<u32>, delay_seconds: Option<u64>) {
        let readiness = self.readiness.get_or_insert_with(ReadinessConfig::default);
        if let Some(attempts) = max_attempts {
            readiness.max_attempts = Some(attempts);
        }
        if let Some(delay) = delay_seconds {
            readiness.delay_seconds = Some(delay);
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        validation::validate_env_var_name("pipeline.password_env", &self.password_env())?;
        self.source.validate_as("source")?;
        self.destination.validate_as("destination")?;

        validation::validate_positive_number(
            "readiness.max_attempts",
            self.max_attempts() as usize,
            1,
        )?;

        validation::validate_path(
            "dump.artifact_path",
            &self.artifact_path().to_string_lossy(),
        )?;

        if let Some(program) = self.dump.as_ref().and_then(|d| d.program.as_deref()) {
            validation::validate_non_empty_string("dump.program", program)?;
        }
        if let Some(program) = self.load.as_ref().and_then(|l| l.program.as_deref()) {
            validation::validate_non_empty_string("load.program", program)?;
        }

        if self.transform_enabled() {
            let settings = self.transform_settings().unwrap_or_default();
            validation::validate_non_empty_string("transform.image", &settings.image)?;
            validation::validate_path("transform.project_dir", &settings.project_dir)?;
            validation::validate_path("transform.profiles_dir", &settings.profiles_dir)?;
        }

        Ok(())
    }

    /// 轉換成已驗證的 pipeline 設定
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        self.validate_config()?;

        let dump = self.dump.clone().unwrap_or_default();
        let load = self.load.clone().unwrap_or_default();

        Ok(PipelineSettings {
            source: self.source.to_target(),
            destination: self.destination.to_target(),
            retry: RetryPolicy::new(self.max_attempts(), self.retry_delay())?,
            artifact: ArtifactSettings {
                path: self.artifact_path(),
                keep: dump.keep_artifact.unwrap_or(false),
            },
            dump: DumpSettings {
                program: dump.program.unwrap_or_else(|| "pg_dump".to_string()),
            },
            load: LoadSettings {
                program: load.program.unwrap_or_else(|| "psql".to_string()),
                stop_on_error: load.stop_on_error.unwrap_or(false),
            },
            password_env: self.password_env(),
        })
    }

    /// `None` when the `[transform]` section is absent or disabled.
    pub fn transform_settings(&self) -> Option<TransformSettings> {
        let t = self.transform.as_ref().filter(|_| self.transform_enabled())?;
        let defaults = TransformSettings::default();

        Some(TransformSettings {
            docker_program: t.docker_program.clone().unwrap_or(defaults.docker_program),
            image: t.image.clone().unwrap_or(defaults.image),
            // an empty network means "use docker's default network"
            network: match &t.network {
                Some(n) if n.is_empty() => None,
                Some(n) => Some(n.clone()),
                None => defaults.network,
            },
            project_dir: t.project_dir.clone().unwrap_or(defaults.project_dir),
            profiles_dir: t.profiles_dir.clone().unwrap_or(defaults.profiles_dir),
            full_refresh: t.full_refresh.unwrap_or(defaults.full_refresh),
            auto_remove: t.auto_remove.unwrap_or(defaults.auto_remove),
        })
    }
}

fn substitute_in(value: &mut toml::Value, re: &regex::Regex) {
    match value {
        toml::Value::String(s) => {
            let replaced = re
                .replace_all(s, |caps: &regex::Captures| {
                    let var_name = &caps[1];
                    std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
                })
                .into_owned();
            *s = replaced;
        }
        toml::Value::Array(items) => items.iter_mut().for_each(|item| substitute_in(item, re)),
        toml::Value::Table(table) => table.iter_mut().for_each(|(_, item)| substitute_in(item, re)),
        _ => {}
    }
}

impl Validate for EltConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

use crate::core::pipeline::PipelineController;
use crate::domain::ports::{CommandRunner, Connector, Sleeper, Task, TokioSleeper};
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// 單一工作的執行結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub name: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub duration_ms: u64,
    pub message: Option<String>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded: bool,
    pub tasks: Vec<TaskReport>,
}

impl WorkflowReport {
    pub fn task(&self, name: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn first_failure(&self) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.status == TaskStatus::Failed)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// 依序執行工作的排程器，後一個工作只在前一個成功後才開始。
///
/// `retries` is the schedule-level retry of a whole task and has nothing to do with
/// the readiness polling inside the pipeline.
pub struct Workflow<S: Sleeper = TokioSleeper> {
    name: String,
    tasks: Vec<Box<dyn Task>>,
    retries: u32,
    retry_delay: Duration,
    sleeper: S,
    monitor: Option<SystemMonitor>,
}

impl Workflow<TokioSleeper> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_sleeper(name, TokioSleeper)
    }
}

impl<S: Sleeper> Workflow<S> {
    pub fn with_sleeper(name: impl Into<String>, sleeper: S) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            retries: 0,
            retry_delay: Duration::from_secs(300),
            sleeper,
            monitor: None,
        }
    }

    pub fn with_retries(mut self, retries: u32, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(|| SystemMonitor::new(true));
        self
    }

    /// 新增一個在目前最後一個工作之後執行的工作
    pub fn then(mut self, task: impl Task + 'static) -> Self {
        self.tasks.push(Box::new(task));
        self
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    pub async fn run(&self) -> WorkflowReport {
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(self.tasks.len());
        let mut blocked_by: Option<String> = None;

        tracing::info!(
            "🚀 Workflow '{}' started with {} tasks",
            self.name,
            self.tasks.len()
        );

        for task in &self.tasks {
            if let Some(upstream) = &blocked_by {
                tracing::info!("⏭️ Skipping task: {} (upstream '{}' failed)", task.name(), upstream);
                reports.push(TaskReport {
                    name: task.name().to_string(),
                    status: TaskStatus::Skipped,
                    attempts: 0,
                    duration_ms: 0,
                    message: Some(format!("upstream task '{}' failed", upstream)),
                    exit_code: None,
                });
                continue;
            }

            let report = self.run_task(task.as_ref()).await;
            if let Some(monitor) = &self.monitor {
                monitor.log_stats(task.name());
            }
            if report.status == TaskStatus::Failed {
                blocked_by = Some(task.name().to_string());
            }
            reports.push(report);
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }

        let succeeded = blocked_by.is_none();
        if succeeded {
            tracing::info!("✅ Workflow '{}' succeeded", self.name);
        } else {
            tracing::error!("❌ Workflow '{}' failed", self.name);
        }

        WorkflowReport {
            workflow: self.name.clone(),
            started_at,
            finished_at: Utc::now(),
            succeeded,
            tasks: reports,
        }
    }

    async fn run_task(&self, task: &dyn Task) -> TaskReport {
        let start = Instant::now();
        let total_attempts = self.retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::info!("▶️ Task {} (try {}/{})", task.name(), attempt, total_attempts);

            match task.run().await {
                Ok(()) => {
                    tracing::info!(
                        "✅ Task executed: {} (duration: {:?})",
                        task.name(),
                        start.elapsed()
                    );
                    return TaskReport {
                        name: task.name().to_string(),
                        status: TaskStatus::Succeeded,
                        attempts: attempt,
                        duration_ms: start.elapsed().as_millis() as u64,
                        message: None,
                        exit_code: Some(0),
                    };
                }
                Err(e) if attempt < total_attempts => {
                    tracing::warn!(
                        "🔁 Task {} failed: {}; retrying in {:?}",
                        task.name(),
                        e,
                        self.retry_delay
                    );
                    self.sleeper.sleep(self.retry_delay).await;
                }
                Err(e) => {
                    tracing::error!("❌ Task execution failed: {}: {}", task.name(), e);
                    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
                    return TaskReport {
                        name: task.name().to_string(),
                        status: TaskStatus::Failed,
                        attempts: attempt,
                        duration_ms: start.elapsed().as_millis() as u64,
                        message: Some(e.user_friendly_message()),
                        exit_code: Some(e.exit_code()),
                    };
                }
            }
        }
    }
}

/// Exposes a [`PipelineController`] as a scheduler task.
pub struct EltTask<C, S, R> {
    name: String,
    controller: PipelineController<C, S, R>,
}

impl<C, S, R> EltTask<C, S, R> {
    pub fn new(name: impl Into<String>, controller: PipelineController<C, S, R>) -> Self {
        Self {
            name: name.into(),
            controller,
        }
    }
}

#[async_trait]
impl<C, S, R> Task for EltTask<C, S, R>
where
    C: Connector,
    S: Sleeper,
    R: CommandRunner,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<()> {
        self.controller.run().await.into_result().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::EltError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    struct CountingTask {
        name: String,
        fail_times: u32,
        calls: Arc<AtomicU32>,
    }

    impl CountingTask {
        fn new(name: &str, fail_times: u32) -> (Self, Arc<AtomicU32>) {
            let calls = Arc::new(AtomicU32::new(0));
            (
                Self {
                    name: name.to_string(),
                    fail_times,
                    calls: calls.clone(),
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Task for CountingTask {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_times {
                Err(EltError::ProcessFailure {
                    program: self.name.clone(),
                    exit_code: 1,
                    stderr: "boom".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    #[tokio::test]
    async fn test_tasks_run_in_order() {
        let (first, first_calls) = CountingTask::new("run_elt_script", 0);
        let (second, second_calls) = CountingTask::new("dbt_run", 0);

        let workflow = Workflow::with_sleeper("elt_and_dbt", RecordingSleeper::default())
            .then(first)
            .then(second);
        assert_eq!(workflow.task_names(), vec!["run_elt_script", "dbt_run"]);

        let report = workflow.run().await;

        assert!(report.succeeded);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.tasks[0].name, "run_elt_script");
        assert_eq!(report.tasks[1].status, TaskStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_failure_skips_downstream() {
        let (first, _) = CountingTask::new("run_elt_script", u32::MAX);
        let (second, second_calls) = CountingTask::new("dbt_run", 0);

        let report = Workflow::with_sleeper("elt_and_dbt", RecordingSleeper::default())
            .then(first)
            .then(second)
            .run()
            .await;

        assert!(!report.succeeded);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.task("run_elt_script").unwrap().status, TaskStatus::Failed);
        assert_eq!(report.task("dbt_run").unwrap().status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn test_schedule_level_retry() {
        let (flaky, calls) = CountingTask::new("run_elt_script", 1);

        let workflow = Workflow::with_sleeper("elt_and_dbt", RecordingSleeper::default())
            .with_retries(2, Duration::from_secs(60))
            .then(flaky);
        let report = workflow.run().await;

        assert!(report.succeeded);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.tasks[0].attempts, 2);
        assert_eq!(
            *workflow.sleeper.sleeps.lock().unwrap(),
            vec![Duration::from_secs(60)]
        );
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let (task, _) = CountingTask::new("run_elt_script", 0);
        let report = Workflow::with_sleeper("elt_and_dbt", RecordingSleeper::default())
            .then(task)
            .run()
            .await;

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["workflow"], "elt_and_dbt");
        assert_eq!(json["tasks"][0]["status"], "succeeded");
    }
}

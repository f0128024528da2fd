use anyhow::Context;
use clap::Parser;
use small_elt::utils::{logger, validation::Validate};
use small_elt::{
    CliConfig, EltConfig, EltError, EltTask, PipelineController, TransformTask, Workflow,
    WorkflowReport,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliConfig::parse();

    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting small-elt");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match EltConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => fail(&e),
    };
    config.override_readiness(args.max_attempts, args.retry_delay);
    if args.verbose {
        tracing::debug!("Config: {:?}", config);
    }

    // 在任何網路或行程活動之前驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        fail(&e);
    }
    let settings = match config.pipeline_settings() {
        Ok(settings) => settings,
        Err(e) => fail(&e),
    };
    let controller = match PipelineController::with_defaults(settings) {
        Ok(controller) => controller,
        Err(e) => fail(&e),
    };
    let transform = if args.skip_transform {
        None
    } else {
        config.transform_settings()
    };

    tracing::info!("✅ Configuration loaded and validated successfully");

    if args.dry_run {
        print_dry_run(&config, &controller, transform.as_ref());
        return Ok(());
    }

    let (retries, retry_delay) = config.workflow_retries();
    let mut workflow = Workflow::new(config.pipeline.name.clone())
        .with_retries(retries, retry_delay)
        .with_monitoring(args.monitor)
        .then(EltTask::new("run_elt_script", controller));
    if let Some(settings) = transform {
        workflow = workflow.then(TransformTask::with_defaults(settings));
    }

    let report = tokio::select! {
        report = workflow.run() => report,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("🛑 Interrupted, stopping run");
            fail(&EltError::Cancelled)
        }
    };

    if let Some(path) = &args.report {
        write_report(&report, path)?;
    }

    match report.first_failure() {
        None => {
            println!("✅ ELT workflow '{}' completed successfully!", report.workflow);
            Ok(())
        }
        Some(task) => {
            eprintln!(
                "❌ Task '{}' failed: {}",
                task.name,
                task.message.as_deref().unwrap_or("unknown error")
            );
            std::process::exit(task.exit_code.filter(|c| *c != 0).unwrap_or(1));
        }
    }
}

fn fail(e: &EltError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(e.exit_code());
}

fn write_report(report: &WorkflowReport, path: &str) -> anyhow::Result<()> {
    let json = report.to_json()?;
    std::fs::write(path, json).with_context(|| format!("failed to write report to {}", path))?;
    tracing::info!("📝 Run report written to {}", path);
    Ok(())
}

fn print_dry_run(
    config: &EltConfig,
    controller: &PipelineController,
    transform: Option<&small_elt::TransformSettings>,
) {
    let settings = controller.settings();

    println!("🔍 Dry Run Analysis: {}", config.pipeline.name);
    println!();
    println!("📡 Readiness:");
    println!("  Source: {}", controller.source_endpoint());
    println!("  Destination: {}", controller.destination_endpoint());
    println!(
        "  Budget: {} attempts, {:?} apart",
        settings.retry.max_attempts(),
        settings.retry.delay()
    );
    println!();
    println!("⚙️ Commands (credentials passed via ${}):", settings.password_env);
    println!("  dump: {}", controller.dump_command().argv().join(" "));
    println!("  load: {}", controller.load_command().argv().join(" "));
    match transform {
        Some(t) => println!(
            "  transform: {}",
            TransformTask::with_defaults(t.clone()).command().argv().join(" ")
        ),
        None => println!("  transform: disabled"),
    }
    println!();
    println!("💾 Artifact: {}", settings.artifact.path.display());
}

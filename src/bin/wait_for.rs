use clap::Parser;
use small_elt::domain::model::{EndpointSpec, RetryPolicy};
use small_elt::utils::logger;
use small_elt::ReadinessProbe;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "wait-for")]
#[command(about = "Wait until a TCP endpoint accepts connections")]
struct Args {
    /// Target as HOST:PORT
    target: String,

    #[arg(long, default_value = "60")]
    attempts: u32,

    /// Seconds between attempts
    #[arg(long, default_value = "2")]
    delay: u64,

    /// Per-attempt connect timeout in seconds
    #[arg(long, default_value = "2")]
    timeout: u64,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_target(target: &str) -> Option<(String, u16)> {
    let (host, port) = target.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let Some((host, port)) = parse_target(&args.target) else {
        eprintln!("❌ Expected HOST:PORT, got '{}'", args.target);
        std::process::exit(3);
    };

    let spec = EndpointSpec::new(host, port, Duration::from_secs(args.timeout))
        .and_then(|endpoint| {
            RetryPolicy::new(args.attempts, Duration::from_secs(args.delay))
                .map(|policy| (endpoint, policy))
        });
    let (endpoint, policy) = match spec {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(e.exit_code());
        }
    };

    if !ReadinessProbe::tcp().wait_until_ready(&endpoint, &policy).await {
        eprintln!("❌ {} not reachable", endpoint);
        std::process::exit(2);
    }
}

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use ratetree::config::EngineConfig;
use ratetree::ratelimit::{LimitsConfig, ResourceLimiterTree, ResourceRequest, TracingListener};

/// Replay requests against a limits file and print each decision.
#[derive(Parser, Debug)]
#[command(name = "ratetree", version, about)]
struct Args {
    /// Limits file; defaults to `limits_path` from the engine configuration
    #[arg(short, long)]
    limits: Option<PathBuf>,

    /// Engine configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dotted resource path to request, e.g. `users.get`
    #[arg(short, long)]
    resource: String,

    /// Caller key the quota is tracked against
    #[arg(short, long, default_value = "anonymous")]
    key: String,

    /// Number of requests to replay
    #[arg(short = 'n', long, default_value_t = 10)]
    requests: u32,

    /// Permits per request
    #[arg(short, long, default_value_t = 1)]
    permits: u64,

    /// Maximum wait per request in milliseconds; overrides the engine configuration
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print decisions and logs as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Decision<'a> {
    request: u32,
    resource: &'a str,
    key: &'a str,
    permits: u64,
    allowed: bool,
    elapsed_ms: f64,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load(args.config.as_deref()).context("loading engine configuration")?;
    let limits_path = args
        .limits
        .clone()
        .or_else(|| config.limits_path.as_ref().map(PathBuf::from))
        .context("no limits file given; pass --limits or set limits_path")?;

    let tree = LimitsConfig::from_file(&limits_path)?.build_tree()?;
    let limiter = ResourceLimiterTree::from_rates(tree, config.bandwidth_factory()?)
        .with_first_match_only(config.first_match_only)
        .with_listener(std::sync::Arc::new(TracingListener));

    let timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.default_timeout());
    info!(
        resource = %args.resource,
        key = %args.key,
        requests = args.requests,
        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        "Replaying requests"
    );

    let request = ResourceRequest::new(args.resource.clone(), args.key.clone());
    let mut allowed_count = 0u32;
    for n in 1..=args.requests {
        let started = Instant::now();
        let allowed = limiter.try_consume(&request, args.permits, timeout)?;
        if allowed {
            allowed_count += 1;
        }

        let decision = Decision {
            request: n,
            resource: &args.resource,
            key: &args.key,
            permits: args.permits,
            allowed,
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        if args.json {
            println!("{}", serde_json::to_string(&decision)?);
        } else {
            println!(
                "request {:>4}: {} ({:.3} ms)",
                decision.request,
                if allowed { "allowed" } else { "rejected" },
                decision.elapsed_ms
            );
        }
    }

    info!(allowed = allowed_count, rejected = args.requests - allowed_count, "Replay finished");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

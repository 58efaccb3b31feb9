use crate::{
    config::Config,
    device::{bridge::BridgeTransport, Credentials},
    job_store::JobStore,
    orchestrator::Orchestrator,
    publisher::{transport_from_config, ProgressPublisher},
    registry::ReportRegistry,
    util::ensure_dir,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "netreport")]
#[command(about = "Network device report orchestrator (RPC sessions + per-report parsers + progress events)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./netreport.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the registered report types.
    Types {},
    /// Check a comma-separated list of report type ids against the registry.
    Validate {
        #[arg(long, value_delimiter = ',')]
        types: Vec<String>,
    },
    /// Connect to one or more devices and generate the requested reports.
    Run {
        /// Comma-separated device hosts; each runs as its own job.
        #[arg(long = "hosts", alias = "host", value_delimiter = ',', required = true)]
        hosts: Vec<String>,
        #[arg(long)]
        user: String,
        #[arg(long)]
        port: Option<u16>,
        /// Comma-separated report type ids, or `all`.
        #[arg(long, value_delimiter = ',', required = true)]
        types: Vec<String>,
        /// Environment variable holding the device password.
        #[arg(long, default_value = "NETREPORT_PASSWORD")]
        password_env: String,
        /// Write the combined results as JSON. A directory gets a timestamped file.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Check that the bridge helper and its device library are usable.
    Doctor {},
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let cfg = match &cfg_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Types {} => types(),
        Command::Validate { types } => validate(types),
        Command::Doctor {} => doctor(&cfg),
        Command::Run {
            hosts,
            user,
            port,
            types,
            password_env,
            out,
        } => run(
            &cfg,
            RunArgs {
                hosts,
                user,
                port: *port,
                types,
                password_env,
                out: out.as_deref(),
            },
        ),
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    ["netreport.toml", "netreport.example.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries the event stream, so console logs go to stderr.
    let console_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }
    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }
    Some(PathBuf::from("logs").join("netreport.log"))
}

fn types() -> Result<()> {
    let registry = ReportRegistry::builtin();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": "success",
            "total": registry.len(),
            "report_types": registry.list_all(),
        }))?
    );
    Ok(())
}

fn validate(types: &[String]) -> Result<()> {
    let registry = ReportRegistry::builtin();
    let (valid, invalid) = registry.validate(types);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "valid": valid,
            "invalid": invalid,
        }))?
    );
    if !valid {
        return Err(anyhow!("unknown report types: {:?}", invalid));
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    let transport = BridgeTransport::new(cfg)?;
    let diag = transport.doctor()?;
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "bridge": diag,
            "report_types": ReportRegistry::builtin().len(),
        }))?
    );
    if !diag.ok {
        return Err(anyhow!(
            "bridge is not usable: {}",
            diag.error.as_deref().unwrap_or("unknown error")
        ));
    }
    Ok(())
}

struct RunArgs<'a> {
    hosts: &'a [String],
    user: &'a str,
    port: Option<u16>,
    types: &'a [String],
    password_env: &'a str,
    out: Option<&'a Path>,
}

fn run(cfg: &Config, args: RunArgs<'_>) -> Result<()> {
    let password = std::env::var(args.password_env)
        .with_context(|| format!("reading device password from ${}", args.password_env))?;

    let transport = Arc::new(BridgeTransport::new(cfg)?);
    let publisher = ProgressPublisher::new(
        transport_from_config(cfg)?,
        cfg.publisher.channel_prefix.clone(),
    );
    let orchestrator = Orchestrator::new(
        ReportRegistry::builtin(),
        transport,
        publisher,
        JobStore::from_config(&cfg.jobs),
    )
    .reject_url_hosts(cfg.security.reject_url_hosts);

    let timeout = match cfg.jobs.wait_timeout_seconds {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };
    let fleet = orchestrator.run_many(
        args.hosts,
        args.port.unwrap_or(cfg.device.port),
        &Credentials::new(args.user, password),
        args.types,
        timeout,
    )?;
    info!(
        "run finished: {} devices, {}/{} reports successful",
        fleet.total_devices, fleet.summary.successful, fleet.summary.total_reports
    );

    if cfg.global.print_summary {
        eprintln!("{}", serde_json::to_string_pretty(&fleet)?);
    }
    if let Some(out) = args.out {
        let path = fleet.write(out)?;
        info!("results saved to {}", path.display());
    }

    if !fleet.all_succeeded() {
        return Err(anyhow!("jobs failed for: {}", fleet.failed_hosts().join(", ")));
    }
    Ok(())
}

//! `gleaner` command line interface.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    clap::{Parser, Subcommand},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use {
    gleaner_config::{GleanerConfig, Severity},
    gleaner_orchestrator::Orchestrator,
    gleaner_session::SessionPool,
};

#[derive(Parser)]
#[command(name = "gleaner", version, about = "Multi-session social feed harvester")]
struct Cli {
    /// Config file path. Defaults to discovering gleaner.{toml,yaml,json}.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info", env = "GLEANER_LOG")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a harvest over the configured targets.
    Run {
        /// Write the merged records to this JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate the configuration and exit.
    Check,
    /// Print the effective configuration as TOML.
    Config {
        /// Also write it to the user config path.
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    let cfg = load(cli.config.as_deref())?;
    match cli.command {
        Command::Run { output } => run(cfg, output).await,
        Command::Check => check(&cfg).await,
        Command::Config { save } => show_config(&cfg, save),
    }
}

fn init_logging(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load(path: Option<&Path>) -> anyhow::Result<GleanerConfig> {
    match path {
        Some(path) => gleaner_config::load_config(path),
        None => Ok(gleaner_config::discover_and_load()),
    }
}

async fn run(cfg: GleanerConfig, output: Option<PathBuf>) -> anyhow::Result<()> {
    let validation = gleaner_config::validate(&cfg);
    for diagnostic in &validation.diagnostics {
        match diagnostic.severity {
            Severity::Error => {
                warn!(path = diagnostic.path, "config error: {}", diagnostic.message);
            },
            _ => info!(path = diagnostic.path, "{}", diagnostic.message),
        }
    }
    if validation.has_errors() {
        anyhow::bail!(
            "configuration has {} error(s); run `gleaner check` for details",
            validation.count(Severity::Error)
        );
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing current rounds");
                cancel.cancel();
            }
        });
    }

    let pool = Arc::new(SessionPool::new(cfg.session.clone()));
    let orchestrator = Orchestrator::new(pool, cfg, cancel);
    let result = orchestrator.run().await?;

    println!(
        "collected {} record(s) across {} session(s), {} cross-session duplicate(s) dropped",
        result.records.len(),
        result.reports.len(),
        result.cross_session_duplicates
    );
    for report in &result.reports {
        println!(
            "  {}: {} record(s), {} scroll(s) ({:.2} records/scroll), {} ({} target(s))",
            report.session_id,
            report.records_collected,
            report.scroll_attempts,
            report.records_per_scroll(),
            report.termination_reason,
            report.targets_assigned
        );
    }

    if let Some(path) = output {
        let file = std::fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, &result.records)?;
        println!("wrote {} record(s) to {}", result.records.len(), path.display());
    }

    if result.failed_partitions() > 0 {
        anyhow::bail!("{} partition(s) failed", result.failed_partitions());
    }
    Ok(())
}

async fn check(cfg: &GleanerConfig) -> anyhow::Result<()> {
    let result = gleaner_config::validate(cfg);
    for diagnostic in &result.diagnostics {
        println!(
            "{}: {}: {}",
            diagnostic.severity, diagnostic.path, diagnostic.message
        );
    }
    if result.has_errors() {
        anyhow::bail!("configuration has {} error(s)", result.count(Severity::Error));
    }
    println!(
        "configuration ok: {} target(s), {} profile(s)",
        cfg.resolved_targets().len(),
        cfg.session.profile_ids.len()
    );

    let pool = SessionPool::new(cfg.session.clone());
    let report = pool.health_check().await;
    println!(
        "host: cpu {:.1}%, memory {:.1}%, disk free {:.1} GiB",
        report.cpu_percent, report.mem_percent, report.disk_free_gb
    );
    println!(
        "managed app: {}, runaway worker(s): {}",
        if report.managed_process_running {
            "running"
        } else {
            "not running"
        },
        report.runaway_worker_pids.len()
    );
    for violation in report.resource_violations(&cfg.session) {
        println!("warning: {violation}");
    }
    Ok(())
}

fn show_config(cfg: &GleanerConfig, save: bool) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(cfg)?);
    if save {
        let path = gleaner_config::save_config(cfg)?;
        println!("# saved to {}", path.display());
    }
    Ok(())
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use repopulse::{
    api,
    collector::MetricsCollector,
    config::{self, Config},
    report,
    watcher::{handler_fn, RepoWatcher, WatchEvent},
};
use std::{path::PathBuf, sync::Arc};

#[derive(Parser, Debug)]
#[command(
    name = "repopulse",
    about = "Zero-token health metrics for a directory of local Git repositories"
)]
struct Cli {
    /// Path to config file (default: ~/.config/repopulse/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Directory to discover repositories under (overrides root_dir)
    #[arg(long, value_name = "PATH", global = true)]
    root: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect metrics for every repository and save the snapshot
    Scan {
        /// Print the snapshot as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Poll repositories for new commits until Ctrl-C
    Watch {
        /// Seconds between polls (overrides poll_interval_secs)
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
    /// Detailed report for one repository from the saved snapshot
    Report {
        /// Repository directory name
        name: String,
    },
    /// Serve the metrics HTTP/WebSocket API
    Serve {
        /// Address to listen on (overrides bind)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);
    check_git_installed()?;

    let mut cfg = config::load_config(cli.config.as_ref())?;
    if let Some(root) = &cli.root {
        cfg.root_dir = root.clone();
    }

    match cli.command {
        Commands::Scan { json } => scan(&cfg, json).await,
        Commands::Watch { interval } => {
            if let Some(secs) = interval {
                cfg.poll_interval_secs = secs;
            }
            watch(&cfg).await
        }
        Commands::Report { name } => show_report(&cfg, &name),
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| cfg.bind.clone());
            api::serve(&cfg, &bind).await
        }
    }
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn check_git_installed() -> Result<()> {
    match std::process::Command::new("git").arg("--version").output() {
        Ok(o) if o.status.success() => Ok(()),
        _ => Err(anyhow::anyhow!(
            "git is not installed or not in PATH.\nPlease install git and try again."
        )),
    }
}

async fn scan(cfg: &Config, json: bool) -> Result<()> {
    let collector = MetricsCollector::new(cfg);
    let repos = collector.collect_all().await?;
    if json {
        let snapshot = repopulse::MetricsSnapshot::new(repos);
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", report::render_table(&repos));
        println!(
            "\nSnapshot saved to {}",
            collector.store().path().display()
        );
    }
    Ok(())
}

async fn watch(cfg: &Config) -> Result<()> {
    let collector = Arc::new(MetricsCollector::new(cfg));
    let handler = handler_fn(|event| async move {
        if let WatchEvent::RepoUpdate { repo, timestamp } = event {
            let head = repo.git.last_commit_hash.as_deref().unwrap_or("");
            println!(
                "[{}] {}  HEAD={}  health={:.1}  LoC={}",
                timestamp.format("%H:%M:%S"),
                repo.name,
                &head[..head.len().min(8)],
                repo.health_score,
                repo.total_loc
            );
        }
    });

    let mut watcher = RepoWatcher::new(collector, cfg).with_handler(handler);
    watcher.start().await?;
    let status = watcher.status();
    println!(
        "Watching {} repos under {} every {}s (Ctrl-C to stop)",
        status.tracked_count,
        cfg.root_dir.display(),
        status.poll_interval
    );

    tokio::signal::ctrl_c().await?;
    watcher.stop().await;
    println!(
        "\nStopped. {} changes detected.",
        watcher.status().changes_detected
    );
    Ok(())
}

fn show_report(cfg: &Config, name: &str) -> Result<()> {
    let collector = MetricsCollector::new(cfg);
    let Some(snapshot) = collector.load_snapshot() else {
        eprintln!("No metrics snapshot found. Run `repopulse scan` first.");
        std::process::exit(1);
    };
    match snapshot.find(name) {
        Some(repo) => {
            print!("{}", report::render_report(repo));
            Ok(())
        }
        None => {
            eprintln!("Repo '{}' not found in snapshot.", name);
            let mut names: Vec<&str> = snapshot.repos.iter().map(|r| r.name.as_str()).collect();
            names.sort_unstable();
            eprintln!("Available: {}", names.join(", "));
            std::process::exit(1);
        }
    }
}

//! HDD Feedback Agent CLI
//!
//! Fake hard-disk light and sound driven by filesystem writes.

use anyhow::Context;
use clap::{Parser, Subcommand};
use hdd_feedback_agent::{
    config::Config,
    coordinator::{ActivityCoordinator, SoundSet},
    core::{ActivityEvent, ActivityPolicy},
    indicator::IndicatorDriver,
    playback::{PlaybackSlot, SystemAudioBackend},
    stats::ActivityStats,
    watcher::{dispatch_events, FileWatchSource, WatchError},
    VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hdd-feedback")]
#[command(version = VERSION)]
#[command(about = "Fake hard-disk activity light and sound driven by filesystem writes", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch directories and drive the light and sound until Ctrl+C
    Run {
        /// Directory to watch (repeatable, replaces configured directories)
        #[arg(long = "watch", short = 'w')]
        watch: Vec<PathBuf>,

        /// GPIO pin for the activity light
        #[arg(long)]
        pin: Option<u32>,
    },

    /// Run a single feedback cycle without watching anything
    TestCycle {
        /// Play the sustained-activity clip instead of the short one
        #[arg(long)]
        sustained: bool,
    },

    /// Show the effective configuration
    Config,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);

    let result = match cli.command {
        Commands::Run { watch, pin } => cmd_run(&config_path, watch, pin),
        Commands::TestCycle { sustained } => cmd_test_cycle(&config_path, sustained),
        Commands::Config => cmd_config(&config_path),
        Commands::InitConfig { force } => cmd_init_config(&config_path, force),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Load the configuration at `path` and anchor its sound paths.
fn load_config(path: &Path) -> anyhow::Result<Config> {
    let mut config = Config::load_from(path)
        .with_context(|| format!("could not load configuration from {}", path.display()))?;
    if let Some(base) = path.parent().filter(|_| path.exists()) {
        config.resolve_sound_paths(base);
    }
    Ok(config)
}

fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start async runtime")
}

fn build_coordinator(config: &Config, policy: ActivityPolicy) -> ActivityCoordinator {
    let indicator = Arc::new(IndicatorDriver::open(config.gpio_pin, config.pulse));
    let playback = Arc::new(PlaybackSlot::new(
        Arc::new(SystemAudioBackend::new(config.volume)),
        config.playback,
    ));
    ActivityCoordinator::new(
        policy,
        indicator,
        playback,
        SoundSet::new(&config.short_sound, &config.long_sound),
    )
}

fn cmd_run(config_path: &Path, watch: Vec<PathBuf>, pin: Option<u32>) -> anyhow::Result<i32> {
    let mut config = load_config(config_path)?;
    if !watch.is_empty() {
        config.watch_dirs = watch;
    }
    if let Some(pin) = pin {
        config.gpio_pin = pin;
    }
    config.validate()?;

    println!("HDD Feedback Agent v{VERSION}");
    println!();
    println!("  GPIO pin: {}", config.gpio_pin);
    println!("  Short clip: {}", config.short_sound.display());
    println!("  Long clip: {}", config.long_sound.display());
    println!(
        "  Burst: {} changes within {}ms",
        config.activity.burst_threshold, config.activity.window_ms
    );

    let runtime = build_runtime()?;
    runtime.block_on(run_agent(config))
}

async fn run_agent(config: Config) -> anyhow::Result<i32> {
    let mut source = FileWatchSource::new(config.watch_dirs.clone());
    match source.start() {
        Ok(count) => println!("  Watching {count} director{}", if count == 1 { "y" } else { "ies" }),
        Err(WatchError::NoTargets) => {
            tracing::error!(
                configured = config.watch_dirs.len(),
                "no valid directories to watch, exiting"
            );
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    }

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let stats = Arc::new(ActivityStats::new());
    let coordinator =
        Arc::new(build_coordinator(&config, config.activity).with_stats(Arc::clone(&stats)));

    let stop = CancellationToken::new();
    ctrlc_handler(stop.clone())?;

    let mut dispatch = {
        let receiver = source.receiver().clone();
        let coordinator = Arc::clone(&coordinator);
        let stop = stop.clone();
        tokio::task::spawn_blocking(move || dispatch_events(&receiver, &coordinator, &stop))
    };

    let finished = tokio::select! {
        _ = stop.cancelled() => None,
        result = &mut dispatch => Some(result),
    };

    println!();
    println!("Stopping...");
    stop.cancel();
    source.stop();
    coordinator.shutdown().await;
    let result = match finished {
        Some(result) => result,
        None => dispatch.await,
    };
    if let Err(e) = result {
        tracing::warn!("dispatch loop ended abnormally: {e}");
    }

    println!();
    println!("{}", stats.summary());
    Ok(0)
}

fn cmd_test_cycle(config_path: &Path, sustained: bool) -> anyhow::Result<i32> {
    let config = load_config(config_path)?;
    config.validate()?;

    // A threshold of one makes the very first event a burst.
    let policy = if sustained {
        ActivityPolicy {
            burst_threshold: 1,
            ..config.activity
        }
    } else {
        ActivityPolicy {
            burst_threshold: usize::MAX,
            ..config.activity
        }
    };

    let runtime = build_runtime()?;
    runtime.block_on(async {
        let coordinator = build_coordinator(&config, policy);
        let report = coordinator.handle(ActivityEvent::now()).await;
        coordinator.shutdown().await;

        match report {
            Some(report) => {
                println!(
                    "{:?} cycle with {}: {:?}",
                    report.classification,
                    report.sound.display(),
                    report.outcome
                );
                anyhow::Ok(if report.outcome.is_some_and(|o| o.is_completed()) {
                    0
                } else {
                    1
                })
            }
            None => Ok(1),
        }
    })
}

fn cmd_config(config_path: &Path) -> anyhow::Result<i32> {
    let config = load_config(config_path)?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {config_path:?}");
    if !config_path.exists() {
        println!("(file not found, showing defaults)");
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(0)
}

fn cmd_init_config(config_path: &Path, force: bool) -> anyhow::Result<i32> {
    if config_path.exists() && !force {
        eprintln!(
            "Config file {config_path:?} already exists. Use --force to overwrite."
        );
        return Ok(1);
    }
    Config::default().save_to(config_path)?;
    println!("Wrote default configuration to {config_path:?}");
    Ok(0)
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(stop: CancellationToken) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        stop.cancel();
    })
    .context("could not install Ctrl+C handler")
}

// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::Notify;
use tracing::info;

use rdvwatch::browser::chromium::{find_chromium, ChromiumSession};
use rdvwatch::config::Config;
use rdvwatch::monitor::Monitor;
use rdvwatch::notify::{DesktopNotifier, NotificationSink, NullSink};

#[derive(Parser)]
#[command(
    name = "rdvwatch",
    about = "Watches a rdv-prefecture booking page and alerts when a slot opens",
    version,
    after_help = "Run 'rdvwatch <command> --help' for details on each command.\nRun 'rdvwatch' with no command to start watching."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start watching the booking page (the default)
    Run {
        /// Entry page of the booking flow (overrides RDV_URL)
        #[arg(long)]
        url: Option<String>,
        /// Fixed inter-check interval in seconds, disables jitter
        #[arg(long)]
        interval: Option<u64>,
        /// Skip sounds and desktop notifications, log only
        #[arg(long)]
        silent: bool,
    },
    /// Check environment and diagnose issues
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "rdvwatch=debug"
    } else if cli.quiet {
        "rdvwatch=warn"
    } else {
        "rdvwatch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.parse().unwrap()),
        )
        .init();

    match cli.command {
        None => run(None, None, false).await,
        Some(Commands::Run {
            url,
            interval,
            silent,
        }) => run(url, interval, silent).await,
        Some(Commands::Doctor) => doctor(),
    }
}

async fn run(url: Option<String>, interval: Option<u64>, silent: bool) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(url) = url {
        config.monitoring.url = url;
    }
    if let Some(interval) = interval {
        config.anti_detection.base_interval_secs = interval;
        config.anti_detection.random_delays_enabled = false;
    }

    let sink: Arc<dyn NotificationSink> = if silent {
        Arc::new(NullSink)
    } else {
        Arc::new(DesktopNotifier)
    };

    info!("launching Chromium (the window stays visible for CAPTCHA solving)");
    let session = ChromiumSession::launch(config.chrome.clone())
        .await
        .context("failed to launch browser session")?;

    // Cooperative shutdown: Ctrl+C flips the notify, the loop finishes or
    // abandons its current tick and tears the session down once.
    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal, stopping");
        shutdown_signal.notify_one();
    });

    Monitor::new(Box::new(session), config, sink, shutdown)
        .run()
        .await
}

fn doctor() -> Result<()> {
    let mut problems = 0;

    match find_chromium() {
        Some(path) => println!("  ok: Chromium found at {}", path.display()),
        None => {
            problems += 1;
            println!("  missing: Chromium not found");
            println!("           install Google Chrome or Chromium, or set RDVWATCH_CHROMIUM_PATH");
        }
    }

    let notifier = if cfg!(target_os = "macos") {
        "osascript"
    } else {
        "notify-send"
    };
    match which::which(notifier) {
        Ok(path) => println!("  ok: notifier '{notifier}' at {}", path.display()),
        Err(_) => {
            println!("  warn: '{notifier}' not found, desktop notifications will be skipped");
        }
    }

    let player = if cfg!(target_os = "macos") {
        "afplay"
    } else {
        "paplay"
    };
    match which::which(player) {
        Ok(path) => println!("  ok: sound player '{player}' at {}", path.display()),
        Err(_) => {
            println!("  warn: '{player}' not found, alert sounds will be skipped");
        }
    }

    if problems > 0 {
        anyhow::bail!("{problems} problem(s) found");
    }
    println!("  environment looks good");
    Ok(())
}

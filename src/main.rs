use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use autodroid::driver::android::AdbBridge;
use autodroid::driver::apk::ZipApkAnalyzer;
use autodroid::driver::frida::FridaCli;
use autodroid::driver::traits::DeviceBridge;
use autodroid::runner::Backends;
use autodroid::utils::config::Config;
use autodroid::{generate_report, run_script};

#[derive(Parser)]
#[command(name = "autodroid")]
#[command(version = "0.1.0")]
#[command(about = "Script-driven automation for Android devices and apps", long_about = None)]
struct Cli {
    /// Path to the JSON script
    script: PathBuf,

    /// Timeout in seconds for each shell, adb, frida or APK command (0 = none)
    #[arg(long, default_value = "0")]
    timeout: u64,

    /// Write the JSON run report to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Path to the adb binary
    #[arg(long)]
    adb: Option<PathBuf>,

    /// Path to the frida CLI
    #[arg(long)]
    frida: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = Config {
        command_timeout: Config::timeout_from_secs(cli.timeout),
        report_path: cli.report,
        adb_path: cli.adb,
        frida_path: cli.frida,
        ..Config::default()
    };

    let bridge = AdbBridge::new(config.adb_path.as_deref())
        .map_err(|e| anyhow::anyhow!("ADB not available: {:#}", e))?;
    if !bridge.is_available().await {
        anyhow::bail!("ADB not available: {} did not respond", bridge.adb_path().display());
    }

    let backends = Backends {
        bridge: Arc::new(bridge),
        instrumentation: Arc::new(FridaCli::new(config.frida_path.as_deref())),
        apk: Arc::new(ZipApkAnalyzer::new()),
    };

    // Set up Ctrl+C handler with atomic flag
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_handler = cancel.clone();
    ctrlc::set_handler(move || {
        println!("\n{} Stopping after the current command...", "⏹".yellow());
        cancel_handler.store(true, Ordering::SeqCst);
    })?;

    println!(
        "{} Running script: {}",
        "▶".green().bold(),
        cli.script.display()
    );
    if let Some(timeout) = config.command_timeout {
        println!("  Command timeout: {}s", timeout.as_secs().to_string().cyan());
    }

    let report = run_script(&cli.script, &config, backends, cancel).await?;

    if let Some(path) = config.report_path.as_deref() {
        generate_report(&report, Some(path)).await?;
    }

    if report.cancelled {
        println!("{} Run cancelled", "⚠".yellow());
    }

    Ok(())
}

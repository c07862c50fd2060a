//! kioskup - on-device self-update orchestrator for the dashboard kiosk.
//!
//! One shot: refresh the checkout, rebuild dependencies when needed, sweep
//! caches, reapply the display, reboot. Progress goes to stdout as plain
//! lines so the application overlay can tail it live; a fatal stage error
//! exits non-zero without rebooting.

use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use clap::Parser;
use kioskup_core::escalate::{PrivilegeEscalator, SudoEscalator};
use kioskup_core::deps::VenvInstaller;
use kioskup_core::process::PgrepManager;
use kioskup_core::vcs::{GitCli, VersionControl};
use kioskup_core::{identity, orchestrator, reboot, CancelToken, UpdateConfig};
use nix::sys::signal::{signal, SigHandler, Signal};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Update the kiosk application in place and reboot.
#[derive(Parser, Debug)]
#[command(name = "kioskup")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Branch to update to (default: the configured primary branch)
    branch: Option<String>,

    /// Path to the updater configuration file
    #[arg(short, long, default_value = "kioskup.toml")]
    config: PathBuf,

    /// Repository root (overrides the config file)
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Leave the application running during the update
    /// (also enabled by KIOSKUP_KEEP_APP=1)
    #[arg(long)]
    keep_app: bool,

    /// Update without rebooting afterwards
    #[arg(long)]
    skip_reboot: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

static CANCEL: OnceLock<CancelToken> = OnceLock::new();

extern "C" fn on_signal(_: nix::libc::c_int) {
    if let Some(token) = CANCEL.get() {
        token.cancel();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = load_config(&cli)?;

    let cancel = CANCEL.get_or_init(CancelToken::new).clone();
    // SAFETY: the handler only stores into an atomic through CancelToken,
    // which is async-signal-safe.
    unsafe {
        signal(Signal::SIGINT, SigHandler::Handler(on_signal))
            .context("installing SIGINT handler")?;
        signal(Signal::SIGTERM, SigHandler::Handler(on_signal))
            .context("installing SIGTERM handler")?;
    }

    let invoker_hint = std::env::var("SUDO_USER").ok();
    let identity = identity::resolve(invoker_hint.as_deref());

    let escalator = SudoEscalator;
    let escalation = escalator.available();
    let vcs = GitCli::new(&config.repository_root);
    let elevated =
        escalation.then(|| GitCli::as_user(&config.repository_root, identity.username.clone()));

    let mut installer =
        VenvInstaller::new(config.venv_dir(), config.repository_root.join(&config.manifest));
    if escalation {
        installer = installer.as_user(identity.username.clone());
    }

    let mechanisms = reboot::default_mechanisms();

    let pipeline = orchestrator::Pipeline {
        config: &config,
        vcs: &vcs,
        elevated_vcs: elevated.as_ref().map(|g| g as &dyn VersionControl),
        escalator: &escalator,
        process: &PgrepManager,
        installer: &installer,
        mechanisms: &mechanisms,
        cancel,
        identity,
    };

    println!(
        "kioskup: updating {} to {}/{}",
        config.repository_root.display(),
        config.remote,
        config.target_branch()
    );

    let summary = orchestrator::run(&pipeline)?;
    tracing::info!(
        new_revision = %summary.update.new_revision,
        deps_installed = summary.deps_installed,
        "update run finished"
    );
    Ok(())
}

fn load_config(cli: &Cli) -> Result<UpdateConfig> {
    let mut config = if cli.config.exists() {
        UpdateConfig::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        UpdateConfig::default()
    };

    if let Some(repo) = &cli.repo {
        config.repository_root = repo.clone();
    }
    config.branch = cli.branch.clone();
    config.keep_app_running = cli.keep_app
        || std::env::var("KIOSKUP_KEEP_APP").map(|v| v == "1").unwrap_or(false);
    config.skip_reboot = config.skip_reboot || cli.skip_reboot;

    Ok(config)
}

//! The update pipeline.
//!
//! Strictly linear and synchronous; each stage prints its own context line
//! so the overlay tailing stdout can tell which stage failed without a
//! stack trace. Any error short-circuits the run before the reboot stage:
//! a device must never reboot into a half-updated, unverified state.

use crate::cache::{self, CacheEntry, RetentionClass};
use crate::config::UpdateConfig;
use crate::deps::{self, DependencyInstaller};
use crate::display;
use crate::error::UpdateError;
use crate::escalate::PrivilegeEscalator;
use crate::executor::{self, UpdateReport};
use crate::identity::EffectiveIdentity;
use crate::process::ProcessManager;
use crate::reboot::{self, CancelToken, RebootMechanism, RebootOutcome};
use crate::repair;
use crate::vcs::VersionControl;

/// Everything the pipeline runs against. Real implementations in the CLI,
/// fakes in tests.
pub struct Pipeline<'a> {
    /// Resolved run configuration.
    pub config: &'a UpdateConfig,
    /// Repository operations as the current process.
    pub vcs: &'a dyn VersionControl,
    /// Repository operations as the effective identity, when escalation
    /// can provide them.
    pub elevated_vcs: Option<&'a dyn VersionControl>,
    /// Non-interactive privilege escalation.
    pub escalator: &'a dyn PrivilegeEscalator,
    /// Target application process control.
    pub process: &'a dyn ProcessManager,
    /// Dependency environment sync.
    pub installer: &'a dyn DependencyInstaller,
    /// Reboot cascade, in order.
    pub mechanisms: &'a [Box<dyn RebootMechanism>],
    /// Countdown cancellation.
    pub cancel: CancelToken,
    /// The identity repository writes run as, from
    /// [`crate::identity::resolve`]. Resolved by the caller because the
    /// elevated git instance needs the username at construction time.
    pub identity: EffectiveIdentity,
}

/// What a completed run did.
#[derive(Debug)]
pub struct RunSummary {
    /// The identity repository writes ran as.
    pub identity: EffectiveIdentity,
    /// Revisions and the path taken.
    pub update: UpdateReport,
    /// Whether the dependency environment was rebuilt.
    pub deps_installed: bool,
    /// Cache entries seen during reconciliation.
    pub cache_entries: Vec<CacheEntry>,
    /// How the reboot stage ended.
    pub reboot: RebootOutcome,
}

/// Run the whole pipeline.
///
/// # Errors
///
/// The first fatal stage error, unchanged; the reboot stage is never
/// reached after one.
pub fn run(pipeline: &Pipeline<'_>) -> Result<RunSummary, UpdateError> {
    let config = pipeline.config;
    let root = &config.repository_root;
    let branch = config.target_branch();

    println!("[1/8] resolving effective identity");
    let identity = pipeline.identity.clone();
    println!("  repository writes will run as {}", identity.username);

    println!("[2/8] checking repository writability");
    repair::ensure_writable(
        root,
        &identity,
        pipeline.escalator,
        pipeline.vcs,
        pipeline.elevated_vcs,
    )?;

    println!("[3/8] handling the running application");
    if config.keep_app_running {
        println!("  leaving {} running during the update", config.app_process_name);
    } else {
        let running = pipeline.process.find_by_name(&config.app_process_name);
        if running.is_empty() {
            println!("  {} is not running", config.app_process_name);
        } else {
            println!("  stopping {} ({} process(es))", config.app_process_name, running.len());
            pipeline.process.terminate(&config.app_process_name)?;
        }
    }

    println!("[4/8] updating working tree to {}/{branch}", config.remote);
    // Re-probe just before executing: repair succeeded above, but another
    // process may have re-broken permissions in between. An unwritable
    // probe here routes through the escalated fallback.
    let writable = repair::tree_writable(root);
    let update = executor::execute(
        pipeline.vcs,
        pipeline.elevated_vcs,
        pipeline.escalator,
        &identity,
        root,
        &config.remote,
        branch,
        writable,
    )?;
    println!(
        "  now at {} (was {})",
        update.new_revision, update.previous_revision
    );

    println!("[5/8] checking dependency manifest");
    let deps_installed = if deps::manifest_changed(pipeline.vcs, &update, &config.manifest)? {
        println!("  {} changed, syncing environment", config.manifest);
        pipeline.installer.sync()?;
        true
    } else {
        println!("  {} unchanged, skipping install", config.manifest);
        false
    };

    println!("[6/8] reconciling cache");
    let cache_entries = cache::reconcile(&config.cache_dir())?;
    let removed = cache_entries
        .iter()
        .filter(|e| e.retention == RetentionClass::Ephemeral)
        .count();
    println!("  removed {removed} ephemeral entries, kept {} durable", cache_entries.len() - removed);

    println!("[7/8] reapplying display configuration");
    display::reapply();

    println!("[8/8] rebooting");
    let reboot = if config.skip_reboot {
        println!("  skip-reboot set; update complete, reboot manually to apply");
        RebootOutcome::Skipped
    } else {
        reboot::sequence(pipeline.mechanisms, config.reboot_delay, &pipeline.cancel)
    };

    Ok(RunSummary {
        identity,
        update,
        deps_installed,
        cache_entries,
        reboot,
    })
}

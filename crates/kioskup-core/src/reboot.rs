//! The reboot sequencer.
//!
//! Commits the update by restarting the device through the first of
//! several redundant mechanisms that succeeds, after a cancellable
//! countdown. A mechanism that works never returns, so the cascade only
//! distinguishes mechanisms that are absent or reject the request
//! outright; it cannot tell "accepted, reboot pending" from "failed
//! silently".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use xshell::Shell;

use crate::error::UpdateError;

/// Cooperative cancellation for the pre-reboot countdown.
///
/// The CLI wires this to SIGINT/SIGTERM; the sequencer polls it between
/// countdown ticks. Once the cascade starts, cancellation has no effect.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Async-signal-safe.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One way of rebooting the device.
pub trait RebootMechanism {
    /// Human-readable name for the progress log.
    fn name(&self) -> &str;

    /// Issue the reboot. An `Ok` return means the command was accepted;
    /// the process is normally killed by the reboot before returning.
    fn attempt(&self) -> Result<(), UpdateError>;
}

/// A reboot mechanism that runs a fixed command line.
pub struct CommandMechanism {
    name: String,
    argv: Vec<String>,
}

impl CommandMechanism {
    /// A mechanism running `argv`.
    pub fn new(name: impl Into<String>, argv: &[&str]) -> Self {
        Self {
            name: name.into(),
            argv: argv.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RebootMechanism for CommandMechanism {
    fn name(&self) -> &str {
        &self.name
    }

    fn attempt(&self) -> Result<(), UpdateError> {
        let action = format!("reboot via {}", self.name);
        let sh = Shell::new().map_err(|e| UpdateError::command(&action, e))?;
        sh.cmd(&self.argv[0])
            .args(&self.argv[1..])
            .run()
            .map_err(|e| UpdateError::command(&action, e))
    }
}

/// The standard cascade, most reliable first: non-interactive escalation,
/// service manager, generic shutdown, direct binary.
pub fn default_mechanisms() -> Vec<Box<dyn RebootMechanism>> {
    vec![
        Box::new(CommandMechanism::new("sudo reboot", &["sudo", "-n", "reboot"])),
        Box::new(CommandMechanism::new("systemctl", &["systemctl", "reboot"])),
        Box::new(CommandMechanism::new("shutdown", &["shutdown", "-r", "now"])),
        Box::new(CommandMechanism::new("/sbin/reboot", &["/sbin/reboot"])),
    ]
}

/// How the sequencer ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebootOutcome {
    /// Operator cancelled during the countdown. The device is updated and
    /// safe to reboot manually.
    Cancelled,
    /// The run was configured to skip the reboot stage.
    Skipped,
    /// A mechanism accepted the request.
    Issued {
        /// Name of the mechanism that accepted.
        mechanism: String,
    },
    /// Every mechanism was absent or rejected the request.
    Exhausted,
}

/// Count down, then walk the cascade.
pub fn sequence(
    mechanisms: &[Box<dyn RebootMechanism>],
    delay: Duration,
    cancel: &CancelToken,
) -> RebootOutcome {
    if !countdown(delay, cancel) {
        println!("  reboot cancelled; the device is updated and safe to reboot manually");
        return RebootOutcome::Cancelled;
    }

    for mechanism in mechanisms {
        println!("  attempting reboot via {}", mechanism.name());
        match mechanism.attempt() {
            // If the reboot actually happens we never get here.
            Ok(()) => {
                return RebootOutcome::Issued {
                    mechanism: mechanism.name().to_string(),
                };
            },
            Err(err) => {
                println!("  {} unavailable ({err}), trying next", mechanism.name());
                tracing::warn!(mechanism = mechanism.name(), error = %err, "reboot attempt failed");
            },
        }
    }

    println!("  all reboot mechanisms failed; reboot the device manually");
    RebootOutcome::Exhausted
}

// Returns false when cancelled.
fn countdown(delay: Duration, cancel: &CancelToken) -> bool {
    let mut remaining = delay;
    while !remaining.is_zero() {
        if cancel.is_cancelled() {
            return false;
        }
        println!("  rebooting in {}s (Ctrl-C cancels)", remaining.as_secs().max(1));
        let tick = remaining.min(Duration::from_secs(1));
        std::thread::sleep(tick);
        remaining = remaining.saturating_sub(tick);
    }
    !cancel.is_cancelled()
}

//! Target application process handling.
//!
//! Before updating, the running dashboard instance is found by
//! command-line match and terminated, unless the caller asked to keep it
//! alive so its overlay can tail our progress output.

use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use xshell::{cmd, Shell};

use crate::error::UpdateError;

/// How long to wait for the application to exit after termination.
const EXIT_WAIT: Duration = Duration::from_secs(5);

/// Finds and stops the target application.
pub trait ProcessManager {
    /// PIDs whose command line matches `pattern`.
    fn find_by_name(&self, pattern: &str) -> Vec<u32>;

    /// Ask every match to terminate.
    fn terminate(&self, pattern: &str) -> Result<(), UpdateError>;
}

/// pgrep/pkill implementation.
pub struct PgrepManager;

impl ProcessManager for PgrepManager {
    fn find_by_name(&self, pattern: &str) -> Vec<u32> {
        let Ok(sh) = Shell::new() else {
            return Vec::new();
        };
        let own_pid = std::process::id();
        cmd!(sh, "pgrep -f {pattern}")
            .ignore_status()
            .read()
            .map(|out| {
                out.lines()
                    .filter_map(|line| line.trim().parse::<u32>().ok())
                    .filter(|pid| *pid != own_pid)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn terminate(&self, pattern: &str) -> Result<(), UpdateError> {
        // Signal the PIDs we found rather than re-matching with pkill:
        // when the pattern is a path component the updater was invoked
        // with, a fresh full-command-line match would include our own
        // process and kill the update mid-run.
        for pid in self.find_by_name(pattern) {
            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                // Already gone between the match and the signal.
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => return Err(UpdateError::command("terminating application", e)),
            }
        }

        let start = Instant::now();
        while start.elapsed() < EXIT_WAIT {
            if self.find_by_name(pattern).is_empty() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(250));
        }
        tracing::warn!(pattern, "application still running after terminate");
        Ok(())
    }
}

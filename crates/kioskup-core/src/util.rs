//! Small shared helpers.

/// Run a step that is allowed to fail.
///
/// Best-effort steps (display reapplication, Wi-Fi tuning) must never block
/// the reboot. The failure is printed for the tailing overlay and logged,
/// then discarded.
pub fn best_effort<F>(label: &str, f: F)
where
    F: FnOnce() -> Result<(), Box<dyn std::error::Error>>,
{
    if let Err(err) = f() {
        println!("  warning: {label}: {err} (continuing)");
        tracing::warn!(step = label, error = %err, "best-effort step failed");
    }
}

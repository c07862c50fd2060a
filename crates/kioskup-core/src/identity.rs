//! Effective identity resolution.
//!
//! The updater is normally launched as root (scheduled task, or sudo from
//! the in-app updater) while the checkout belongs to the desktop user. All
//! repository writes must happen as that user, so we resolve it once up
//! front and carry it through the run.

use std::path::PathBuf;

use nix::unistd::{Uid, User};
use xshell::{cmd, Shell};

/// The non-privileged account that owns the checkout.
///
/// Resolved once per run, immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveIdentity {
    /// Account name.
    pub username: String,
    /// Home directory. Best effort; falls back to the process's own home.
    pub home: PathBuf,
    /// Numeric user id.
    pub uid: u32,
    /// Numeric primary group id.
    pub gid: u32,
}

impl EffectiveIdentity {
    /// `user:group` form for `chown`.
    pub fn chown_spec(&self) -> String {
        format!("{}:{}", self.uid, self.gid)
    }
}

/// Resolve the identity repository writes should run as.
///
/// Preference order:
/// 1. the `invoker_hint` (`SUDO_USER` from the caller), unless it still
///    resolves to root, which happens when sudo was run from a root shell;
/// 2. the session login name (`logname`);
/// 3. the current process identity.
///
/// Never fails: when no home directory can be resolved the process's own
/// `HOME` is used, and downstream stages tolerate the best-effort result.
pub fn resolve(invoker_hint: Option<&str>) -> EffectiveIdentity {
    if let Some(name) = invoker_hint {
        if let Some(identity) = lookup_user(name) {
            if identity.uid != 0 {
                return identity;
            }
            tracing::debug!(user = name, "invoker hint resolves to root, ignoring");
        }
    }

    if let Some(name) = session_login_name() {
        if let Some(identity) = lookup_user(&name) {
            if identity.uid != 0 {
                return identity;
            }
        }
    }

    current_process_identity()
}

fn lookup_user(name: &str) -> Option<EffectiveIdentity> {
    let user = User::from_name(name).ok().flatten()?;
    Some(identity_from(user))
}

fn session_login_name() -> Option<String> {
    let sh = Shell::new().ok()?;
    let name = cmd!(sh, "logname").ignore_status().read().ok()?;
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn current_process_identity() -> EffectiveIdentity {
    let uid = Uid::effective();
    match User::from_uid(uid).ok().flatten() {
        Some(user) => identity_from(user),
        None => EffectiveIdentity {
            username: uid.to_string(),
            home: process_home(),
            uid: uid.as_raw(),
            gid: nix::unistd::Gid::effective().as_raw(),
        },
    }
}

fn identity_from(user: User) -> EffectiveIdentity {
    let home = if user.dir.as_os_str().is_empty() || !user.dir.exists() {
        process_home()
    } else {
        user.dir.clone()
    };
    EffectiveIdentity {
        username: user.name,
        home,
        uid: user.uid.as_raw(),
        gid: user.gid.as_raw(),
    }
}

fn process_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/root"))
}

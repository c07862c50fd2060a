//! Best-effort display reapplication.
//!
//! Some updates change how the UI is presented before the next full boot,
//! so on the target hardware we re-detect the active output and reapply
//! the rotation persisted in the boot configuration. None of this may
//! block the reboot: the reboot re-applies boot-time display settings
//! anyway, so every failure here is logged and swallowed.

use std::path::Path;

use xshell::{cmd, Shell};

use crate::util::best_effort;

/// Screen orientation, as persisted in the kernel command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// No rotation.
    Normal,
    /// 90 degrees clockwise.
    Right,
    /// Upside down.
    Inverted,
    /// 90 degrees counter-clockwise.
    Left,
}

impl Orientation {
    /// From a `rotate=` degree value.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees {
            0 => Some(Self::Normal),
            90 => Some(Self::Right),
            180 => Some(Self::Inverted),
            270 => Some(Self::Left),
            _ => None,
        }
    }

    /// The matching `xrandr --rotate` argument.
    pub fn xrandr_arg(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Right => "right",
            Self::Inverted => "inverted",
            Self::Left => "left",
        }
    }
}

/// A persisted display configuration: which connector, which way up.
///
/// Read from boot configuration, never created or destroyed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayProfile {
    /// Connector name from the boot configuration (e.g. `DSI-1`).
    pub connector_name: String,
    /// Persisted rotation.
    pub orientation: Orientation,
}

/// Parse a `video=<connector>:...,rotate=<deg>` clause from the kernel
/// command line.
pub fn parse_cmdline_profile(cmdline: &str) -> Option<DisplayProfile> {
    for token in cmdline.split_whitespace() {
        let Some(spec) = token.strip_prefix("video=") else {
            continue;
        };
        let (connector, rest) = spec.split_once(':')?;
        let rotate = rest
            .split(',')
            .find_map(|opt| opt.strip_prefix("rotate="))?;
        let degrees: u32 = rotate.parse().ok()?;
        return Some(DisplayProfile {
            connector_name: connector.to_string(),
            orientation: Orientation::from_degrees(degrees)?,
        });
    }
    None
}

/// First connected output in `xrandr --query` output.
pub fn active_connector(xrandr_query: &str) -> Option<String> {
    xrandr_query.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        let name = words.next()?;
        match words.next() {
            Some("connected") => Some(name.to_string()),
            _ => None,
        }
    })
}

/// Whether this host is the target embedded hardware.
pub fn is_raspberry_pi() -> bool {
    std::fs::read_to_string("/proc/device-tree/model")
        .map(|model| model.contains("Raspberry Pi"))
        .unwrap_or(false)
}

/// Re-assert the persisted rotation on the active output, and tune Wi-Fi
/// power save off. Both are best-effort and never abort the run.
pub fn reapply() {
    if !is_raspberry_pi() {
        println!("  not running on target hardware, skipping display reapply");
        return;
    }

    best_effort("reapplying display rotation", || {
        let cmdline = read_boot_cmdline()?;
        let profile =
            parse_cmdline_profile(&cmdline).ok_or("no rotation in boot configuration")?;

        let sh = Shell::new()?;
        let query = cmd!(sh, "xrandr --query").read()?;
        let output = active_connector(&query).unwrap_or(profile.connector_name);
        let rotate = profile.orientation.xrandr_arg();

        cmd!(sh, "xrandr --output {output} --rotate {rotate}").run()?;
        println!("  rotation {rotate} reapplied on {output}");
        Ok(())
    });

    best_effort("disabling Wi-Fi power save", || {
        let sh = Shell::new()?;
        cmd!(sh, "iw dev wlan0 set power_save off").run()?;
        Ok(())
    });
}

fn read_boot_cmdline() -> Result<String, Box<dyn std::error::Error>> {
    for candidate in ["/boot/firmware/cmdline.txt", "/boot/cmdline.txt"] {
        if Path::new(candidate).exists() {
            return Ok(std::fs::read_to_string(candidate)?);
        }
    }
    Err("no boot command line found".into())
}

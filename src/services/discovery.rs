//! Locating the PitStop Server command-line executable.
//!
//! PitStop Server is installed by a vendor installer, so there is no fixed
//! path to rely on:
//! - Windows: the install folder is read from the registry with `reg query`
//!   and `PitStopServerCLI.exe` is expected inside it
//! - macOS: `/Applications` is scanned for an `Enfocus PitStop Server*`
//!   folder and the `PitStop Server CLI` symlink inside it is resolved
//!
//! The discovered path is cached process-wide. The cache is filled on the
//! first successful [`resolve_executable`] call and stays until
//! [`reset_executable_cache`] is called (intended for tests).
//!
//! # Examples
//!
//! ```ignore
//! use pitstop_runner::services::discovery::{resolve_executable, PlatformLocator};
//!
//! let cli = resolve_executable(&PlatformLocator)?;
//! println!("Using {}", cli);
//! ```

use crate::error::{PreflightError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;
use std::sync::Mutex;

/// Registry key written by the PitStop Server installer
pub const REGISTRY_KEY: &str = r"HKLM\SOFTWARE\Enfocus\PitStop Server";

/// Executable name inside the Windows install folder
pub const WINDOWS_EXECUTABLE: &str = "PitStopServerCLI.exe";

/// Folder scanned for application bundles on macOS
pub const MACOS_APPLICATIONS_DIR: &str = "/Applications";

/// Bundle folder name prefix on macOS
pub const MACOS_BUNDLE_PREFIX: &str = "Enfocus PitStop Server";

/// Symlink to the CLI binary inside the macOS bundle folder
pub const MACOS_CLI_LINK: &str = "PitStop Server CLI";

static RESOLVED_EXECUTABLE: Mutex<Option<Utf8PathBuf>> = Mutex::new(None);

/// Source of the PitStop Server executable path
#[cfg_attr(test, mockall::automock)]
pub trait ExecutableLocator: Send + Sync {
    /// Path to the CLI executable, or `None` if it cannot be found
    fn locate(&self) -> Option<Utf8PathBuf>;
}

/// Discovery using the registry (Windows) or the Applications folder (macOS)
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformLocator;

impl ExecutableLocator for PlatformLocator {
    fn locate(&self) -> Option<Utf8PathBuf> {
        if cfg!(target_os = "windows") {
            locate_from_registry()
        } else if cfg!(target_os = "macos") {
            find_cli_in_applications(Utf8Path::new(MACOS_APPLICATIONS_DIR))
        } else {
            tracing::debug!("No PitStop Server discovery available on this platform");
            None
        }
    }
}

/// Resolve the executable, using the process-wide cache when it is filled.
///
/// # Errors
///
/// Returns [`PreflightError::NotFound`] if `locator` finds nothing.
pub fn resolve_executable(locator: &dyn ExecutableLocator) -> Result<Utf8PathBuf> {
    let mut cached = RESOLVED_EXECUTABLE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(path) = cached.as_ref() {
        return Ok(path.clone());
    }

    let path = locator.locate().ok_or_else(|| {
        PreflightError::NotFound(
            "PitStop Server CLI executable could not be discovered; set applicationPath"
                .to_string(),
        )
    })?;

    tracing::info!("Discovered PitStop Server CLI at {}", path);
    *cached = Some(path.clone());
    Ok(path)
}

/// Forget the cached executable path
pub fn reset_executable_cache() {
    let mut cached = RESOLVED_EXECUTABLE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *cached = None;
}

fn locate_from_registry() -> Option<Utf8PathBuf> {
    let output = std::process::Command::new("reg")
        .args(["query", REGISTRY_KEY, "/s", "/v", "InstallPath"])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let install_dir = parse_registry_install_path(&stdout)?;
            let exe = install_dir.join(WINDOWS_EXECUTABLE);
            exe.is_file().then_some(exe)
        }
        Ok(output) => {
            tracing::debug!(
                "Registry query for {} failed with {:?}",
                REGISTRY_KEY,
                output.status.code()
            );
            None
        }
        Err(e) => {
            tracing::warn!("Could not run reg query: {}", e);
            None
        }
    }
}

/// Extract the `InstallPath` value from `reg query` output.
///
/// With several versions installed the last listed subkey wins. The relevant
/// line looks like
/// `    InstallPath    REG_SZ    C:\Program Files\Enfocus\Enfocus PitStop Server 24`.
pub fn parse_registry_install_path(output: &str) -> Option<Utf8PathBuf> {
    let pattern = Regex::new(r"(?m)^\s*InstallPath\s+REG_(?:EXPAND_)?SZ\s+(.+?)\s*$").ok()?;
    pattern
        .captures_iter(output)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(['\\', '/']))
        .filter(|path| !path.is_empty())
        .last()
        .map(Utf8PathBuf::from)
}

/// Find the CLI inside the newest `Enfocus PitStop Server*` folder of `applications_dir`.
///
/// Folders are compared by name, so `... Server 24` wins over `... Server 23`.
pub fn find_cli_in_applications(applications_dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let entries = match applications_dir.read_dir_utf8() {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Cannot read {}: {}", applications_dir, e);
            return None;
        }
    };

    let mut bundles: Vec<Utf8PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().starts_with(MACOS_BUNDLE_PREFIX))
        .map(|entry| entry.into_path())
        .filter(|path| path.is_dir())
        .collect();
    bundles.sort();

    for bundle in bundles.iter().rev() {
        let link = bundle.join(MACOS_CLI_LINK);
        match fs::canonicalize(&link) {
            Ok(target) => match Utf8PathBuf::from_path_buf(target) {
                Ok(target) if target.is_file() => return Some(target),
                Ok(target) => tracing::debug!("{} points at non-file {}", link, target),
                Err(target) => tracing::warn!("Non UTF-8 CLI path {}", target.display()),
            },
            Err(e) => tracing::debug!("No CLI link at {}: {}", link, e),
        }
    }

    None
}

//! Path and platform adapter.
//!
//! Paths cross the capability surface as UTF-8 strings on every host. This
//! module is the only place that converts between those strings and the
//! platform's native path representation, and it carries the process-wide
//! constants the orchestrator receives at startup.

use std::io;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Platform family identifier handed to the orchestrator.
pub const PLATFORM: &str = if cfg!(windows) { "windows" } else { "posix" };

/// Preferred path separator on this host.
pub const PATHSEP: char = std::path::MAIN_SEPARATOR;

/// Longest path, in bytes, an extracted archive member may be rewritten to.
pub const MAX_PATH: usize = if cfg!(windows) { 260 } else { 4096 };

/// Version string, overridable at build time through `LPM_VERSION`.
pub const VERSION: &str = match option_env!("LPM_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

/// Build architecture tuple such as `x86_64-linux` or `aarch64-darwin`.
///
/// `LPM_ARCH_TUPLE` set at build time takes precedence.
pub fn arch_tuple() -> String {
    if let Some(tuple) = option_env!("LPM_ARCH_TUPLE") {
        return tuple.to_string();
    }
    let os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    format!("{}-{}", std::env::consts::ARCH, os)
}

/// Convert a native path back to UTF-8 for the capability surface.
pub fn to_utf8(op: &'static str, path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidEncoding {
            op,
            path: path.to_string_lossy().into_owned(),
        })
}

/// Resolve `path` to an absolute, symlink-free form.
pub fn absolute(path: &Path) -> io::Result<PathBuf> {
    let resolved = std::fs::canonicalize(path)?;
    Ok(strip_verbatim(resolved))
}

// canonicalize yields `\\?\C:\...` on Windows; callers expect the plain form.
#[cfg(windows)]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) if s.starts_with(r"\\?\UNC\") => PathBuf::from(format!(r"\\{}", &s[8..])),
        Some(s) if s.starts_with(r"\\?\") => PathBuf::from(&s[4..]),
        _ => path,
    }
}

#[cfg(not(windows))]
fn strip_verbatim(path: PathBuf) -> PathBuf {
    path
}

/// Join `base` and `relative` with a forward slash, cutting the result down
/// to fewer than `limit` bytes without splitting a character.
pub fn join_within_limit(base: &str, relative: &str, limit: usize) -> String {
    let mut joined = format!("{}/{}", base, relative);
    let max = limit.saturating_sub(1);
    if joined.len() > max {
        let mut end = max;
        while !joined.is_char_boundary(end) {
            end -= 1;
        }
        joined.truncate(end);
    }
    joined
}

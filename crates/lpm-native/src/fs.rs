//! Filesystem component: listing, stat, directory creation and removal,
//! symlinks and permission changes.

use std::fs::{self, Metadata};
use std::io;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use crate::platform;
use crate::{Error, Result};

/// What a stat call found at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Unknown,
}

impl FileKind {
    fn from_metadata(metadata: &Metadata) -> Self {
        let file_type = metadata.file_type();
        if file_type.is_file() {
            FileKind::File
        } else if file_type.is_dir() {
            FileKind::Directory
        } else {
            FileKind::Unknown
        }
    }

    /// Short name used in registry tables; unknown kinds have none.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            FileKind::File => Some("file"),
            FileKind::Directory => Some("dir"),
            FileKind::Unknown => None,
        }
    }
}

/// Snapshot of a path's metadata at the time of the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// The path exactly as the caller passed it.
    pub path: String,
    pub absolute_path: String,
    pub kind: FileKind,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Raw link text when `path` itself is a symbolic link.
    pub symlink_target: Option<String>,
}

impl FileEntry {
    fn apply(&mut self, metadata: &Metadata) {
        self.kind = FileKind::from_metadata(metadata);
        self.size = metadata.len();
        self.modified = DateTime::from(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH));
    }
}

/// Result of [`stat`]: a missing or unreadable path is an expected outcome,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatOutcome {
    Found(FileEntry),
    Missing { message: String },
}

impl StatOutcome {
    pub fn entry(&self) -> Option<&FileEntry> {
        match self {
            StatOutcome::Found(entry) => Some(entry),
            StatOutcome::Missing { .. } => None,
        }
    }

    fn missing(error: io::Error) -> Self {
        StatOutcome::Missing {
            message: error.to_string(),
        }
    }
}

/// Names of the entries in `path`, in the order the OS returns them.
pub fn list(path: &str) -> Result<Vec<String>> {
    log::debug!("Listing {}", path);
    let entries = fs::read_dir(path).map_err(|source| Error::fs("ls", path, source))?;

    // `read_dir` never yields `.` or `..`.
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::fs("ls", path, source))?;
        let name = entry.file_name();
        let name = name.into_string().map_err(|_| Error::InvalidEncoding {
            op: "ls",
            path: path.to_string(),
        })?;
        log::trace!("  {}", name);
        names.push(name);
    }
    Ok(names)
}

/// Stat `path` without following a final symlink.
///
/// On POSIX a symlink additionally reports its link text, and its kind, size
/// and modification time are taken from the link's target when the target
/// can be reached. When it cannot, the link's own values are kept.
pub fn stat(path: &str) -> StatOutcome {
    let native = Path::new(path);
    let metadata = match fs::symlink_metadata(native) {
        Ok(metadata) => metadata,
        Err(error) => return StatOutcome::missing(error),
    };
    let absolute = match platform::absolute(native) {
        Ok(absolute) => absolute,
        Err(error) => return StatOutcome::missing(error),
    };

    let mut entry = FileEntry {
        path: path.to_string(),
        absolute_path: absolute.to_string_lossy().into_owned(),
        kind: FileKind::Unknown,
        size: 0,
        modified: DateTime::<Utc>::from(SystemTime::UNIX_EPOCH),
        symlink_target: None,
    };
    entry.apply(&metadata);

    #[cfg(unix)]
    if metadata.file_type().is_symlink() {
        match fs::read_link(native) {
            Ok(target) => entry.symlink_target = Some(target.to_string_lossy().into_owned()),
            Err(error) => return StatOutcome::missing(error),
        }
        match fs::metadata(native) {
            Ok(followed) => entry.apply(&followed),
            Err(error) => log::debug!("Can't follow symlink {}: {}", path, error),
        }
    }

    StatOutcome::Found(entry)
}

/// Create a single directory with mode `0755`; parents must already exist.
pub fn make_directory(path: &str) -> Result<()> {
    log::debug!("Creating directory {}", path);
    let mut builder = fs::DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder
        .create(path)
        .map_err(|source| Error::fs("mkdir", path, source))
}

/// Remove an empty directory.
pub fn remove_directory(path: &str) -> Result<()> {
    log::debug!("Removing directory {}", path);
    fs::remove_dir(path).map_err(|source| Error::fs("rmdir", path, source))
}

/// Create a symbolic link at `link_path` pointing to `target`.
pub fn symlink(target: &str, link_path: &str) -> Result<()> {
    log::debug!("Linking {} -> {}", link_path, target);
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link_path)
            .map_err(|source| Error::fs("create symlink", link_path, source))
    }

    #[cfg(not(unix))]
    {
        let _ = target;
        Err(Error::SymlinkUnsupported {
            path: link_path.to_string(),
        })
    }
}

/// Apply a raw permission bit-mask to `path`.
///
/// Windows only honours the owner-write bit, as read-only or not.
pub fn chmod(path: &str, mode: u32) -> Result<()> {
    log::debug!("Changing mode of {} to {:o}", path, mode);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|source| Error::fs("chmod", path, source))
    }

    #[cfg(not(unix))]
    {
        let mut permissions = fs::metadata(path)
            .map_err(|source| Error::fs("chmod", path, source))?
            .permissions();
        permissions.set_readonly(mode & 0o200 == 0);
        fs::set_permissions(path, permissions).map_err(|source| Error::fs("chmod", path, source))
    }
}

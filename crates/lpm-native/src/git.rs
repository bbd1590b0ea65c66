//! Git repository synchronization: init with a remote, fetch, reset.
//!
//! Every operation opens the repository itself and drops it before
//! returning; no repository handle survives a call.

use git2::{FetchOptions, Oid, Repository, ResetType};

use crate::{Error, Result};

/// The single remote every managed repository tracks.
pub const REMOTE_NAME: &str = "origin";

/// How far `reset` goes beyond moving the branch pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// Move the branch pointer only.
    #[default]
    Soft,
    /// Also reset the index.
    Mixed,
    /// Also reset the working tree.
    Hard,
}

impl ResetMode {
    /// Unrecognized names fall back to [`ResetMode::Soft`].
    pub fn parse(mode: &str) -> Self {
        match mode {
            "mixed" => ResetMode::Mixed,
            "hard" => ResetMode::Hard,
            _ => ResetMode::Soft,
        }
    }
}

impl From<ResetMode> for ResetType {
    fn from(mode: ResetMode) -> Self {
        match mode {
            ResetMode::Soft => ResetType::Soft,
            ResetMode::Mixed => ResetType::Mixed,
            ResetMode::Hard => ResetType::Hard,
        }
    }
}

/// Create a repository at `path` whose `origin` remote points at `remote_url`.
pub fn init(path: &str, remote_url: &str) -> Result<()> {
    log::debug!("Initializing repository {} (origin {})", path, remote_url);
    let repository = Repository::init(path).map_err(|e| Error::git("init", e))?;
    repository
        .remote(REMOTE_NAME, remote_url)
        .map_err(|e| Error::git("remote add", e))?;
    Ok(())
}

/// Fetch `origin`'s default refspecs into the repository at `path`.
pub fn fetch(path: &str) -> Result<()> {
    log::debug!("Fetching {} in {}", REMOTE_NAME, path);
    let repository = open(path)?;
    let mut remote = repository
        .find_remote(REMOTE_NAME)
        .map_err(|e| Error::git("remote fetch", e))?;

    let mut options = FetchOptions::new();
    remote
        .fetch(&[] as &[&str], Some(&mut options), None)
        .map_err(|e| Error::git("remote fetch", e))?;

    let stats = remote.stats();
    log::debug!(
        "Received {}/{} objects ({} bytes)",
        stats.received_objects(),
        stats.total_objects(),
        stats.received_bytes()
    );
    Ok(())
}

/// Reset the repository at `path` to `revision`.
///
/// See [`resolve_revision`] for how the revision string is interpreted.
pub fn reset(path: &str, revision: &str, mode: ResetMode) -> Result<()> {
    log::debug!("Resetting {} to {} ({:?})", path, revision, mode);
    let repository = open(path)?;
    let commit = resolve_revision(&repository, revision)
        .and_then(|id| repository.find_commit(id))
        .map_err(|e| Error::git("retrieve commit", e))?;
    repository
        .reset(commit.as_object(), mode.into(), None)
        .map_err(|e| Error::git("reset", e))
}

/// Exactly 40 hex digits is a literal object id, even if a reference of the
/// same name exists. Anything else is looked up as a reference name such as
/// `HEAD`, `refs/tags/v1.0` or `refs/remotes/origin/master`.
pub fn resolve_revision(
    repository: &Repository,
    revision: &str,
) -> std::result::Result<Oid, git2::Error> {
    if is_object_id(revision) {
        Oid::from_str(revision)
    } else {
        repository.refname_to_id(revision)
    }
}

pub fn is_object_id(revision: &str) -> bool {
    revision.len() == 40 && revision.bytes().all(|b| b.is_ascii_hexdigit())
}

fn open(path: &str) -> Result<Repository> {
    Repository::open(path).map_err(|e| Error::git("open", e))
}

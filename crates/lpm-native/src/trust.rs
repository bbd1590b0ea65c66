//! Trust store shared by the Git and HTTP transports.
//!
//! Designating a certificate directory or bundle file makes both network
//! stacks validate TLS against the same roots: libgit2 receives the location
//! directly, the HTTP transfer handle loads the PEM certificates it finds.

use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Certificate;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStoreKind {
    /// A directory of PEM files.
    Dir,
    /// A single PEM bundle.
    File,
}

impl TrustStoreKind {
    /// `"dir"` selects a directory; anything else a bundle file.
    pub fn parse(kind: &str) -> Self {
        if kind == "dir" {
            TrustStoreKind::Dir
        } else {
            TrustStoreKind::File
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustStore {
    pub kind: TrustStoreKind,
    pub path: PathBuf,
}

impl TrustStore {
    pub fn new(kind: TrustStoreKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self::new(TrustStoreKind::Dir, path)
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(TrustStoreKind::File, path)
    }

    /// Point libgit2's TLS verification at this store.
    pub fn apply_to_git(&self) -> Result<()> {
        log::debug!("Git trust store: {:?} {}", self.kind, self.path.display());
        // SAFETY: libgit2 keeps the location in process-global state. Capability
        // calls are serialized by the caller, so no transport reads it meanwhile.
        let applied = unsafe {
            match self.kind {
                TrustStoreKind::File => git2::opts::set_ssl_cert_file(self.path.as_path()),
                TrustStoreKind::Dir => git2::opts::set_ssl_cert_dir(self.path.as_path()),
            }
        };
        applied.map_err(|e| Error::git("certificate location", e))
    }

    /// Load every certificate the store holds.
    pub fn certificates(&self) -> Result<Vec<Certificate>> {
        match self.kind {
            TrustStoreKind::File => {
                let pem = fs::read(&self.path).map_err(|e| self.error(e))?;
                Certificate::from_pem_bundle(&pem).map_err(|e| self.error(e))
            }
            TrustStoreKind::Dir => {
                let mut certificates = Vec::new();
                for entry in fs::read_dir(&self.path).map_err(|e| self.error(e))? {
                    let path = entry.map_err(|e| self.error(e))?.path();
                    if !path.is_file() {
                        continue;
                    }
                    match load_bundle(&path) {
                        Ok(found) => certificates.extend(found),
                        Err(message) => {
                            log::warn!("Skipping certificate file {}: {}", path.display(), message)
                        }
                    }
                }
                Ok(certificates)
            }
        }
    }

    fn error(&self, message: impl ToString) -> Error {
        Error::TrustStore {
            path: self.path.display().to_string(),
            message: message.to_string(),
        }
    }
}

fn load_bundle(path: &Path) -> std::result::Result<Vec<Certificate>, String> {
    let pem = fs::read(path).map_err(|e| e.to_string())?;
    Certificate::from_pem_bundle(&pem).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_kind_parse() {
        assert_eq!(TrustStoreKind::parse("dir"), TrustStoreKind::Dir);
        assert_eq!(TrustStoreKind::parse("file"), TrustStoreKind::File);
        assert_eq!(TrustStoreKind::parse("bundle"), TrustStoreKind::File);
    }

    #[test]
    fn test_bundle_without_certificates_is_empty() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("empty.pem");
        std::fs::write(&bundle, "# no certificates in this bundle\n").unwrap();

        let store = TrustStore::file(&bundle);
        assert!(store.certificates().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_bundle_file() {
        let dir = TempDir::new().unwrap();
        let bundle = dir.path().join("broken.pem");
        std::fs::write(
            &bundle,
            "-----BEGIN CERTIFICATE-----\nnot base64 at all!\n-----END CERTIFICATE-----\n",
        )
        .unwrap();

        let error = TrustStore::file(&bundle).certificates().unwrap_err();
        assert!(error.to_string().contains("broken.pem"));
    }

    #[test]
    fn test_missing_bundle_file() {
        let dir = TempDir::new().unwrap();
        let store = TrustStore::file(dir.path().join("missing.pem"));
        let error = store.certificates().unwrap_err();
        assert!(error.to_string().starts_with("can't load trust store"));
    }

    #[test]
    fn test_directory_without_certificates() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("README"), "no certificates here").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let store = TrustStore::dir(dir.path());
        assert!(store.certificates().unwrap().is_empty());
    }

    #[test]
    fn test_directory_skips_malformed_certificates() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("broken.pem"),
            "-----BEGIN CERTIFICATE-----\nnot base64 at all!\n-----END CERTIFICATE-----\n",
        )
        .unwrap();

        let store = TrustStore::dir(dir.path());
        assert!(store.certificates().unwrap().is_empty());
    }
}

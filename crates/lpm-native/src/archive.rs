//! Archive extraction (tar, zip; gzip, bzip2 or xz compressed).
//!
//! The container and compression are detected from the archive's leading
//! bytes, never from its file name. Members are written in archive order to
//! `destination + "/" + member_path`. A failing member aborts the extraction;
//! members written before it stay on disk.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;
use zip::result::ZipError;

use crate::platform::{self, MAX_PATH};
use crate::{Error, Result};

/// Destination used when the caller does not name one.
pub const DEFAULT_DESTINATION: &str = ".";

const READ_BLOCK_SIZE: usize = 10240;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
// After "BZh" and the block-size digit: a compressed block or, for an empty
// stream, the end-of-stream marker.
const BZIP2_BLOCK_MAGIC: &[u8] = &[0x31, 0x41, 0x59, 0x26, 0x53, 0x59];
const BZIP2_EOS_MAGIC: &[u8] = &[0x17, 0x72, 0x45, 0x38, 0x50, 0x90];
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];
const ZIP_MAGICS: &[&[u8]] = &[b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// Supported archive types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    Zip,
    Tar,
    TarGz,
    TarBz2,
    TarXz,
}

impl ArchiveType {
    /// Detect archive type from the first bytes of the stream.
    ///
    /// Anything that is neither compressed nor a zip is assumed to be tar;
    /// the tar reader reports malformed input.
    pub fn detect(head: &[u8]) -> Self {
        if head.starts_with(GZIP_MAGIC) {
            ArchiveType::TarGz
        } else if is_bzip2(head) {
            ArchiveType::TarBz2
        } else if head.starts_with(XZ_MAGIC) {
            ArchiveType::TarXz
        } else if ZIP_MAGICS.iter().any(|magic| head.starts_with(magic)) {
            ArchiveType::Zip
        } else {
            ArchiveType::Tar
        }
    }
}

/// Extract `archive` into `destination`.
pub fn extract(archive: &str, destination: &str) -> Result<()> {
    log::debug!("Extracting {} into {}", archive, destination);
    let extraction = Extraction {
        archive,
        destination,
    };

    let file = File::open(archive).map_err(|e| extraction.write_error(e))?;
    let mut reader = BufReader::with_capacity(READ_BLOCK_SIZE, file);
    let head = reader.fill_buf().map_err(|e| extraction.read_error(e))?;
    let archive_type = ArchiveType::detect(head);
    log::debug!("Detected {:?}", archive_type);

    match archive_type {
        ArchiveType::Zip => extraction.zip(reader),
        ArchiveType::Tar => extraction.tar(reader),
        ArchiveType::TarGz => extraction.decompressed(GzDecoder::new(reader)),
        ArchiveType::TarBz2 => extraction.decompressed(BzDecoder::new(reader)),
        ArchiveType::TarXz => extraction.decompressed(XzDecoder::new(reader)),
    }
}

struct Extraction<'a> {
    archive: &'a str,
    destination: &'a str,
}

impl Extraction<'_> {
    /// A compressed stream usually holds a tar; a zip inside one has to be
    /// spooled to disk because zip needs random access.
    fn decompressed<R: Read>(&self, decoder: R) -> Result<()> {
        let mut reader = BufReader::with_capacity(READ_BLOCK_SIZE, decoder);
        let head = reader.fill_buf().map_err(|e| self.read_error(e))?;
        if ArchiveType::detect(head) != ArchiveType::Zip {
            return self.tar(reader);
        }

        let mut spool = tempfile::tempfile().map_err(|e| self.write_error(e))?;
        io::copy(&mut reader, &mut spool).map_err(|e| self.read_error(e))?;
        spool
            .seek(SeekFrom::Start(0))
            .map_err(|e| self.write_error(e))?;
        self.zip(spool)
    }

    fn tar<R: Read>(&self, reader: R) -> Result<()> {
        let mut archive = tar::Archive::new(reader);
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive.set_unpack_xattrs(false);

        let entries = archive.entries().map_err(|e| self.read_error(e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| self.read_error(e))?;
            let stored = entry.path().map_err(|e| self.read_error(e))?.into_owned();
            let target = self.target(&stored)?;
            log::trace!("  {:?} {}", entry.header().entry_type(), target.display());

            self.prepare_parent(&target)?;
            if entry.header().entry_type() == tar::EntryType::Link {
                let linked = entry
                    .link_name()
                    .map_err(|e| self.read_error(e))?
                    .ok_or_else(|| {
                        Error::archive_format(
                            self.archive,
                            format!("hard link {} has no target", stored.display()),
                        )
                    })?
                    .into_owned();
                self.write_hard_link(&self.target(&linked)?, &target)?;
                continue;
            }
            // Writes the header's type and mode, then streams the data,
            // sparse regions included.
            entry.unpack(&target).map_err(|e| self.read_error(e))?;
        }
        Ok(())
    }

    fn zip<R: Read + Seek>(&self, reader: R) -> Result<()> {
        let mut archive = zip::ZipArchive::new(reader).map_err(|e| self.zip_error(e))?;

        for index in 0..archive.len() {
            let mut member = archive.by_index(index).map_err(|e| self.zip_error(e))?;
            let target = self.target(Path::new(member.name()))?;
            log::trace!("  {}", target.display());
            let mode = member.unix_mode();

            if member.is_dir() {
                fs::create_dir_all(&target).map_err(|e| self.write_error(e))?;
                continue;
            }

            self.prepare_parent(&target)?;
            if mode.is_some_and(is_symlink_mode) {
                let mut link = String::new();
                member
                    .read_to_string(&mut link)
                    .map_err(|e| self.read_error(e))?;
                self.write_symlink(&link, &target)?;
                continue;
            }

            let mut out = File::create(&target).map_err(|e| self.write_error(e))?;
            io::copy(&mut member, &mut out).map_err(|e| self.read_error(e))?;

            #[cfg(unix)]
            if let Some(mode) = mode {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&target, fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|e| self.write_error(e))?;
            }
        }
        Ok(())
    }

    /// Rewrite a stored member path to its place under the destination.
    fn target(&self, stored: &Path) -> Result<PathBuf> {
        let escapes = stored.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(Error::archive_format(
                self.archive,
                format!("entry {} escapes the destination directory", stored.display()),
            ));
        }
        let stored = stored.to_str().ok_or_else(|| {
            Error::archive_format(
                self.archive,
                format!("entry {} is not valid utf-8", stored.display()),
            )
        })?;
        Ok(PathBuf::from(platform::join_within_limit(
            self.destination,
            stored,
            MAX_PATH,
        )))
    }

    fn prepare_parent(&self, target: &Path) -> Result<()> {
        match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                fs::create_dir_all(parent).map_err(|e| self.write_error(e))
            }
            _ => Ok(()),
        }
    }

    /// Hard link targets are member paths too, so they resolve under the
    /// destination rather than the working directory.
    fn write_hard_link(&self, original: &Path, target: &Path) -> Result<()> {
        if fs::symlink_metadata(target).is_ok() {
            fs::remove_file(target).map_err(|e| self.write_error(e))?;
        }
        fs::hard_link(original, target).map_err(|e| self.write_error(e))
    }

    #[cfg(unix)]
    fn write_symlink(&self, link: &str, target: &Path) -> Result<()> {
        if fs::symlink_metadata(target).is_ok() {
            fs::remove_file(target).map_err(|e| self.write_error(e))?;
        }
        std::os::unix::fs::symlink(link, target).map_err(|e| self.write_error(e))
    }

    // Without native symlinks the link text is stored as a plain file.
    #[cfg(not(unix))]
    fn write_symlink(&self, link: &str, target: &Path) -> Result<()> {
        fs::write(target, link).map_err(|e| self.write_error(e))
    }

    fn read_error(&self, source: io::Error) -> Error {
        Error::archive_read(self.archive, source)
    }

    fn write_error(&self, source: io::Error) -> Error {
        Error::ArchiveIo {
            archive: self.archive.to_string(),
            cause: source,
        }
    }

    fn zip_error(&self, error: ZipError) -> Error {
        match error {
            ZipError::Io(source) => self.read_error(source),
            other => Error::archive_format(self.archive, other.to_string()),
        }
    }
}

fn is_bzip2(head: &[u8]) -> bool {
    let Some(rest) = head.strip_prefix(BZIP2_MAGIC) else {
        return false;
    };
    match rest.split_first() {
        Some((level, block)) if (b'1'..=b'9').contains(level) => {
            block.starts_with(BZIP2_BLOCK_MAGIC) || block.starts_with(BZIP2_EOS_MAGIC)
        }
        _ => false,
    }
}

fn is_symlink_mode(mode: u32) -> bool {
    mode & 0o170000 == 0o120000
}

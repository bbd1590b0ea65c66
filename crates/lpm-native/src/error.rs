use std::io;
use thiserror::Error;

/// Broad category of a failed capability call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    NotEmpty,
    Unsupported,
    InvalidEncoding,
    InvalidArgument,
    Io,
    Format,
    Git,
    Transport,
    HttpStatus,
}

/// Every message already embeds the underlying library's text, so the
/// wrapped errors are kept as plain fields rather than `#[source]`.
#[derive(Error, Debug)]
pub enum Error {
    // Filesystem errors
    #[error("can't {op} {path}: {cause}")]
    Fs {
        op: &'static str,
        path: String,
        cause: io::Error,
    },

    #[error("can't create symbolic link {path}: symbolic links are not supported on this platform")]
    SymlinkUnsupported { path: String },

    // Path adapter errors
    #[error("can't {op} {path}: invalid utf-8 character conversion")]
    InvalidEncoding { op: &'static str, path: String },

    // Argument errors raised by the registry
    #[error("bad argument to {op}: {message}")]
    InvalidArgument { op: String, message: String },

    // Archive errors
    #[error("error extracting archive {archive}: {message}")]
    ArchiveFormat { archive: String, message: String },

    #[error("error extracting archive {archive}: {cause}")]
    ArchiveIo { archive: String, cause: io::Error },

    // Git errors
    #[error("git {op} error: {cause}")]
    Git {
        op: &'static str,
        cause: git2::Error,
    },

    // HTTP errors
    #[error("can't initialize transfer handle: {0}")]
    TransferSetup(reqwest::Error),

    #[error("error accessing {url}: {cause}")]
    Transport { url: String, cause: reqwest::Error },

    #[error("error accessing {url}, non-200 response code: {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("error opening file {path}: {cause}")]
    Destination { path: String, cause: io::Error },

    // Trust store errors
    #[error("can't load trust store {path}: {message}")]
    TrustStore { path: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn fs(op: &'static str, path: impl Into<String>, source: io::Error) -> Self {
        Error::Fs {
            op,
            path: path.into(),
            cause: source,
        }
    }

    pub(crate) fn git(op: &'static str, source: git2::Error) -> Self {
        Error::Git { op, cause: source }
    }

    pub(crate) fn transport(url: &str, source: reqwest::Error) -> Self {
        Error::Transport {
            url: url.to_string(),
            cause: source,
        }
    }

    /// Reading a member can fail because the bytes are not a valid archive or
    /// because the disk failed underneath; only the latter is an I/O error.
    pub(crate) fn archive_read(archive: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::InvalidData
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::Other => Error::ArchiveFormat {
                archive: archive.to_string(),
                message: source.to_string(),
            },
            _ => Error::ArchiveIo {
                archive: archive.to_string(),
                cause: source,
            },
        }
    }

    pub(crate) fn archive_format(archive: &str, message: impl Into<String>) -> Self {
        Error::ArchiveFormat {
            archive: archive.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_argument(op: &str, message: impl Into<String>) -> Self {
        Error::InvalidArgument {
            op: op.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Fs { cause, .. }
            | Error::ArchiveIo { cause, .. }
            | Error::Destination { cause, .. } => io_kind(cause),
            Error::SymlinkUnsupported { .. } => ErrorKind::Unsupported,
            Error::InvalidEncoding { .. } => ErrorKind::InvalidEncoding,
            Error::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Error::ArchiveFormat { .. } => ErrorKind::Format,
            Error::Git { .. } => ErrorKind::Git,
            Error::TransferSetup(_) | Error::Transport { .. } => ErrorKind::Transport,
            Error::HttpStatus { .. } => ErrorKind::HttpStatus,
            Error::TrustStore { .. } => ErrorKind::Io,
        }
    }
}

fn io_kind(error: &io::Error) -> ErrorKind {
    match error.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::AlreadyExists => ErrorKind::AlreadyExists,
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        io::ErrorKind::DirectoryNotEmpty => ErrorKind::NotEmpty,
        io::ErrorKind::Unsupported => ErrorKind::Unsupported,
        _ => ErrorKind::Io,
    }
}

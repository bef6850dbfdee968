// Error taxonomy shared by the engines, the inspection driver, and the CLI.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

use libc::{EACCES, EAGAIN, EBUSY, EINVAL, ENOENT, ENOMEM, ENOTDIR, EPERM, EROFS};

use crate::core::engine::Op;

/// Result codes in the LMDB code space. Positive codes are errno values.
pub mod codes {
    pub const KEY_EXIST: i32 = -30799;
    pub const NOT_FOUND: i32 = -30798;
    pub const PAGE_NOT_FOUND: i32 = -30797;
    pub const CORRUPTED: i32 = -30796;
    pub const PANIC: i32 = -30795;
    pub const VERSION_MISMATCH: i32 = -30794;
    pub const INVALID: i32 = -30793;
    pub const MAP_FULL: i32 = -30792;
    pub const DBS_FULL: i32 = -30791;
    pub const READERS_FULL: i32 = -30790;
    pub const TLS_FULL: i32 = -30789;
    pub const TXN_FULL: i32 = -30788;
    pub const CURSOR_FULL: i32 = -30787;
    pub const PAGE_FULL: i32 = -30786;
    pub const MAP_RESIZED: i32 = -30785;
    pub const INCOMPATIBLE: i32 = -30784;
    pub const BAD_RSLOT: i32 = -30783;
    pub const BAD_TXN: i32 = -30782;
    pub const BAD_VALSIZE: i32 = -30781;
    pub const BAD_DBI: i32 = -30780;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    NotFound,
    Incompatible,
    Capacity,
    Busy,
    Permission,
    Corrupt,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    op: Option<Op>,
    code: Option<i32>,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            op: None,
            code: None,
            message: None,
            hint: None,
            path: None,
            source: None,
        }
    }

    /// Builds an engine-reported failure; the kind is derived from the code.
    pub fn engine(op: Op, code: i32, description: impl Into<String>) -> Self {
        Self::new(kind_for_code(code))
            .with_op(op)
            .with_code(code)
            .with_message(description)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn op(&self) -> Option<Op> {
        self.op
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn with_op(mut self, op: Op) -> Self {
        self.op = Some(op);
        self
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(op) = self.op {
            write!(f, "{op} failed")?;
            match (self.code, &self.message) {
                (Some(code), Some(message)) => write!(f, ", error {code} {message}")?,
                (Some(code), None) => write!(f, ", error {code}")?,
                (None, Some(message)) => write!(f, ": {message}")?,
                (None, None) => {}
            }
            return Ok(());
        }
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io)
            .with_message("failed to write report")
            .with_source(err)
    }
}

/// Engine description for a result code, as the engine's strerror reports it.
pub fn describe(code: i32) -> String {
    let text = match code {
        codes::KEY_EXIST => "MDB_KEYEXIST: Key/data pair already exists",
        codes::NOT_FOUND => "MDB_NOTFOUND: No matching key/data pair found",
        codes::PAGE_NOT_FOUND => "MDB_PAGE_NOTFOUND: Requested page not found",
        codes::CORRUPTED => "MDB_CORRUPTED: Located page was wrong type",
        codes::PANIC => "MDB_PANIC: Update of meta page failed or environment had fatal error",
        codes::VERSION_MISMATCH => "MDB_VERSION_MISMATCH: Database environment version mismatch",
        codes::INVALID => "MDB_INVALID: File is not an LMDB file",
        codes::MAP_FULL => "MDB_MAP_FULL: Environment mapsize limit reached",
        codes::DBS_FULL => "MDB_DBS_FULL: Environment maxdbs limit reached",
        codes::READERS_FULL => "MDB_READERS_FULL: Environment maxreaders limit reached",
        codes::TLS_FULL => {
            "MDB_TLS_FULL: Thread-local storage keys full - too many environments open"
        }
        codes::TXN_FULL => {
            "MDB_TXN_FULL: Transaction has too many dirty pages - transaction too big"
        }
        codes::CURSOR_FULL => "MDB_CURSOR_FULL: Internal error - cursor stack limit reached",
        codes::PAGE_FULL => "MDB_PAGE_FULL: Internal error - page has no more space",
        codes::MAP_RESIZED => "MDB_MAP_RESIZED: Database contents grew beyond environment mapsize",
        codes::INCOMPATIBLE => {
            "MDB_INCOMPATIBLE: Operation and DB incompatible, or DB flags changed"
        }
        codes::BAD_RSLOT => "MDB_BAD_RSLOT: Invalid reuse of reader locktable slot",
        codes::BAD_TXN => "MDB_BAD_TXN: Transaction must abort, has a child, or is invalid",
        codes::BAD_VALSIZE => {
            "MDB_BAD_VALSIZE: Unsupported size of key/DB name/data, or wrong DUPFIXED size"
        }
        codes::BAD_DBI => "MDB_BAD_DBI: The specified DBI handle was closed/changed unexpectedly",
        code if code > 0 => return std::io::Error::from_raw_os_error(code).to_string(),
        _ => "Unknown error",
    };
    text.to_string()
}

pub fn kind_for_code(code: i32) -> ErrorKind {
    match code {
        codes::NOT_FOUND => ErrorKind::NotFound,
        codes::INCOMPATIBLE | codes::BAD_VALSIZE => ErrorKind::Incompatible,
        codes::DBS_FULL
        | codes::READERS_FULL
        | codes::TLS_FULL
        | codes::TXN_FULL
        | codes::CURSOR_FULL
        | codes::PAGE_FULL
        | codes::MAP_FULL => ErrorKind::Capacity,
        codes::CORRUPTED
        | codes::PAGE_NOT_FOUND
        | codes::PANIC
        | codes::VERSION_MISMATCH
        | codes::INVALID => ErrorKind::Corrupt,
        codes::MAP_RESIZED => ErrorKind::Busy,
        codes::KEY_EXIST | codes::BAD_RSLOT | codes::BAD_TXN | codes::BAD_DBI => {
            ErrorKind::Internal
        }
        ENOENT | ENOTDIR => ErrorKind::NotFound,
        EACCES | EPERM | EROFS => ErrorKind::Permission,
        EAGAIN | EBUSY => ErrorKind::Busy,
        ENOMEM => ErrorKind::Capacity,
        EINVAL => ErrorKind::Corrupt,
        code if code > 0 => ErrorKind::Io,
        _ => ErrorKind::Internal,
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::Incompatible => 4,
        ErrorKind::Busy => 5,
        ErrorKind::Permission => 6,
        ErrorKind::Corrupt => 7,
        ErrorKind::Io => 8,
        ErrorKind::Capacity => 9,
    }
}

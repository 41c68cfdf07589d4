use serde::Serialize;
use std::fmt;
use std::io;
use std::path::Path;
use thiserror::Error;

/// Flat error taxonomy. Every kind maps to a stable process exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownError,
    WrongArguments,
    NoSuchFile,
    IoError,
    OutOfMemory,
    WrongInputFormat,
    UnrecognizedTime,
    InternalError,
    WrongFileLocation,
    MhlNotFound,
    WrongMhlFormat,
    NotFile,
    FileSizeCheckFailed,
    HashCheckFailed,
    UnsupportedHashEncoding,
    CharConversionError,
    UnknownMode,
    NotImplemented,
    InvalidSequence,
    GapInSequence,
    NoMhlEntry,
}

impl ErrorKind {
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::UnknownError => 1,
            ErrorKind::WrongArguments => 2,
            ErrorKind::NoSuchFile => 3,
            ErrorKind::IoError => 4,
            ErrorKind::OutOfMemory => 5,
            ErrorKind::WrongInputFormat => 6,
            ErrorKind::UnrecognizedTime => 7,
            ErrorKind::InternalError => 8,
            ErrorKind::WrongFileLocation => 9,
            ErrorKind::MhlNotFound => 10,
            ErrorKind::WrongMhlFormat => 11,
            ErrorKind::NotFile => 13,
            ErrorKind::FileSizeCheckFailed => 15,
            ErrorKind::HashCheckFailed => 16,
            ErrorKind::UnsupportedHashEncoding => 17,
            ErrorKind::CharConversionError => 18,
            ErrorKind::UnknownMode => 19,
            ErrorKind::NotImplemented => 20,
            ErrorKind::InvalidSequence => 22,
            ErrorKind::GapInSequence => 23,
            ErrorKind::NoMhlEntry => 24,
        }
    }

    /// Human-readable description, independent of any particular failure.
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::UnknownError => "Unknown error.",
            ErrorKind::WrongArguments => "Wrong or incompatible arguments are passed.",
            ErrorKind::NoSuchFile => "File does not exist.",
            ErrorKind::IoError => "IO error occurred.",
            ErrorKind::OutOfMemory => "Out of memory.",
            ErrorKind::WrongInputFormat => "Wrong or incompatible input data.",
            ErrorKind::UnrecognizedTime => "Unknown time format.",
            ErrorKind::InternalError => "Internal error occurred.",
            ErrorKind::WrongFileLocation => "Wrong file location.",
            ErrorKind::MhlNotFound => "MHL file is not found.",
            ErrorKind::WrongMhlFormat => "Wrong or unsupported MHL file format.",
            ErrorKind::NotFile => "Path is not a regular file.",
            ErrorKind::FileSizeCheckFailed => {
                "Real file size and the size contained in MHL file record are not equal."
            }
            ErrorKind::HashCheckFailed => {
                "Calculated hash of file and hash from corresponding MHL file record are not equal."
            }
            ErrorKind::UnsupportedHashEncoding => {
                "One or more items of MHL file contain an unsupported hash encoding."
            }
            ErrorKind::CharConversionError => "Error during conversion of character encodings.",
            ErrorKind::UnknownMode => "Unknown mode.",
            ErrorKind::NotImplemented => "Functionality is not implemented yet.",
            ErrorKind::InvalidSequence => {
                "Invalid sequence specification. Format: <start of file name>#...#<number1>-<number2><end of file name>"
            }
            ErrorKind::GapInSequence => {
                "Gap detected in the file sequence. One or more files are missing or can't be opened."
            }
            ErrorKind::NoMhlEntry => "File is not listed in MHL file.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// An error of a known kind plus the context needed to act on it
/// (paths, declared vs. observed values).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct MhlError {
    kind: ErrorKind,
    message: String,
}

impl MhlError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> u8 {
        self.kind.exit_code()
    }

    /// Wrap an I/O failure on `path`; a missing path becomes `NoSuchFile`.
    pub fn io(path: impl AsRef<Path>, err: io::Error) -> Self {
        let path = path.as_ref();
        match err.kind() {
            io::ErrorKind::NotFound => {
                Self::new(ErrorKind::NoSuchFile, format!("file does not exist: {}", path.display()))
            }
            io::ErrorKind::OutOfMemory => {
                Self::new(ErrorKind::OutOfMemory, format!("{}: {err}", path.display()))
            }
            _ => Self::new(ErrorKind::IoError, format!("{}: {err}", path.display())),
        }
    }

    pub fn wrong_mhl_format(manifest: impl fmt::Display, detail: impl fmt::Display) -> Self {
        Self::new(ErrorKind::WrongMhlFormat, format!("MHL file {manifest}: {detail}"))
    }
}

impl From<io::Error> for MhlError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::new(ErrorKind::NoSuchFile, err.to_string()),
            _ => Self::new(ErrorKind::IoError, err.to_string()),
        }
    }
}

pub type Result<T, E = MhlError> = std::result::Result<T, E>;

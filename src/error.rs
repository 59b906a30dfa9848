//! Error types for zflate

use std::io;

use crate::inflate::InflateStatus;

/// Result type for zflate operations
pub type Result<T> = std::result::Result<T, ZipError>;

/// Error types that can occur during codec or archive operations
#[derive(Debug)]
pub enum ZipError {
    /// I/O error from the underlying source or sink
    Io(io::Error),
    /// The data does not look like a ZIP archive
    NotAnArchive,
    /// No end-of-central-directory record within the search window
    FailedFindingCentralDir,
    /// A header record is malformed or inconsistent
    InvalidHeader(&'static str),
    /// Archive spans multiple disks
    UnsupportedMultiDisk,
    /// Compression method other than stored or deflate
    UnsupportedMethod(u16),
    /// Entry is encrypted
    UnsupportedEncryption,
    /// Feature this library does not implement (patch data, etc.)
    UnsupportedFeature(&'static str),
    /// Central directory size exceeds what can be held in memory
    UnsupportedCdirSize,
    /// More entries than the format (or this library) can represent
    TooManyFiles,
    /// Entry too large for the non-ZIP64 fields and ZIP64 is disabled
    FileTooLarge,
    /// Archive grew past the representable size
    ArchiveTooLarge,
    /// Entry not found in the archive
    EntryNotFound(String),
    /// CRC-32 of the extracted data does not match the stored value
    CrcMismatch { expected: u32, actual: u32 },
    /// Decompressed size does not match the stored value
    UnexpectedDecompressedSize { expected: u64, actual: u64 },
    /// Entry failed validation against its local header
    ValidationFailed(&'static str),
    /// Entry name is not acceptable (absolute path, too long, ...)
    InvalidFilename,
    /// Caller error: bad flag combination, wrong archive mode, ...
    InvalidParameter(&'static str),
    /// The deflate encoder could not make progress
    CompressionFailed,
    /// The deflate decoder rejected the stream
    Decompression(InflateStatus),
}

impl std::fmt::Display for ZipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipError::Io(e) => write!(f, "I/O error: {}", e),
            ZipError::NotAnArchive => write!(f, "not a ZIP archive"),
            ZipError::FailedFindingCentralDir => {
                write!(f, "end of central directory not found")
            }
            ZipError::InvalidHeader(what) => write!(f, "invalid or corrupted header: {}", what),
            ZipError::UnsupportedMultiDisk => write!(f, "multi-disk archives are not supported"),
            ZipError::UnsupportedMethod(m) => write!(f, "unsupported compression method: {}", m),
            ZipError::UnsupportedEncryption => write!(f, "encrypted entries are not supported"),
            ZipError::UnsupportedFeature(what) => write!(f, "unsupported feature: {}", what),
            ZipError::UnsupportedCdirSize => write!(f, "central directory too large"),
            ZipError::TooManyFiles => write!(f, "too many entries"),
            ZipError::FileTooLarge => write!(f, "entry too large"),
            ZipError::ArchiveTooLarge => write!(f, "archive too large"),
            ZipError::EntryNotFound(name) => write!(f, "entry not found: {}", name),
            ZipError::CrcMismatch { expected, actual } => {
                write!(
                    f,
                    "CRC-32 check failed: expected 0x{:08x}, got 0x{:08x}",
                    expected, actual
                )
            }
            ZipError::UnexpectedDecompressedSize { expected, actual } => {
                write!(
                    f,
                    "unexpected decompressed size: expected {}, got {}",
                    expected, actual
                )
            }
            ZipError::ValidationFailed(what) => write!(f, "validation failed: {}", what),
            ZipError::InvalidFilename => write!(f, "invalid entry name"),
            ZipError::InvalidParameter(what) => write!(f, "invalid parameter: {}", what),
            ZipError::CompressionFailed => write!(f, "deflate compression failed"),
            ZipError::Decompression(status) => write!(f, "deflate stream rejected: {:?}", status),
        }
    }
}

impl std::error::Error for ZipError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ZipError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        ZipError::Io(err)
    }
}

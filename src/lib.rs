//! # zflate: Self-Contained DEFLATE + ZIP Library
//!
//! `zflate` implements the DEFLATE compression and decompression algorithms
//! from RFC 1951, the zlib stream wrapper from RFC 1950 (with Adler-32),
//! CRC-32 as used by ZIP, and a reader/writer for the PKZIP archive format
//! including ZIP64 - with no external compression backend.
//!
//! ## Features
//!
//! - **Streaming codec**: resumable compress/decompress over caller-supplied
//!   buffers, no hidden allocation per call
//! - **Streaming ZIP write**: on-the-fly compression straight to any
//!   `Write + Seek` sink, ZIP64 promotion when sizes demand it
//! - **Streaming ZIP read**: central directory indexed in memory, entries
//!   extracted incrementally through a 32 KiB window
//! - **Append in place**: reopen an archive, overwrite its central
//!   directory, add entries, re-finalize
//!
//! ## Quick Start
//!
//! ### Buffer-to-buffer compression
//!
//! ```
//! let compressed = zflate::compress_to_vec_zlib(b"Hello", 6);
//! let restored = zflate::decompress_to_vec_zlib(&compressed).unwrap();
//! assert_eq!(restored, b"Hello");
//! ```
//!
//! ### Writing a ZIP file
//!
//! ```no_run
//! use zflate::{EntryOptions, ZipWriter};
//!
//! let mut writer = ZipWriter::create("output.zip")?;
//! writer.add_bytes("file1.txt", b"Hello, World!", EntryOptions::default())?;
//! writer.start_entry("file2.txt")?;
//! writer.write_data(b"streamed ")?;
//! writer.write_data(b"in pieces")?;
//! writer.finish()?;
//! # Ok::<(), zflate::ZipError>(())
//! ```
//!
//! ### Reading a ZIP file
//!
//! ```no_run
//! use zflate::ZipReader;
//!
//! let mut reader = ZipReader::open("archive.zip")?;
//! for entry in reader.entries()? {
//!     println!("{}: {} bytes", entry.name, entry.uncomp_size);
//! }
//! let data = reader.extract_by_name("file1.txt", 0)?;
//! # Ok::<(), zflate::ZipError>(())
//! ```

pub mod checksum;
pub mod deflate;
pub mod error;
pub mod format;
pub mod inflate;
pub mod reader;
pub mod writer;

pub use checksum::{adler32, crc32};
pub use deflate::{
    compress_to_vec, compress_to_vec_zlib, CompressStatus, CompressionStrategy, Compressor,
    FlushMode,
};
pub use error::{Result, ZipError};
pub use format::DosDateTime;
pub use inflate::{
    decompress_to_vec, decompress_to_vec_zlib, Decompressor, InflateError, InflateStatus,
};
pub use reader::{EntryReader, ZipEntry, ZipReader};
pub use writer::{add_bytes_to_archive, EntryOptions, ZipWriter};

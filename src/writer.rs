//! ZIP archive writer
//!
//! Streams entries to any `Write + Seek` sink, compressing on-the-fly with
//! the built-in DEFLATE encoder, and keeps the central directory as an
//! in-memory byte image until [`ZipWriter::finish`] appends it together
//! with the (optional) ZIP64 records and the end-of-central-directory.
//!
//! Entries are written with the data-descriptor bit set, so sizes and CRC
//! land after the data; [`EntryOptions::set_sizes_in_header`] additionally
//! seeks back and patches the local header once they are known.

use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::checksum::{crc32, CRC32_INIT};
use crate::deflate::{CompressStatus, CompressionStrategy, Compressor, FlushMode};
use crate::error::{Result, ZipError};
use crate::format::*;
use crate::reader::ZipReader;

const WRITE_CHUNK: usize = 16 * 1024;

/// Per-entry settings. The default compresses at level 6 with no comment,
/// no extras and a zeroed timestamp.
#[derive(Debug, Clone)]
pub struct EntryOptions {
    /// Compression level 0-10; level 0 stores the data uncompressed.
    pub level: u32,
    pub strategy: CompressionStrategy,
    pub comment: String,
    pub mtime: Option<SystemTime>,
    pub external_attr: u32,
    /// Extra data appended to the local header.
    pub local_extra: Vec<u8>,
    /// Extra data appended to the central directory record.
    pub central_extra: Vec<u8>,
    /// Emit ZIP64 records for this entry even if the sizes would fit.
    pub force_zip64: bool,
    /// Seek back and write the final sizes into the local header.
    pub set_sizes_in_header: bool,
    /// Reject non-ASCII entry names.
    pub ascii_name_only: bool,
    /// Size the caller promises to write; informs ZIP64 reservation for
    /// streamed entries.
    pub declared_size: Option<u64>,
}

impl Default for EntryOptions {
    fn default() -> Self {
        EntryOptions {
            level: 6,
            strategy: CompressionStrategy::Default,
            comment: String::new(),
            mtime: None,
            external_attr: 0,
            local_extra: Vec::new(),
            central_extra: Vec::new(),
            force_zip64: false,
            set_sizes_in_header: false,
            ascii_name_only: false,
            declared_size: None,
        }
    }
}

impl EntryOptions {
    pub fn level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }
    pub fn strategy(mut self, strategy: CompressionStrategy) -> Self {
        self.strategy = strategy;
        self
    }
    pub fn comment<S: Into<String>>(mut self, comment: S) -> Self {
        self.comment = comment.into();
        self
    }
    pub fn mtime(mut self, t: SystemTime) -> Self {
        self.mtime = Some(t);
        self
    }
    pub fn external_attr(mut self, attr: u32) -> Self {
        self.external_attr = attr;
        self
    }
    pub fn force_zip64(mut self) -> Self {
        self.force_zip64 = true;
        self
    }
    pub fn set_sizes_in_header(mut self) -> Self {
        self.set_sizes_in_header = true;
        self
    }
    pub fn declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }
}

struct CurrentEntry {
    name: Vec<u8>,
    local_header_ofs: u64,
    // file offset of the reserved ZIP64 extra payload, when present
    zip64_extra_ofs: Option<u64>,
    method: u16,
    bit_flag: u16,
    dos: DosDateTime,
    options: EntryOptions,
    compressor: Option<Box<Compressor>>,
    crc: u32,
    uncomp_size: u64,
    comp_size: u64,
}

/// ZIP archive writer over a seekable byte sink.
pub struct ZipWriter<W: Write + Seek> {
    sink: W,
    archive_size: u64,
    central_dir: Vec<u8>,
    entry_offsets: Vec<u32>,
    zip64: bool,
    finalized: bool,
    alignment: u64,
    force_zip64: bool,
    current: Option<CurrentEntry>,
}

impl ZipWriter<File> {
    /// Create a fresh archive file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(File::create(path)?)
    }

    /// Open an existing archive for appending: the old central directory is
    /// overwritten and rewritten on finish.
    pub fn append_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_reader(ZipReader::new(file)?)
    }

    /// Finish and shrink the file to the archive's final size, which matters
    /// in append mode where the rewritten tail may be shorter.
    pub fn finish_and_truncate(self) -> Result<()> {
        let (file, size) = self.finish_with_size()?;
        file.set_len(size)?;
        Ok(())
    }
}

impl ZipWriter<Cursor<Vec<u8>>> {
    /// Build an archive in memory; [`Self::finish_into_bytes`] hands the
    /// buffer back.
    pub fn in_memory() -> Self {
        ZipWriter {
            sink: Cursor::new(Vec::new()),
            archive_size: 0,
            central_dir: Vec::new(),
            entry_offsets: Vec::new(),
            zip64: false,
            finalized: false,
            alignment: 0,
            force_zip64: false,
            current: None,
        }
    }

    pub fn finish_into_bytes(self) -> Result<Vec<u8>> {
        Ok(self.finish()?.into_inner())
    }
}

impl<W: Write + Seek> ZipWriter<W> {
    /// Start a fresh archive at the sink's current end.
    pub fn new(mut sink: W) -> Result<Self> {
        let archive_size = sink.seek(SeekFrom::End(0))?;
        Ok(ZipWriter {
            sink,
            archive_size,
            central_dir: Vec::new(),
            entry_offsets: Vec::new(),
            zip64: false,
            finalized: false,
            alignment: 0,
            force_zip64: false,
            current: None,
        })
    }

    /// Convert a reader into an appending writer. The reader's central
    /// directory image is adopted and its file position becomes the write
    /// position, so the old central directory gets overwritten.
    pub fn from_reader(reader: ZipReader<W>) -> Result<Self>
    where
        W: Read,
    {
        let (mut sink, cd_ofs, central_dir, entry_offsets, zip64) = reader.into_append_parts();
        sink.seek(SeekFrom::Start(cd_ofs))?;
        Ok(ZipWriter {
            sink,
            archive_size: cd_ofs,
            central_dir,
            entry_offsets,
            zip64,
            finalized: false,
            alignment: 0,
            force_zip64: false,
            current: None,
        })
    }

    /// Pad entries so every local header offset is a multiple of
    /// `alignment` (a power of two).
    pub fn with_alignment(mut self, alignment: u64) -> Result<Self> {
        if alignment != 0 && !alignment.is_power_of_two() {
            return Err(ZipError::InvalidParameter("alignment must be a power of two"));
        }
        self.alignment = alignment;
        Ok(self)
    }

    /// Emit ZIP64 end-of-central-directory records even for small archives.
    pub fn with_zip64(mut self) -> Self {
        self.force_zip64 = true;
        self.zip64 = true;
        self
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.entry_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_offsets.is_empty()
    }

    /// Begin a new entry with default options.
    pub fn start_entry(&mut self, name: &str) -> Result<()> {
        self.start_entry_with_options(name, EntryOptions::default())
    }

    /// Begin a new entry; any previously started entry is finished first.
    pub fn start_entry_with_options(&mut self, name: &str, options: EntryOptions) -> Result<()> {
        if self.finalized {
            return Err(ZipError::InvalidParameter("archive already finalized"));
        }
        self.finish_current_entry()?;
        validate_entry_name(name, options.ascii_name_only)?;
        if self.entry_offsets.len() as u64 >= u64::from(u32::MAX) {
            return Err(ZipError::TooManyFiles);
        }

        self.write_alignment_padding()?;

        let local_header_ofs = self.archive_size;
        let method = if options.level == 0 {
            METHOD_STORED
        } else {
            METHOD_DEFLATED
        };
        let mut bit_flag = GP_FLAG_DATA_DESCRIPTOR;
        if !name.is_ascii() {
            bit_flag |= GP_FLAG_UTF8;
        }
        let dos = options
            .mtime
            .map(DosDateTime::from_system_time)
            .unwrap_or_default();

        let reserve_zip64 = options.set_sizes_in_header
            && (options.force_zip64
                || self.force_zip64
                || options.declared_size.is_some_and(|s| s >= u64::from(u32::MAX)));

        let zip64_extra_len: usize = if reserve_zip64 { 4 + 16 } else { 0 };
        let extra_len = zip64_extra_len + options.local_extra.len();
        if extra_len > usize::from(u16::MAX) {
            return Err(ZipError::InvalidParameter("local extra data too large"));
        }

        let size_placeholder: u32 = if reserve_zip64 { 0xFFFF_FFFF } else { 0 };
        let version_needed = if reserve_zip64 {
            VERSION_NEEDED_ZIP64
        } else {
            VERSION_NEEDED_DEFAULT
        };

        let mut header = Vec::with_capacity(LOCAL_FILE_HEADER_SIZE + name.len() + extra_len);
        header.extend_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        header.extend_from_slice(&version_needed.to_le_bytes());
        header.extend_from_slice(&bit_flag.to_le_bytes());
        header.extend_from_slice(&method.to_le_bytes());
        header.extend_from_slice(&dos.time.to_le_bytes());
        header.extend_from_slice(&dos.date.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes()); // crc placeholder
        header.extend_from_slice(&size_placeholder.to_le_bytes());
        header.extend_from_slice(&size_placeholder.to_le_bytes());
        header.extend_from_slice(&(name.len() as u16).to_le_bytes());
        header.extend_from_slice(&(extra_len as u16).to_le_bytes());
        header.extend_from_slice(name.as_bytes());
        let zip64_extra_ofs = if reserve_zip64 {
            header.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
            header.extend_from_slice(&16u16.to_le_bytes());
            header.extend_from_slice(&[0u8; 16]);
            Some(local_header_ofs + header.len() as u64 - 16)
        } else {
            None
        };
        header.extend_from_slice(&options.local_extra);
        self.sink.write_all(&header)?;
        self.archive_size += header.len() as u64;

        let compressor = if method == METHOD_DEFLATED {
            Some(Box::new(Compressor::new_with_params(
                options.level.min(10),
                -15,
                options.strategy,
            )))
        } else {
            None
        };

        self.current = Some(CurrentEntry {
            name: name.as_bytes().to_vec(),
            local_header_ofs,
            zip64_extra_ofs,
            method,
            bit_flag,
            dos,
            options,
            compressor,
            crc: CRC32_INIT,
            uncomp_size: 0,
            comp_size: 0,
        });
        Ok(())
    }

    fn write_alignment_padding(&mut self) -> Result<()> {
        if self.alignment > 1 {
            let pad =
                (self.alignment - (self.archive_size & (self.alignment - 1))) & (self.alignment - 1);
            if pad > 0 {
                let zeros = vec![0u8; pad as usize];
                self.sink.write_all(&zeros)?;
                self.archive_size += pad;
            }
        }
        Ok(())
    }

    /// Feed data to the entry started with [`Self::start_entry`].
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        let current = self
            .current
            .as_mut()
            .ok_or(ZipError::InvalidParameter("no entry started"))?;
        current.crc = crc32(current.crc, data);
        current.uncomp_size += data.len() as u64;

        match &mut current.compressor {
            None => {
                self.sink.write_all(data)?;
                self.archive_size += data.len() as u64;
                current.comp_size += data.len() as u64;
            }
            Some(compressor) => {
                let mut chunk = [0u8; WRITE_CHUNK];
                let mut in_pos = 0usize;
                loop {
                    let (status, consumed, produced) =
                        compressor.compress(&data[in_pos..], &mut chunk, FlushMode::None);
                    in_pos += consumed;
                    if produced > 0 {
                        self.sink.write_all(&chunk[..produced])?;
                        self.archive_size += produced as u64;
                        current.comp_size += produced as u64;
                    }
                    if status != CompressStatus::Okay {
                        return Err(ZipError::CompressionFailed);
                    }
                    if in_pos == data.len() && produced == 0 {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Add a whole in-memory buffer as one entry.
    pub fn add_bytes(&mut self, name: &str, data: &[u8], options: EntryOptions) -> Result<()> {
        let mut options = options.declared_size(data.len() as u64);
        if data.is_empty() {
            options.level = 0;
        }
        self.start_entry_with_options(name, options)?;
        self.write_data(data)?;
        self.finish_current_entry()
    }

    /// Add a directory entry (trailing `/` enforced, DOS DIR attribute set).
    pub fn add_directory(&mut self, name: &str, options: EntryOptions) -> Result<()> {
        let dir_name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{}/", name)
        };
        let options = options.level(0).external_attr(DOS_ATTR_DIRECTORY);
        self.start_entry_with_options(&dir_name, options)?;
        self.finish_current_entry()
    }

    /// Stream an arbitrary reader in as one entry; returns the byte count.
    pub fn add_reader<R: Read>(
        &mut self,
        name: &str,
        mut reader: R,
        options: EntryOptions,
    ) -> Result<u64> {
        self.start_entry_with_options(name, options)?;
        let mut buf = vec![0u8; 64 * 1024];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.write_data(&buf[..n])?;
            total += n as u64;
        }
        self.finish_current_entry()?;
        Ok(total)
    }

    /// Add the contents of a file on disk, carrying its mtime.
    pub fn add_file<P: AsRef<Path>>(
        &mut self,
        name: &str,
        path: P,
        options: EntryOptions,
    ) -> Result<u64> {
        let file = File::open(path)?;
        let mut options = options;
        if let Ok(meta) = file.metadata() {
            if options.mtime.is_none() {
                options.mtime = meta.modified().ok();
            }
            options = options.declared_size(meta.len());
        }
        self.add_reader(name, file, options)
    }

    /// Clone an entry from another archive without recompressing: the local
    /// header, data and descriptor are copied verbatim and a fresh central
    /// directory record is synthesized for the new offset.
    pub fn add_entry_from<R: Read + Seek>(
        &mut self,
        source: &mut ZipReader<R>,
        index: usize,
    ) -> Result<()> {
        if self.finalized {
            return Err(ZipError::InvalidParameter("archive already finalized"));
        }
        self.finish_current_entry()?;
        if self.entry_offsets.len() as u64 >= u64::from(u32::MAX) {
            return Err(ZipError::TooManyFiles);
        }
        let entry = source.stat(index)?;

        self.write_alignment_padding()?;
        let new_ofs = self.archive_size;

        let (start, len) = source.raw_entry_span(index)?;
        source.copy_raw_range(start, len, &mut self.sink)?;
        self.archive_size += len;

        // rebuild the CD record: same metadata, new offset, fresh ZIP64
        // extra carrying only the fields that need 64 bits
        let src_record = source.central_dir_record(index).to_vec();
        let name_len = read_u16(&src_record, 28) as usize;
        let extra_len = read_u16(&src_record, 30) as usize;
        let comment_len = read_u16(&src_record, 32) as usize;
        let name =
            src_record[CENTRAL_DIR_HEADER_SIZE..CENTRAL_DIR_HEADER_SIZE + name_len].to_vec();
        let src_extra = &src_record
            [CENTRAL_DIR_HEADER_SIZE + name_len..CENTRAL_DIR_HEADER_SIZE + name_len + extra_len];
        let comment_start = CENTRAL_DIR_HEADER_SIZE + name_len + extra_len;
        let comment = src_record[comment_start..comment_start + comment_len].to_vec();
        let preserved_extra = strip_extra_field(src_extra, ZIP64_EXTRA_FIELD_ID);

        self.append_central_record(&CentralRecord {
            version_made_by: read_u16(&src_record, 4),
            bit_flag: read_u16(&src_record, 8),
            method: read_u16(&src_record, 10),
            dos: DosDateTime::new(read_u16(&src_record, 12), read_u16(&src_record, 14)),
            crc: entry.crc32,
            comp_size: entry.comp_size,
            uncomp_size: entry.uncomp_size,
            internal_attr: read_u16(&src_record, 36),
            external_attr: entry.external_attr,
            local_header_ofs: new_ofs,
            name: &name,
            extra: &preserved_extra,
            comment: &comment,
        })
    }

    fn finish_current_entry(&mut self) -> Result<()> {
        let Some(mut current) = self.current.take() else {
            return Ok(());
        };

        if let Some(compressor) = &mut current.compressor {
            let mut chunk = [0u8; WRITE_CHUNK];
            loop {
                let (status, _, produced) = compressor.compress(&[], &mut chunk, FlushMode::Finish);
                if produced > 0 {
                    self.sink.write_all(&chunk[..produced])?;
                    self.archive_size += produced as u64;
                    current.comp_size += produced as u64;
                }
                match status {
                    CompressStatus::Done => break,
                    CompressStatus::Okay => {}
                    _ => return Err(ZipError::CompressionFailed),
                }
            }
        }

        // data descriptor: 64-bit sizes exactly when a 32-bit field would
        // overflow, which is also how readers sniff the descriptor width
        let zip64_sizes = current.comp_size >= u64::from(u32::MAX)
            || current.uncomp_size >= u64::from(u32::MAX);
        let mut descriptor = Vec::with_capacity(24);
        descriptor.extend_from_slice(&DATA_DESCRIPTOR_SIG.to_le_bytes());
        descriptor.extend_from_slice(&current.crc.to_le_bytes());
        if zip64_sizes {
            descriptor.extend_from_slice(&current.comp_size.to_le_bytes());
            descriptor.extend_from_slice(&current.uncomp_size.to_le_bytes());
        } else {
            descriptor.extend_from_slice(&(current.comp_size as u32).to_le_bytes());
            descriptor.extend_from_slice(&(current.uncomp_size as u32).to_le_bytes());
        }
        self.sink.write_all(&descriptor)?;
        self.archive_size += descriptor.len() as u64;

        if current.options.set_sizes_in_header {
            self.patch_local_header(&current, zip64_sizes)?;
        }

        let name = current.name.clone();
        let central_extra = current.options.central_extra.clone();
        let comment = current.options.comment.clone();
        self.append_central_record(&CentralRecord {
            version_made_by: VERSION_MADE_BY,
            bit_flag: current.bit_flag,
            method: current.method,
            dos: current.dos,
            crc: current.crc,
            comp_size: current.comp_size,
            uncomp_size: current.uncomp_size,
            internal_attr: 0,
            external_attr: effective_external_attr(&current),
            local_header_ofs: current.local_header_ofs,
            name: &name,
            extra: &central_extra,
            comment: comment.as_bytes(),
        })
    }

    fn patch_local_header(&mut self, current: &CurrentEntry, zip64_sizes: bool) -> Result<()> {
        let end = self.archive_size;
        self.sink
            .seek(SeekFrom::Start(current.local_header_ofs + 14))?;
        let mut patch = Vec::with_capacity(12);
        patch.extend_from_slice(&current.crc.to_le_bytes());
        match current.zip64_extra_ofs {
            Some(extra_ofs) => {
                patch.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
                patch.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
                self.sink.write_all(&patch)?;
                self.sink.seek(SeekFrom::Start(extra_ofs))?;
                self.sink.write_all(&current.uncomp_size.to_le_bytes())?;
                self.sink.write_all(&current.comp_size.to_le_bytes())?;
            }
            None => {
                if zip64_sizes {
                    return Err(ZipError::FileTooLarge);
                }
                patch.extend_from_slice(&(current.comp_size as u32).to_le_bytes());
                patch.extend_from_slice(&(current.uncomp_size as u32).to_le_bytes());
                self.sink.write_all(&patch)?;
            }
        }
        self.sink.seek(SeekFrom::Start(end))?;
        Ok(())
    }

    fn append_central_record(&mut self, rec: &CentralRecord<'_>) -> Result<()> {
        let needs_ofs64 = rec.local_header_ofs >= u64::from(u32::MAX);
        let needs_comp64 = rec.comp_size >= u64::from(u32::MAX);
        let needs_uncomp64 = rec.uncomp_size >= u64::from(u32::MAX);
        let entry_zip64 = needs_ofs64 || needs_comp64 || needs_uncomp64;

        let mut zip64_extra = Vec::new();
        if entry_zip64 {
            let mut payload = Vec::with_capacity(24);
            if needs_uncomp64 {
                payload.extend_from_slice(&rec.uncomp_size.to_le_bytes());
            }
            if needs_comp64 {
                payload.extend_from_slice(&rec.comp_size.to_le_bytes());
            }
            if needs_ofs64 {
                payload.extend_from_slice(&rec.local_header_ofs.to_le_bytes());
            }
            zip64_extra.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
            zip64_extra.extend_from_slice(&(payload.len() as u16).to_le_bytes());
            zip64_extra.extend_from_slice(&payload);
        }

        let extra_total = zip64_extra.len() + rec.extra.len();
        if extra_total > usize::from(u16::MAX) || rec.comment.len() > usize::from(u16::MAX) {
            return Err(ZipError::InvalidParameter("extra data or comment too large"));
        }

        let record_ofs = self.central_dir.len();
        let record_len = CENTRAL_DIR_HEADER_SIZE + rec.name.len() + extra_total + rec.comment.len();
        if record_ofs as u64 + record_len as u64 >= u64::from(u32::MAX) {
            return Err(ZipError::ArchiveTooLarge);
        }

        let version_needed = if entry_zip64 {
            VERSION_NEEDED_ZIP64
        } else {
            VERSION_NEEDED_DEFAULT
        };
        let cap32 = |v: u64| v.min(u64::from(u32::MAX)) as u32;

        let dir = &mut self.central_dir;
        dir.extend_from_slice(&CENTRAL_DIR_HEADER_SIG.to_le_bytes());
        dir.extend_from_slice(&rec.version_made_by.to_le_bytes());
        dir.extend_from_slice(&version_needed.to_le_bytes());
        dir.extend_from_slice(&rec.bit_flag.to_le_bytes());
        dir.extend_from_slice(&rec.method.to_le_bytes());
        dir.extend_from_slice(&rec.dos.time.to_le_bytes());
        dir.extend_from_slice(&rec.dos.date.to_le_bytes());
        dir.extend_from_slice(&rec.crc.to_le_bytes());
        dir.extend_from_slice(&cap32(rec.comp_size).to_le_bytes());
        dir.extend_from_slice(&cap32(rec.uncomp_size).to_le_bytes());
        dir.extend_from_slice(&(rec.name.len() as u16).to_le_bytes());
        dir.extend_from_slice(&(extra_total as u16).to_le_bytes());
        dir.extend_from_slice(&(rec.comment.len() as u16).to_le_bytes());
        dir.extend_from_slice(&0u16.to_le_bytes()); // disk start
        dir.extend_from_slice(&rec.internal_attr.to_le_bytes());
        dir.extend_from_slice(&rec.external_attr.to_le_bytes());
        dir.extend_from_slice(&cap32(rec.local_header_ofs).to_le_bytes());
        dir.extend_from_slice(rec.name);
        dir.extend_from_slice(&zip64_extra);
        dir.extend_from_slice(rec.extra);
        dir.extend_from_slice(rec.comment);

        self.entry_offsets.push(record_ofs as u32);
        // ZIP64 is sticky for the whole archive once any entry needs it
        self.zip64 |= entry_zip64 || self.entry_offsets.len() > usize::from(u16::MAX);
        Ok(())
    }

    /// Write the central directory, ZIP64 records when needed, and the
    /// end-of-central-directory, then hand the sink back.
    pub fn finish(self) -> Result<W> {
        Ok(self.finish_with_size()?.0)
    }

    /// Like [`Self::finish`], also returning the final archive size (append
    /// mode may leave stale bytes past it in a file-backed sink).
    pub fn finish_with_size(mut self) -> Result<(W, u64)> {
        if self.finalized {
            return Err(ZipError::InvalidParameter("archive already finalized"));
        }
        self.finish_current_entry()?;

        let cd_ofs = self.archive_size;
        let cd_size = self.central_dir.len() as u64;
        let total = self.entry_offsets.len() as u64;
        self.sink.write_all(&self.central_dir)?;
        self.archive_size += cd_size;

        let need_zip64 = self.zip64
            || self.force_zip64
            || total > u64::from(u16::MAX)
            || cd_size >= u64::from(u32::MAX)
            || cd_ofs >= u64::from(u32::MAX);

        if need_zip64 {
            let zip64_eocd_ofs = self.archive_size;
            let mut rec = Vec::with_capacity(ZIP64_END_OF_CENTRAL_DIR_SIZE);
            rec.extend_from_slice(&ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes());
            rec.extend_from_slice(&44u64.to_le_bytes()); // size of remaining record
            rec.extend_from_slice(&VERSION_MADE_BY.to_le_bytes());
            rec.extend_from_slice(&VERSION_NEEDED_ZIP64.to_le_bytes());
            rec.extend_from_slice(&0u32.to_le_bytes()); // this disk
            rec.extend_from_slice(&0u32.to_le_bytes()); // cd start disk
            rec.extend_from_slice(&total.to_le_bytes());
            rec.extend_from_slice(&total.to_le_bytes());
            rec.extend_from_slice(&cd_size.to_le_bytes());
            rec.extend_from_slice(&cd_ofs.to_le_bytes());
            self.sink.write_all(&rec)?;
            self.archive_size += rec.len() as u64;

            let mut locator = Vec::with_capacity(ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE);
            locator.extend_from_slice(&ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG.to_le_bytes());
            locator.extend_from_slice(&0u32.to_le_bytes());
            locator.extend_from_slice(&zip64_eocd_ofs.to_le_bytes());
            locator.extend_from_slice(&1u32.to_le_bytes());
            self.sink.write_all(&locator)?;
            self.archive_size += locator.len() as u64;
        }

        let cap16 = |v: u64| v.min(u64::from(u16::MAX)) as u16;
        let cap32 = |v: u64| v.min(u64::from(u32::MAX)) as u32;
        let mut eocd = Vec::with_capacity(END_OF_CENTRAL_DIR_SIZE);
        eocd.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        eocd.extend_from_slice(&0u16.to_le_bytes());
        eocd.extend_from_slice(&0u16.to_le_bytes());
        eocd.extend_from_slice(&cap16(total).to_le_bytes());
        eocd.extend_from_slice(&cap16(total).to_le_bytes());
        eocd.extend_from_slice(&cap32(cd_size).to_le_bytes());
        eocd.extend_from_slice(&cap32(cd_ofs).to_le_bytes());
        eocd.extend_from_slice(&0u16.to_le_bytes()); // archive comment length
        self.sink.write_all(&eocd)?;
        self.archive_size += eocd.len() as u64;

        self.sink.flush()?;
        self.finalized = true;
        Ok((self.sink, self.archive_size))
    }
}

struct CentralRecord<'a> {
    version_made_by: u16,
    bit_flag: u16,
    method: u16,
    dos: DosDateTime,
    crc: u32,
    comp_size: u64,
    uncomp_size: u64,
    internal_attr: u16,
    external_attr: u32,
    local_header_ofs: u64,
    name: &'a [u8],
    extra: &'a [u8],
    comment: &'a [u8],
}

fn effective_external_attr(current: &CurrentEntry) -> u32 {
    let mut attr = current.options.external_attr;
    if current.name.ends_with(b"/") {
        attr |= DOS_ATTR_DIRECTORY;
    }
    attr
}

fn validate_entry_name(name: &str, ascii_only: bool) -> Result<()> {
    if name.is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name.contains(':')
        || name.len() > usize::from(u16::MAX)
    {
        return Err(ZipError::InvalidFilename);
    }
    if ascii_only && !name.is_ascii() {
        return Err(ZipError::InvalidFilename);
    }
    Ok(())
}

/// Copy an extra-data blob, dropping every occurrence of field `id`.
fn strip_extra_field(extra: &[u8], id: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(extra.len());
    let mut i = 0usize;
    while i + 4 <= extra.len() {
        let field_id = read_u16(extra, i);
        let field_len = read_u16(extra, i + 2) as usize;
        if i + 4 + field_len > extra.len() {
            break;
        }
        if field_id != id {
            out.extend_from_slice(&extra[i..i + 4 + field_len]);
        }
        i += 4 + field_len;
    }
    out
}

/// Open-or-create `path`, append one entry, finalize, and truncate: the
/// everything-in-one-call way to drop a buffer into an archive on disk.
pub fn add_bytes_to_archive<P: AsRef<Path>>(
    path: P,
    name: &str,
    data: &[u8],
    options: EntryOptions,
) -> Result<()> {
    let path = path.as_ref();
    let exists = path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    let mut writer = if exists {
        ZipWriter::append_path(path)?
    } else {
        ZipWriter::create(path)?
    };
    writer.add_bytes(name, data, options)?;
    writer.finish_and_truncate()
}

//! ZIP archive reader
//!
//! Loads the whole central directory into memory as one byte image, indexes
//! it per entry, and streams extraction through the built-in DEFLATE
//! decoder. The byte source only needs `Read + Seek`; reading never touches
//! anything outside the archive bounds discovered at open time.

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::checksum::{crc32, CRC32_INIT};
use crate::error::{Result, ZipError};
use crate::format::*;
use crate::inflate::{
    decompress, Decompressor, InflateStatus, FLAG_HAS_MORE_INPUT,
    FLAG_USING_NON_WRAPPING_OUTPUT_BUF,
};

/// Match filenames exactly instead of ASCII case-insensitively.
pub const FLAG_CASE_SENSITIVE: u32 = 0x0100;
/// Compare only the part of the name after the last `/`.
pub const FLAG_IGNORE_PATH: u32 = 0x0200;
/// Hand back the raw compressed bytes instead of decompressing.
pub const FLAG_COMPRESSED_DATA: u32 = 0x0400;
/// Skip building the sorted name index at open time.
pub const FLAG_DO_NOT_SORT_CENTRAL_DIRECTORY: u32 = 0x0800;
/// Validate header consistency only, without decompressing the data.
pub const FLAG_VALIDATE_HEADERS_ONLY: u32 = 0x2000;

/// Largest filename/comment slice exposed through [`ZipEntry`].
const MAX_STAT_STRING: usize = 512;

const EXTRACT_CHUNK: usize = 64 * 1024;
const WINDOW_SIZE: usize = 32 * 1024;

/// Decoded view of one central directory record.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub file_index: u32,
    pub central_dir_ofs: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub bit_flag: u16,
    pub method: u16,
    pub mtime: DosDateTime,
    pub crc32: u32,
    pub comp_size: u64,
    pub uncomp_size: u64,
    pub internal_attr: u16,
    pub external_attr: u32,
    pub local_header_ofs: u64,
    pub comment_size: u16,
    pub name: String,
    pub comment: String,
}

impl ZipEntry {
    /// A directory entry: trailing `/` in the name, or the DOS DIR bit.
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/') || self.external_attr & DOS_ATTR_DIRECTORY != 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.bit_flag & (GP_FLAG_ENCRYPTED | GP_FLAG_STRONG_ENCRYPTION) != 0
    }

    /// Stored or deflated, and free of encryption and patch data.
    pub fn is_supported(&self) -> bool {
        (self.method == METHOD_STORED || self.method == METHOD_DEFLATED)
            && !self.is_encrypted()
            && self.bit_flag & GP_FLAG_PATCH_DATA == 0
    }
}

/// ZIP archive reader over a seekable byte source.
pub struct ZipReader<R: Read + Seek> {
    source: R,
    archive_size: u64,
    central_dir: Vec<u8>,
    entry_offsets: Vec<u32>,
    sorted_index: Vec<u32>,
    cd_file_ofs: u64,
    zip64: bool,
    zip64_extended_info: bool,
}

impl ZipReader<BufReader<File>> {
    /// Open an archive file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl ZipReader<Cursor<Vec<u8>>> {
    /// Read an archive held entirely in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::new(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> ZipReader<R> {
    pub fn new(source: R) -> Result<Self> {
        Self::with_flags(source, 0)
    }

    /// Open with reader flags (`FLAG_DO_NOT_SORT_CENTRAL_DIRECTORY`, ...).
    pub fn with_flags(mut source: R, flags: u32) -> Result<Self> {
        let archive_size = source.seek(SeekFrom::End(0))?;
        if archive_size < END_OF_CENTRAL_DIR_SIZE as u64 {
            return Err(ZipError::NotAnArchive);
        }

        let eocd_ofs = Self::find_eocd(&mut source, archive_size)?;
        let mut eocd = [0u8; END_OF_CENTRAL_DIR_SIZE];
        source.seek(SeekFrom::Start(eocd_ofs))?;
        source.read_exact(&mut eocd)?;

        let num_this_disk = read_u16(&eocd, 4);
        let cd_disk = read_u16(&eocd, 6);
        if !(num_this_disk == 0 && cd_disk == 0) && !(num_this_disk == 1 && cd_disk == 1) {
            return Err(ZipError::UnsupportedMultiDisk);
        }

        let mut total_files = u64::from(read_u16(&eocd, 10));
        let mut cd_size = u64::from(read_u32(&eocd, 12));
        let mut cd_file_ofs = u64::from(read_u32(&eocd, 16));
        let mut zip64 = false;

        // ZIP64: a locator may sit immediately before the EOCD
        let locator_size = ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE as u64;
        if eocd_ofs >= locator_size + ZIP64_END_OF_CENTRAL_DIR_SIZE as u64 {
            let locator_ofs = eocd_ofs - locator_size;
            let mut locator = [0u8; ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIZE];
            source.seek(SeekFrom::Start(locator_ofs))?;
            source.read_exact(&mut locator)?;
            if read_u32(&locator, 0) == ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG {
                let zip64_eocd_ofs = read_u64(&locator, 8);
                if zip64_eocd_ofs + ZIP64_END_OF_CENTRAL_DIR_SIZE as u64 <= archive_size {
                    let mut z64 = [0u8; ZIP64_END_OF_CENTRAL_DIR_SIZE];
                    source.seek(SeekFrom::Start(zip64_eocd_ofs))?;
                    source.read_exact(&mut z64)?;
                    if read_u32(&z64, 0) == ZIP64_END_OF_CENTRAL_DIR_SIG {
                        zip64 = true;
                        total_files = read_u64(&z64, 32);
                        cd_size = read_u64(&z64, 40);
                        cd_file_ofs = read_u64(&z64, 48);
                    }
                }
            }
        }

        if !zip64
            && (read_u16(&eocd, 10) == 0xFFFF
                || read_u32(&eocd, 12) == 0xFFFF_FFFF
                || read_u32(&eocd, 16) == 0xFFFF_FFFF)
        {
            return Err(ZipError::InvalidHeader("zip64 markers without zip64 records"));
        }
        if total_files > u64::from(u32::MAX) {
            return Err(ZipError::TooManyFiles);
        }
        if cd_size >= u64::from(u32::MAX) {
            return Err(ZipError::UnsupportedCdirSize);
        }
        if cd_file_ofs
            .checked_add(cd_size)
            .map_or(true, |end| end > archive_size)
        {
            return Err(ZipError::InvalidHeader("central directory out of bounds"));
        }
        if total_files > 0 && cd_size < CENTRAL_DIR_HEADER_SIZE as u64 {
            return Err(ZipError::InvalidHeader("central directory too small"));
        }

        let mut central_dir = vec![0u8; cd_size as usize];
        source.seek(SeekFrom::Start(cd_file_ofs))?;
        source.read_exact(&mut central_dir)?;

        let mut entry_offsets = Vec::with_capacity(total_files as usize);
        let mut zip64_extended_info = false;
        let mut ofs = 0usize;
        for _ in 0..total_files {
            if ofs + CENTRAL_DIR_HEADER_SIZE > central_dir.len()
                || read_u32(&central_dir, ofs) != CENTRAL_DIR_HEADER_SIG
            {
                return Err(ZipError::InvalidHeader("bad central directory record"));
            }
            let name_len = read_u16(&central_dir, ofs + 28) as usize;
            let extra_len = read_u16(&central_dir, ofs + 30) as usize;
            let comment_len = read_u16(&central_dir, ofs + 32) as usize;
            let record_len = CENTRAL_DIR_HEADER_SIZE + name_len + extra_len + comment_len;
            if ofs + record_len > central_dir.len() {
                return Err(ZipError::InvalidHeader("truncated central directory record"));
            }
            let sentinel = read_u32(&central_dir, ofs + 20) == 0xFFFF_FFFF
                || read_u32(&central_dir, ofs + 24) == 0xFFFF_FFFF
                || read_u32(&central_dir, ofs + 42) == 0xFFFF_FFFF;
            if sentinel && extra_len >= 4 {
                let extra = &central_dir[ofs + CENTRAL_DIR_HEADER_SIZE + name_len
                    ..ofs + CENTRAL_DIR_HEADER_SIZE + name_len + extra_len];
                if find_extra_field(extra, ZIP64_EXTRA_FIELD_ID).is_some() {
                    zip64_extended_info = true;
                }
            }
            entry_offsets.push(ofs as u32);
            ofs += record_len;
        }

        let mut reader = ZipReader {
            source,
            archive_size,
            central_dir,
            entry_offsets,
            sorted_index: Vec::new(),
            cd_file_ofs,
            zip64,
            zip64_extended_info,
        };
        if flags & FLAG_DO_NOT_SORT_CENTRAL_DIRECTORY == 0 {
            reader.build_sorted_index();
        }
        Ok(reader)
    }

    fn find_eocd(source: &mut R, archive_size: u64) -> Result<u64> {
        let search_start = archive_size.saturating_sub(EOCD_SEARCH_WINDOW);
        source.seek(SeekFrom::Start(search_start))?;
        let mut buf = Vec::with_capacity((archive_size - search_start) as usize);
        source.read_to_end(&mut buf)?;
        let sig = END_OF_CENTRAL_DIR_SIG.to_le_bytes();
        for i in (0..buf.len().saturating_sub(END_OF_CENTRAL_DIR_SIZE - 1)).rev() {
            if buf[i..i + 4] == sig {
                return Ok(search_start + i as u64);
            }
        }
        Err(ZipError::FailedFindingCentralDir)
    }

    fn build_sorted_index(&mut self) {
        let mut index: Vec<u32> = (0..self.entry_offsets.len() as u32).collect();
        let dir = &self.central_dir;
        let offsets = &self.entry_offsets;
        index.sort_unstable_by(|&a, &b| {
            let na = raw_name(dir, offsets[a as usize] as usize);
            let nb = raw_name(dir, offsets[b as usize] as usize);
            cmp_name_ci(na, nb)
        });
        self.sorted_index = index;
    }

    /// Number of entries in the archive.
    pub fn len(&self) -> usize {
        self.entry_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_offsets.is_empty()
    }

    /// Whole-archive size in bytes, as discovered at open time.
    pub fn archive_size(&self) -> u64 {
        self.archive_size
    }

    /// True when the archive carries ZIP64 end-of-central-directory records.
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    /// True when any entry relies on the ZIP64 extended information field.
    pub fn has_zip64_extended_info(&self) -> bool {
        self.zip64_extended_info
    }

    /// Decode the central directory record of entry `index`.
    pub fn stat(&self, index: usize) -> Result<ZipEntry> {
        let ofs = *self
            .entry_offsets
            .get(index)
            .ok_or(ZipError::InvalidParameter("entry index out of range"))?
            as usize;
        let dir = &self.central_dir;

        let name_len = read_u16(dir, ofs + 28) as usize;
        let extra_len = read_u16(dir, ofs + 30) as usize;
        let comment_len = read_u16(dir, ofs + 32) as usize;

        let mut comp_size = u64::from(read_u32(dir, ofs + 20));
        let mut uncomp_size = u64::from(read_u32(dir, ofs + 24));
        let mut local_header_ofs = u64::from(read_u32(dir, ofs + 42));

        // the ZIP64 extra overrides any field that reads 0xFFFFFFFF, whether
        // or not the archive-level ZIP64 records are present
        let extra = &dir[ofs + CENTRAL_DIR_HEADER_SIZE + name_len
            ..ofs + CENTRAL_DIR_HEADER_SIZE + name_len + extra_len];
        if let Some(field) = find_extra_field(extra, ZIP64_EXTRA_FIELD_ID) {
            let mut cursor = 0usize;
            if uncomp_size == 0xFFFF_FFFF && cursor + 8 <= field.len() {
                uncomp_size = read_u64(field, cursor);
                cursor += 8;
            }
            if comp_size == 0xFFFF_FFFF && cursor + 8 <= field.len() {
                comp_size = read_u64(field, cursor);
                cursor += 8;
            }
            if local_header_ofs == 0xFFFF_FFFF && cursor + 8 <= field.len() {
                local_header_ofs = read_u64(field, cursor);
            }
        }

        let name_bytes = &dir[ofs + CENTRAL_DIR_HEADER_SIZE
            ..ofs + CENTRAL_DIR_HEADER_SIZE + name_len.min(MAX_STAT_STRING)];
        let comment_start = ofs + CENTRAL_DIR_HEADER_SIZE + name_len + extra_len;
        let comment_bytes =
            &dir[comment_start..comment_start + comment_len.min(MAX_STAT_STRING)];

        Ok(ZipEntry {
            file_index: index as u32,
            central_dir_ofs: ofs as u64,
            version_made_by: read_u16(dir, ofs + 4),
            version_needed: read_u16(dir, ofs + 6),
            bit_flag: read_u16(dir, ofs + 8),
            method: read_u16(dir, ofs + 10),
            mtime: DosDateTime::new(read_u16(dir, ofs + 12), read_u16(dir, ofs + 14)),
            crc32: read_u32(dir, ofs + 16),
            comp_size,
            uncomp_size,
            internal_attr: read_u16(dir, ofs + 36),
            external_attr: read_u32(dir, ofs + 38),
            local_header_ofs,
            comment_size: comment_len as u16,
            name: String::from_utf8_lossy(name_bytes).into_owned(),
            comment: String::from_utf8_lossy(comment_bytes).into_owned(),
        })
    }

    /// All entries, decoded. Convenience over [`Self::stat`].
    pub fn entries(&self) -> Result<Vec<ZipEntry>> {
        (0..self.len()).map(|i| self.stat(i)).collect()
    }

    /// Find an entry by name. Case-insensitive unless
    /// [`FLAG_CASE_SENSITIVE`]; [`FLAG_IGNORE_PATH`] compares only the final
    /// path component.
    pub fn locate(&self, name: &str, flags: u32) -> Option<usize> {
        self.locate_with_comment(name, None, flags)
    }

    /// Like [`Self::locate`], optionally also requiring an exact comment
    /// match.
    pub fn locate_with_comment(
        &self,
        name: &str,
        comment: Option<&str>,
        flags: u32,
    ) -> Option<usize> {
        let can_binary_search = !self.sorted_index.is_empty()
            && flags & (FLAG_CASE_SENSITIVE | FLAG_IGNORE_PATH) == 0
            && comment.is_none();
        if can_binary_search {
            let target = name.as_bytes();
            let mut lo = 0usize;
            let mut hi = self.sorted_index.len();
            while lo < hi {
                let mid = (lo + hi) / 2;
                let entry_ofs = self.entry_offsets[self.sorted_index[mid] as usize] as usize;
                let entry_name = raw_name(&self.central_dir, entry_ofs);
                match cmp_name_ci(entry_name, target) {
                    std::cmp::Ordering::Less => lo = mid + 1,
                    std::cmp::Ordering::Greater => hi = mid,
                    std::cmp::Ordering::Equal => return Some(self.sorted_index[mid] as usize),
                }
            }
            return None;
        }

        for (i, &ofs) in self.entry_offsets.iter().enumerate() {
            let ofs = ofs as usize;
            let entry_name = raw_name(&self.central_dir, ofs);
            if !name_matches(entry_name, name.as_bytes(), flags) {
                continue;
            }
            if let Some(want) = comment {
                let name_len = read_u16(&self.central_dir, ofs + 28) as usize;
                let extra_len = read_u16(&self.central_dir, ofs + 30) as usize;
                let comment_len = read_u16(&self.central_dir, ofs + 32) as usize;
                let start = ofs + CENTRAL_DIR_HEADER_SIZE + name_len + extra_len;
                if &self.central_dir[start..start + comment_len] != want.as_bytes() {
                    continue;
                }
            }
            return Some(i);
        }
        None
    }

    /// Position the source just past entry `index`'s local header and
    /// return the stat.
    fn seek_to_entry_data(&mut self, index: usize) -> Result<ZipEntry> {
        let entry = self.stat(index)?;
        if !entry.is_supported() {
            return if entry.is_encrypted() {
                Err(ZipError::UnsupportedEncryption)
            } else {
                Err(ZipError::UnsupportedMethod(entry.method))
            };
        }
        let mut header = [0u8; LOCAL_FILE_HEADER_SIZE];
        self.source.seek(SeekFrom::Start(entry.local_header_ofs))?;
        self.source.read_exact(&mut header)?;
        if read_u32(&header, 0) != LOCAL_FILE_HEADER_SIG {
            return Err(ZipError::InvalidHeader("bad local file header signature"));
        }
        let name_len = read_u16(&header, 26) as i64;
        let extra_len = read_u16(&header, 28) as i64;
        self.source.seek(SeekFrom::Current(name_len + extra_len))?;
        Ok(entry)
    }

    /// Extract entry `index` into a freshly allocated vector.
    pub fn extract_to_vec(&mut self, index: usize, flags: u32) -> Result<Vec<u8>> {
        let entry = self.seek_to_entry_data(index)?;
        if entry.uncomp_size > usize::MAX as u64 || entry.comp_size > usize::MAX as u64 {
            return Err(ZipError::FileTooLarge);
        }

        if entry.method == METHOD_STORED || flags & FLAG_COMPRESSED_DATA != 0 {
            let mut data = vec![0u8; entry.comp_size as usize];
            self.source.read_exact(&mut data)?;
            if flags & FLAG_COMPRESSED_DATA == 0 {
                let actual = crc32(CRC32_INIT, &data);
                if actual != entry.crc32 {
                    return Err(ZipError::CrcMismatch {
                        expected: entry.crc32,
                        actual,
                    });
                }
            }
            return Ok(data);
        }

        let mut output = vec![0u8; entry.uncomp_size as usize];
        let mut decomp = Box::new(Decompressor::new());
        let mut in_buf = vec![0u8; EXTRACT_CHUNK];
        let mut comp_remaining = entry.comp_size;
        let mut in_len = 0usize;
        let mut in_ofs = 0usize;
        let mut out_pos = 0usize;
        loop {
            if in_ofs == in_len {
                in_len = in_buf.len().min(comp_remaining as usize);
                if in_len > 0 {
                    self.source.read_exact(&mut in_buf[..in_len])?;
                    comp_remaining -= in_len as u64;
                }
                in_ofs = 0;
            }
            let inflate_flags = FLAG_USING_NON_WRAPPING_OUTPUT_BUF
                | if comp_remaining > 0 { FLAG_HAS_MORE_INPUT } else { 0 };
            let (status, consumed, produced) = decompress(
                &mut decomp,
                &in_buf[in_ofs..in_len],
                &mut output,
                out_pos,
                inflate_flags,
            );
            in_ofs += consumed;
            out_pos += produced;
            match status {
                InflateStatus::Done => break,
                InflateStatus::NeedsMoreInput if comp_remaining > 0 || in_ofs < in_len => {}
                InflateStatus::HasMoreOutput => {
                    // stream inflates past the declared size
                    return Err(ZipError::UnexpectedDecompressedSize {
                        expected: entry.uncomp_size,
                        actual: out_pos as u64 + 1,
                    });
                }
                other => return Err(ZipError::Decompression(other)),
            }
        }
        if out_pos as u64 != entry.uncomp_size {
            return Err(ZipError::UnexpectedDecompressedSize {
                expected: entry.uncomp_size,
                actual: out_pos as u64,
            });
        }
        let actual = crc32(CRC32_INIT, &output);
        if actual != entry.crc32 {
            return Err(ZipError::CrcMismatch {
                expected: entry.crc32,
                actual,
            });
        }
        Ok(output)
    }

    /// Extract an entry by name.
    pub fn extract_by_name(&mut self, name: &str, flags: u32) -> Result<Vec<u8>> {
        let index = self
            .locate(name, flags)
            .ok_or_else(|| ZipError::EntryNotFound(name.to_string()))?;
        self.extract_to_vec(index, flags)
    }

    /// Stream entry `index` into `sink` through a 32 KiB window, verifying
    /// the CRC on the way out.
    pub fn extract_to_writer<W: Write>(
        &mut self,
        index: usize,
        sink: &mut W,
        flags: u32,
    ) -> Result<u64> {
        let mut reader = self.entry_reader_with_flags(index, flags)?;
        let mut written = 0u64;
        let mut buf = [0u8; 8192];
        loop {
            let n = reader.read(&mut buf).map_err(unwrap_io_zip_error)?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])?;
            written += n as u64;
        }
        Ok(written)
    }

    /// Extract entry `index` to a file on disk.
    pub fn extract_to_file<P: AsRef<Path>>(&mut self, index: usize, path: P) -> Result<u64> {
        let mut file = File::create(path)?;
        self.extract_to_writer(index, &mut file, 0)
    }

    /// Incremental extraction: an `io::Read` that inflates on demand.
    pub fn entry_reader(&mut self, index: usize) -> Result<EntryReader<'_, R>> {
        self.entry_reader_with_flags(index, 0)
    }

    pub fn entry_reader_with_flags(
        &mut self,
        index: usize,
        flags: u32,
    ) -> Result<EntryReader<'_, R>> {
        let entry = self.seek_to_entry_data(index)?;
        let raw = entry.method == METHOD_STORED || flags & FLAG_COMPRESSED_DATA != 0;
        let check_crc = flags & FLAG_COMPRESSED_DATA == 0;
        Ok(EntryReader {
            archive: self,
            decomp: if raw {
                None
            } else {
                Some(Box::new(Decompressor::new()))
            },
            window: vec![0u8; WINDOW_SIZE],
            window_start: 0,
            window_end: 0,
            window_pos: 0,
            in_buf: vec![0u8; EXTRACT_CHUNK],
            in_len: 0,
            in_ofs: 0,
            comp_remaining: entry.comp_size,
            out_remaining: if raw { entry.comp_size } else { entry.uncomp_size },
            crc: CRC32_INIT,
            expected_crc: entry.crc32,
            check_crc,
            done: false,
        })
    }

    /// Cross-check entry `index` against its local header, then (unless
    /// [`FLAG_VALIDATE_HEADERS_ONLY`]) decompress it fully and verify CRC
    /// and size.
    pub fn validate_entry(&mut self, index: usize, flags: u32) -> Result<()> {
        let entry = self.stat(index)?;
        if !entry.is_supported() {
            return Err(ZipError::UnsupportedFeature("entry method or flags"));
        }

        let mut header = [0u8; LOCAL_FILE_HEADER_SIZE];
        self.source.seek(SeekFrom::Start(entry.local_header_ofs))?;
        self.source.read_exact(&mut header)?;
        if read_u32(&header, 0) != LOCAL_FILE_HEADER_SIG {
            return Err(ZipError::ValidationFailed("local header signature"));
        }
        if read_u16(&header, 8) != entry.method {
            return Err(ZipError::ValidationFailed("method mismatch"));
        }
        let cd_name = raw_name(&self.central_dir, entry.central_dir_ofs as usize).to_vec();
        let name_len = read_u16(&header, 26) as usize;
        if name_len != cd_name.len() {
            return Err(ZipError::ValidationFailed("filename length mismatch"));
        }
        let mut name = vec![0u8; name_len];
        self.source.read_exact(&mut name)?;
        if name != cd_name {
            return Err(ZipError::ValidationFailed("filename mismatch"));
        }

        if entry.is_directory() && entry.uncomp_size == 0 {
            return Ok(());
        }
        if flags & FLAG_VALIDATE_HEADERS_ONLY != 0 {
            return Ok(());
        }

        let bit_flag = read_u16(&header, 6);
        let mut sink = CountingCrcSink::default();
        match self.extract_to_writer(index, &mut sink, 0) {
            Ok(_) => {}
            Err(ZipError::CrcMismatch { .. }) => {
                return Err(ZipError::ValidationFailed("crc mismatch"))
            }
            Err(ZipError::UnexpectedDecompressedSize { .. }) => {
                return Err(ZipError::ValidationFailed("size mismatch"))
            }
            Err(e) => return Err(e),
        }
        if sink.count != entry.uncomp_size {
            return Err(ZipError::ValidationFailed("size mismatch"));
        }
        if sink.crc != entry.crc32 {
            return Err(ZipError::ValidationFailed("crc mismatch"));
        }

        // data descriptor, when the local header announced one
        if bit_flag & GP_FLAG_DATA_DESCRIPTOR != 0 {
            self.validate_data_descriptor(&entry)?;
        }
        Ok(())
    }

    fn validate_data_descriptor(&mut self, entry: &ZipEntry) -> Result<()> {
        let data_end =
            entry.local_header_ofs + self.local_header_total_size(entry)? + entry.comp_size;
        self.source.seek(SeekFrom::Start(data_end))?;
        let mut buf = [0u8; 24];
        let mut filled = 0usize;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(ZipError::Io(e)),
            }
        }

        // the descriptor signature is optional and the size width is not
        // self-describing; accept any interpretation that matches
        let ofs = if filled >= 4 && read_u32(&buf, 0) == DATA_DESCRIPTOR_SIG {
            4
        } else {
            0
        };
        if filled >= ofs + 12
            && read_u32(&buf, ofs) == entry.crc32
            && u64::from(read_u32(&buf, ofs + 4)) == entry.comp_size
            && u64::from(read_u32(&buf, ofs + 8)) == entry.uncomp_size
        {
            return Ok(());
        }
        if filled >= ofs + 20
            && read_u32(&buf, ofs) == entry.crc32
            && read_u64(&buf, ofs + 4) == entry.comp_size
            && read_u64(&buf, ofs + 12) == entry.uncomp_size
        {
            return Ok(());
        }
        Err(ZipError::ValidationFailed("data descriptor mismatch"))
    }

    fn local_header_total_size(&mut self, entry: &ZipEntry) -> Result<u64> {
        let mut header = [0u8; LOCAL_FILE_HEADER_SIZE];
        self.source.seek(SeekFrom::Start(entry.local_header_ofs))?;
        self.source.read_exact(&mut header)?;
        Ok(LOCAL_FILE_HEADER_SIZE as u64
            + u64::from(read_u16(&header, 26))
            + u64::from(read_u16(&header, 28)))
    }

    /// Validate every entry in the archive.
    pub fn validate(&mut self, flags: u32) -> Result<()> {
        for i in 0..self.len() {
            self.validate_entry(i, flags)?;
        }
        Ok(())
    }

    // Writer-side helpers for append mode and entry cloning.

    pub(crate) fn into_append_parts(self) -> (R, u64, Vec<u8>, Vec<u32>, bool) {
        (
            self.source,
            self.cd_file_ofs,
            self.central_dir,
            self.entry_offsets,
            self.zip64,
        )
    }

    pub(crate) fn central_dir_record(&self, index: usize) -> &[u8] {
        let ofs = self.entry_offsets[index] as usize;
        let name_len = read_u16(&self.central_dir, ofs + 28) as usize;
        let extra_len = read_u16(&self.central_dir, ofs + 30) as usize;
        let comment_len = read_u16(&self.central_dir, ofs + 32) as usize;
        &self.central_dir[ofs..ofs + CENTRAL_DIR_HEADER_SIZE + name_len + extra_len + comment_len]
    }

    /// Byte span of an entry's local header + data (+ data descriptor).
    pub(crate) fn raw_entry_span(&mut self, index: usize) -> Result<(u64, u64)> {
        let entry = self.stat(index)?;
        let header_size = self.local_header_total_size(&entry)?;
        let mut span = header_size + entry.comp_size;
        if entry.bit_flag & GP_FLAG_DATA_DESCRIPTOR != 0 {
            self.source
                .seek(SeekFrom::Start(entry.local_header_ofs + span))?;
            let mut buf = [0u8; 24];
            let mut filled = 0usize;
            while filled < buf.len() {
                match self.source.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(ZipError::Io(e)),
                }
            }
            let ofs = if filled >= 4 && read_u32(&buf, 0) == DATA_DESCRIPTOR_SIG {
                4
            } else {
                0
            };
            if filled >= ofs + 12
                && read_u32(&buf, ofs) == entry.crc32
                && u64::from(read_u32(&buf, ofs + 4)) == entry.comp_size
                && u64::from(read_u32(&buf, ofs + 8)) == entry.uncomp_size
            {
                span += (ofs + 12) as u64;
            } else if filled >= ofs + 20
                && read_u32(&buf, ofs) == entry.crc32
                && read_u64(&buf, ofs + 4) == entry.comp_size
                && read_u64(&buf, ofs + 12) == entry.uncomp_size
            {
                span += (ofs + 20) as u64;
            } else {
                return Err(ZipError::InvalidHeader("unrecognized data descriptor"));
            }
        }
        Ok((entry.local_header_ofs, span))
    }

    pub(crate) fn copy_raw_range<W: Write>(
        &mut self,
        start: u64,
        len: u64,
        sink: &mut W,
    ) -> Result<()> {
        self.source.seek(SeekFrom::Start(start))?;
        let mut remaining = len;
        let mut buf = [0u8; 8192];
        while remaining > 0 {
            let n = buf.len().min(remaining as usize);
            self.source.read_exact(&mut buf[..n])?;
            sink.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }
}

/// Streaming extraction handle; implements [`Read`] and verifies the CRC
/// when the last byte has been served.
pub struct EntryReader<'a, R: Read + Seek> {
    archive: &'a mut ZipReader<R>,
    decomp: Option<Box<Decompressor>>,
    window: Vec<u8>,
    window_start: usize,
    window_end: usize,
    window_pos: usize,
    in_buf: Vec<u8>,
    in_len: usize,
    in_ofs: usize,
    comp_remaining: u64,
    out_remaining: u64,
    crc: u32,
    expected_crc: u32,
    check_crc: bool,
    done: bool,
}

impl<R: Read + Seek> EntryReader<'_, R> {
    fn fill_input(&mut self) -> io::Result<()> {
        if self.in_ofs == self.in_len && self.comp_remaining > 0 {
            self.in_len = self.in_buf.len().min(self.comp_remaining as usize);
            self.archive
                .source
                .read_exact(&mut self.in_buf[..self.in_len])?;
            self.comp_remaining -= self.in_len as u64;
            self.in_ofs = 0;
        }
        Ok(())
    }

    fn finish_check(&mut self) -> io::Result<()> {
        self.done = true;
        if self.check_crc && self.crc != self.expected_crc {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                ZipError::CrcMismatch {
                    expected: self.expected_crc,
                    actual: self.crc,
                },
            ));
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for EntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.done {
            return Ok(0);
        }

        // raw passthrough (stored entries, or compressed-data mode)
        if self.decomp.is_none() {
            if self.out_remaining == 0 {
                self.finish_check()?;
                return Ok(0);
            }
            let n = buf.len().min(self.out_remaining as usize);
            self.archive.source.read_exact(&mut buf[..n])?;
            if self.check_crc {
                self.crc = crc32(self.crc, &buf[..n]);
            }
            self.out_remaining -= n as u64;
            if self.out_remaining == 0 {
                self.finish_check()?;
            }
            return Ok(n);
        }

        loop {
            // serve decoded bytes still sitting in the window
            if self.window_pos < self.window_end {
                let n = buf.len().min(self.window_end - self.window_pos);
                buf[..n].copy_from_slice(&self.window[self.window_pos..self.window_pos + n]);
                self.window_pos += n;
                return Ok(n);
            }
            if self.out_remaining == 0 {
                self.finish_check()?;
                return Ok(0);
            }

            self.fill_input()?;
            let flags = if self.comp_remaining > 0 {
                FLAG_HAS_MORE_INPUT
            } else {
                0
            };
            let decomp = self.decomp.as_mut().unwrap();
            let (status, consumed, produced) = decompress(
                decomp,
                &self.in_buf[self.in_ofs..self.in_len],
                &mut self.window,
                self.window_start,
                flags,
            );
            self.in_ofs += consumed;
            self.window_pos = self.window_start;
            self.window_end = self.window_start + produced;
            self.window_start = (self.window_start + produced) & (WINDOW_SIZE - 1);
            if self.check_crc && produced > 0 {
                self.crc = crc32(self.crc, &self.window[self.window_pos..self.window_end]);
            }
            if produced as u64 > self.out_remaining {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    ZipError::UnexpectedDecompressedSize {
                        expected: self.out_remaining,
                        actual: produced as u64,
                    },
                ));
            }
            self.out_remaining -= produced as u64;
            match status {
                InflateStatus::Done => {
                    if self.out_remaining != 0 {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            ZipError::UnexpectedDecompressedSize {
                                expected: self.out_remaining,
                                actual: 0,
                            },
                        ));
                    }
                }
                InflateStatus::HasMoreOutput => {}
                InflateStatus::NeedsMoreInput => {
                    if self.comp_remaining == 0 && self.in_ofs == self.in_len {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            ZipError::Decompression(status),
                        ));
                    }
                }
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        ZipError::Decompression(other),
                    ))
                }
            }
        }
    }
}

#[derive(Default)]
struct CountingCrcSink {
    crc: u32,
    count: u64,
}

impl Write for CountingCrcSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.crc = crc32(self.crc, buf);
        self.count += buf.len() as u64;
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn unwrap_io_zip_error(e: io::Error) -> ZipError {
    if e.get_ref().map_or(false, |r| r.is::<ZipError>()) {
        if let Ok(inner) = e.into_inner().unwrap().downcast::<ZipError>() {
            return *inner;
        }
        unreachable!()
    } else {
        ZipError::Io(e)
    }
}

fn raw_name(dir: &[u8], record_ofs: usize) -> &[u8] {
    let len = read_u16(dir, record_ofs + 28) as usize;
    &dir[record_ofs + CENTRAL_DIR_HEADER_SIZE..record_ofs + CENTRAL_DIR_HEADER_SIZE + len]
}

fn cmp_name_ci(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    let la = a.iter().map(|c| c.to_ascii_lowercase());
    let lb = b.iter().map(|c| c.to_ascii_lowercase());
    la.cmp(lb)
}

fn name_matches(entry_name: &[u8], wanted: &[u8], flags: u32) -> bool {
    let entry_name = if flags & FLAG_IGNORE_PATH != 0 {
        strip_path(entry_name)
    } else {
        entry_name
    };
    let wanted = if flags & FLAG_IGNORE_PATH != 0 {
        strip_path(wanted)
    } else {
        wanted
    };
    if flags & FLAG_CASE_SENSITIVE != 0 {
        entry_name == wanted
    } else {
        entry_name.len() == wanted.len()
            && cmp_name_ci(entry_name, wanted) == std::cmp::Ordering::Equal
    }
}

fn strip_path(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&c| c == b'/') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Walk an extra-data blob and return the payload of field `id`.
pub(crate) fn find_extra_field(extra: &[u8], id: u16) -> Option<&[u8]> {
    let mut i = 0usize;
    while i + 4 <= extra.len() {
        let field_id = read_u16(extra, i);
        let field_len = read_u16(extra, i + 2) as usize;
        i += 4;
        if i + field_len > extra.len() {
            return None;
        }
        if field_id == id {
            return Some(&extra[i..i + field_len]);
        }
        i += field_len;
    }
    None
}

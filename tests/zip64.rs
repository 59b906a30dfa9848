use std::fs::File;
use std::io::Write;
use tempfile::tempdir;
use zflate::{EntryOptions, ZipReader, ZipWriter};

// Craft a minimal ZIP64 archive by hand: one stored entry with 0xFFFFFFFF
// placeholders, a central directory with the ZIP64 extra field, a ZIP64
// EOCD record and locator, and a classic EOCD full of sentinels.

#[test]
fn read_crafted_zip64_archive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zip64_test.zip");
    let mut f = File::create(&path).unwrap();

    let data = b"hello";
    let crc = zflate::crc32(0, data);

    // local file header (stored, data descriptor bit set)
    f.write_all(&[0x50, 0x4b, 0x03, 0x04]).unwrap();
    f.write_all(&[45, 0]).unwrap(); // version needed
    f.write_all(&[8, 0]).unwrap(); // flags (bit 3)
    f.write_all(&[0, 0]).unwrap(); // method = stored
    f.write_all(&[0, 0, 0, 0]).unwrap(); // mod time/date
    f.write_all(&crc.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // comp size
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // uncomp size
    f.write_all(&5u16.to_le_bytes()).unwrap(); // name len
    f.write_all(&0u16.to_le_bytes()).unwrap(); // extra len
    f.write_all(b"a.txt").unwrap();

    f.write_all(data).unwrap();

    // ZIP64-style data descriptor (64-bit sizes)
    f.write_all(&[0x50, 0x4b, 0x07, 0x08]).unwrap();
    f.write_all(&crc.to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u64).to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u64).to_le_bytes()).unwrap();

    let cd_start = 30 + 5 + data.len() as u64 + 24;

    // central directory record with ZIP64 extra
    f.write_all(&[0x50, 0x4b, 0x01, 0x02]).unwrap();
    f.write_all(&[45, 3]).unwrap(); // version made by
    f.write_all(&[45, 0]).unwrap(); // version needed
    f.write_all(&[8, 0]).unwrap(); // flags
    f.write_all(&[0, 0]).unwrap(); // method
    f.write_all(&[0, 0, 0, 0]).unwrap(); // time/date
    f.write_all(&crc.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // comp size
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // uncomp size
    f.write_all(&5u16.to_le_bytes()).unwrap(); // name len
    f.write_all(&28u16.to_le_bytes()).unwrap(); // extra len
    f.write_all(&0u16.to_le_bytes()).unwrap(); // comment len
    f.write_all(&0u16.to_le_bytes()).unwrap(); // disk start
    f.write_all(&0u16.to_le_bytes()).unwrap(); // internal attrs
    f.write_all(&0u32.to_le_bytes()).unwrap(); // external attrs
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // local header ofs
    f.write_all(b"a.txt").unwrap();
    // ZIP64 extra: uncompressed, compressed, local header offset
    f.write_all(&0x0001u16.to_le_bytes()).unwrap();
    f.write_all(&24u16.to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u64).to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u64).to_le_bytes()).unwrap();
    f.write_all(&0u64.to_le_bytes()).unwrap();

    let cd_size = 46 + 5 + 28;
    let zip64_eocd_start = cd_start + cd_size;

    // ZIP64 EOCD record
    f.write_all(&[0x50, 0x4b, 0x06, 0x06]).unwrap();
    f.write_all(&44u64.to_le_bytes()).unwrap();
    f.write_all(&[45, 0]).unwrap();
    f.write_all(&[45, 0]).unwrap();
    f.write_all(&0u32.to_le_bytes()).unwrap();
    f.write_all(&0u32.to_le_bytes()).unwrap();
    f.write_all(&1u64.to_le_bytes()).unwrap();
    f.write_all(&1u64.to_le_bytes()).unwrap();
    f.write_all(&cd_size.to_le_bytes()).unwrap();
    f.write_all(&cd_start.to_le_bytes()).unwrap();

    // ZIP64 EOCD locator
    f.write_all(&[0x50, 0x4b, 0x06, 0x07]).unwrap();
    f.write_all(&0u32.to_le_bytes()).unwrap();
    f.write_all(&zip64_eocd_start.to_le_bytes()).unwrap();
    f.write_all(&1u32.to_le_bytes()).unwrap();

    // classic EOCD with sentinels
    f.write_all(&[0x50, 0x4b, 0x05, 0x06]).unwrap();
    f.write_all(&0u16.to_le_bytes()).unwrap();
    f.write_all(&0u16.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFu16.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFu16.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
    f.write_all(&0u16.to_le_bytes()).unwrap();
    f.flush().unwrap();

    let mut reader = ZipReader::open(&path).unwrap();
    assert!(reader.is_zip64());
    assert_eq!(reader.len(), 1);
    let entry = reader.stat(0).unwrap();
    assert_eq!(entry.name, "a.txt");
    assert_eq!(entry.uncomp_size, data.len() as u64);
    assert_eq!(entry.comp_size, data.len() as u64);
    assert_eq!(entry.local_header_ofs, 0);
    assert_eq!(reader.extract_to_vec(0, 0).unwrap(), data);
    reader.validate(0).unwrap();
}

// The "archives that aren't marked zip64 but use zip64 ext data" case: a
// classic EOCD with real values, but a CD record whose sizes are sentinels
// resolved through the 0x0001 extra field.

#[test]
fn zip64_extra_honored_without_archive_markers() {
    let mut bytes = Vec::new();
    let data = b"hello";
    let crc = zflate::crc32(0, data);

    bytes.extend_from_slice(&[0x50, 0x4b, 0x03, 0x04]);
    bytes.extend_from_slice(&[20, 0]);
    bytes.extend_from_slice(&[0, 0]); // no descriptor bit
    bytes.extend_from_slice(&[0, 0]); // stored
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&5u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(b"b.txt");
    bytes.extend_from_slice(data);

    let cd_start = bytes.len() as u32;
    bytes.extend_from_slice(&[0x50, 0x4b, 0x01, 0x02]);
    bytes.extend_from_slice(&[20, 3]);
    bytes.extend_from_slice(&[20, 0]);
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // comp sentinel
    bytes.extend_from_slice(&0xFFFFFFFFu32.to_le_bytes()); // uncomp sentinel
    bytes.extend_from_slice(&5u16.to_le_bytes());
    bytes.extend_from_slice(&20u16.to_le_bytes()); // extra len
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes()); // real local header ofs
    bytes.extend_from_slice(b"b.txt");
    bytes.extend_from_slice(&0x0001u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(&(data.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&(data.len() as u64).to_le_bytes());
    let cd_size = bytes.len() as u32 - cd_start;

    bytes.extend_from_slice(&[0x50, 0x4b, 0x05, 0x06]);
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&cd_size.to_le_bytes());
    bytes.extend_from_slice(&cd_start.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());

    let mut reader = ZipReader::from_bytes(bytes).unwrap();
    assert!(!reader.is_zip64());
    assert!(reader.has_zip64_extended_info());
    let entry = reader.stat(0).unwrap();
    assert_eq!(entry.uncomp_size, data.len() as u64);
    assert_eq!(entry.comp_size, data.len() as u64);
    assert_eq!(reader.extract_to_vec(0, 0).unwrap(), data);
}

#[test]
fn forced_zip64_archives_carry_the_records() {
    let mut writer = ZipWriter::in_memory().with_zip64();
    writer
        .add_bytes("small.txt", b"tiny", EntryOptions::default())
        .unwrap();
    let bytes = writer.finish_into_bytes().unwrap();

    let zip64_eocd_sig = [0x50u8, 0x4b, 0x06, 0x06];
    let locator_sig = [0x50u8, 0x4b, 0x06, 0x07];
    assert!(bytes.windows(4).any(|w| w == zip64_eocd_sig));
    assert!(bytes.windows(4).any(|w| w == locator_sig));

    let mut reader = ZipReader::from_bytes(bytes).unwrap();
    assert!(reader.is_zip64());
    assert_eq!(reader.extract_by_name("small.txt", 0).unwrap(), b"tiny");
    reader.validate(0).unwrap();
}

#[test]
fn small_archives_stay_classic() {
    let mut writer = ZipWriter::in_memory();
    writer
        .add_bytes("small.txt", b"tiny", EntryOptions::default())
        .unwrap();
    let bytes = writer.finish_into_bytes().unwrap();

    let zip64_eocd_sig = [0x50u8, 0x4b, 0x06, 0x06];
    assert!(!bytes.windows(4).any(|w| w == zip64_eocd_sig));
    let reader = ZipReader::from_bytes(bytes).unwrap();
    assert!(!reader.is_zip64());
}

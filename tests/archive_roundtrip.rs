use std::io::Read;
use std::time::{Duration, UNIX_EPOCH};

use tempfile::tempdir;
use zflate::reader::{FLAG_CASE_SENSITIVE, FLAG_COMPRESSED_DATA, FLAG_IGNORE_PATH};
use zflate::{add_bytes_to_archive, decompress_to_vec, EntryOptions, ZipReader, ZipWriter};

fn lorem(size: usize) -> Vec<u8> {
    let pattern = b"Lorem ipsum dolor sit amet, consectetur adipiscing elit. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

#[test]
fn two_entry_archive_roundtrip() {
    let mut writer = ZipWriter::in_memory();
    writer
        .add_bytes("a.txt", b"A", EntryOptions::default())
        .unwrap();
    writer.add_directory("b", EntryOptions::default()).unwrap();
    let bytes = writer.finish_into_bytes().unwrap();

    let mut reader = ZipReader::from_bytes(bytes).unwrap();
    assert_eq!(reader.len(), 2);
    let a_index = reader.locate("a.txt", 0).expect("a.txt present");
    let b_index = reader.locate("b/", 0).expect("b/ present");
    assert!(reader.stat(b_index).unwrap().is_directory());
    assert!(!reader.stat(a_index).unwrap().is_directory());
    assert_eq!(reader.extract_to_vec(a_index, 0).unwrap(), b"A");
}

#[test]
fn many_entries_with_metadata_roundtrip() {
    // 2024-03-15 12:34:56 UTC
    let mtime = UNIX_EPOCH + Duration::from_secs(1_710_506_096);
    let mut writer = ZipWriter::in_memory();
    let mut originals = Vec::new();
    for i in 0..40 {
        let data = lorem(i * 700);
        let options = EntryOptions::default()
            .level((i % 11) as u32)
            .comment(format!("entry {}", i))
            .mtime(mtime)
            .external_attr(0o100644 << 16);
        writer
            .add_bytes(&format!("dir{}/file{}.txt", i % 4, i), &data, options)
            .unwrap();
        originals.push(data);
    }
    let bytes = writer.finish_into_bytes().unwrap();

    let mut reader = ZipReader::from_bytes(bytes).unwrap();
    assert_eq!(reader.len(), 40);
    for i in 0..40 {
        let index = reader
            .locate(&format!("dir{}/file{}.txt", i % 4, i), 0)
            .unwrap();
        let entry = reader.stat(index).unwrap();
        assert_eq!(entry.comment, format!("entry {}", i));
        assert_eq!(entry.uncomp_size, originals[i].len() as u64);
        assert_eq!(entry.mtime.year(), 2024);
        assert_eq!(entry.mtime.second(), 56);
        assert_eq!(entry.external_attr, 0o100644 << 16);
        assert_eq!(reader.extract_to_vec(index, 0).unwrap(), originals[i]);
    }
    reader.validate(0).unwrap();
}

#[test]
fn locate_flags() {
    let mut writer = ZipWriter::in_memory();
    writer
        .add_bytes("Path/To/File.TXT", b"x", EntryOptions::default())
        .unwrap();
    let bytes = writer.finish_into_bytes().unwrap();
    let reader = ZipReader::from_bytes(bytes).unwrap();

    assert!(reader.locate("path/to/file.txt", 0).is_some());
    assert!(reader.locate("path/to/file.txt", FLAG_CASE_SENSITIVE).is_none());
    assert!(reader.locate("Path/To/File.TXT", FLAG_CASE_SENSITIVE).is_some());
    assert!(reader.locate("file.txt", FLAG_IGNORE_PATH).is_some());
    assert!(reader.locate("file.txt", 0).is_none());
}

#[test]
fn alignment_pads_local_headers() {
    let mut writer = ZipWriter::in_memory().with_alignment(4096).unwrap();
    for i in 0..5 {
        writer
            .add_bytes(&format!("f{}", i), &lorem(1000 + i * 37), EntryOptions::default())
            .unwrap();
    }
    let bytes = writer.finish_into_bytes().unwrap();
    let mut reader = ZipReader::from_bytes(bytes).unwrap();
    for i in 0..reader.len() {
        let entry = reader.stat(i).unwrap();
        assert_eq!(entry.local_header_ofs % 4096, 0, "entry {}", i);
        reader.validate_entry(i, 0).unwrap();
    }
}

#[test]
fn corrupted_cd_crc_fails_only_that_entry() {
    let mut writer = ZipWriter::in_memory();
    writer
        .add_bytes("good1.txt", &lorem(5000), EntryOptions::default())
        .unwrap();
    writer
        .add_bytes("victim.txt", &lorem(6000), EntryOptions::default())
        .unwrap();
    writer
        .add_bytes("good2.txt", &lorem(7000), EntryOptions::default())
        .unwrap();
    let mut bytes = writer.finish_into_bytes().unwrap();

    // find victim.txt's central directory record and flip its CRC bytes
    let sig = [0x50u8, 0x4b, 0x01, 0x02];
    let mut found = false;
    let mut i = 0usize;
    while i + 46 <= bytes.len() {
        if bytes[i..i + 4] == sig {
            let name_len =
                u16::from_le_bytes([bytes[i + 28], bytes[i + 29]]) as usize;
            if &bytes[i + 46..i + 46 + name_len] == b"victim.txt" {
                for b in &mut bytes[i + 16..i + 20] {
                    *b ^= 0xFF;
                }
                found = true;
                break;
            }
        }
        i += 1;
    }
    assert!(found, "central directory record not found");

    let mut reader = ZipReader::from_bytes(bytes).unwrap();
    let victim = reader.locate("victim.txt", 0).unwrap();
    for index in 0..reader.len() {
        let result = reader.validate_entry(index, 0);
        if index == victim {
            assert!(
                matches!(result, Err(zflate::ZipError::ValidationFailed(_))),
                "victim validated: {:?}",
                result
            );
        } else {
            result.unwrap();
        }
    }
}

#[test]
fn entry_reader_streams_incrementally() {
    let data = lorem(100_000);
    let mut writer = ZipWriter::in_memory();
    writer
        .add_bytes("big.txt", &data, EntryOptions::default())
        .unwrap();
    let bytes = writer.finish_into_bytes().unwrap();

    let mut reader = ZipReader::from_bytes(bytes).unwrap();
    let mut entry_reader = reader.entry_reader(0).unwrap();
    let mut restored = Vec::new();
    let mut chunk = [0u8; 7];
    loop {
        let n = entry_reader.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        restored.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(restored, data);
}

#[test]
fn compressed_data_flag_returns_raw_deflate() {
    let data = lorem(20_000);
    let mut writer = ZipWriter::in_memory();
    writer
        .add_bytes("f.bin", &data, EntryOptions::default())
        .unwrap();
    let bytes = writer.finish_into_bytes().unwrap();

    let mut reader = ZipReader::from_bytes(bytes).unwrap();
    let raw = reader.extract_to_vec(0, FLAG_COMPRESSED_DATA).unwrap();
    assert_eq!(raw.len() as u64, reader.stat(0).unwrap().comp_size);
    assert_eq!(decompress_to_vec(&raw).unwrap(), data);
}

#[test]
fn stored_entries_roundtrip() {
    let data = lorem(10_000);
    let mut writer = ZipWriter::in_memory();
    writer
        .add_bytes("stored.bin", &data, EntryOptions::default().level(0))
        .unwrap();
    let bytes = writer.finish_into_bytes().unwrap();

    let mut reader = ZipReader::from_bytes(bytes).unwrap();
    let entry = reader.stat(0).unwrap();
    assert_eq!(entry.method, 0);
    assert_eq!(entry.comp_size, entry.uncomp_size);
    assert_eq!(reader.extract_to_vec(0, 0).unwrap(), data);
    reader.validate(0).unwrap();
}

#[test]
fn set_sizes_in_header_rewrites_local_header() {
    let data = lorem(15_000);
    let mut writer = ZipWriter::in_memory();
    writer
        .add_bytes(
            "patched.bin",
            &data,
            EntryOptions::default().set_sizes_in_header(),
        )
        .unwrap();
    let bytes = writer.finish_into_bytes().unwrap();

    // local header at offset 0: sizes must no longer be placeholders
    let comp = u32::from_le_bytes(bytes[18..22].try_into().unwrap());
    let uncomp = u32::from_le_bytes(bytes[22..26].try_into().unwrap());
    assert_eq!(uncomp as usize, data.len());
    assert!(comp > 0 && (comp as usize) < data.len());

    let mut reader = ZipReader::from_bytes(bytes).unwrap();
    assert_eq!(reader.extract_to_vec(0, 0).unwrap(), data);
    reader.validate(0).unwrap();
}

#[test]
fn append_in_place_keeps_existing_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("appended.zip");

    let mut writer = ZipWriter::create(&path).unwrap();
    writer
        .add_bytes("one.txt", b"first entry", EntryOptions::default())
        .unwrap();
    writer
        .add_bytes("two.txt", &lorem(30_000), EntryOptions::default())
        .unwrap();
    writer.finish().unwrap();
    let initial_size = std::fs::metadata(&path).unwrap().len();

    add_bytes_to_archive(&path, "three.txt", b"appended later", EntryOptions::default()).unwrap();

    let mut reader = ZipReader::open(&path).unwrap();
    assert_eq!(reader.len(), 3);
    assert_eq!(
        reader.extract_by_name("one.txt", 0).unwrap(),
        b"first entry"
    );
    assert_eq!(reader.extract_by_name("two.txt", 0).unwrap(), lorem(30_000));
    assert_eq!(
        reader.extract_by_name("three.txt", 0).unwrap(),
        b"appended later"
    );
    reader.validate(0).unwrap();

    // the rewritten archive was truncated to its exact size
    let final_size = std::fs::metadata(&path).unwrap().len();
    assert_eq!(final_size, reader.archive_size());
    assert!(final_size > initial_size);
}

#[test]
fn clone_entries_between_archives() {
    let data_a = lorem(40_000);
    let data_b = lorem(123);
    let mut writer = ZipWriter::in_memory();
    writer
        .add_bytes("a.bin", &data_a, EntryOptions::default().comment("keep me"))
        .unwrap();
    writer
        .add_bytes("b.bin", &data_b, EntryOptions::default().level(0))
        .unwrap();
    let source_bytes = writer.finish_into_bytes().unwrap();

    let mut source = ZipReader::from_bytes(source_bytes).unwrap();
    let mut dest = ZipWriter::in_memory();
    dest.add_bytes("own.txt", b"native entry", EntryOptions::default())
        .unwrap();
    dest.add_entry_from(&mut source, 0).unwrap();
    dest.add_entry_from(&mut source, 1).unwrap();
    let dest_bytes = dest.finish_into_bytes().unwrap();

    let mut reader = ZipReader::from_bytes(dest_bytes).unwrap();
    assert_eq!(reader.len(), 3);
    assert_eq!(reader.extract_by_name("a.bin", 0).unwrap(), data_a);
    assert_eq!(reader.extract_by_name("b.bin", 0).unwrap(), data_b);
    assert_eq!(
        reader.stat(reader.locate("a.bin", 0).unwrap()).unwrap().comment,
        "keep me"
    );
    reader.validate(0).unwrap();
}

#[test]
fn invalid_names_are_rejected() {
    let mut writer = ZipWriter::in_memory();
    for bad in ["/absolute", "back\\slash", "drive:colon", ""] {
        assert!(
            matches!(
                writer.add_bytes(bad, b"x", EntryOptions::default()),
                Err(zflate::ZipError::InvalidFilename)
            ),
            "accepted {:?}",
            bad
        );
    }
}

#[test]
fn not_an_archive_is_reported() {
    assert!(matches!(
        ZipReader::from_bytes(b"this is definitely not a zip archive, promise".to_vec()),
        Err(zflate::ZipError::FailedFindingCentralDir)
    ));
    assert!(matches!(
        ZipReader::from_bytes(b"tiny".to_vec()),
        Err(zflate::ZipError::NotAnArchive)
    ));
}

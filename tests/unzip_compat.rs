use std::process::Command;
use tempfile::tempdir;

// Write a ZIP with the library and verify it with the system `unzip -t`.
// Skipped when `unzip` is not installed.

#[test]
fn unzip_compatibility() {
    use zflate::{EntryOptions, ZipWriter};

    let check = Command::new("unzip").arg("-v").output();
    if check.is_err() {
        eprintln!("skipping test: `unzip` not found");
        return;
    }

    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("compat.zip");

    {
        let mut writer = ZipWriter::create(&zip_path).unwrap();
        writer.start_entry("hello.txt").unwrap();
        writer.write_data(b"hello from test").unwrap();
        writer.start_entry("big.bin").unwrap();
        for i in 0..1024u32 {
            let chunk: Vec<u8> = (0..1024).map(|j| ((i + j) % 251) as u8).collect();
            writer.write_data(&chunk).unwrap();
        }
        writer
            .add_bytes(
                "stored.bin",
                b"kept verbatim",
                EntryOptions::default().level(0),
            )
            .unwrap();
        writer
            .add_directory("subdir", EntryOptions::default())
            .unwrap();
        writer.finish().unwrap();
    }

    let output = Command::new("unzip")
        .arg("-t")
        .arg(&zip_path)
        .output()
        .expect("failed to run unzip");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(
        output.status.success(),
        "unzip reported failure: {} {}",
        stdout,
        stderr
    );
}

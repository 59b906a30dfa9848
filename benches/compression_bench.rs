use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::NamedTempFile;
use zflate::{compress_to_vec, decompress_to_vec, EntryOptions, ZipWriter};

fn generate_compressible_data(size: usize) -> Vec<u8> {
    // Pattern that compresses well
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn generate_random_data(size: usize) -> Vec<u8> {
    // Pseudo-random data that doesn't compress well
    let mut data = Vec::with_capacity(size);
    let mut state = 0x12345678u32;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

fn bench_codec(c: &mut Criterion) {
    let sizes = vec![
        10 * 1024,        // 10KB
        100 * 1024,       // 100KB
        1024 * 1024,      // 1MB
        10 * 1024 * 1024, // 10MB
    ];

    for size in sizes {
        let mut group = c.benchmark_group(format!("deflate_compressible_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_compressible_data(size);

        for level in [1u32, 6, 9] {
            group.bench_with_input(
                BenchmarkId::new(format!("compress_level_{}", level), size),
                &data,
                |b, data| {
                    b.iter(|| compress_to_vec(black_box(data), level));
                },
            );
        }

        let compressed = compress_to_vec(&data, 6);
        group.bench_with_input(
            BenchmarkId::new("decompress", size),
            &compressed,
            |b, compressed| {
                b.iter(|| decompress_to_vec(black_box(compressed)).unwrap());
            },
        );

        group.finish();
    }
}

fn bench_random_data(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024]; // 100KB, 1MB

    for size in sizes {
        let mut group = c.benchmark_group(format!("deflate_random_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_random_data(size);

        group.bench_with_input(
            BenchmarkId::new("compress_level_6", size),
            &data,
            |b, data| {
                b.iter(|| compress_to_vec(black_box(data), 6));
            },
        );

        group.finish();
    }
}

fn bench_zip_writer(c: &mut Criterion) {
    let mut group = c.benchmark_group("zip_write_multiple_entries");

    let entry_count = 100;
    let entry_size = 10 * 1024; // 10KB per entry
    group.throughput(Throughput::Bytes((entry_count * entry_size) as u64));

    let data = generate_compressible_data(entry_size);

    group.bench_function("deflate_100_entries", |b| {
        b.iter(|| {
            let temp = NamedTempFile::new().unwrap();
            let mut writer = ZipWriter::create(temp.path()).unwrap();
            for i in 0..entry_count {
                writer.start_entry(&format!("file_{}.txt", i)).unwrap();
                writer.write_data(black_box(&data)).unwrap();
            }
            writer.finish().unwrap();
        });
    });

    group.bench_function("stored_100_entries", |b| {
        b.iter(|| {
            let temp = NamedTempFile::new().unwrap();
            let mut writer = ZipWriter::create(temp.path()).unwrap();
            for i in 0..entry_count {
                writer
                    .add_bytes(
                        &format!("file_{}.txt", i),
                        black_box(&data),
                        EntryOptions::default().level(0),
                    )
                    .unwrap();
            }
            writer.finish().unwrap();
        });
    });

    group.finish();
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}MB", bytes / (1024 * 1024))
    }
}

criterion_group!(benches, bench_codec, bench_random_data, bench_zip_writer);
criterion_main!(benches);

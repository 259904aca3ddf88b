mod common;

use pretty_assertions::assert_eq;
use std::sync::Arc;

use common::{ZipBuilder, sample_archive};
use relunzip::zip::CompressionMethod;
use relunzip::{ArchiveReader, BlockCache, Error, ErrorKind, MemoryReader, ReadAt};

async fn read_entry<R: ReadAt>(archive: &ArchiveReader<R>, name: &str) -> Vec<u8> {
    let entry = archive
        .entries()
        .iter()
        .find(|e| e.name == name)
        .expect("entry present");
    let mut stream = archive.open_entry(entry).await.unwrap();
    let mut out = Vec::new();
    let mut buf = [0u8; 1000];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[tokio::test]
async fn lists_entries_of_hand_built_archive() {
    let data = ZipBuilder::new()
        .file("one.txt", b"1", 0o644)
        .file("two.txt", b"22", 0o644)
        .dir("nested/", 0o755)
        .file("nested/three.txt", b"333", 0o600)
        .finish();

    let archive = ArchiveReader::open(Arc::new(MemoryReader::new(data)))
        .await
        .unwrap();

    let listing: Vec<(&str, u64, bool)> = archive
        .entries()
        .iter()
        .map(|e| (e.name.as_str(), e.uncompressed_size, e.is_directory))
        .collect();
    assert_eq!(
        listing,
        vec![
            ("one.txt", 1, false),
            ("two.txt", 2, false),
            ("nested/", 0, true),
            ("nested/three.txt", 3, false),
        ]
    );
    assert_eq!(archive.entries()[3].mode, 0o600);
    assert_eq!(archive.entries()[2].mode, 0o755);
}

#[tokio::test]
async fn opening_only_touches_the_tail_of_the_archive() {
    let payload = vec![7u8; 256 * 1024];
    let data = ZipBuilder::new()
        .file("big.bin", &payload, 0o644)
        .file("small.txt", b"tail", 0o644)
        .finish();
    let size = data.len() as u64;

    let cache = Arc::new(BlockCache::with_block_size(MemoryReader::new(data), 4096));
    let archive = ArchiveReader::open(cache.clone()).await.unwrap();
    assert_eq!(archive.entries().len(), 2);

    // Only the blocks holding the directory and end record were fetched
    let fetched: u64 = cache.inner().ranges().iter().map(|(_, len)| *len as u64).sum();
    assert!(fetched <= 2 * 4096, "fetched {fetched} of {size} bytes");
    assert!(cache.inner().ranges().iter().all(|(off, _)| *off >= size - 2 * 4096));
}

#[tokio::test]
async fn cache_fetches_each_block_once_while_extracting_entries() {
    let data = ZipBuilder::new()
        .file("a", &[1u8; 3000], 0o644)
        .file("b", &[2u8; 3000], 0o644)
        .file("c", &[3u8; 3000], 0o644)
        .finish();
    let block_size = 1024u64;
    let blocks = data.len() as u64 / block_size + 1;

    let cache = Arc::new(BlockCache::with_block_size(
        MemoryReader::new(data),
        block_size as usize,
    ));
    let archive = ArchiveReader::open(cache.clone()).await.unwrap();
    for _ in 0..2 {
        for name in ["a", "b", "c"] {
            read_entry(&archive, name).await;
        }
    }

    let mut offsets: Vec<u64> = cache.inner().ranges().iter().map(|(off, _)| *off).collect();
    let fetches = offsets.len();
    offsets.sort_unstable();
    offsets.dedup();
    assert_eq!(offsets.len(), fetches, "a block was fetched twice");
    assert!(offsets.iter().all(|off| off % block_size == 0));
    assert_eq!(cache.fetches(), blocks);
}

#[tokio::test]
async fn stored_and_deflated_payloads_round_out() {
    let text = b"the quick brown fox jumps over the lazy dog\n".repeat(500);
    let data = ZipBuilder::new()
        .file("plain.txt", &text, 0o644)
        .deflated("packed.txt", &text, 0o644)
        .finish();

    let archive = ArchiveReader::open(Arc::new(BlockCache::with_block_size(
        MemoryReader::new(data),
        512,
    )))
    .await
    .unwrap();

    let packed = &archive.entries()[1];
    assert_eq!(packed.compression_method, CompressionMethod::Deflate);
    assert!(packed.compressed_size < packed.uncompressed_size);

    assert_eq!(read_entry(&archive, "plain.txt").await, text);
    assert_eq!(read_entry(&archive, "packed.txt").await, text);
}

#[tokio::test]
async fn archive_comment_is_skipped() {
    let data = ZipBuilder::new()
        .file("a.txt", b"hello", 0o644)
        .comment(b"built by hand, PK\x05\x06 lookalike inside")
        .finish();

    let archive = ArchiveReader::open(Arc::new(MemoryReader::new(data)))
        .await
        .unwrap();
    assert_eq!(archive.entries().len(), 1);
    assert_eq!(read_entry(&archive, "a.txt").await, b"hello");
}

#[tokio::test]
async fn unsupported_compression_fails_the_whole_open() {
    let data = ZipBuilder::new()
        .file("ok.txt", b"fine", 0o644)
        .raw("weird.bin", 14, 0, b"xx", b"xx", 0o100644)
        .finish();

    let err = ArchiveReader::open(Arc::new(MemoryReader::new(data)))
        .await
        .err()
        .expect("open must fail");
    assert!(matches!(
        err,
        Error::UnsupportedCompression { ref name, method: 14 } if name == "weird.bin"
    ));
    assert_eq!(err.kind(), ErrorKind::Archive);
}

#[tokio::test]
async fn encrypted_entries_are_rejected() {
    let data = ZipBuilder::new()
        .raw("secret.txt", 0, 0x0001, b"xxxx", b"xxxx", 0o100644)
        .finish();

    let err = ArchiveReader::open(Arc::new(MemoryReader::new(data)))
        .await
        .err()
        .expect("open must fail");
    assert!(matches!(err, Error::Encrypted { .. }));
}

#[tokio::test]
async fn truncated_or_garbage_archives_are_structural_errors() {
    let mut data = sample_archive();
    // Chop the central directory out from under the end record
    let eocd = data.split_off(data.len() - 22);
    data.truncate(data.len() - 10);
    data.extend_from_slice(&eocd);

    for bad in [data, b"not a zip at all, not even close".to_vec(), Vec::new()] {
        let err = ArchiveReader::open(Arc::new(MemoryReader::new(bad)))
            .await
            .err()
            .expect("open must fail");
        assert_eq!(err.kind(), ErrorKind::Archive, "{err}");
    }
}

#[tokio::test]
async fn zip64_archive_is_listed_and_read() {
    let text = b"sixty-four bits of bookkeeping ".repeat(100);
    let data = ZipBuilder::new()
        .zip64()
        .file("a.txt", b"hello", 0o644)
        .deflated("docs/long.txt", &text, 0o600)
        .finish();

    let archive = ArchiveReader::open(Arc::new(BlockCache::with_block_size(
        MemoryReader::new(data),
        256,
    )))
    .await
    .unwrap();

    let listing: Vec<(&str, u64, u64)> = archive
        .entries()
        .iter()
        .map(|e| (e.name.as_str(), e.uncompressed_size, e.lfh_offset))
        .collect();
    // Sizes and offsets only exist in the 0x0001 extra field
    assert_eq!(
        listing,
        vec![("a.txt", 5, 0), ("docs/long.txt", text.len() as u64, 30 + 5 + 5)]
    );
    assert_eq!(archive.entries()[1].mode, 0o600);

    assert_eq!(read_entry(&archive, "a.txt").await, b"hello");
    assert_eq!(read_entry(&archive, "docs/long.txt").await, text);
}

#[tokio::test]
async fn zip64_locator_pointing_past_itself_is_rejected() {
    let mut data = ZipBuilder::new()
        .zip64()
        .file("a.txt", b"hello", 0o644)
        .finish();
    // Locator sits right before the 22-byte end record; its record offset
    // field starts 8 bytes in
    let field = data.len() - 22 - 20 + 8;
    let past_end = data.len() as u64;
    data[field..field + 8].copy_from_slice(&past_end.to_le_bytes());

    let err = ArchiveReader::open(Arc::new(MemoryReader::new(data)))
        .await
        .err()
        .expect("open must fail");
    assert_eq!(err.kind(), ErrorKind::Archive, "{err}");
}

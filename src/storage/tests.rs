use super::*;
use crate::metainfo::Info;
use std::path::PathBuf;
use tempfile::TempDir;

fn info_for(files: &[(&str, u64)], piece_length: u64) -> Info {
    let entries: Vec<(PathBuf, u64)> = files
        .iter()
        .map(|(name, len)| (PathBuf::from(name), *len))
        .collect();
    let files = layout_files(&entries);
    let total_length: u64 = files.iter().map(|f| f.length).sum();
    let piece_count = total_length.div_ceil(piece_length) as usize;

    Info {
        name: "test".into(),
        piece_length,
        pieces: vec![[0u8; 20]; piece_count],
        files,
        total_length,
    }
}

#[tokio::test]
async fn test_create_truncates_and_makes_dirs() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("sub/dir/file.bin");

    let info = info_for(&[("sub/dir/file.bin", 100)], 100);
    {
        let _mapper = FileMapper::create(temp.path(), &info).await.unwrap();
    }
    assert!(path.exists());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

    // A fresh mapper over existing output truncates it.
    std::fs::write(&path, b"stale bytes from a previous run").unwrap();
    let _mapper = FileMapper::create(temp.path(), &info).await.unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[tokio::test]
async fn test_write_single_file() {
    let temp = TempDir::new().unwrap();
    let info = info_for(&[("data.bin", 65536)], 16384);
    let mapper = FileMapper::create(temp.path(), &info).await.unwrap();

    let piece: Vec<u8> = (0..16384u32).map(|i| (i % 256) as u8).collect();
    for index in 0..4u32 {
        mapper.write(index, 0, &piece).await.unwrap();
    }
    mapper.sync_all().await.unwrap();

    let on_disk = std::fs::read(temp.path().join("data.bin")).unwrap();
    assert_eq!(on_disk.len(), 65536);
    assert_eq!(&on_disk[..16384], piece.as_slice());
    assert_eq!(&on_disk[49152..], piece.as_slice());
}

#[tokio::test]
async fn test_write_splits_across_file_boundary() {
    let temp = TempDir::new().unwrap();
    let info = info_for(&[("a.bin", 10), ("b.bin", 10)], 20);
    let mapper = FileMapper::create(temp.path(), &info).await.unwrap();

    // 19-byte last piece spanning both files.
    mapper.write(0, 0, b"Hello, world! BT ok").await.unwrap();
    mapper.sync_all().await.unwrap();

    let a = std::fs::read(temp.path().join("a.bin")).unwrap();
    let b = std::fs::read(temp.path().join("b.bin")).unwrap();
    assert_eq!(a, b"Hello, wor");
    assert_eq!(b, b"ld! BT ok");
}

#[tokio::test]
async fn test_block_offset_write_lands_mid_piece() {
    let temp = TempDir::new().unwrap();
    let info = info_for(&[("data.bin", 40)], 20);
    let mapper = FileMapper::create(temp.path(), &info).await.unwrap();

    mapper.write(1, 5, b"abcde").await.unwrap();
    mapper.sync_all().await.unwrap();

    let on_disk = std::fs::read(temp.path().join("data.bin")).unwrap();
    assert_eq!(&on_disk[25..30], b"abcde");
}

#[tokio::test]
async fn test_read_piece_concatenates_spans() {
    let temp = TempDir::new().unwrap();
    let info = info_for(&[("a.bin", 7), ("b.bin", 7), ("c.bin", 6)], 20);
    let mapper = FileMapper::create(temp.path(), &info).await.unwrap();

    let piece: Vec<u8> = (0u8..20).collect();
    mapper.write(0, 0, &piece).await.unwrap();

    let back = mapper.read_piece(0).await.unwrap();
    assert_eq!(back.as_ref(), piece.as_slice());
}

#[tokio::test]
async fn test_write_correctness_over_sorted_offsets() {
    // Concatenated file contents equal the writes sorted by offset,
    // regardless of issue order.
    let temp = TempDir::new().unwrap();
    let info = info_for(&[("a.bin", 13), ("b.bin", 13), ("c.bin", 6)], 16);
    let mapper = FileMapper::create(temp.path(), &info).await.unwrap();

    let expected: Vec<u8> = (0..32u32).map(|i| (i * 7 % 256) as u8).collect();
    // Out-of-order block writes: second piece first.
    mapper.write(1, 0, &expected[16..]).await.unwrap();
    mapper.write(0, 8, &expected[8..16]).await.unwrap();
    mapper.write(0, 0, &expected[..8]).await.unwrap();

    let mut all = Vec::new();
    for name in ["a.bin", "b.bin", "c.bin"] {
        all.extend(std::fs::read(temp.path().join(name)).unwrap());
    }
    assert_eq!(all, expected);
}

#[tokio::test]
async fn test_rejects_out_of_range() {
    let temp = TempDir::new().unwrap();
    let info = info_for(&[("data.bin", 20)], 20);
    let mapper = FileMapper::create(temp.path(), &info).await.unwrap();

    assert!(matches!(
        mapper.write(1, 0, b"x").await,
        Err(StorageError::InvalidPieceIndex(1))
    ));
    assert!(matches!(
        mapper.write(0, 18, b"xyz").await,
        Err(StorageError::OutOfRange { .. })
    ));
}

#[tokio::test]
async fn test_rejects_path_traversal() {
    let temp = TempDir::new().unwrap();
    let info = info_for(&[("../escape.bin", 10)], 10);
    assert!(matches!(
        FileMapper::create(temp.path(), &info).await,
        Err(StorageError::PathTraversal(_))
    ));
}

//! Crate-level integration tests exercising the writer, reader, and merge
//! scanner together against real files on disk.

use crate::merge::{MergeConfig, MergeScanner, ScanSource, VecSource};
use crate::reader::{CellStoreReader, ScanContext};
use crate::writer::{CellStoreWriter, CellStoreWriterOptions};
use bloom::BloomFilterMode;
use codec::CodecKind;
use keys::{Flag, Key};
use tempfile::tempdir;

#[test]
fn full_roundtrip_with_deletes_across_block_boundaries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.cellstore");

    let mut w = CellStoreWriter::create(
        &path,
        CellStoreWriterOptions {
            blocksize: 96,
            codec: CodecKind::Zlib,
            bloom_mode: BloomFilterMode::RowsCols,
            expected_items: 100,
            index_64bit: false,
            is_split_output: false,
            is_major_compaction: true,
        },
    )
    .unwrap();

    for i in 0..40u32 {
        let flag = if i % 10 == 9 { Flag::DeleteCell } else { Flag::Insert };
        let k = Key::new(format!("row{:04}", i / 2).into_bytes(), 1, b"q".to_vec(), flag, 1000 + i as i64, i as i64);
        w.observe_stats(k.timestamp, k.revision);
        w.add(&k.serialize(), format!("v{i}").as_bytes()).unwrap();
    }
    let trailer = w.finalize(1, 1).unwrap();
    assert!(trailer.flags & crate::trailer::FLAG_MAJOR_COMPACTION != 0);

    let reader = CellStoreReader::open(&path).unwrap();
    assert!(reader.block_count() >= 1);

    let probe = Key::new(b"row0001".to_vec(), 1, b"q".to_vec(), Flag::Insert, 1002, 2).serialize();
    assert_eq!(reader.get(&probe).unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn reader_scan_feeds_merge_scanner_via_vec_source() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("0.cellstore");

    let mut w = CellStoreWriter::create(&path, CellStoreWriterOptions::default()).unwrap();
    for i in 0..20u32 {
        let k = Key::new(format!("r{:03}", i).into_bytes(), 1, b"q".to_vec(), Flag::Insert, 100, i as i64);
        w.add(&k.serialize(), b"v").unwrap();
    }
    w.finalize(1, 1).unwrap();

    let reader = CellStoreReader::open(&path).unwrap();
    let mut collected = Vec::new();
    reader
        .scan(&ScanContext::unbounded(), |k, v| collected.push((k.clone(), v.to_vec())))
        .unwrap();

    let source: Box<dyn ScanSource> = Box::new(VecSource::new(collected));
    let mut scanner = MergeScanner::new(vec![source], MergeConfig::default()).unwrap();
    let merged = scanner.collect_all().unwrap();
    assert_eq!(merged.len(), 20);
}

#[test]
fn two_cell_stores_merge_without_overlap() {
    let dir = tempdir().unwrap();

    let path_a = dir.path().join("a.cellstore");
    let mut wa = CellStoreWriter::create(&path_a, CellStoreWriterOptions::default()).unwrap();
    for i in 0..5u32 {
        let k = Key::new(format!("a{:02}", i).into_bytes(), 1, b"q".to_vec(), Flag::Insert, 100, i as i64);
        wa.add(&k.serialize(), b"va").unwrap();
    }
    wa.finalize(1, 1).unwrap();

    let path_b = dir.path().join("b.cellstore");
    let mut wb = CellStoreWriter::create(&path_b, CellStoreWriterOptions::default()).unwrap();
    for i in 0..5u32 {
        let k = Key::new(format!("b{:02}", i).into_bytes(), 1, b"q".to_vec(), Flag::Insert, 100, i as i64);
        wb.add(&k.serialize(), b"vb").unwrap();
    }
    wb.finalize(2, 1).unwrap();

    let ra = CellStoreReader::open(&path_a).unwrap();
    let rb = CellStoreReader::open(&path_b).unwrap();

    let mut items_a = Vec::new();
    ra.scan(&ScanContext::unbounded(), |k, v| items_a.push((k.clone(), v.to_vec()))).unwrap();
    let mut items_b = Vec::new();
    rb.scan(&ScanContext::unbounded(), |k, v| items_b.push((k.clone(), v.to_vec()))).unwrap();

    let sources: Vec<Box<dyn ScanSource>> = vec![Box::new(VecSource::new(items_a)), Box::new(VecSource::new(items_b))];
    let mut scanner = MergeScanner::new(sources, MergeConfig::default()).unwrap();
    let merged = scanner.collect_all().unwrap();

    assert_eq!(merged.len(), 10);
    assert_eq!(merged[0].0.row, b"a00");
    assert_eq!(merged[9].0.row, b"b04");
}

#[test]
fn opening_a_truncated_file_fails_cleanly() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.cellstore");
    std::fs::write(&path, b"too small").unwrap();
    assert!(CellStoreReader::open(&path).is_err());
}

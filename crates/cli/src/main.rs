//! # CLI - Range Store Interactive Shell
//!
//! A REPL-style command-line interface for one range of a table. Reads
//! commands from stdin, executes them against a [`rangestore::Range`], and
//! prints results to stdout. Designed for both interactive use and scripted
//! testing (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! PUT row cf cq value        Insert or update one cell
//! GET row cf cq              Look up a cell (prints value or "(nil)")
//! DELETEROW row              Delete every column of a row (writes a row tombstone)
//! SCAN [start] [end]         Range scan (inclusive start, exclusive end)
//! COMPACT ag <minor|merge|major|gc|inmemory>  Trigger a compaction on one access group
//! SPLIT                      Split the range at its median row
//! RELINQUISH                 Flush and stop serving this range
//! STATS                      Print range debug info
//! EXIT / QUIT                Shut down gracefully
//! ```
//!
//! The shell is seeded with a two-column-family schema (`value`, a plain
//! column, and `hits`, a counter column), both in the `default` access group —
//! enough to exercise every command without a DDL surface, which is out of
//! scope here.
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! RANGESTORE_DIR            Range data directory      (default: "data/range")
//! RANGESTORE_CACHE_MB       Block cache size in MiB    (default: 64)
//! RANGESTORE_SPLIT_MB       Split threshold in MiB     (default: 256)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! range store started (dir=data/range, cache=64MiB, split=256MiB)
//! > PUT alice value name Alice
//! OK
//! > GET alice value name
//! Alice
//! > SCAN
//! name -> Alice
//! (1 entries)
//! > EXIT
//! bye
//! ```

use anyhow::{anyhow, Result};
use cellstore::reader::ScanContext;
use keys::{Flag, Key, TIMESTAMP_AUTO};
use rangestore::{AccessGroupProperties, ColumnFamily, CompactionType, RangeStoreConfig, Schema, StorageContext};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// The single access group this shell writes through. A production range
/// server would build its schema from the catalog; here it is fixed so the
/// shell has something concrete to talk to.
const ACCESS_GROUP: &str = "default";

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn build_schema() -> Schema {
    Schema::new(
        1,
        vec![
            ColumnFamily {
                name: "value".to_string(),
                id: 1,
                access_group: ACCESS_GROUP.to_string(),
                is_counter: false,
                max_versions: None,
            },
            ColumnFamily {
                name: "hits".to_string(),
                id: 2,
                access_group: ACCESS_GROUP.to_string(),
                is_counter: true,
                max_versions: None,
            },
        ],
    )
}

fn column_family_id(schema: &Schema, name: &str) -> Option<u8> {
    (0..=u8::MAX).find(|&id| schema.column_family(id).is_some_and(|cf| cf.name == name))
}

fn parse_compaction_type(s: &str) -> Option<CompactionType> {
    match s.to_uppercase().as_str() {
        "MINOR" => Some(CompactionType::Minor),
        "MERGE" => Some(CompactionType::Merge),
        "MAJOR" => Some(CompactionType::Major),
        "GC" => Some(CompactionType::Gc),
        "INMEMORY" => Some(CompactionType::InMemory),
        _ => None,
    }
}

/// Scans the exact byte range `[row, row ++ 0x00)`, which contains only rows
/// equal to `row` itself — any row with extra trailing bytes sorts at or
/// past the exclusive upper bound.
fn exact_row_range(row: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut end = row.to_vec();
    end.push(0);
    (row.to_vec(), end)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let dir = env_or("RANGESTORE_DIR", "data/range");
    let cache_mb: usize = env_or("RANGESTORE_CACHE_MB", "64").parse().unwrap_or(64);
    let split_mb: u64 = env_or("RANGESTORE_SPLIT_MB", "256").parse().unwrap_or(256);

    std::fs::create_dir_all(&dir)?;

    let mut config = RangeStoreConfig::default();
    config.split_size = split_mb * 1024 * 1024;

    let ctx = Arc::new(StorageContext::standalone(cache_mb * 1024 * 1024, config));

    let mut ag_properties = HashMap::new();
    ag_properties.insert(ACCESS_GROUP.to_string(), AccessGroupProperties::default());

    let range = rangestore::Range::new(
        "shell-range",
        0,
        dir.clone().into(),
        ctx,
        build_schema(),
        ag_properties,
        None,
        None,
    )?;

    println!(
        "range store started (dir={}, cache={}MiB, split={}MiB, revision={})",
        dir,
        cache_mb,
        split_mb,
        range.latest_revision()
    );
    println!("Commands: PUT row cf cq value | GET row cf cq | DELETEROW row | SCAN [start] [end]");
    println!("          COMPACT ag <minor|merge|major|gc|inmemory> | SPLIT | RELINQUISH | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    let schema = build_schema();
    let schema_generation = range.schema_generation();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "PUT" => {
                    let fields = (parts.next(), parts.next(), parts.next());
                    if let (Some(row), Some(cf), Some(cq)) = fields {
                        let value: String = parts.collect::<Vec<&str>>().join(" ");
                        match (column_family_id(&schema, cf), value.is_empty()) {
                            (None, _) => println!("ERR unknown column family {:?}", cf),
                            (_, true) => println!("ERR usage: PUT row cf cq value"),
                            (Some(cfid), false) => {
                                let key = Key::new(
                                    row.as_bytes().to_vec(),
                                    cfid,
                                    cq.as_bytes().to_vec(),
                                    Flag::Insert,
                                    TIMESTAMP_AUTO,
                                    0,
                                );
                                let mut guard = range.lock();
                                let result =
                                    guard.add(key, value.into_bytes(), schema_generation).and_then(|()| guard.unlock());
                                match result {
                                    Ok(_) => println!("OK"),
                                    Err(e) => println!("ERR put failed: {}", e),
                                }
                            }
                        }
                    } else {
                        println!("ERR usage: PUT row cf cq value");
                    }
                }
                "GET" => {
                    let fields = (parts.next(), parts.next(), parts.next());
                    if let (Some(row), Some(cf), Some(cq)) = fields {
                        match column_family_id(&schema, cf) {
                            None => println!("ERR unknown column family {:?}", cf),
                            Some(cfid) => match get_cell(&range, row.as_bytes(), cfid, cq.as_bytes()) {
                                Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                                Ok(None) => println!("(nil)"),
                                Err(e) => println!("ERR read failed: {}", e),
                            },
                        }
                    } else {
                        println!("ERR usage: GET row cf cq");
                    }
                }
                "DELETEROW" => {
                    if let Some(row) = parts.next() {
                        let key = Key::new(
                            row.as_bytes().to_vec(),
                            keys::ROW_DELETE_COLUMN_FAMILY,
                            Vec::new(),
                            Flag::DeleteRow,
                            TIMESTAMP_AUTO,
                            0,
                        );
                        let mut guard = range.lock();
                        let result = guard.add(key, Vec::new(), schema_generation).and_then(|()| guard.unlock());
                        match result {
                            Ok(_) => println!("OK"),
                            Err(e) => println!("ERR deleterow failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DELETEROW row");
                    }
                }
                "SCAN" => {
                    let start = parts.next().map(|s| s.as_bytes().to_vec());
                    let end = parts.next().map(|s| s.as_bytes().to_vec());
                    let scan_ctx = ScanContext {
                        start_row: start,
                        end_row: end,
                        column_families: Vec::new(),
                    };
                    match scan(&range, scan_ctx) {
                        Ok(results) => {
                            if results.is_empty() {
                                println!("(empty)");
                            } else {
                                let count = results.len();
                                for (row, value) in results {
                                    println!("{} -> {}", String::from_utf8_lossy(&row), String::from_utf8_lossy(&value));
                                }
                                println!("({} entries)", count);
                            }
                        }
                        Err(e) => println!("ERR scan failed: {}", e),
                    }
                }
                "COMPACT" => {
                    let fields = (parts.next(), parts.next().and_then(parse_compaction_type));
                    if let (Some(ag), Some(kind)) = fields {
                        match range.compact(ag, kind) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR compact failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: COMPACT ag <minor|merge|major|gc|inmemory>");
                    }
                }
                "SPLIT" => match range.split() {
                    Ok(outcome) => println!(
                        "OK split at {:?} (retained={:?}..{:?}, sibling={:?}..{:?})",
                        String::from_utf8_lossy(&outcome.split_row),
                        outcome.retained_start.as_deref().map(String::from_utf8_lossy),
                        outcome.retained_end.as_deref().map(String::from_utf8_lossy),
                        outcome.sibling_start.as_deref().map(String::from_utf8_lossy),
                        outcome.sibling_end.as_deref().map(String::from_utf8_lossy),
                    ),
                    Err(e) => println!("ERR split failed: {}", e),
                },
                "RELINQUISH" => match range.relinquish() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR relinquish failed: {}", e),
                },
                "STATS" => {
                    println!(
                        "name={} revision={} disk_usage={} state={:?} boundary={:?}",
                        range.name(),
                        range.latest_revision(),
                        range.disk_usage(),
                        range.state(),
                        range.boundary(),
                    );
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

fn get_cell(range: &rangestore::Range, row: &[u8], cfid: u8, cq: &[u8]) -> Result<Option<Vec<u8>>> {
    let (start, end) = exact_row_range(row);
    let scan_ctx = ScanContext {
        start_row: Some(start),
        end_row: Some(end),
        column_families: vec![cfid],
    };
    let mut scanner = range.create_scanner(&scan_ctx).map_err(|e| anyhow!(e))?;
    while let Some((key, value)) = scanner.next_cell().map_err(|e| anyhow!(e))? {
        if key.column_qualifier == cq {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn scan(range: &rangestore::Range, scan_ctx: ScanContext) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut scanner = range.create_scanner(&scan_ctx).map_err(|e| anyhow!(e))?;
    let cells = scanner.collect_all().map_err(|e| anyhow!(e))?;
    Ok(cells.into_iter().map(|(key, value)| (key.row, value)).collect())
}

//! Integration tests driving the shell binary end to end via stdin/stdout.
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn run_cli_command(dir: &Path, command: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new("cargo")
        .args(["run", "-p", "cli", "--"])
        .env("RANGESTORE_DIR", dir.to_str().unwrap())
        .env("RANGESTORE_CACHE_MB", "8")
        .env("RANGESTORE_SPLIT_MB", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn cli");

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        stdin.write_all(command.as_bytes()).expect("failed to write to stdin");
        stdin.write_all(b"EXIT\n").expect("failed to write EXIT");
    }

    let output = child.wait_with_output().expect("failed to read output");
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_basic_put_get() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let output = run_cli_command(&range_dir, "PUT key1 value q value1\nGET key1 value q\n");

    assert!(output.contains("OK"));
    assert!(output.contains("value1"));
}

#[test]
fn test_multiple_rows() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let commands = "PUT a value q 1\nPUT b value q 2\nPUT c value q 3\nGET a value q\nGET b value q\nGET c value q\n";
    let output = run_cli_command(&range_dir, commands);

    assert!(output.contains("1"));
    assert!(output.contains("2"));
    assert!(output.contains("3"));
}

#[test]
fn test_overwrite_row() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let commands = "PUT mykey value q oldvalue\nGET mykey value q\nPUT mykey value q newvalue\nGET mykey value q\n";
    let output = run_cli_command(&range_dir, commands);

    assert!(output.contains("oldvalue"));
    assert!(output.contains("newvalue"));
}

#[test]
fn test_delete_row() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let commands = "PUT delme value q somevalue\nGET delme value q\nDELETEROW delme\nGET delme value q\n";
    let output = run_cli_command(&range_dir, commands);

    assert!(output.contains("somevalue"));
    assert!(output.contains("(nil)"));
}

#[test]
fn test_unknown_column_family_rejected() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let output = run_cli_command(&range_dir, "PUT a bogus q 1\n");
    assert!(output.contains("unknown column family"));
}

#[test]
fn test_range_scan() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let mut commands = String::new();
    for i in 0..10 {
        commands.push_str(&format!("PUT key{:02} value q value{}\n", i, i));
    }
    commands.push_str("SCAN\n");

    let output = run_cli_command(&range_dir, &commands);

    assert!(output.contains("key00"));
    assert!(output.contains("key09"));
}

#[test]
fn test_compact_minor() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let commands = "PUT a value q 1\nPUT b value q 2\nCOMPACT default minor\nGET a value q\nGET b value q\n";
    let output = run_cli_command(&range_dir, commands);

    assert!(output.contains("OK"));
    assert!(output.contains("1"));
    assert!(output.contains("2"));
}

#[test]
fn test_tombstone_excluded_from_scan() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let commands =
        "PUT a value q 1\nPUT b value q 2\nPUT c value q 3\nPUT d value q 4\nDELETEROW b\nCOMPACT default minor\nSCAN\n";
    let output = run_cli_command(&range_dir, commands);

    let lines: Vec<&str> = output.lines().collect();
    let scan_section: Vec<&&str> = lines
        .iter()
        .skip_while(|l| !l.contains("SCAN"))
        .take_while(|l| !l.contains("entries"))
        .collect();
    let entry_count = scan_section.iter().filter(|l| l.contains("->")).count();
    assert_eq!(entry_count, 3, "should have 3 rows (a, c, d); b was deleted");
}

#[test]
fn test_persistence_across_restarts() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    run_cli_command(&range_dir, "PUT persist_key value q persist_value\nCOMPACT default minor\n");
    let output = run_cli_command(&range_dir, "GET persist_key value q\n");

    assert!(output.contains("persist_value"));
}

#[test]
fn test_stats_output() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let commands = "PUT x value q 1\nPUT y value q 2\nSTATS\n";
    let output = run_cli_command(&range_dir, commands);

    assert!(output.contains("revision") || output.contains("disk_usage"));
}

#[test]
fn test_quit_command() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let commands = "PUT foo value q bar\nQUIT\n";
    let output = run_cli_command(&range_dir, commands);

    assert!(output.contains("OK"));
    assert!(output.contains("bye"));
}

#[test]
fn test_invalid_compaction_kind_rejected() {
    let dir = tempdir().unwrap();
    let range_dir = dir.path().join("range");
    fs::create_dir_all(&range_dir).unwrap();

    let output = run_cli_command(&range_dir, "COMPACT default bogus\n");
    assert!(output.contains("ERR usage"));
}

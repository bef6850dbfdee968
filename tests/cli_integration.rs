// CLI integration tests against real LMDB stores built with heed.
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStringExt;
use std::path::Path;
use std::process::{Command, Output};
use std::ptr;

use heed::types::Bytes;
use heed::{Database, EnvOpenOptions};
use lmdb_master_sys as ffi;
use serde_json::Value;

fn cmd() -> Command {
    let exe = env!("CARGO_BIN_EXE_mapstat");
    Command::new(exe)
}

fn build_store(dir: &Path, tables: &[(&str, usize)], plain: &[&str]) {
    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(16 * 1024 * 1024)
            .max_dbs(64)
            .open(dir)
            .expect("open env")
    };
    let mut wtxn = env.write_txn().expect("write txn");
    for &(name, entries) in tables {
        let table: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, Some(name))
            .expect("create table");
        for i in 0..entries {
            table
                .put(&mut wtxn, format!("key-{i:04}").as_bytes(), b"value")
                .expect("put");
        }
    }
    let root: Database<Bytes, Bytes> = env.create_database(&mut wtxn, None).expect("root table");
    for key in plain {
        root.put(&mut wtxn, key.as_bytes(), b"value").expect("put");
    }
    wtxn.commit().expect("commit");
    env.prepare_for_closing().wait();
}

/// Creates one sub-database per name through the C API, which accepts any
/// non-NUL byte string; heed only creates tables with UTF-8 names.
fn build_raw_store(dir: &Path, tables: &[&[u8]]) {
    let path = CString::new(dir.to_str().expect("utf8 path")).expect("path");
    unsafe {
        let mut env = ptr::null_mut();
        assert_eq!(ffi::mdb_env_create(&mut env), 0);
        assert_eq!(ffi::mdb_env_set_maxdbs(env, 8), 0);
        assert_eq!(ffi::mdb_env_open(env, path.as_ptr(), 0, 0o644), 0);
        let mut txn = ptr::null_mut();
        assert_eq!(ffi::mdb_txn_begin(env, ptr::null_mut(), 0, &mut txn), 0);
        for table in tables {
            let name = CString::new(*table).expect("table name");
            let mut dbi = 0;
            assert_eq!(
                ffi::mdb_dbi_open(txn, name.as_ptr(), ffi::MDB_CREATE, &mut dbi),
                0
            );
            let mut key = *b"k1";
            let mut value = *b"v1";
            let mut key_val = ffi::MDB_val {
                mv_size: key.len(),
                mv_data: key.as_mut_ptr().cast(),
            };
            let mut data_val = ffi::MDB_val {
                mv_size: value.len(),
                mv_data: value.as_mut_ptr().cast(),
            };
            assert_eq!(ffi::mdb_put(txn, dbi, &mut key_val, &mut data_val, 0), 0);
        }
        assert_eq!(ffi::mdb_txn_commit(txn), 0);
        ffi::mdb_env_close(env);
    }
}

fn run(args: &[&str], dir: &Path) -> Output {
    cmd()
        .arg(dir.to_str().expect("utf8 path"))
        .args(args)
        .output()
        .expect("run mapstat")
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("utf8 stdout")
}

fn stat_blocks(text: &str) -> usize {
    text.lines().filter(|line| line.starts_with("Page size: ")).count()
}

#[test]
fn root_only_prints_one_block_with_root_entry_count() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_store(temp.path(), &[], &["a", "b", "c", "d"]);

    let output = run(&[], temp.path());
    assert!(output.status.success());
    let text = stdout(&output);
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("Page size: "));
    assert_eq!(lines[1], "Tree depth: 1");
    assert_eq!(lines[5], "Entries: 4");
}

#[test]
fn all_reports_sub_databases_in_key_order() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_store(temp.path(), &[("C", 3), ("A", 1), ("B", 2)], &[]);

    let output = run(&["-a"], temp.path());
    assert!(output.status.success());
    let text = stdout(&output);
    assert_eq!(stat_blocks(&text), 4);

    let blocks = text.split("\n\n").collect::<Vec<_>>();
    assert_eq!(blocks.len(), 4);
    assert!(blocks[0].ends_with("Entries: 3"));
    assert!(blocks[1].starts_with("A\nPage size: "));
    assert!(blocks[1].ends_with("Entries: 1"));
    assert!(blocks[2].starts_with("B\nPage size: "));
    assert!(blocks[2].ends_with("Entries: 2"));
    assert!(blocks[3].starts_with("C\nPage size: "));
    assert!(blocks[3].ends_with("Entries: 3\n"));
}

#[test]
fn all_skips_ordinary_root_keys() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_store(
        temp.path(),
        &[("alpha", 2), ("beta", 0), ("gamma", 5)],
        &["config", "aaa-plain", "zzz-plain"],
    );

    let output = run(&["-a"], temp.path());
    assert!(output.status.success());
    let text = stdout(&output);
    assert_eq!(stat_blocks(&text), 4);
    assert!(text.starts_with("Page size: "));
    assert!(text.contains("Entries: 6\n"));
    assert!(text.contains("\nalpha\n"));
    assert!(text.contains("\nbeta\n"));
    assert!(text.contains("\ngamma\n"));
    assert!(!text.contains("config"));
    assert!(!text.contains("plain"));
}

#[test]
fn named_sub_database_reports_only_that_table() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_store(temp.path(), &[("alpha", 2), ("gamma", 7)], &["config"]);

    let output = run(&["-s", "gamma"], temp.path());
    assert!(output.status.success());
    let text = stdout(&output);
    assert_eq!(text.lines().count(), 6);
    assert!(text.ends_with("Entries: 7\n"));
    assert!(!text.contains("gamma"));
}

#[test]
fn missing_sub_database_fails_without_stats() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_store(temp.path(), &[("alpha", 2)], &["config"]);

    let output = run(&["-s", "nope"], temp.path());
    assert!(!output.status.success());
    let text = stdout(&output);
    assert_eq!(stat_blocks(&text), 0);
    assert!(text.starts_with("table_open failed, error -30798 "), "{text}");

    let output = run(&["-s", "config"], temp.path());
    assert!(!output.status.success());
    let text = stdout(&output);
    assert_eq!(stat_blocks(&text), 0);
    assert!(text.starts_with("table_open failed, error -30784 "), "{text}");
}

#[test]
fn env_info_block_precedes_stats_only_when_requested() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_store(temp.path(), &[("alpha", 2)], &[]);

    let output = run(&["-e"], temp.path());
    assert!(output.status.success());
    let text = stdout(&output);
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 11);
    assert!(lines[0].starts_with("Map size: "));
    assert!(lines[1].starts_with("Last transaction ID: "));
    assert!(lines[2].starts_with("Last page used: "));
    assert!(lines[3].starts_with("Max readers: "));
    assert!(lines[4].starts_with("Number of readers used: "));
    assert!(lines[5].starts_with("Page size: "));

    let output = run(&[], temp.path());
    assert!(output.status.success());
    assert!(!stdout(&output).contains("Map size"));
}

#[test]
fn wrong_arity_prints_usage_and_fails() {
    let output = cmd().output().expect("run");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));

    let output = cmd().args(["one", "two"]).output().expect("run");
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn unrecognized_option_is_named_before_usage() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(&["-x"], temp.path());
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    let named = stderr.find("-x").expect("option named");
    let usage = stderr.find("Usage").expect("usage printed");
    assert!(named < usage);
}

#[test]
fn missing_store_reports_open_failure() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run(&[], &temp.path().join("absent"));
    assert!(!output.status.success());
    let text = stdout(&output);
    assert!(text.starts_with("env_open failed, error "), "{text}");
    assert_eq!(stat_blocks(&text), 0);
}

#[test]
fn repeated_runs_are_byte_identical() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_store(temp.path(), &[("alpha", 20), ("beta", 3)], &["config"]);

    let first = run(&["-a", "-e"], temp.path());
    let second = run(&["-a", "-e"], temp.path());
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn json_output_lists_sub_databases() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_store(temp.path(), &[("beta", 1), ("alpha", 4)], &["config"]);

    let output = run(&["-a", "--json"], temp.path());
    assert!(output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert!(value.get("env").is_none());
    assert_eq!(value["table"]["stats"]["entries"], 3);
    let names = value["subdbs"]
        .as_array()
        .expect("subdbs array")
        .iter()
        .map(|entry| entry["name"].as_str().expect("name").to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["alpha", "beta"]);
    assert_eq!(value["subdbs"][0]["stats"]["entries"], 4);
}

#[test]
fn json_errors_are_enveloped() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_store(temp.path(), &[("alpha", 1)], &[]);

    let output = run(&["-s", "nope", "--json"], temp.path());
    assert!(!output.status.success());
    let value: Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(value["error"]["op"], "table_open");
    assert_eq!(value["error"]["code"], -30798);
}

#[test]
fn all_reports_more_sub_databases_than_table_slots() {
    let temp = tempfile::tempdir().expect("tempdir");
    let names = (0..40).map(|i| format!("t{i:03}")).collect::<Vec<_>>();
    let tables = names
        .iter()
        .map(|name| (name.as_str(), 1))
        .collect::<Vec<_>>();
    build_store(temp.path(), &tables, &["config"]);

    let cases: [&[&str]; 3] = [&["-a", "--max-tables", "4"], &["-a", "--max-tables", "1"], &["-a"]];
    for args in cases {
        let output = run(args, temp.path());
        let text = stdout(&output);
        assert!(output.status.success(), "{args:?}: {text}");
        assert_eq!(stat_blocks(&text), 41, "{args:?}");
        assert!(text.contains("\nt000\nPage size: "));
        assert!(text.contains("\nt039\nPage size: "));
    }
}

#[test]
fn all_reports_sub_databases_with_non_utf8_names() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_raw_store(temp.path(), &[b"alpha", &[0xff, b'x']]);

    let output = run(&["-a"], temp.path());
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stat_blocks(&text), 3);
    assert!(
        output
            .stdout
            .windows(4)
            .any(|window| window == b"\n\xffx\n")
    );

    let output = cmd()
        .arg(temp.path())
        .arg("-s")
        .arg(OsString::from_vec(vec![0xff, b'x']))
        .output()
        .expect("run mapstat");
    assert!(output.status.success());
    assert!(stdout(&output).ends_with("Entries: 1\n"));
}

#[test]
fn empty_sub_database_name_reports_engine_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    build_store(temp.path(), &[("alpha", 1)], &[]);

    let output = run(&["-s", ""], temp.path());
    assert!(!output.status.success());
    let text = stdout(&output);
    assert!(text.starts_with("table_open failed, error -30781 "), "{text}");
    assert_eq!(stat_blocks(&text), 0);
}

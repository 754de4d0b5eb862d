use std::fs;
use std::path::Path;

use netsurface::{canonicalize_or_current, default_host_for, sha256_file};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_returns_cwd_for_dot() {
    let original = std::env::current_dir().expect("cwd");
    let tmp = tempdir().expect("tempdir");
    std::env::set_current_dir(tmp.path()).expect("chdir tmp");

    let result = canonicalize_or_current(".").expect("canonicalize").canonicalize().expect("canon");
    let expected = tmp.path().canonicalize().expect("canon tmp");

    std::env::set_current_dir(original).expect("restore cwd");
    assert_eq!(result, expected);
}

#[test]
fn canonicalize_or_current_keeps_absolute_missing_paths() {
    let tmp = tempdir().expect("tempdir");
    let missing = tmp.path().join("not-there.bin");
    let result = canonicalize_or_current(missing.to_str().unwrap()).expect("canonicalize");
    assert_eq!(result, missing);
}

#[test]
fn sha256_file_matches_known_digest() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("abc.bin");
    fs::write(&path, b"abc").expect("write");
    assert_eq!(
        sha256_file(&path).expect("hash"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn default_host_prefers_snapshot_for_json_inputs() {
    let all = vec!["capstone".to_string(), "rizin".to_string(), "snapshot".to_string()];
    assert_eq!(default_host_for(Path::new("dump.JSON"), &all), "snapshot");
    assert_eq!(default_host_for(Path::new("libclient.so"), &all), "capstone");

    let no_capstone = vec!["rizin".to_string(), "snapshot".to_string()];
    assert_eq!(default_host_for(Path::new("libclient.so"), &no_capstone), "rizin");
}

use std::fs;
use std::path::{Path, PathBuf};

use predicates::prelude::*;
use tempfile::tempdir;

const SNAPSHOT: &str = r#"{
    "binary": "client",
    "procedures": [
        { "address": "0x1000", "name": "net_init",
          "references": [ { "address": "0x1004", "symbol": "_socket" },
                          { "address": "0x1010", "target": "0x9000" } ] },
        { "address": "0x3000", "name": "helper",
          "references": [ { "address": "0x3004", "symbol": "memcpy" } ] }
    ],
    "strings": [ { "address": "0x2000", "value": "https://api.example.com/v1" },
                 { "address": "0x2100", "value": "192.168.1.1" } ],
    "symbols": [ { "address": "0x9000", "name": "sym.imp.SSL_connect" } ]
}"#;

fn write_snapshot(dir: &Path) -> PathBuf {
    let path = dir.join("client.json");
    fs::write(&path, SNAPSHOT).expect("write snapshot");
    path
}

fn netsurface() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("netsurface")
}

#[test]
fn list_hosts_includes_snapshot() {
    netsurface()
        .arg("list-hosts")
        .assert()
        .success()
        .stdout(predicate::str::contains("snapshot"));
}

#[test]
fn list_hosts_json_is_an_array() {
    let out = netsurface().args(["list-hosts", "--json"]).output().expect("run");
    assert!(out.status.success());
    let hosts: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert!(hosts.as_array().unwrap().iter().any(|h| h["name"] == "snapshot"));
}

#[test]
fn catalog_filters_by_category() {
    netsurface()
        .args(["catalog", "--category", "tls_handshake"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SSL_connect"))
        .stdout(predicate::str::contains("getaddrinfo").not());
}

#[test]
fn catalog_rejects_unknown_category() {
    netsurface()
        .args(["catalog", "--category", "carrier_pigeon"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown category"));
}

#[test]
fn analyze_snapshot_prints_text_report() {
    let dir = tempdir().unwrap();
    let input = write_snapshot(dir.path());
    netsurface()
        .args(["analyze", "--quiet", "--input"])
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("sha256"))
        .stdout(predicate::str::contains("Host: snapshot"))
        .stdout(predicate::str::contains("SocketRaw"))
        .stdout(predicate::str::contains("TLSHandshake"))
        .stdout(predicate::str::contains("https://api.example.com/v1"))
        .stdout(predicate::str::contains("192.168.1.1"));
}

#[test]
fn analyze_json_is_machine_readable() {
    let dir = tempdir().unwrap();
    let input = write_snapshot(dir.path());
    let out = netsurface()
        .args(["analyze", "--json", "--input"])
        .arg(&input)
        .output()
        .expect("run analyze");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let record: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(record["sha256"].as_str().map(str::len), Some(64));
    let report = &record["report"];
    assert_eq!(report["complete"], true);
    assert!(report["findings"]["socket_raw"].is_object());
    assert!(report["findings"]["tls_handshake"].is_object());
    assert_eq!(report["ip_addresses"][0]["value"], "192.168.1.1");
    assert!(record.get("annotations").is_none());
}

#[test]
fn analyze_writes_output_file() {
    let dir = tempdir().unwrap();
    let input = write_snapshot(dir.path());
    let output = dir.path().join("report.txt");
    netsurface()
        .args(["analyze", "--quiet", "--sequential", "--batch-size", "1", "--input"])
        .arg(&input)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();
    let body = fs::read_to_string(&output).expect("report written");
    assert!(body.contains("Network procedures:"));
    assert!(body.contains("net_init"));
}

#[test]
fn analyze_annotations_land_in_the_database() {
    let dir = tempdir().unwrap();
    let input = write_snapshot(dir.path());
    let db = dir.path().join("notes.db");
    netsurface()
        .args(["analyze", "--quiet", "--input"])
        .arg(&input)
        .arg("--annotate-db")
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("Annotations: 4 written"));

    netsurface()
        .args(["annotations", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stdout(predicate::str::contains("0x00001004"))
        .stdout(predicate::str::contains("[netsurface] SocketRaw: call to socket"));

    let out = netsurface().args(["annotations", "--json", "--db"]).arg(&db).output().unwrap();
    let rows: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(rows.as_array().map(Vec::len), Some(4));
}

#[test]
fn analyze_writes_annotated_snapshot() {
    let dir = tempdir().unwrap();
    let input = write_snapshot(dir.path());
    let annotated = dir.path().join("client.annotated.json");
    netsurface()
        .args(["analyze", "--quiet", "--input"])
        .arg(&input)
        .arg("--annotate-snapshot")
        .arg(&annotated)
        .assert()
        .success();

    let doc: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&annotated).unwrap()).expect("json");
    assert_eq!(doc["binary"], "client");
    assert_eq!(doc["annotations"].as_array().map(Vec::len), Some(4));
}

#[test]
fn analyze_fails_for_missing_input() {
    netsurface()
        .args(["analyze", "--input", "does/not/exist.bin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input not found"));
}

#[test]
fn analyze_rejects_unknown_host() {
    let dir = tempdir().unwrap();
    let input = write_snapshot(dir.path());
    netsurface()
        .args(["analyze", "--host", "ida", "--input"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown host 'ida'"));
}

#[test]
fn conflicting_catalog_fails_unless_lenient() {
    let dir = tempdir().unwrap();
    let input = write_snapshot(dir.path());
    let ext = dir.path().join("ext.yaml");
    fs::write(
        &ext,
        "version: dup\nsignatures:\n  - symbol: socket\n    category: http_client\n    family: c_socket\n    confidence: 0.4\n",
    )
    .unwrap();

    netsurface()
        .args(["analyze", "--quiet", "--input"])
        .arg(&input)
        .arg("--catalog")
        .arg(&ext)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Catalog conflict"));

    netsurface()
        .args(["analyze", "--quiet", "--lenient-catalog", "--input"])
        .arg(&input)
        .arg("--catalog")
        .arg(&ext)
        .assert()
        .success()
        .stdout(predicate::str::contains("Catalog: 2025.1+dup"));
}

//! `key generate`, `cert create` and `cert show` through the binary.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use trustkit::{Certificate, PrivateKey};

fn trustkit(home: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("trustkit").unwrap();
    cmd.env("TRUSTKIT_HOME", home)
        .env("TRUSTKIT_CONFIG", home.join("config.toml"));
    cmd
}

#[test]
fn generate_key_and_sign_chain() {
    let dir = common::temp_home();
    let home = dir.path();
    let ca_key = home.join("ca.key");
    let ca_pem = home.join("ca.pem");
    let leaf_key = home.join("leaf.key");
    let leaf_pem = home.join("leaf.pem");

    trustkit(home)
        .args(["key", "generate", "--out"])
        .arg(&ca_key)
        .assert()
        .success()
        .stdout(predicate::str::contains("2048-bit"));
    trustkit(home)
        .args(["key", "generate", "--out"])
        .arg(&leaf_key)
        .assert()
        .success();

    trustkit(home)
        .args(["cert", "create", "--cn", "Dev Root", "--org", "Test Org", "--ca", "--days", "30"])
        .arg("--key")
        .arg(&ca_key)
        .arg("--out")
        .arg(&ca_pem)
        .assert()
        .success();

    trustkit(home)
        .args(["cert", "create", "--cn", "app.test", "--san", "app.test", "--san", "127.0.0.1"])
        .arg("--key")
        .arg(&ca_key)
        .arg("--issuer")
        .arg(&ca_pem)
        .arg("--subject-key")
        .arg(&leaf_key)
        .arg("--out")
        .arg(&leaf_pem)
        .assert()
        .success();

    let root = Certificate::load_from_file(&ca_pem).unwrap();
    let leaf = Certificate::load_from_file(&leaf_pem).unwrap();
    assert!(root.is_ca());
    assert!(!leaf.is_ca());
    assert_eq!(
        leaf.public_key(),
        PrivateKey::load_from_file(&leaf_key).unwrap().public_key().unwrap()
    );
    leaf.x509()
        .unwrap()
        .verify_signature(Some(root.x509().unwrap().public_key()))
        .unwrap();

    trustkit(home)
        .args(["cert", "show"])
        .arg(&leaf_pem)
        .assert()
        .success()
        .stdout(predicate::str::contains("app.test"))
        .stdout(predicate::str::contains("IP SAN:       127.0.0.1"));
}

#[test]
fn undersized_key_is_rejected() {
    let dir = common::temp_home();
    trustkit(dir.path())
        .args(["key", "generate", "--bits", "1024", "--out"])
        .arg(dir.path().join("weak.key"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 2048 bits"));
}

#[test]
fn show_missing_cert_fails() {
    let dir = common::temp_home();
    trustkit(dir.path())
        .args(["cert", "show"])
        .arg(dir.path().join("absent.pem"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.pem"));
}

#[test]
fn days_outside_range_are_rejected() {
    let dir = common::temp_home();
    let key = dir.path().join("ca.key");
    PrivateKey::generate(2048).unwrap().write_to_file(&key).unwrap();

    for days in ["0", "-5", "4000000"] {
        trustkit(dir.path())
            .args(["cert", "create", "--cn", "range.test", "--days", days])
            .arg("--key")
            .arg(&key)
            .arg("--out")
            .arg(dir.path().join("range.pem"))
            .assert()
            .failure();
    }
    assert!(!dir.path().join("range.pem").exists());
}

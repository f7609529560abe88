use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn kiln_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("kiln"))
}

// ============================================================================
// PROJECT INITIALIZATION TESTS
// ============================================================================

#[test]
fn test_init_creates_config_and_sources() {
    let temp_dir = TempDir::new().unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .arg("--init")
        .assert()
        .success()
        .stdout(predicate::str::contains("kiln.yaml"));

    assert!(temp_dir.path().join("kiln.yaml").exists());
    assert!(temp_dir.path().join("src/app.ts").exists());

    let config = fs::read_to_string(temp_dir.path().join("kiln.yaml")).unwrap();
    assert!(config.contains("src/app.ts"));
    assert!(config.contains("outDir"));
}

#[test]
fn test_initialized_project_builds() {
    let temp_dir = TempDir::new().unwrap();

    kiln_cmd().current_dir(&temp_dir).arg("--init").assert().success();
    kiln_cmd().current_dir(&temp_dir).assert().success();

    let app = fs::read_to_string(temp_dir.path().join("dist/src/app.js")).unwrap();
    assert!(app.contains("require(\"./greeting\")"));
    assert!(app.contains("exports.message = message;"));
    assert!(temp_dir.path().join("dist/src/greeting.js").exists());
}

// ============================================================================
// BUILD TESTS
// ============================================================================

#[test]
fn test_build_entry_from_command_line() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("app.ts"), "export const a = 1;\n").unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .args(["app.ts", "--out-dir", "out"])
        .assert()
        .success();

    let app = fs::read_to_string(temp_dir.path().join("out/app.js")).unwrap();
    assert_eq!(app, "var a = 1;\nexports.a = a;\n");
}

#[test]
fn test_build_copies_assets() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("app.ts"),
        "var logo = b.asset(\"logo.png\");\n",
    )
    .unwrap();
    fs::write(temp_dir.path().join("logo.png"), [0u8, 1, 2]).unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .args(["app.ts", "--out-dir", "out"])
        .assert()
        .success();

    assert_eq!(
        fs::read(temp_dir.path().join("out/logo.png")).unwrap(),
        vec![0u8, 1, 2]
    );
}

#[test]
fn test_sprite_merge_warns_without_encoder() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("app.ts"), "export const a = 1;\n").unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .args(["app.ts", "--out-dir", "out", "--sprite-merge"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no atlas encoder"));
}

#[test]
fn test_merged_bundle() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("app.ts"),
        "import { b } from \"./lib\";\nexport const a = b;\n",
    )
    .unwrap();
    fs::write(temp_dir.path().join("lib.ts"), "export const b = 2;\n").unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .args(["app.ts", "--bundle", "merged", "--out-dir", "out"])
        .assert()
        .success();

    let bundle = fs::read_to_string(temp_dir.path().join("out/bundle.js")).unwrap();
    assert!(bundle.contains("R(\"lib\",function("));
    assert!(bundle.contains("R.r(\"app\");"));
    assert!(!temp_dir.path().join("out/app.js").exists());
}

#[test]
fn test_fast_bundle_has_source_map() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("app.ts"), "export const a = 1;\n").unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .args(["app.ts", "--bundle", "fast", "--out-dir", "out"])
        .assert()
        .success();

    assert!(temp_dir.path().join("out/bundle.js").exists());
    assert!(temp_dir.path().join("out/bundle.js.map").exists());
}

#[test]
fn test_project_file_in_subdirectory() {
    let temp_dir = TempDir::new().unwrap();
    let sub = temp_dir.path().join("site");
    fs::create_dir_all(&sub).unwrap();
    fs::write(sub.join("kiln.yaml"), "main:\n  - main.ts\noutDir: build\n").unwrap();
    fs::write(sub.join("main.ts"), "export const x = 0;\n").unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .args(["--project", "site/kiln.yaml"])
        .assert()
        .success();

    assert!(sub.join("build/main.js").exists());
}

#[test]
fn test_json_config_is_found() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("kiln.json"),
        r#"{ "main": ["app.ts"], "outDir": "out" }"#,
    )
    .unwrap();
    fs::write(temp_dir.path().join("app.ts"), "export const a = 1;\n").unwrap();

    kiln_cmd().current_dir(&temp_dir).assert().success();

    assert!(temp_dir.path().join("out/app.js").exists());
}

// ============================================================================
// ERROR TESTS
// ============================================================================

#[test]
fn test_no_entry_files_fails() {
    let temp_dir = TempDir::new().unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No entry files specified"));
}

#[test]
fn test_missing_entry_fails() {
    let temp_dir = TempDir::new().unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .args(["missing.ts", "--out-dir", "out"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot read missing.ts"));
}

#[test]
fn test_duplicate_export_is_reported_with_code() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("app.ts"),
        "export const a = 1;\nexport const a = 2;\n",
    )
    .unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .args(["app.ts", "--out-dir", "out", "--diagnostics"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Duplicate export 'a'"))
        .stderr(predicate::str::contains("[KS2]"));

    assert!(!temp_dir.path().join("out/app.js").exists());
}

#[test]
fn test_invalid_bundle_mode_fails() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("app.ts"), "export const a = 1;\n").unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .args(["app.ts", "--bundle", "tiny"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid bundle mode 'tiny'"));
}

#[test]
fn test_invalid_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("kiln.yaml"), "main: [unclosed\n").unwrap();

    kiln_cmd()
        .current_dir(&temp_dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load"));
}

//! Integration tests for the catalog-ingest CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const REFERENCE: &str = include_str!("fixtures/reference.yaml");

const COURSE_HEADER: &str = "Organization,Title,Number,Verified Price,Course Pacing,Start Date,Start Time,End Date,End Time,Image,External Identifier,Redirect Url,Variant Id";

/// Helper to get a catalog-ingest command isolated from the user's config
fn cli() -> Command {
    let mut cmd = Command::cargo_bin("catalog-ingest").unwrap();
    for var in [
        "CATALOG_PARTNER",
        "CATALOG_DEFAULT_PRODUCT_SOURCE",
        "CATALOG_SHEETS_API_KEY",
        "CATALOG_STUDIO_TOKEN",
        "CATALOG_MARKETING_PASSWORD",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("NO_PROXY", "127.0.0.1,localhost");
    cmd
}

/// Helper to run a command inside the workspace
fn cli_in(tmp: &TempDir) -> Command {
    let mut cmd = cli();
    cmd.current_dir(tmp.path())
        .env("HOME", tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join(".config"));
    cmd
}

/// Helper to create a workspace loaded with the reference data
fn setup_workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    cli_in(&tmp).arg("init").assert().success();
    fs::write(tmp.path().join("reference.yaml"), REFERENCE).unwrap();
    cli_in(&tmp)
        .args(["seed", "reference.yaml"])
        .assert()
        .success();
    tmp
}

/// Mock server serving a card image
fn image_server() -> mockito::ServerGuard {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/card.png")
        .with_status(200)
        .with_header("content-type", "image/png")
        .with_body(b"\x89PNG\r\n\x1a\ncard")
        .create();
    server
}

fn course_line(server: &mockito::ServerGuard, number: &str, external_id: &str) -> String {
    format!(
        "edx,Intro Bio {n},{n},100,instructor-paced,2025-01-01,09:00:00,2025-03-01,17:00:00,{url}/card.png,{id},https://partner.example/{n},V1",
        n = number,
        url = server.url(),
        id = external_id
    )
}

fn write_csv(dir: &Path, name: &str, lines: &[&str]) {
    fs::write(dir.join(name), format!("{}\n", lines.join("\n"))).unwrap();
}

/// Import one executive education course and return the JSON report
fn import_course(tmp: &TempDir, server: &mockito::ServerGuard) -> serde_json::Value {
    let line = course_line(server, "BIO101", "EXT-1");
    write_csv(tmp.path(), "courses.csv", &[COURSE_HEADER, &line]);

    let output = cli_in(tmp)
        .args([
            "import",
            "course",
            "courses.csv",
            "--product-type",
            "executive-education-2u",
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn created_uuid(report: &serde_json::Value) -> String {
    report["created_products"][0]["uuid"]
        .as_str()
        .unwrap()
        .to_string()
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("archive"))
        .stdout(predicate::str::contains("extract"));
}

#[test]
fn test_version_displays() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("catalog-ingest"));
}

#[test]
fn test_commands_need_a_workspace() {
    let tmp = TempDir::new().unwrap();
    cli_in(&tmp)
        .args(["import", "course", "courses.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("catalog-ingest init"));
}

#[test]
fn test_completions_bash() {
    cli()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("catalog-ingest"));
}

// ============================================================================
// Workspace Tests
// ============================================================================

#[test]
fn test_init_creates_workspace() {
    let tmp = TempDir::new().unwrap();
    cli_in(&tmp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized catalog workspace"));

    assert!(tmp.path().join(".catalog/config.yaml").is_file());
    assert!(tmp.path().join(".catalog/catalog.db").is_file());
    assert!(tmp.path().join(".catalog/outbox").is_dir());
}

#[test]
fn test_init_twice_reports_existing() {
    let tmp = TempDir::new().unwrap();
    cli_in(&tmp).arg("init").assert().success();
    cli_in(&tmp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_seed_check_does_not_write() {
    let tmp = TempDir::new().unwrap();
    cli_in(&tmp).arg("init").assert().success();
    fs::write(tmp.path().join("reference.yaml"), REFERENCE).unwrap();

    cli_in(&tmp)
        .args(["seed", "reference.yaml", "--check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid seed document"));

    // Nothing seeded, so the partner cannot be resolved
    cli_in(&tmp)
        .arg("extract")
        .assert()
        .failure()
        .stderr(predicate::str::contains("edx"));
}

#[test]
fn test_seed_rejects_invalid_document() {
    let tmp = TempDir::new().unwrap();
    cli_in(&tmp).arg("init").assert().success();
    fs::write(
        tmp.path().join("bad.yaml"),
        "courses:\n  - partner: edx\n    key: not-a-key\n    title: Bad\n",
    )
    .unwrap();

    cli_in(&tmp)
        .args(["seed", "bad.yaml"])
        .assert()
        .failure();
}

#[test]
fn test_seed_json_counts() {
    let tmp = TempDir::new().unwrap();
    cli_in(&tmp).arg("init").assert().success();
    fs::write(tmp.path().join("reference.yaml"), REFERENCE).unwrap();

    let output = cli_in(&tmp)
        .args(["seed", "reference.yaml", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(stats.is_object());
}

// ============================================================================
// Import Tests
// ============================================================================

#[test]
fn test_import_template_prints_header() {
    cli()
        .args(["import", "editor", "--template"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(
            "username_or_email,course_key_or_uuid,action",
        ));
}

#[test]
fn test_import_without_input_fails() {
    let tmp = setup_workspace();
    cli_in(&tmp)
        .args(["import", "course"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No input given"));
}

#[test]
fn test_import_course_creates_product() {
    let tmp = setup_workspace();
    let server = image_server();

    let report = import_course(&tmp, &server);

    assert_eq!(report["loader"], "course");
    assert_eq!(report["total_products_count"], 1);
    assert_eq!(report["success_count"], 1);
    assert_eq!(report["failure_count"], 0);
    let created = &report["created_products"][0];
    assert_eq!(created["key"], "edx+BIO101");
    assert_eq!(created["url_slug"], "intro-bio-bio101");
    assert_eq!(created["variant_id"], "V1");
}

#[test]
fn test_import_course_replay_updates() {
    let tmp = setup_workspace();
    let server = image_server();
    import_course(&tmp, &server);

    cli_in(&tmp)
        .args([
            "import",
            "course",
            "courses.csv",
            "--product-type",
            "executive-education-2u",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("updated_products_count"))
        .stdout(predicate::str::contains("Created").not());
}

#[test]
fn test_import_course_report_lists_errors() {
    let tmp = setup_workspace();
    let server = image_server();
    let good = course_line(&server, "BIO101", "EXT-1");
    let bad = good.replacen("edx,", "nobody,", 1).replace("EXT-1", "EXT-2");
    write_csv(tmp.path(), "courses.csv", &[COURSE_HEADER, &good, &bad]);

    cli_in(&tmp)
        .args([
            "import",
            "course",
            "courses.csv",
            "--product-type",
            "executive-education-2u",
            "--report",
            "out/report.csv",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("MISSING_ORGANIZATION"))
        .stdout(predicate::str::contains("Report written"));

    let csv = fs::read_to_string(tmp.path().join("out/report.csv")).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("error_key,message"));
    assert!(csv.contains("MISSING_ORGANIZATION"));
    assert!(csv.contains("summary,failure_count=1"));
    assert!(csv.contains("summary,success_count=1"));
}

#[test]
fn test_import_reads_stdin() {
    let tmp = setup_workspace();
    let server = image_server();
    let line = course_line(&server, "BIO101", "EXT-1");

    let output = cli_in(&tmp)
        .args([
            "import",
            "course",
            "-",
            "--product-type",
            "executive-education-2u",
            "--format",
            "json",
        ])
        .write_stdin(format!("{}\n{}\n", COURSE_HEADER, line))
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["created_products"].as_array().unwrap().len(), 1);
}

#[test]
fn test_import_unknown_product_source_fails() {
    let tmp = setup_workspace();
    write_csv(tmp.path(), "courses.csv", &[COURSE_HEADER]);

    cli_in(&tmp)
        .args([
            "import",
            "course",
            "courses.csv",
            "--product-source",
            "nowhere",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn test_import_sheet_tab() {
    let tmp = setup_workspace();
    let mut server = image_server();
    let sheet = server
        .mock("GET", "/v4/spreadsheets/sheet-1")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(r#"{"sheets":[{"properties":{"sheetId":7,"title":"Courses"}}]}"#)
        .create();
    let header: Vec<&str> = COURSE_HEADER.split(',').collect();
    let line = course_line(&server, "BIO101", "EXT-1");
    let cells: Vec<&str> = line.split(',').collect();
    let values = server
        .mock("GET", "/v4/spreadsheets/sheet-1/values/Courses")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(serde_json::json!({ "values": [header, cells] }).to_string())
        .create();
    fs::write(
        tmp.path().join(".catalog/config.yaml"),
        format!(
            "sheets:\n  base_url: {}\n  api_key: test-key\nproduct_source_mapping_table:\n  executive-education-2u:\n    edx:\n      sheet_id: sheet-1\n      input_tab_id: \"7\"\n",
            server.url()
        ),
    )
    .unwrap();

    let output = cli_in(&tmp)
        .args([
            "import",
            "course",
            "--product-type",
            "executive-education-2u",
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["success_count"], 1);
    sheet.assert();
    values.assert();
}

#[test]
fn test_notification_lands_in_outbox() {
    let tmp = setup_workspace();
    let server = image_server();
    fs::write(
        tmp.path().join(".catalog/config.yaml"),
        "notification:\n  outbox_dir: .catalog/outbox\n  recipients: [ops@example.com]\n",
    )
    .unwrap();

    import_course(&tmp, &server);

    let files: Vec<_> = fs::read_dir(tmp.path().join(".catalog/outbox"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    let summary = files
        .iter()
        .map(|path| fs::read_to_string(path).unwrap())
        .find(|body| body.contains("course ingestion run"))
        .expect("run summary in outbox");
    assert!(summary.starts_with("To: ops@example.com"));
    assert!(summary.contains("No errors reported in the ingestion."));
}

#[test]
fn test_import_editor_rows() {
    let tmp = setup_workspace();
    let server = image_server();
    import_course(&tmp, &server);
    write_csv(
        tmp.path(),
        "editors.csv",
        &[
            "username_or_email,course_key_or_uuid,action",
            "bob,edx+BIO101,add",
            "alice@example.com,edx+BIO101,add",
            "carol,edx+BIO101,add",
        ],
    );

    let output = cli_in(&tmp)
        .args(["import", "editor", "editors.csv", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["success_count"], 1);
    assert_eq!(report["failure_count"], 2);
    assert_eq!(report["errors"]["USER_ORG_MISMATCH"].as_array().unwrap().len(), 1);
    assert_eq!(report["errors"]["USER_NOT_FOUND"].as_array().unwrap().len(), 1);
}

#[test]
fn test_import_geolocation_rows() {
    let tmp = setup_workspace();
    let server = image_server();
    let uuid = created_uuid(&import_course(&tmp, &server));
    write_csv(
        tmp.path(),
        "geo.csv",
        &[
            "UUID,Product Type,Location Name,Latitude,Longitude",
            &format!("{},Course,Boston,42.36,-71.05", uuid),
            "not-a-uuid,Course,Boston,42.36,-71.05",
        ],
    );

    let output = cli_in(&tmp)
        .args(["import", "geolocation", "geo.csv", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["updated_products_count"], 1);
    assert_eq!(report["failure_count"], 1);
}

#[test]
fn test_import_csv_format_prints_summary() {
    let tmp = setup_workspace();
    write_csv(
        tmp.path(),
        "editors.csv",
        &["username_or_email,course_key_or_uuid,action", "bob,edx+NONE,add"],
    );

    cli_in(&tmp)
        .args(["import", "editor", "editors.csv", "--format", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("error_key,message"))
        .stdout(predicate::str::contains("COURSE_NOT_FOUND"));
}

// ============================================================================
// Archive / Slugs / Extract Tests
// ============================================================================

#[test]
fn test_archive_requires_a_target() {
    let tmp = setup_workspace();
    cli_in(&tmp).arg("archive").assert().failure();
}

#[test]
fn test_archive_by_uuid() {
    let tmp = setup_workspace();
    let server = image_server();
    let uuid = created_uuid(&import_course(&tmp, &server));

    cli_in(&tmp)
        .args([
            "archive",
            "--uuids",
            &format!("{},00000000-0000-0000-0000-000000000000", uuid),
            "--mangle-title",
            "--report",
            "archive.csv",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Archived 1 of 2 course(s)"));

    let csv = fs::read_to_string(tmp.path().join("archive.csv")).unwrap();
    assert!(csv.starts_with("course_uuid,title,status"));
    assert!(csv.contains(&format!("{},Intro Bio BIO101,success", uuid)));
}

#[test]
fn test_slugs_update_and_report_failures() {
    let tmp = setup_workspace();
    let server = image_server();
    let uuid = created_uuid(&import_course(&tmp, &server));
    write_csv(
        tmp.path(),
        "slugs.csv",
        &[
            "course_uuid,new_slug",
            &format!("{},learn/biology/intro-bio", uuid),
            "not-a-uuid,whatever",
        ],
    );

    cli_in(&tmp)
        .args(["slugs", "slugs.csv", "--report", "slug-errors.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated 1 course url slug(s)"))
        .stdout(predicate::str::contains("1 row(s) failed"));

    let csv = fs::read_to_string(tmp.path().join("slug-errors.csv")).unwrap();
    assert!(csv.starts_with("course_uuid,old_slug,new_slug,error"));
    assert!(csv.contains("Invalid course uuid: not-a-uuid"));
}

#[test]
fn test_extract_empty_catalog_fails() {
    let tmp = setup_workspace();
    cli_in(&tmp)
        .args(["extract", "-o", "catalog.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No products found"));
    assert!(!tmp.path().join("catalog.csv").exists());
}

#[test]
fn test_extract_writes_published_courses() {
    let tmp = setup_workspace();
    let server = image_server();
    import_course(&tmp, &server);

    cli_in(&tmp)
        .args(["extract", "-o", "catalog.csv"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote 1 product(s)"));

    let csv = fs::read_to_string(tmp.path().join("catalog.csv")).unwrap();
    assert!(csv.starts_with("UUID,Title,Organizations Name"));
    assert!(csv.contains("Intro Bio BIO101"));
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_show_json() {
    let tmp = setup_workspace();
    let output = cli_in(&tmp)
        .args(["config", "show", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let config: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(config["partner"], "edx");
    assert!(config["notification"]["outbox_dir"]
        .as_str()
        .unwrap()
        .ends_with(".catalog/outbox"));
}

#[test]
fn test_config_show_env_override() {
    let tmp = setup_workspace();
    cli_in(&tmp)
        .args(["config", "show"])
        .env("CATALOG_PARTNER", "mitx")
        .assert()
        .success()
        .stdout(predicate::str::contains("partner: mitx"));
}

#[test]
fn test_config_path_outside_workspace() {
    let tmp = TempDir::new().unwrap();
    cli_in(&tmp)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not in a workspace"));
}

#[test]
fn test_config_schema_is_json() {
    let output = cli().args(["config", "schema"]).output().unwrap();
    assert!(output.status.success());
    let schema: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(schema["properties"]["courses"].is_object());
}

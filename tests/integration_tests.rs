//! Integration tests for the placeload CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PLACES_CSV: &str = "\
Name,Type,Country,City,Latitude,Longitude
Cafe 1,cafe,Poland,Krakow,50.06,19.94
Cafe 2,cafe,Poland,Krakow,50.07,19.95
Bar 3,bar,Poland,Warsaw,52.23,21.01
";

/// Helper to get a placeload command with batching pauses disabled
fn placeload() -> Command {
    let mut cmd = Command::cargo_bin("placeload").unwrap();
    cmd.env("PLACELOAD_BATCH_DELAY_MS", "0")
        .env_remove("PLACELOAD_LOG")
        .env_remove("PLACELOAD_BATCH_SIZE");
    cmd
}

/// Helper to create a workspace in a temp directory
fn setup_workspace() -> TempDir {
    let tmp = TempDir::new().unwrap();
    placeload()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success();
    tmp
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).unwrap();
}

fn list_json(tmp: &TempDir) -> Vec<Value> {
    let output = placeload()
        .current_dir(tmp.path())
        .args(["list", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    json.as_array().unwrap().clone()
}

fn import_json(tmp: &TempDir, file: &str) -> Value {
    let output = placeload()
        .current_dir(tmp.path())
        .args(["import", file, "--yes", "--format", "json"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

// ============================================================================
// Init / Template
// ============================================================================

#[test]
fn test_init_creates_workspace() {
    let tmp = TempDir::new().unwrap();
    placeload()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized placeload workspace"));

    assert!(tmp.path().join(".placeload/config.yaml").is_file());
    assert!(tmp.path().join(".placeload/ledgers").is_dir());
}

#[test]
fn test_init_twice_reports_existing() {
    let tmp = setup_workspace();
    placeload()
        .current_dir(tmp.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_command_outside_workspace_fails() {
    let tmp = TempDir::new().unwrap();
    placeload()
        .current_dir(tmp.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a placeload workspace"));
}

#[test]
fn test_template_prints_header_and_example() {
    placeload()
        .arg("template")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("name,type,country,city"))
        .stdout(predicate::str::contains("Cafe Central"));
}

#[test]
fn test_template_output_imports_cleanly() {
    let tmp = setup_workspace();
    let output = placeload().arg("template").output().unwrap();
    fs::write(tmp.path().join("template.csv"), &output.stdout).unwrap();

    let summary = import_json(&tmp, "template.csv");
    assert_eq!(summary["created"], 1);
    assert_eq!(summary["errors"], 0);
}

// ============================================================================
// Import
// ============================================================================

#[test]
fn test_import_creates_places() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);

    placeload()
        .current_dir(tmp.path())
        .args(["import", "places.csv", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created:   3"))
        .stdout(predicate::str::contains("placeload undo"));

    let places = list_json(&tmp);
    assert_eq!(places.len(), 3);
    let cafe = places.iter().find(|p| p["name"] == "Cafe 1").unwrap();
    assert_eq!(cafe["city"], "Krakow");
    assert_eq!(cafe["latitude"], 50.06);
}

#[test]
fn test_import_json_summary() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);

    let summary = import_json(&tmp, "places.csv");
    assert_eq!(summary["kind"], "import");
    assert_eq!(summary["state"], "completed");
    assert_eq!(summary["created"], 3);
    assert_eq!(summary["created_ids"].as_array().unwrap().len(), 3);
}

#[test]
fn test_import_reports_invalid_rows() {
    let tmp = setup_workspace();
    write_file(
        tmp.path(),
        "places.csv",
        "name,type,country,city\nCafe 1,cafe,Poland,Krakow\nShip,spaceship,Poland,Gdansk\n",
    );

    placeload()
        .current_dir(tmp.path())
        .args(["import", "places.csv", "--yes", "--errors"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created:   1"))
        .stderr(predicate::str::contains("1 row(s) failed validation"))
        .stderr(predicate::str::contains("is not one of"));

    assert_eq!(list_json(&tmp).len(), 1);
}

#[test]
fn test_import_without_country_column_fails_every_row() {
    let tmp = setup_workspace();
    write_file(
        tmp.path(),
        "places.csv",
        "name,type,city\nCafe 1,cafe,Krakow\nCafe 2,cafe,Krakow\n",
    );

    placeload()
        .current_dir(tmp.path())
        .args(["import", "places.csv", "--yes", "--errors"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("country is required"))
        .stderr(predicate::str::contains("No valid rows to import"));

    assert!(list_json(&tmp).is_empty());
}

#[test]
fn test_import_with_mapping_override() {
    let tmp = setup_workspace();
    write_file(
        tmp.path(),
        "places.csv",
        "Title,Type,Country,Town\nCafe 1,cafe,Poland,Krakow\n",
    );

    let summary_out = placeload()
        .current_dir(tmp.path())
        .args([
            "import",
            "places.csv",
            "--map",
            "name=Title",
            "--map",
            "city=Town",
            "--yes",
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(summary_out.status.success());

    let places = list_json(&tmp);
    assert_eq!(places.len(), 1);
    assert_eq!(places[0]["name"], "Cafe 1");
    assert_eq!(places[0]["city"], "Krakow");
}

#[test]
fn test_import_dry_run_leaves_store_untouched() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);

    placeload()
        .current_dir(tmp.path())
        .args(["import", "places.csv", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run complete"));

    assert!(list_json(&tmp).is_empty());
}

#[test]
fn test_import_requires_yes_without_terminal() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);

    placeload()
        .current_dir(tmp.path())
        .args(["import", "places.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("confirmation"));

    assert!(list_json(&tmp).is_empty());
}

#[test]
fn test_import_selected_rows_only() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);

    placeload()
        .current_dir(tmp.path())
        .args(["import", "places.csv", "--rows", "1,3", "--yes"])
        .assert()
        .success();

    let names: Vec<String> = list_json(&tmp)
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Cafe 1".to_string()));
    assert!(names.contains(&"Bar 3".to_string()));
}

#[test]
fn test_import_wide_row_range_is_bounded() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);

    placeload()
        .current_dir(tmp.path())
        .args(["import", "places.csv", "--rows", "2-99999999999", "--yes"])
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .success();
    assert_eq!(list_json(&tmp).len(), 2);

    placeload()
        .current_dir(tmp.path())
        .args(["import", "places.csv", "--rows", "9-99999999999", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Row 9 is out of range"));
}

#[test]
fn test_import_errors_name_source_rows_after_blank_lines() {
    let tmp = setup_workspace();
    write_file(
        tmp.path(),
        "places.csv",
        "name,type,country,city\nA,cafe,PL,K\n\n\nB,foodtruck,PL,K\n",
    );

    let output = placeload()
        .current_dir(tmp.path())
        .args(["import", "places.csv", "--rows", "1,4", "--dry-run", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["create"], 1);
    let errors = json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["row"], 3);
    assert_eq!(errors[0]["field"], "type");
}

#[test]
fn test_import_enriches_empty_fields() {
    let tmp = setup_workspace();
    write_file(
        tmp.path(),
        "gazetteer.csv",
        "name,city,address,website\nCafe 1,Krakow,Rynek 1,https://cafe1.example\n",
    );
    write_file(
        tmp.path(),
        "places.csv",
        "name,type,country,city,website\nCafe 1,cafe,Poland,Krakow,https://own.example\n",
    );

    placeload()
        .current_dir(tmp.path())
        .args(["import", "places.csv", "--enrich", "gazetteer.csv", "--yes"])
        .assert()
        .success()
        .stderr(predicate::str::contains("1 field(s) filled"));

    let places = list_json(&tmp);
    assert_eq!(places[0]["address"], "Rynek 1");
    assert_eq!(places[0]["website"], "https://own.example");
}

#[test]
fn test_import_missing_file() {
    let tmp = setup_workspace();
    placeload()
        .current_dir(tmp.path())
        .args(["import", "nope.csv", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_import_with_ids_updates_existing() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);
    import_json(&tmp, "places.csv");

    let places = list_json(&tmp);
    let cafe = places.iter().find(|p| p["name"] == "Cafe 1").unwrap();
    let id = cafe["id"].as_str().unwrap();
    write_file(
        tmp.path(),
        "update.csv",
        &format!("id,name,type,country,city\n{},Cafe 1,cafe,Poland,Gdansk\n", id),
    );

    let summary = import_json(&tmp, "update.csv");
    assert_eq!(summary["created"], 0);
    assert_eq!(summary["updated"], 1);

    let places = list_json(&tmp);
    assert_eq!(places.len(), 3);
    let cafe = places.iter().find(|p| p["id"] == id).unwrap();
    assert_eq!(cafe["city"], "Gdansk");
}

// ============================================================================
// List
// ============================================================================

#[test]
fn test_list_filters_and_count() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);
    import_json(&tmp, "places.csv");

    placeload()
        .current_dir(tmp.path())
        .args(["list", "--city", "krakow", "--count"])
        .assert()
        .success()
        .stdout(predicate::str::diff("2\n"));

    placeload()
        .current_dir(tmp.path())
        .args(["list", "--type", "bar"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bar 3"))
        .stdout(predicate::str::contains("Cafe 1").not());
}

#[test]
fn test_list_csv_format() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);
    import_json(&tmp, "places.csv");

    placeload()
        .current_dir(tmp.path())
        .args(["list", "--format", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("id,name,type,country,city"));
}

// ============================================================================
// Undo
// ============================================================================

#[test]
fn test_undo_removes_imported_places() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);
    let summary = import_json(&tmp, "places.csv");
    let job = summary["job_id"].as_str().unwrap().to_string();

    placeload()
        .current_dir(tmp.path())
        .args(["undo", "--list"])
        .assert()
        .success()
        .stdout(predicate::str::contains(job.as_str()));

    placeload()
        .current_dir(tmp.path())
        .args(["undo", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted:  3"));

    assert!(list_json(&tmp).is_empty());

    // Undo is single-shot
    placeload()
        .current_dir(tmp.path())
        .args(["undo", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to undo"));
}

#[test]
fn test_undo_restores_updated_fields() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);
    import_json(&tmp, "places.csv");
    placeload()
        .current_dir(tmp.path())
        .args(["undo", "--dismiss"])
        .assert()
        .success();

    let id = list_json(&tmp)
        .iter()
        .find(|p| p["name"] == "Cafe 2")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    write_file(
        tmp.path(),
        "update.csv",
        &format!("id,name,type,country,city\n{},Cafe Two,cafe,Poland,Krakow\n", id),
    );
    let summary = import_json(&tmp, "update.csv");
    let job = summary["job_id"].as_str().unwrap().to_string();

    placeload()
        .current_dir(tmp.path())
        .args(["undo", &job, "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored: 1"));

    let places = list_json(&tmp);
    assert_eq!(places.len(), 3);
    let cafe = places.iter().find(|p| p["id"] == id.as_str()).unwrap();
    assert_eq!(cafe["name"], "Cafe 2");
}

#[test]
fn test_undo_list_empty() {
    let tmp = setup_workspace();
    placeload()
        .current_dir(tmp.path())
        .args(["undo", "--list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

// ============================================================================
// Edit
// ============================================================================

#[test]
fn test_edit_export_then_apply() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);
    import_json(&tmp, "places.csv");

    placeload()
        .current_dir(tmp.path())
        .args(["edit", "--export", "edit.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 3 place(s)"));

    let exported = fs::read_to_string(tmp.path().join("edit.csv")).unwrap();
    assert!(exported.lines().next().unwrap().ends_with(",_delete"));
    let edited: String = exported
        .lines()
        .map(|line| {
            if line.contains("Bar 3") {
                line.replace("Warsaw", "Gdansk")
            } else if line.contains("Cafe 2") {
                format!("{}true", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    write_file(tmp.path(), "edit.csv", &edited);

    placeload()
        .current_dir(tmp.path())
        .args(["edit", "--from", "edit.csv", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated:   1"))
        .stdout(predicate::str::contains("Deleted:   1"));

    let places = list_json(&tmp);
    assert_eq!(places.len(), 2);
    let bar = places.iter().find(|p| p["name"] == "Bar 3").unwrap();
    assert_eq!(bar["city"], "Gdansk");
    assert!(places.iter().all(|p| p["name"] != "Cafe 2"));
}

#[test]
fn test_edit_set_flag_and_undo() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);
    import_json(&tmp, "places.csv");
    placeload()
        .current_dir(tmp.path())
        .args(["undo", "--dismiss"])
        .assert()
        .success();

    let id = list_json(&tmp)
        .iter()
        .find(|p| p["name"] == "Cafe 1")
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    placeload()
        .current_dir(tmp.path())
        .args(["edit", "--set", &format!("{}:is_featured=yes", id), "--yes"])
        .assert()
        .success();

    let places = list_json(&tmp);
    let cafe = places.iter().find(|p| p["id"] == id.as_str()).unwrap();
    assert_eq!(cafe["is_featured"], true);

    placeload()
        .current_dir(tmp.path())
        .args(["undo", "--yes"])
        .assert()
        .success();

    let places = list_json(&tmp);
    let cafe = places.iter().find(|p| p["id"] == id.as_str()).unwrap();
    assert!(cafe.get("is_featured").map_or(true, Value::is_null));
}

#[test]
fn test_edit_dry_run() {
    let tmp = setup_workspace();
    write_file(tmp.path(), "places.csv", PLACES_CSV);
    import_json(&tmp, "places.csv");
    let id = list_json(&tmp)[0]["id"].as_str().unwrap().to_string();

    placeload()
        .current_dir(tmp.path())
        .args(["edit", "--delete", &id, "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run complete"));

    assert_eq!(list_json(&tmp).len(), 3);
}

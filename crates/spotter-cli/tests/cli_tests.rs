use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A throwaway database shared by the commands of one test.
struct TestEnv {
    temp_dir: TempDir,
    db_path: String,
}

impl TestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory");
        let db_path = temp_dir
            .path()
            .join("cli_test.db")
            .to_str()
            .expect("Temp path is not UTF-8")
            .to_string();
        Self {
            temp_dir,
            db_path,
        }
    }

    /// `spotter --no-color --database-file <db>`
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("spotter").expect("Failed to find spotter binary");
        cmd.args(["--no-color", "--database-file", &self.db_path]);
        cmd
    }

    fn run(&self, args: &[&str]) -> String {
        let output = self.cmd().args(args).assert().success().get_output().clone();
        String::from_utf8(output.stdout).expect("stdout is not UTF-8")
    }

    /// Current version stamp of a plan, as printed by `--json plan stamp`.
    fn stamp(&self, plan_id: &str) -> String {
        let out = self.run(&["--json", "plan", "stamp", plan_id]);
        serde_json::from_str::<String>(out.trim()).expect("stamp is a JSON string")
    }

    fn seed_plan(&self) {
        self.run(&["plan", "create", "7", "Off-season"]);
        self.run(&["phase", "add", "1", "Base"]);
        self.run(&["session", "add", "1", "Push", "--duration", "60"]);
    }
}

#[test]
fn test_cli_create_plan_success() {
    let env = TestEnv::new();
    env.cmd()
        .args(["plan", "create", "7", "Off-season"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved plan"))
        .stdout(predicate::str::contains("# 1. Off-season"));
}

#[test]
fn test_cli_list_empty_plans() {
    let env = TestEnv::new();
    env.cmd()
        .args(["plan", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No plans found."));
}

#[test]
fn test_cli_default_command_lists_plans() {
    let env = TestEnv::new();
    env.run(&["plan", "create", "7", "Off-season"]);
    env.cmd()
        .assert()
        .success()
        .stdout(predicate::str::contains("## Off-season (ID: 1)"));
}

#[test]
fn test_cli_plan_tree_show() {
    let env = TestEnv::new();
    env.seed_plan();
    env.run(&[
        "exercise", "add", "1", "42", "Bench Press", "--sets", "3", "--reps", "8-12",
    ]);

    env.cmd()
        .args(["plan", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## 1. Base"))
        .stdout(predicate::str::contains("### 1. Push (60 min)"))
        .stdout(predicate::str::contains("**Bench Press** 3 x 8-12, rest 90s"));
}

#[test]
fn test_cli_show_missing_plan_fails() {
    let env = TestEnv::new();
    env.cmd()
        .args(["plan", "show", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_cli_stale_token_reports_conflict() {
    let env = TestEnv::new();
    env.run(&["plan", "create", "7", "Off-season"]);
    let token = env.stamp("1");

    env.cmd()
        .args(["phase", "add", "1", "Base", "--token", &token])
        .assert()
        .success();

    env.cmd()
        .args(["phase", "add", "1", "Peak", "--token", &token])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Conflict"))
        .stderr(predicate::str::contains("not saved"));

    let tree = env.run(&["plan", "show", "1"]);
    assert!(tree.contains("Base"));
    assert!(!tree.contains("Peak"));
}

#[test]
fn test_cli_invalid_token_is_rejected_by_parser() {
    let env = TestEnv::new();
    env.cmd()
        .args(["phase", "add", "1", "Base", "--token", "yesterday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--token"));
}

#[test]
fn test_cli_phase_activation() {
    let env = TestEnv::new();
    env.seed_plan();
    env.run(&["phase", "add", "1", "Peak"]);

    env.cmd()
        .args(["phase", "activate", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## 2. Peak (active)"));

    env.cmd()
        .args(["phase", "activate", "1"])
        .assert()
        .success();
    let tree = env.run(&["plan", "show", "1"]);
    assert!(tree.contains("## 1. Base (active)"));
    assert!(!tree.contains("Peak (active)"));
}

#[test]
fn test_cli_session_clear_duration() {
    let env = TestEnv::new();
    env.seed_plan();
    env.run(&["session", "update", "1", "--name", "Push A"]);
    assert!(env.run(&["plan", "show", "1"]).contains("Push A (60 min)"));

    env.run(&["session", "update", "1", "--clear-duration"]);
    let tree = env.run(&["plan", "show", "1"]);
    assert!(tree.contains("### 1. Push A"));
    assert!(!tree.contains("60 min"));
}

#[test]
fn test_cli_session_reorder() {
    let env = TestEnv::new();
    env.seed_plan();
    env.run(&["session", "add", "1", "Pull"]);
    env.run(&["session", "add", "1", "Legs"]);

    let out = env.run(&["session", "reorder", "1", "2,1,3"]);
    let pull = out.find("Pull").expect("Pull listed");
    let push = out.find("Push").expect("Push listed");
    assert!(pull < push);

    env.cmd()
        .args(["session", "reorder", "1", "2,1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Invalid input"));
}

#[test]
fn test_cli_exercise_range_validation() {
    let env = TestEnv::new();
    env.seed_plan();
    env.cmd()
        .args(["exercise", "add", "1", "42", "Row", "--reps", "12-8"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds"));
}

#[test]
fn test_cli_exercise_edit_keeps_other_fields() {
    let env = TestEnv::new();
    env.seed_plan();
    env.run(&["exercise", "add", "1", "42", "Row", "--sets", "4", "--reps", "6-8"]);

    env.cmd()
        .args(["exercise", "edit", "1", "--rest", "120"])
        .assert()
        .success()
        .stdout(predicate::str::contains("**Row** 4 x 6-8, rest 120s"));
}

#[test]
fn test_cli_record_workout() {
    let env = TestEnv::new();
    env.cmd()
        .args([
            "log",
            "record",
            "7",
            "Push",
            "Bench Press:5@80",
            "Bench Press:5@80",
            "Dips:12",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Bench Press #1: 5 reps @ 80 (volume 400)"))
        .stdout(predicate::str::contains("Bench Press #2"))
        .stdout(predicate::str::contains("Dips #1: 12 reps"))
        .stdout(predicate::str::contains("Duration"));

    // The log has performed reps, so it cannot be deleted as empty.
    env.cmd()
        .args(["log", "delete", "1"])
        .assert()
        .failure();
    env.cmd()
        .args(["log", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Dips #1"));
}

#[test]
fn test_cli_log_sets_by_hand() {
    let env = TestEnv::new();
    env.run(&["log", "start", "7", "Legs", "--ref", "legs-1"]);
    env.run(&["log", "add-set", "1", "Squat:5@100", "--ref", "s1"]);
    // Same ref again: the stored set comes back instead of a duplicate.
    env.run(&["log", "add-set", "1", "Squat:5@100", "--ref", "s1"]);

    env.cmd()
        .args(["log", "update-set", "1", "6@100", "--notes", "easy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("6 reps @ 100 (volume 600) - easy"));

    let log = env.run(&["log", "show", "1"]);
    assert_eq!(log.matches("Squat #").count(), 1);

    env.cmd()
        .args(["log", "end", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Ended"));
}

#[test]
fn test_cli_delete_empty_log() {
    let env = TestEnv::new();
    env.run(&["log", "start", "7", "Legs"]);
    env.run(&["log", "add-set", "1", "Squat:0@100"]);

    env.cmd()
        .args(["log", "delete", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted log 1: Legs"));
}

#[test]
fn test_cli_json_output() {
    let env = TestEnv::new();
    let out = env.run(&["--json", "plan", "create", "7", "Off-season"]);
    let outcome: serde_json::Value = serde_json::from_str(&out).expect("valid JSON");
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["conflict"], false);
    assert_eq!(outcome["value"]["title"], "Off-season");
}

#[test]
fn test_cli_queue_import_with_notification() {
    let env = TestEnv::new();
    env.run(&["plan", "create", "7", "Off-season"]);
    let draft_path = env.temp_dir.path().join("draft.json");
    fs::write(
        &draft_path,
        r#"{
            "phases": [{
                "name": "Imported",
                "is_active": true,
                "sessions": [{
                    "name": "Legs",
                    "duration_minutes": 45,
                    "exercises": [{
                        "exercise_id": 1,
                        "exercise_name": "Squat",
                        "sets": {"min": 5, "max": 5},
                        "reps": {"min": 5, "max": 5},
                        "rest_seconds": {"min": 120, "max": 180}
                    }]
                }]
            }]
        }"#,
    )
    .unwrap();

    env.cmd()
        .args([
            "queue",
            "import",
            "1",
            draft_path.to_str().unwrap(),
            "--notify",
            "Your new block is ready",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("plan_save"))
        .stdout(predicate::str::contains("notification"))
        .stdout(predicate::str::contains("completed"));

    env.cmd()
        .args(["plan", "show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported (active)"))
        .stdout(predicate::str::contains("**Squat** 5 x 5, rest 120-180s"));
}

#[test]
fn test_cli_queue_job_failure_exits_non_zero() {
    let env = TestEnv::new();
    env.seed_plan();
    let stale = env.stamp("1");
    env.run(&["phase", "add", "1", "Peak"]);

    env.cmd()
        .args(["queue", "duplicate-phase", "1", "--token", &stale])
        .assert()
        .failure()
        .stdout(predicate::str::contains("failed"))
        .stderr(predicate::str::contains("job(s) failed"));
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn vix_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("vix");
    path
}

const NOTE_13: &str = "# 2025-12-13\n\n## Key Takeaways\n\n- Work in 90 minute focus blocks ^20251213-t1\n  - phone in another room\n\n## INDEX\n\n- [learning] Focus blocks ![[00.daily/2025-12-13.md#^20251213-t1]] #book:DeepWork #topic:focus ^20251213-l1\n- [action] Pick one weekly metric effort=30 status=inbox #topic:productivity ^20251213-a1\n";

const NOTE_14: &str = "# 2025-12-14\n\n## INDEX\n\n- [idea] Automate daily ETL #topic:workflow ^20251214-i1\n- [experiment] Pomodoro vs. time blocks #topic:focus ^20251214-e1\n";

const TAXONOMY: &str = "approved:\n  topic: [workflow, focus, productivity]\n  book: [DeepWork]\n";

fn setup_vault() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let daily = root.join("00.daily");
    fs::create_dir_all(&daily).unwrap();
    fs::write(daily.join("2025-12-13.md"), NOTE_13).unwrap();
    fs::write(daily.join("2025-12-14.md"), NOTE_14).unwrap();

    let taxonomy = root.join("99.system/taxonomy");
    fs::create_dir_all(&taxonomy).unwrap();
    fs::write(taxonomy.join("tags.yml"), TAXONOMY).unwrap();

    tmp
}

fn run_vix(vault: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vix_binary();
    let output = Command::new(&binary)
        .arg("--vault")
        .arg(vault)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vix binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let tmp = setup_vault();

    let (stdout, stderr, success) = run_vix(tmp.path(), &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("99.system/db/notes.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let tmp = setup_vault();

    let (_, _, success1) = run_vix(tmp.path(), &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_vix(tmp.path(), &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_reconcile_full() {
    let tmp = setup_vault();

    let (stdout, stderr, success) = run_vix(tmp.path(), &["reconcile", "--full"]);
    assert!(success, "reconcile failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("reconcile full"));
    assert!(stdout.contains("files scanned: 2"));
    assert!(stdout.contains("inserted: 4"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_reconcile_idempotent() {
    let tmp = setup_vault();

    run_vix(tmp.path(), &["reconcile", "--full"]);
    let (stdout, _, success) = run_vix(tmp.path(), &["reconcile", "--full"]);
    assert!(success);
    assert!(stdout.contains("inserted: 0"), "got: {}", stdout);
    assert!(stdout.contains("updated: 0"), "got: {}", stdout);
    assert!(stdout.contains("unchanged: 4"), "got: {}", stdout);
}

#[test]
fn test_reconcile_default_window_skips_old_notes() {
    let tmp = setup_vault();

    let today = chrono::Local::now().date_naive();
    let name = format!("{}.md", today.format("%Y-%m-%d"));
    let block = format!("^{}-i1", today.format("%Y%m%d"));
    fs::write(
        tmp.path().join("00.daily").join(name),
        format!("## INDEX\n\n- [idea] Today's idea #topic:workflow {}\n", block),
    )
    .unwrap();

    let (stdout, _, success) = run_vix(tmp.path(), &["reconcile"]);
    assert!(success);
    assert!(stdout.contains("reconcile since:7"));
    assert!(stdout.contains("files scanned: 1"), "got: {}", stdout);
    assert!(stdout.contains("inserted: 1"), "got: {}", stdout);
}

#[test]
fn test_reconcile_dry_run() {
    let tmp = setup_vault();

    let (stdout, _, success) = run_vix(tmp.path(), &["reconcile", "--full", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("inserted: 4"));

    let (stdout, _, _) = run_vix(tmp.path(), &["reconcile", "--full"]);
    assert!(
        stdout.contains("inserted: 4"),
        "dry run must not write items, got: {}",
        stdout
    );
}

#[test]
fn test_reconcile_reports_errors_but_succeeds() {
    let tmp = setup_vault();
    fs::write(
        tmp.path().join("00.daily/2025-12-15.md"),
        "## INDEX\n\n- [bogus] nope ^20251215-i1\n- [idea] fine ^20251215-i2\n",
    )
    .unwrap();

    let (stdout, stderr, success) = run_vix(tmp.path(), &["reconcile", "--full"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("lines failed: 1"));
    assert!(stdout.contains("00.daily/2025-12-15.md:3"));

    let log = fs::read_to_string(tmp.path().join("99.system/logs/etl_errors.log")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("bogus"));
}

#[test]
fn test_build_index_writes_pages() {
    let tmp = setup_vault();

    run_vix(tmp.path(), &["reconcile", "--full"]);
    let (stdout, stderr, success) = run_vix(tmp.path(), &["build-index"]);
    assert!(success, "build-index failed: stdout={}, stderr={}", stdout, stderr);

    let index = tmp.path().join("01.index");
    let ideas = fs::read_to_string(index.join("ideas.md")).unwrap();
    assert!(ideas.contains(
        "- 2025-12-14: ![[00.daily/2025-12-14.md#^20251214-i1]] #topic:workflow"
    ));
    let actions = fs::read_to_string(index.join("actions.md")).unwrap();
    assert!(actions.contains("- [inbox|30m] 2025-12-13: ![[00.daily/2025-12-13.md#^20251213-a1]]"));
    assert!(index.join("learnings.md").exists());
    assert!(index.join("experiments.md").exists());
    assert!(index.join("books/DeepWork.md").exists());
}

#[test]
fn test_build_index_deterministic() {
    let tmp = setup_vault();

    run_vix(tmp.path(), &["reconcile", "--full"]);
    run_vix(tmp.path(), &["build-index"]);
    let first = fs::read_to_string(tmp.path().join("01.index/ideas.md")).unwrap();

    let (stdout, _, _) = run_vix(tmp.path(), &["build-index"]);
    let second = fs::read_to_string(tmp.path().join("01.index/ideas.md")).unwrap();
    assert_eq!(first, second);
    assert!(stdout.contains("written: 0"), "got: {}", stdout);
}

#[test]
fn test_build_index_removes_stale_group_page() {
    let tmp = setup_vault();

    run_vix(tmp.path(), &["reconcile", "--full"]);
    run_vix(tmp.path(), &["build-index"]);
    let book = tmp.path().join("01.index/books/DeepWork.md");
    assert!(book.exists());

    fs::write(
        tmp.path().join("00.daily/2025-12-13.md"),
        NOTE_13.replace(
            "- [learning] Focus blocks ![[00.daily/2025-12-13.md#^20251213-t1]] #book:DeepWork #topic:focus ^20251213-l1\n",
            "",
        ),
    )
    .unwrap();
    let (stdout, _, _) = run_vix(tmp.path(), &["reconcile", "--full"]);
    assert!(stdout.contains("retired: 1"), "got: {}", stdout);

    let (stdout, _, success) = run_vix(tmp.path(), &["build-index"]);
    assert!(success);
    assert!(stdout.contains("removed 01.index/books/DeepWork.md"), "got: {}", stdout);
    assert!(!book.exists());
}

#[test]
fn test_build_index_only() {
    let tmp = setup_vault();

    run_vix(tmp.path(), &["reconcile", "--full"]);
    let (_, _, success) = run_vix(tmp.path(), &["build-index", "--only", "idea,action"]);
    assert!(success);

    let index = tmp.path().join("01.index");
    assert!(index.join("ideas.md").exists());
    assert!(index.join("actions.md").exists());
    assert!(!index.join("learnings.md").exists());
    assert!(!index.join("books").exists());
}

#[test]
fn test_export_pack() {
    let tmp = setup_vault();

    run_vix(tmp.path(), &["reconcile", "--full"]);
    let (stdout, stderr, success) = run_vix(
        tmp.path(),
        &["export-pack", "--tag", "book:DeepWork", "--output", "deep-work"],
    );
    assert!(success, "export failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("items: 1"));

    let pack = fs::read_to_string(tmp.path().join("02.blog/drafts/deep-work.md")).unwrap();
    assert!(pack.starts_with("---\n"));
    assert!(pack.contains("> - Work in 90 minute focus blocks\n>   - phone in another room\n"));
}

#[test]
fn test_export_pack_output_stays_in_export_dir() {
    let tmp = setup_vault();

    run_vix(tmp.path(), &["reconcile", "--full"]);
    let (stdout, stderr, success) = run_vix(
        tmp.path(),
        &["export-pack", "--tag", "book:DeepWork", "--output", "../../escaped"],
    );
    assert!(success, "export failed: stdout={}, stderr={}", stdout, stderr);

    assert!(!tmp.path().join("escaped.md").exists());
    let drafts: Vec<_> = fs::read_dir(tmp.path().join("02.blog/drafts"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(drafts.len(), 1, "got: {:?}", drafts);
    assert!(drafts[0].to_string_lossy().ends_with("escaped.md"));
}

#[test]
fn test_export_pack_no_match_writes_nothing() {
    let tmp = setup_vault();

    run_vix(tmp.path(), &["reconcile", "--full"]);
    let (stdout, _, success) = run_vix(tmp.path(), &["export-pack", "--tag", "book:Missing"]);
    assert!(success);
    assert!(stdout.contains("nothing written"));
    assert!(!tmp.path().join("02.blog/drafts").exists());
}

#[test]
fn test_validate_clean_vault() {
    let tmp = setup_vault();

    let (stdout, stderr, success) = run_vix(tmp.path(), &["validate"]);
    assert!(success, "validate failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files scanned: 2"));
    assert!(stdout.contains("errors: 0"));
}

#[test]
fn test_validate_fails_on_errors() {
    let tmp = setup_vault();
    fs::write(
        tmp.path().join("00.daily/2025-12-15.md"),
        "## INDEX\n\n- [idea] wrong date ^20251201-i1\n",
    )
    .unwrap();

    let (stdout, _, success) = run_vix(tmp.path(), &["validate"]);
    assert!(!success);
    assert!(stdout.contains("BLOCK_ID_DATE"));
    assert!(stdout.contains("00.daily/2025-12-15.md:3"));
}

#[test]
fn test_stats() {
    let tmp = setup_vault();

    run_vix(tmp.path(), &["reconcile", "--full"]);
    let (stdout, _, success) = run_vix(tmp.path(), &["stats"]);
    assert!(success);
    assert!(stdout.contains("Items:       4"));
    assert!(stdout.contains("Recent runs:"));
    assert!(stdout.contains("#topic:focus"));
}

#[test]
fn test_config_file_overrides_paths() {
    let tmp = setup_vault();
    fs::write(
        tmp.path().join("99.system/vix.toml"),
        "[paths]\nindex_dir = \"Index\"\n",
    )
    .unwrap();

    run_vix(tmp.path(), &["reconcile", "--full"]);
    let (_, _, success) = run_vix(tmp.path(), &["build-index"]);
    assert!(success);
    assert!(tmp.path().join("Index/ideas.md").exists());
}

#[test]
fn test_invalid_config_fails() {
    let tmp = setup_vault();
    fs::write(
        tmp.path().join("99.system/vix.toml"),
        "[reconcile]\nstale_items = \"shred\"\n",
    )
    .unwrap();

    let (_, stderr, success) = run_vix(tmp.path(), &["init"]);
    assert!(!success);
    assert!(stderr.contains("config"), "got: {}", stderr);
}

#[test]
fn test_database_failure_exits_nonzero() {
    let tmp = setup_vault();
    fs::create_dir_all(tmp.path().join("dbdir")).unwrap();
    fs::write(tmp.path().join("99.system/vix.toml"), "[paths]\ndb = \"dbdir\"\n").unwrap();

    let (stdout, stderr, success) = run_vix(tmp.path(), &["reconcile", "--full"]);
    assert!(!success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.is_empty(), "got: {}", stdout);
    assert!(stderr.contains("Error"), "got: {}", stderr);
}

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn uxaudit_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_uxaudit"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let guidance_dir = root.join("guidance");
    fs::create_dir_all(&guidance_dir).unwrap();
    fs::write(
        guidance_dir.join("heuristics.md"),
        "# Visibility of system status\n\nThe design should always keep users informed.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/uxaudit.sqlite"

[llm]
model = "gpt-4o"
batch_size = 20

[frames]
scratch_dir = "{root}/data/frames"

[embedding]
provider = "disabled"

[server]
bind = "127.0.0.1:7341"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("uxaudit.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_uxaudit(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = uxaudit_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run uxaudit binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn init_and_seed(config_path: &Path) {
    let (_, stderr, ok) = run_uxaudit(config_path, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    let (_, stderr, ok) = run_uxaudit(config_path, &["knowledge", "seed"]);
    assert!(ok, "seed failed: {}", stderr);
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_uxaudit(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/uxaudit.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_uxaudit(&config_path, &["init"]);
    assert!(first, "First init failed");
    let (_, _, second) = run_uxaudit(&config_path, &["init"]);
    assert!(second, "Second init failed (not idempotent)");
}

#[test]
fn test_seed_lists_default_categories() {
    let (_tmp, config_path) = setup_test_env();
    run_uxaudit(&config_path, &["init"]);

    let (stdout, _, success) = run_uxaudit(&config_path, &["knowledge", "seed"]);
    assert!(success);
    assert!(stdout.contains("Seeded 5 knowledge categories."));

    // Existing slugs are kept on a second run.
    let (stdout, _, success) = run_uxaudit(&config_path, &["knowledge", "seed"]);
    assert!(success);
    assert!(stdout.contains("Seeded 0 knowledge categories."));

    let (stdout, _, success) = run_uxaudit(&config_path, &["knowledge", "categories"]);
    assert!(success);
    for slug in [
        "core_heuristics",
        "accessibility",
        "design_systems",
        "ai_interfaces",
        "mobile_platforms",
    ] {
        assert!(stdout.contains(slug), "missing {} in {}", slug, stdout);
    }
    let default_line = stdout
        .lines()
        .find(|l| l.starts_with("core_heuristics"))
        .unwrap();
    assert!(default_line.contains("default"));
}

#[test]
fn test_user_preferences_roundtrip() {
    let (_tmp, config_path) = setup_test_env();
    init_and_seed(&config_path);

    let (stdout, stderr, success) =
        run_uxaudit(&config_path, &["user", "create", "dana@example.com"]);
    assert!(success, "user create failed: {}", stderr);
    let user_id = stdout.trim().to_string();
    assert!(!user_id.is_empty());

    let (stdout, _, success) = run_uxaudit(&config_path, &["prefs", "list", &user_id]);
    assert!(success);
    let state = |out: &str, slug: &str| {
        out.lines()
            .find(|l| l.starts_with(slug))
            .map(|l| l.trim_end().ends_with("on"))
            .unwrap()
    };
    assert!(state(&stdout, "core_heuristics"));
    assert!(!state(&stdout, "accessibility"));

    let (_, stderr, success) =
        run_uxaudit(&config_path, &["prefs", "set", &user_id, "accessibility"]);
    assert!(success, "prefs set failed: {}", stderr);
    let (_, _, success) = run_uxaudit(
        &config_path,
        &["prefs", "set", &user_id, "core_heuristics", "--enabled", "false"],
    );
    assert!(success);

    let (stdout, _, _) = run_uxaudit(&config_path, &["prefs", "list", &user_id]);
    assert!(state(&stdout, "accessibility"));
    assert!(!state(&stdout, "core_heuristics"));
}

#[test]
fn test_prefs_for_unknown_user_fails() {
    let (_tmp, config_path) = setup_test_env();
    init_and_seed(&config_path);

    let (_, stderr, success) = run_uxaudit(&config_path, &["prefs", "list", "nobody"]);
    assert!(!success);
    assert!(stderr.contains("Unknown user"));
}

#[test]
fn test_status_lists_and_rejects_unknown_id() {
    let (_tmp, config_path) = setup_test_env();
    run_uxaudit(&config_path, &["init"]);

    let (stdout, _, success) = run_uxaudit(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("No audits."));

    let (_, stderr, success) = run_uxaudit(&config_path, &["status", "missing-id"]);
    assert!(!success);
    assert!(stderr.contains("Audit not found"));

    let (_, stderr, success) = run_uxaudit(&config_path, &["report", "missing-id"]);
    assert!(!success);
    assert!(stderr.contains("Audit not found"));
}

#[test]
fn test_audit_rejects_missing_video() {
    let (tmp, config_path) = setup_test_env();
    run_uxaudit(&config_path, &["init"]);

    let video = tmp.path().join("nope.mp4");
    let (_, stderr, success) = run_uxaudit(&config_path, &["audit", video.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Video not found"));
}

#[test]
fn test_index_requires_embedding_provider() {
    let (tmp, config_path) = setup_test_env();
    init_and_seed(&config_path);

    let dir = tmp.path().join("guidance");
    let (_, stderr, success) =
        run_uxaudit(&config_path, &["knowledge", "index", dir.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Embedding provider is disabled"));
}

#[test]
fn test_invalid_config_rejected() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("config/bad.toml");
    fs::write(
        &bad,
        format!(
            "[db]\npath = \"{}/data/x.sqlite\"\n\n[llm]\nbatch_size = 0\n",
            tmp.path().display()
        ),
    )
    .unwrap();

    let (_, stderr, success) = run_uxaudit(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("llm.batch_size"));
}

#[test]
fn test_missing_config_file_rejected() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_uxaudit(&tmp.path().join("absent.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

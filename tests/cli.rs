use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn repoqa_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_repoqa"))
}

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_content = format!(
        r#"[index]
dir = "{}/indexes"

[retrieval]
top_k = 4
{}
"#,
        root.display(),
        extra
    );
    let config_path = root.join("repoqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// Runs the binary with a scrubbed environment plus `env`.
fn run_repoqa(config_path: &Path, args: &[&str], env: &[(&str, &str)]) -> (String, String, bool) {
    let binary = repoqa_binary();
    let output = Command::new(&binary)
        .env_clear()
        .envs(env.iter().copied())
        .arg("--config")
        .arg(config_path)
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run repoqa binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

const ALL_KEYS: &[(&str, &str)] = &[
    ("GITHUB_PERSONAL_ACCESS_TOKEN", "ghp_test"),
    ("HUGGINGFACEHUB_API_TOKEN", "hf_test"),
    ("GROQ_API_KEY", "gsk_test"),
];

#[test]
fn test_malformed_repository_fails_before_credentials() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_repoqa(&config_path, &["ask", "not-a-repo", "hi"], &[]);
    assert!(!success);
    assert!(stderr.contains("Invalid format 'not-a-repo'"), "stderr={}", stderr);
    assert!(!stderr.contains("GITHUB_PERSONAL_ACCESS_TOKEN"));
}

#[test]
fn test_missing_github_token_is_fatal() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_repoqa(&config_path, &["check"], &[]);
    assert!(!success);
    assert!(
        stderr.contains("GITHUB_PERSONAL_ACCESS_TOKEN environment variable not set"),
        "stderr={}",
        stderr
    );
}

#[test]
fn test_missing_provider_key_is_fatal() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_repoqa(
        &config_path,
        &["check"],
        &[("GITHUB_PERSONAL_ACCESS_TOKEN", "ghp_test"), ("HUGGINGFACEHUB_API_TOKEN", "hf_test")],
    );
    assert!(!success);
    assert!(stderr.contains("GROQ_API_KEY"), "stderr={}", stderr);
}

#[test]
fn test_check_passes_with_credentials() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_repoqa(&config_path, &["check"], ALL_KEYS);
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Configuration OK."));
    assert!(stdout.contains("huggingface"));
    assert!(stdout.contains("groq"));
}

#[test]
fn test_ollama_providers_need_no_keys() {
    let (_tmp, config_path) = setup_test_env(
        r#"
[embedding]
provider = "ollama"

[llm]
provider = "ollama"
"#,
    );

    let (stdout, stderr, success) = run_repoqa(
        &config_path,
        &["check"],
        &[("GITHUB_PERSONAL_ACCESS_TOKEN", "ghp_test")],
    );
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env(
        r#"
[chunking]
text_splitter = "recursive"
text_chunk_size = 50
text_chunk_overlap = 50
"#,
    );

    let (_, stderr, success) = run_repoqa(&config_path, &["check"], ALL_KEYS);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr={}", stderr);
}

#[test]
fn test_missing_config_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_repoqa(&tmp.path().join("absent.toml"), &["check"], ALL_KEYS);
    assert!(!success);
    assert!(stderr.contains("config file not found"), "stderr={}", stderr);
}

#[test]
fn test_ask_requires_a_query() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_repoqa(&config_path, &["ask", "octo/demo"], ALL_KEYS);
    assert!(!success);
    assert!(stderr.contains("a query is required"), "stderr={}", stderr);
}

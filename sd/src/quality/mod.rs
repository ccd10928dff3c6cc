//! Quality gate
//!
//! Language-aware test/lint/build runner. Project type is detected once
//! from manifest files and cached; each check runs the canonical command
//! for that language under a timeout with bounded output.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Marker prefix when every enabled check passed
pub const QUALITY_PASSED: &str = "QUALITY_PASSED:";

/// Marker prefix when any enabled check failed
pub const QUALITY_BLOCKED: &str = "QUALITY_BLOCKED:";

/// Max characters of a failing check's output included in a report
const MAX_FAILURE_OUTPUT: usize = 2_000;

/// Detected project language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectType {
    Rust,
    Node,
    Python,
    Go,
    Make,
    Unknown,
}

impl ProjectType {
    /// Detect by manifest files, most specific first
    pub fn detect(dir: &Path) -> Self {
        debug!(?dir, "ProjectType::detect: called");
        if dir.join("Cargo.toml").exists() {
            return ProjectType::Rust;
        }
        if dir.join("package.json").exists() {
            return ProjectType::Node;
        }
        if dir.join("pyproject.toml").exists() || dir.join("setup.py").exists() {
            return ProjectType::Python;
        }
        if dir.join("go.mod").exists() {
            return ProjectType::Go;
        }
        if dir.join("Makefile").exists() {
            return ProjectType::Make;
        }
        ProjectType::Unknown
    }

    /// Canonical test command
    pub fn test_command(&self, verbose: bool) -> Option<String> {
        match self {
            ProjectType::Rust => Some(if verbose { "cargo test -- --nocapture" } else { "cargo test" }.to_string()),
            ProjectType::Node => Some("npm test".to_string()),
            ProjectType::Python => Some(if verbose { "pytest -v" } else { "pytest" }.to_string()),
            ProjectType::Go => Some(if verbose { "go test -v ./..." } else { "go test ./..." }.to_string()),
            ProjectType::Make => Some("make test".to_string()),
            ProjectType::Unknown => None,
        }
    }

    /// Canonical lint command
    pub fn lint_command(&self, fix: bool) -> Option<String> {
        match self {
            ProjectType::Rust => Some(
                if fix {
                    "cargo clippy --fix --allow-dirty --allow-staged"
                } else {
                    "cargo clippy -- -D warnings"
                }
                .to_string(),
            ),
            ProjectType::Node => Some(if fix { "npx eslint . --fix" } else { "npx eslint ." }.to_string()),
            ProjectType::Python => Some(if fix { "ruff check --fix ." } else { "ruff check ." }.to_string()),
            ProjectType::Go => Some("go vet ./...".to_string()),
            ProjectType::Make => None,
            ProjectType::Unknown => None,
        }
    }

    /// Canonical build command
    pub fn build_command(&self) -> Option<String> {
        match self {
            ProjectType::Rust => Some("cargo build".to_string()),
            ProjectType::Node => Some("npm run build --if-present".to_string()),
            ProjectType::Python => Some("python -m compileall -q .".to_string()),
            ProjectType::Go => Some("go build ./...".to_string()),
            ProjectType::Make => Some("make".to_string()),
            ProjectType::Unknown => None,
        }
    }
}

/// Which gate check a result belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Tests,
    Lint,
    Build,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Tests => "tests",
            CheckKind::Lint => "lint",
            CheckKind::Build => "build",
        }
    }
}

/// Outcome of one check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub kind: CheckKind,
    pub command: String,
    pub exit_code: i32,
    pub output: String,
    pub passed: bool,
    pub duration_ms: u64,
}

impl CheckOutcome {
    fn skipped(kind: CheckKind) -> Self {
        Self {
            kind,
            command: String::new(),
            exit_code: 0,
            output: "skipped".to_string(),
            passed: true,
            duration_ms: 0,
        }
    }
}

/// Aggregate result of a gate run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub checks: Vec<CheckOutcome>,
    pub passed: bool,
}

impl QualityReport {
    /// Render the in-band form: `QUALITY_PASSED:` or `QUALITY_BLOCKED:`
    /// followed by up to 2000 chars of each failing check's output.
    pub fn render(&self) -> String {
        if self.passed {
            let summary: Vec<&str> = self.checks.iter().map(|c| c.kind.as_str()).collect();
            return format!("{} {}", QUALITY_PASSED, summary.join(", "));
        }

        let mut out = String::from(QUALITY_BLOCKED);
        for check in self.checks.iter().filter(|c| !c.passed) {
            let mut snippet = check.output.clone();
            if snippet.len() > MAX_FAILURE_OUTPUT {
                let mut end = MAX_FAILURE_OUTPUT;
                while !snippet.is_char_boundary(end) {
                    end -= 1;
                }
                snippet.truncate(end);
                snippet.push_str("\n[output truncated]");
            }
            out.push_str(&format!(
                "\n== {} failed (exit {}) ==\n$ {}\n{}",
                check.kind.as_str(),
                check.exit_code,
                check.command,
                snippet
            ));
        }
        out
    }
}

/// Run one shell command and capture its combined output
pub async fn run_check(kind: CheckKind, command: &str, dir: &Path, timeout: Duration) -> CheckOutcome {
    debug!(%command, ?dir, ?timeout, "run_check: called");
    let started = Instant::now();

    let result = tokio::time::timeout(
        timeout,
        tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .output(),
    )
    .await;

    let duration_ms = started.elapsed().as_millis() as u64;

    match result {
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.is_empty() {
                if !combined.is_empty() {
                    combined.push('\n');
                }
                combined.push_str(&stderr);
            }
            CheckOutcome {
                kind,
                command: command.to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                passed: output.status.success(),
                output: combined,
                duration_ms,
            }
        }
        Ok(Err(e)) => CheckOutcome {
            kind,
            command: command.to_string(),
            exit_code: -1,
            passed: false,
            output: format!("failed to spawn: {}", e),
            duration_ms,
        },
        Err(_) => CheckOutcome {
            kind,
            command: command.to_string(),
            exit_code: -1,
            passed: false,
            output: format!("timed out after {:?}", timeout),
            duration_ms,
        },
    }
}

/// Language-aware gate bound to one worktree
pub struct QualityGate {
    worktree: PathBuf,
    timeout: Duration,
    detected: Mutex<Option<ProjectType>>,
}

impl QualityGate {
    pub fn new(worktree: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            worktree: worktree.into(),
            timeout,
            detected: Mutex::new(None),
        }
    }

    /// Detected project type, cached after the first call
    pub fn project_type(&self) -> ProjectType {
        let mut cached = self.detected.lock().unwrap();
        if let Some(pt) = *cached {
            return pt;
        }
        let pt = ProjectType::detect(&self.worktree);
        info!(?pt, worktree = %self.worktree.display(), "QualityGate: detected project type");
        *cached = Some(pt);
        pt
    }

    pub async fn run_tests(&self, verbose: bool) -> CheckOutcome {
        match self.project_type().test_command(verbose) {
            Some(cmd) => run_check(CheckKind::Tests, &cmd, &self.worktree, self.timeout).await,
            None => CheckOutcome::skipped(CheckKind::Tests),
        }
    }

    pub async fn run_lint(&self, fix: bool) -> CheckOutcome {
        match self.project_type().lint_command(fix) {
            Some(cmd) => run_check(CheckKind::Lint, &cmd, &self.worktree, self.timeout).await,
            None => CheckOutcome::skipped(CheckKind::Lint),
        }
    }

    pub async fn run_build(&self) -> CheckOutcome {
        match self.project_type().build_command() {
            Some(cmd) => run_check(CheckKind::Build, &cmd, &self.worktree, self.timeout).await,
            None => CheckOutcome::skipped(CheckKind::Build),
        }
    }

    /// Run the enabled checks in sequence and aggregate
    pub async fn run_all(&self, skip_tests: bool, skip_lint: bool, skip_build: bool) -> QualityReport {
        debug!(skip_tests, skip_lint, skip_build, "QualityGate::run_all: called");
        let mut checks = Vec::new();

        if !skip_tests {
            checks.push(self.run_tests(false).await);
        }
        if !skip_lint {
            checks.push(self.run_lint(false).await);
        }
        if !skip_build {
            checks.push(self.run_build().await);
        }

        let passed = checks.iter().all(|c| c.passed);
        QualityReport { checks, passed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_detect_rust_project() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("Cargo.toml"), "[package]").unwrap();
        assert_eq!(ProjectType::detect(temp.path()), ProjectType::Rust);
    }

    #[test]
    fn test_detect_precedence_rust_over_make() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("Cargo.toml"), "[package]").unwrap();
        std::fs::write(temp.path().join("Makefile"), "all:").unwrap();
        assert_eq!(ProjectType::detect(temp.path()), ProjectType::Rust);
    }

    #[test]
    fn test_detect_unknown() {
        let temp = tempdir().unwrap();
        assert_eq!(ProjectType::detect(temp.path()), ProjectType::Unknown);
    }

    #[test]
    fn test_project_type_cached() {
        let temp = tempdir().unwrap();
        let gate = QualityGate::new(temp.path(), Duration::from_secs(5));
        assert_eq!(gate.project_type(), ProjectType::Unknown);

        // Manifest added after first detection does not change the cache
        std::fs::write(temp.path().join("Cargo.toml"), "[package]").unwrap();
        assert_eq!(gate.project_type(), ProjectType::Unknown);
    }

    #[tokio::test]
    async fn test_run_check_captures_output_and_exit() {
        let temp = tempdir().unwrap();
        let outcome = run_check(CheckKind::Tests, "echo hello && exit 3", temp.path(), Duration::from_secs(5)).await;
        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.output.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_check_timeout() {
        let temp = tempdir().unwrap();
        let outcome = run_check(CheckKind::Build, "sleep 5", temp.path(), Duration::from_millis(100)).await;
        assert!(!outcome.passed);
        assert!(outcome.output.contains("timed out"));
    }

    #[tokio::test]
    async fn test_unknown_project_gate_passes_vacuously() {
        let temp = tempdir().unwrap();
        let gate = QualityGate::new(temp.path(), Duration::from_secs(5));
        let report = gate.run_all(false, false, false).await;
        assert!(report.passed);
        assert!(report.render().starts_with(QUALITY_PASSED));
    }

    #[test]
    fn test_report_render_blocked_truncates() {
        let report = QualityReport {
            checks: vec![
                CheckOutcome {
                    kind: CheckKind::Tests,
                    command: "cargo test".to_string(),
                    exit_code: 101,
                    output: "E".repeat(5_000),
                    passed: false,
                    duration_ms: 10,
                },
                CheckOutcome {
                    kind: CheckKind::Build,
                    command: "cargo build".to_string(),
                    exit_code: 0,
                    output: "ok".to_string(),
                    passed: true,
                    duration_ms: 10,
                },
            ],
            passed: false,
        };

        let rendered = report.render();
        assert!(rendered.starts_with(QUALITY_BLOCKED));
        assert!(rendered.contains("[output truncated]"));
        assert!(rendered.contains("tests failed"));
        assert!(!rendered.contains("build failed"));
        // Bounded: marker + header + 2000 chars + truncation note
        assert!(rendered.len() < 2_300);
    }
}

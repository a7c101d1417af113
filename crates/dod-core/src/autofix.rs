use crate::rule::Rule;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Default wall-clock budget for a single fix command.
pub const DEFAULT_FIX_TIMEOUT_SECS: u64 = 300;

/// Cap on captured output, keeping the tail.
const MAX_OUTPUT: usize = 10 * 1024;

// ---------------------------------------------------------------------------
// FixOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub rule: String,
    pub applied: bool,
    pub output: String,
    pub duration_ms: f64,
}

// ---------------------------------------------------------------------------
// AutoFixApplier
// ---------------------------------------------------------------------------

/// Runs a rule's fix command through `sh -c` inside the project directory.
/// Never returns an error: spawn failures, non-zero exits and timeouts all
/// come back as `applied: false`.
#[derive(Debug, Clone)]
pub struct AutoFixApplier {
    timeout: Option<Duration>,
}

impl Default for AutoFixApplier {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(DEFAULT_FIX_TIMEOUT_SECS)),
        }
    }
}

impl AutoFixApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `0` disables the timeout.
    pub fn with_timeout_secs(secs: u64) -> Self {
        Self {
            timeout: (secs > 0).then(|| Duration::from_secs(secs)),
        }
    }

    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn apply(&self, project: &Path, rule: &Rule) -> bool {
        self.run(project, rule).applied
    }

    pub fn run(&self, project: &Path, rule: &Rule) -> FixOutcome {
        let command = rule
            .fix_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let Some(command) = command else {
            return FixOutcome {
                rule: rule.name.clone(),
                applied: false,
                output: "no fix command configured".to_string(),
                duration_ms: 0.0,
            };
        };

        let _span = tracing::info_span!("auto_fix", rule = %rule.name).entered();
        let start = Instant::now();
        let (applied, output) = execute_shell(command, project, self.timeout);
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        if applied {
            tracing::info!(command, duration_ms, "fix applied");
        } else {
            tracing::warn!(command, duration_ms, output = %output, "fix failed");
        }

        FixOutcome {
            rule: rule.name.clone(),
            applied,
            output,
            duration_ms,
        }
    }
}

/// Run `command` under `sh -c` in `cwd`. Returns (success, combined output).
///
/// The shell leads its own process group; on timeout the whole group is
/// killed so no grandchild keeps the output pipes open.
fn execute_shell(command: &str, cwd: &Path, timeout: Option<Duration>) -> (bool, String) {
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return (false, format!("failed to spawn: {e}")),
    };
    let pid = child.id();
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match timeout {
        None => child.wait().map_err(|e| format!("wait failed: {e}")),
        Some(limit) => {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(child.wait());
            });
            match rx.recv_timeout(limit) {
                Ok(waited) => waited.map_err(|e| format!("wait failed: {e}")),
                Err(_) => {
                    kill_group(pid);
                    Err(format!("timed out after {}s", limit.as_secs_f64()))
                }
            }
        }
    };

    let out = combine_output(
        &stdout.join().unwrap_or_default(),
        &stderr.join().unwrap_or_default(),
    );
    match status {
        Ok(status) => (status.success(), out),
        Err(reason) if out.is_empty() => (false, reason),
        Err(reason) => (false, format!("{reason}\n{out}")),
    }
}

fn drain<R: std::io::Read + Send + 'static>(pipe: Option<R>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut r) = pipe {
            let _ = r.read_to_string(&mut buf);
        }
        buf
    })
}

fn combine_output(stdout: &str, stderr: &str) -> String {
    let output = if stderr.is_empty() {
        stdout.to_string()
    } else if stdout.is_empty() {
        stderr.to_string()
    } else {
        format!("{stdout}\n{stderr}")
    };
    let trimmed = output.trim();
    if trimmed.len() > MAX_OUTPUT {
        let mut cut = trimmed.len() - MAX_OUTPUT;
        while !trimmed.is_char_boundary(cut) {
            cut += 1;
        }
        trimmed[cut..].to_string()
    } else {
        trimmed.to_string()
    }
}

fn kill_group(pid: u32) {
    #[cfg(unix)]
    let target = format!("-{pid}");
    #[cfg(not(unix))]
    let target = pid.to_string();
    let _ = Command::new("kill")
        .args(["-9", "--", &target])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleCompiler, RuleDefinition};
    use crate::types::Category;
    use tempfile::TempDir;

    fn fix_rule(command: &str) -> Rule {
        let def = RuleDefinition {
            name: "fixable".to_string(),
            condition: "errors == 0".to_string(),
            description: None,
            severity: None,
            auto_fix: true,
            fix_command: Some(command.to_string()),
            telemetry: true,
        };
        RuleCompiler::default()
            .compile(Category::CodeQuality, &def)
            .unwrap()
    }

    #[test]
    fn exit_zero_is_applied() {
        let dir = TempDir::new().unwrap();
        let outcome = AutoFixApplier::new().run(dir.path(), &fix_rule("echo fixed"));
        assert!(outcome.applied);
        assert_eq!(outcome.output, "fixed");
        assert_eq!(outcome.rule, "fixable");
    }

    #[test]
    fn non_zero_exit_is_not_applied() {
        let dir = TempDir::new().unwrap();
        let applier = AutoFixApplier::new();
        assert!(!applier.apply(dir.path(), &fix_rule("echo nope >&2; exit 3")));
        let outcome = applier.run(dir.path(), &fix_rule("echo nope >&2; exit 3"));
        assert_eq!(outcome.output, "nope");
    }

    #[test]
    fn runs_in_project_directory() {
        let dir = TempDir::new().unwrap();
        assert!(AutoFixApplier::new().apply(dir.path(), &fix_rule("touch fixed.marker")));
        assert!(dir.path().join("fixed.marker").exists());
    }

    #[test]
    fn missing_command_returns_false_without_running() {
        let dir = TempDir::new().unwrap();
        let mut rule = fix_rule("touch never");
        rule.fix_command = None;
        let outcome = AutoFixApplier::new().run(dir.path(), &rule);
        assert!(!outcome.applied);
        assert!(!dir.path().join("never").exists());
    }

    #[test]
    fn missing_directory_is_spawn_failure() {
        let outcome =
            AutoFixApplier::new().run(Path::new("/definitely/not/a/dir"), &fix_rule("true"));
        assert!(!outcome.applied);
        assert!(outcome.output.contains("failed to spawn"));
    }

    #[test]
    fn timeout_kills_command() {
        let dir = TempDir::new().unwrap();
        let applier = AutoFixApplier::with_timeout(Some(Duration::from_millis(150)));
        let outcome = applier.run(dir.path(), &fix_rule("sleep 60"));
        assert!(!outcome.applied);
        assert!(outcome.output.contains("timed out"));
    }

    #[test]
    fn timeout_kills_the_whole_command_line() {
        let dir = TempDir::new().unwrap();
        let applier = AutoFixApplier::with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let outcome = applier.run(dir.path(), &fix_rule("echo started; sleep 30; echo finished"));
        assert!(!outcome.applied);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(outcome.output.starts_with("timed out"));
        assert!(outcome.output.contains("started"));
        assert!(!outcome.output.contains("finished"));
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        let dir = TempDir::new().unwrap();
        assert!(AutoFixApplier::with_timeout_secs(0).apply(dir.path(), &fix_rule("echo ok")));
    }

    #[test]
    fn output_keeps_tail_when_capped() {
        let long = "x".repeat(MAX_OUTPUT + 100) + "END";
        let combined = combine_output(&long, "");
        assert_eq!(combined.len(), MAX_OUTPUT);
        assert!(combined.ends_with("END"));
    }
}

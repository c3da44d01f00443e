//! Script runner
//!
//! Writes generated code to a scoped temp file and runs it either under
//! `openroad -python` or a plain interpreter. Output is captured and
//! rendered as a diagnostic block; a non-zero exit is data, not an error.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use vlsi_core::config::ExecutorConfig;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Script did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("Temp file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub command: Vec<String>,
    /// `-1` when the child was ended by a signal.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn or_empty(s: &str) -> &str {
    if s.is_empty() {
        "<empty>"
    } else {
        s
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            format!("Command: {}", self.command_line()),
            format!("Exit code: {}", self.exit_code),
            "----- STDOUT -----".to_string(),
            or_empty(&self.stdout).to_string(),
            "----- STDERR -----".to_string(),
            or_empty(&self.stderr).to_string(),
        ];
        f.write_str(&parts.join("\n"))
    }
}

#[derive(Debug, Clone)]
pub struct ScriptRunner {
    openroad_bin: String,
    interpreter: String,
    sentinel: String,
    timeout: Option<Duration>,
    search_path: Option<OsString>,
    temp_dir: Option<PathBuf>,
}

impl ScriptRunner {
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            openroad_bin: config.openroad_bin.clone(),
            interpreter: config.python_bin.clone(),
            sentinel: config.sentinel.clone(),
            timeout: config.timeout_seconds.map(Duration::from_secs),
            search_path: None,
            temp_dir: None,
        }
    }

    /// Resolves the openroad binary against `path` instead of `$PATH`.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Writes script files under `dir` instead of the system temp dir.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Full path of the openroad binary, if it resolves.
    pub fn resolve_openroad(&self) -> Option<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().ok()?;
                which::which_in(&self.openroad_bin, Some(paths), cwd)
            }
            None => which::which(&self.openroad_bin),
        };
        found.ok()
    }

    /// Picks the command line for `script`. Openroad is used only when
    /// asked for, when the code imports it and when the binary resolves.
    pub fn select_command(&self, code: &str, use_openroad: bool, script: &Path) -> Vec<String> {
        self.plan(code, use_openroad, script).1
    }

    /// The program to launch alongside the argv reported in diagnostics.
    /// Openroad is launched by its resolved path but reported by name.
    fn plan(&self, code: &str, use_openroad: bool, script: &Path) -> (OsString, Vec<String>) {
        let script = script.to_string_lossy().into_owned();
        if use_openroad && code.contains(&self.sentinel) {
            if let Some(bin) = self.resolve_openroad() {
                let argv = vec![self.openroad_bin.clone(), "-python".to_string(), script];
                return (bin.into_os_string(), argv);
            }
            tracing::debug!(bin = %self.openroad_bin, "openroad not found, using interpreter");
        }
        (
            OsString::from(&self.interpreter),
            vec![self.interpreter.clone(), script],
        )
    }

    /// Runs `code` in a child process and waits for it.
    ///
    /// `context` entries are passed to the child as environment variables.
    /// The temp file is gone when this returns, whatever the outcome.
    pub async fn run(
        &self,
        code: &str,
        context: Option<&HashMap<String, String>>,
        use_openroad: bool,
    ) -> Result<ExecutionResult, ExecutorError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("vlsi-script-").suffix(".py");
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(code.as_bytes())?;
        if !code.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        file.flush()?;
        // Closes the handle; the path is still deleted on drop.
        let script = file.into_temp_path();

        let (program, command) = self.plan(code, use_openroad, &script);
        let outcome = self.spawn_and_wait(&program, &command, context).await;

        if let Err(e) = script.close() {
            tracing::debug!(error = %e, "Could not remove script temp file");
        }

        let output = outcome?;
        let result = ExecutionResult {
            command,
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::info!(
            command = %result.command_line(),
            exit_code = result.exit_code,
            "Script finished"
        );
        Ok(result)
    }

    /// Same as [`run`](Self::run), rendered as the diagnostic block.
    pub async fn execute(
        &self,
        code: &str,
        context: Option<&HashMap<String, String>>,
        use_openroad: bool,
    ) -> Result<String, ExecutorError> {
        Ok(self.run(code, context, use_openroad).await?.to_string())
    }

    async fn spawn_and_wait(
        &self,
        program: &OsString,
        command: &[String],
        context: Option<&HashMap<String, String>>,
    ) -> Result<std::process::Output, ExecutorError> {
        let (name, args) = command
            .split_first()
            .ok_or_else(|| ExecutorError::Io(std::io::Error::other("empty command")))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(vars) = context {
            cmd.envs(vars);
        }

        let spawn_err = |source| ExecutorError::Spawn {
            program: name.clone(),
            source,
        };
        match self.timeout {
            None => cmd.output().await.map_err(spawn_err),
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(output) => output.map_err(spawn_err),
                Err(_) => {
                    tracing::warn!(?limit, program = %name, "Script timed out, killed");
                    Err(ExecutorError::TimedOut(limit))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn runner() -> ScriptRunner {
        ScriptRunner::from_config(&ExecutorConfig::default()).with_interpreter("sh")
    }

    /// A directory holding an executable fake `openroad`.
    fn fake_openroad_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("openroad");
        fs::write(&bin, "#!/bin/sh\necho \"openroad $*\"\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    }

    const OR_CODE: &str = "import openroad\nprint('hi')";

    #[test]
    fn test_selects_openroad_when_all_conditions_hold() {
        let dir = fake_openroad_dir();
        let r = runner().with_search_path(dir.path());
        assert_eq!(
            r.select_command(OR_CODE, true, Path::new("/tmp/s.py")),
            vec!["openroad".to_string(), "-python".to_string(), "/tmp/s.py".to_string()]
        );
    }

    #[test]
    fn test_falls_back_when_flag_cleared() {
        let dir = fake_openroad_dir();
        let r = runner().with_search_path(dir.path());
        assert_eq!(
            r.select_command(OR_CODE, false, Path::new("/tmp/s.py")),
            vec!["sh".to_string(), "/tmp/s.py".to_string()]
        );
    }

    #[test]
    fn test_falls_back_without_sentinel() {
        let dir = fake_openroad_dir();
        let r = runner().with_search_path(dir.path());
        assert_eq!(
            r.select_command("print('hi')", true, Path::new("/tmp/s.py"))[0],
            "sh"
        );
    }

    #[test]
    fn test_falls_back_when_binary_missing() {
        let empty = tempfile::tempdir().unwrap();
        let r = runner().with_search_path(empty.path());
        assert_eq!(r.select_command(OR_CODE, true, Path::new("/tmp/s.py"))[0], "sh");
    }

    #[test]
    fn test_non_executable_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("openroad"), "not a program").unwrap();
        assert!(runner().with_search_path(dir.path()).resolve_openroad().is_none());
    }

    #[tokio::test]
    async fn test_captures_streams_and_removes_temp_file() {
        let result = runner()
            .run("echo out\necho err 1>&2\nexit 3", None, false)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(!Path::new(&result.command[1]).exists());
    }

    #[tokio::test]
    async fn test_diagnostic_marks_empty_streams() {
        let result = runner().run("true", None, false).await.unwrap();
        let text = result.to_string();
        let expected = format!(
            "Command: sh {}\nExit code: 0\n----- STDOUT -----\n<empty>\n----- STDERR -----\n<empty>",
            result.command[1]
        );
        assert_eq!(text, expected);
    }

    #[tokio::test]
    async fn test_runs_under_openroad_with_python_flag() {
        let dir = fake_openroad_dir();
        let result = runner()
            .with_search_path(dir.path())
            .run(OR_CODE, None, true)
            .await
            .unwrap();

        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.starts_with("openroad -python "));
        assert!(result.to_string().starts_with("Command: openroad -python "));
        assert!(!Path::new(&result.command[2]).exists());
    }

    #[tokio::test]
    async fn test_two_runs_use_distinct_files_and_match_otherwise() {
        let r = runner();
        let a = r.run("echo same", None, false).await.unwrap();
        let b = r.run("echo same", None, false).await.unwrap();

        assert_ne!(a.command[1], b.command[1]);
        assert_eq!(a.exit_code, b.exit_code);
        assert_eq!(a.stdout, b.stdout);
        assert_eq!(a.stderr, b.stderr);
        assert_eq!(
            a.to_string().replace(&a.command[1], "<script>"),
            b.to_string().replace(&b.command[1], "<script>")
        );
    }

    #[tokio::test]
    async fn test_context_is_passed_as_environment() {
        let mut ctx = HashMap::new();
        ctx.insert("DESIGN_NAME".to_string(), "gcd".to_string());
        let result = runner()
            .run("echo \"$DESIGN_NAME\"", Some(&ctx), false)
            .await
            .unwrap();
        assert_eq!(result.stdout, "gcd\n");
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_a_spawn_error() {
        let err = runner()
            .with_interpreter("/nonexistent/python-interpreter")
            .run("print(1)", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_spawn_failure_still_removes_temp_file() {
        let scratch = tempfile::tempdir().unwrap();
        let err = runner()
            .with_interpreter("/nonexistent/python-interpreter")
            .with_temp_dir(scratch.path())
            .run("print(1)", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Spawn { .. }));

        let left: Vec<_> = fs::read_dir(scratch.path()).unwrap().collect();
        assert!(left.is_empty(), "script files left behind: {:?}", left);
    }

    #[tokio::test]
    async fn test_temp_dir_holds_the_script_while_it_runs() {
        let scratch = tempfile::tempdir().unwrap();
        let result = runner()
            .with_temp_dir(scratch.path())
            .run("echo ok", None, false)
            .await
            .unwrap();
        assert!(Path::new(&result.command[1]).starts_with(scratch.path()));
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let err = runner()
            .with_timeout(Some(Duration::from_millis(200)))
            .run("sleep 5", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::TimedOut(_)));
    }
}

//! Typed command execution
//!
//! Commands are described as a program plus an argument vector and a timeout;
//! nothing is ever assembled by string interpolation. When a command line has
//! to cross a remote shell (ssh), [`remote_command_line`] quotes every word.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use crate::error::ExecError;

/// One process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    stdin: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
            stdin: None,
        }
    }

    /// Build from an argv slice (`["hostname", "-I"]`). Returns `None` if empty.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, rest) = argv.split_first()?;
        Some(Self::new(program.clone(), timeout).args(rest.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed the contents of a local file to the process's stdin
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin = Some(path.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn argv(&self) -> &[String] {
        &self.args
    }

    /// Human-readable rendering for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status, or -1 when the process was killed by a signal
    pub code: i32,
    /// Signal that terminated the process, if any
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// "status N" or "signal N", for messages
    pub fn exit_text(&self) -> String {
        match self.signal {
            Some(signal) => format!("signal {}", signal),
            None => format!("status {}", self.code),
        }
    }
}

/// Runs commands to completion or timeout.
///
/// Owns a small tokio runtime so that blocking callers (rayon workers, main)
/// can wait on a child with a deadline; a child that outlives its timeout is
/// killed when its future is dropped.
///
/// On unix every child gets its own process group, so a terminal Ctrl-C
/// reaches only this process and the interrupt handler decides whether
/// in-flight commands are allowed to finish.
pub struct Executor {
    runtime: tokio::runtime::Runtime,
}

impl Executor {
    pub fn new() -> Result<Self, ExecError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(2)
            .thread_name("fanout-exec")
            .build()
            .map_err(ExecError::Runtime)?;
        Ok(Self { runtime })
    }

    pub fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let stdin = match &spec.stdin {
            Some(path) => {
                let file = std::fs::File::open(path).map_err(|source| ExecError::Stdin {
                    path: path.clone(),
                    source,
                })?;
                Stdio::from(file)
            }
            None => Stdio::null(),
        };

        self.runtime.block_on(async {
            let mut command = tokio::process::Command::new(&spec.program);
            command
                .args(&spec.args)
                .stdin(stdin)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);
            #[cfg(unix)]
            command.process_group(0);

            let child = command
                .spawn()
                .map_err(|source| ExecError::Spawn {
                    program: spec.program.clone(),
                    source,
                })?;

            match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
                Ok(Ok(output)) => Ok(CommandOutput {
                    code: output.status.code().unwrap_or(-1),
                    signal: exit_signal(&output.status),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                }),
                Ok(Err(source)) => Err(ExecError::Wait {
                    program: spec.program.clone(),
                    source,
                }),
                Err(_) => Err(ExecError::Timeout {
                    program: spec.program.clone(),
                    timeout: spec.timeout,
                }),
            }
        })
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Quote one word for a POSIX shell
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"_-./:=@%+,".contains(&b));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Render an argv as a single string for a remote shell, each word quoted
pub fn remote_command_line<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|w| shell_quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote_plain_words_untouched() {
        assert_eq!(shell_quote("sha256sum"), "sha256sum");
        assert_eq!(shell_quote("/data/app/v1.2"), "/data/app/v1.2");
    }

    #[test]
    fn test_shell_quote_escapes_metacharacters() {
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("$(rm -rf /)"), "'$(rm -rf /)'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_remote_command_line() {
        let line = remote_command_line(&["mkdir", "-p", "--", "/dest/my dir"]);
        assert_eq!(line, "mkdir -p -- '/dest/my dir'");
    }

    #[test]
    fn test_from_argv() {
        let argv = vec!["hostname".to_string(), "-I".to_string()];
        let spec = CommandSpec::from_argv(&argv, Duration::from_secs(1)).unwrap();
        assert_eq!(spec.program(), "hostname");
        assert_eq!(spec.argv(), &["-I".to_string()]);
        assert!(CommandSpec::from_argv(&[], Duration::from_secs(1)).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_exit_code_and_output() {
        let exec = Executor::new().unwrap();
        let spec = CommandSpec::new("sh", Duration::from_secs(5))
            .args(["-c", "echo out; echo err >&2; exit 3"]);
        let out = exec.run(&spec).unwrap();
        assert_eq!(out.code, 3);
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr, "err");
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_times_out() {
        let exec = Executor::new().unwrap();
        let spec = CommandSpec::new("sleep", Duration::from_millis(100)).arg("5");
        let started = std::time::Instant::now();
        let err = exec.run(&spec).unwrap_err();
        assert!(matches!(err, ExecError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_reports_killing_signal() {
        let exec = Executor::new().unwrap();
        let spec = CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", "kill -TERM $$"]);
        let out = exec.run(&spec).unwrap();
        assert_eq!(out.signal, Some(15));
        assert_eq!(out.code, -1);
        assert!(!out.success());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_children_run_in_their_own_process_group() {
        let exec = Executor::new().unwrap();
        // Field 5 of /proc/<pid>/stat is the process group id
        let spec = CommandSpec::new("sh", Duration::from_secs(5))
            .args(["-c", "echo $$; cut -d' ' -f5 /proc/$$/stat"]);
        let out = exec.run(&spec).unwrap();
        let mut lines = out.stdout.lines().map(str::trim);
        let pid = lines.next().unwrap();
        let pgid = lines.next().unwrap();
        assert_eq!(pid, pgid);
    }

    #[test]
    fn test_run_missing_program() {
        let exec = Executor::new().unwrap();
        let spec = CommandSpec::new("fanout-no-such-program", Duration::from_secs(1));
        assert!(matches!(exec.run(&spec), Err(ExecError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_stdin_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        std::fs::write(&input, "payload").unwrap();
        let exec = Executor::new().unwrap();
        let spec = CommandSpec::new("cat", Duration::from_secs(5)).stdin_file(&input);
        assert_eq!(exec.run(&spec).unwrap().stdout, "payload");
    }
}

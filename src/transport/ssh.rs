//! SSH transport using the system ssh client
//!
//! Every remote operation is a fresh `ssh` invocation carrying its own
//! timeout. Remote commands are argv vectors rendered with
//! [`remote_command_line`], so paths are always passed as quoted words.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::checksum::{parse_digest_output, ChecksumType, RemoteDigest};
use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::exec::{remote_command_line, CommandOutput, CommandSpec, Executor};

use super::{temp_name, DirStatus, Target, Transport};

/// Exit status the digest script uses for "no such file"
const ABSENT_EXIT: i32 = 3;

/// Exit status reserved by ssh for its own failures
const SSH_FAILURE_EXIT: i32 = 255;

/// Streams stdin into `$1`; with a second path, renames `$1` to `$2` on
/// success and removes it on failure.
const PUT_SCRIPT: &str = r#"cat > "$1" || { rm -f -- "$1"; exit 1; }"#;
const PUT_ATOMIC_SCRIPT: &str =
    r#"{ cat > "$1" && mv -f -- "$1" "$2"; } || { rm -f -- "$1"; exit 1; }"#;
const DIGEST_SCRIPT: &str = r#"[ -e "$2" ] || exit 3; exec "$1" -- "$2""#;

#[derive(Debug, Clone)]
pub struct SshSettings {
    pub ssh_program: String,
    pub options: Vec<String>,
    pub command_timeout: Duration,
    pub transfer_timeout: Duration,
}

impl SshSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            ssh_program: config.ssh_program.clone(),
            options: config.ssh_options.clone(),
            command_timeout: config.command_timeout(),
            transfer_timeout: config.transfer_timeout(),
        }
    }
}

pub struct SshTransport {
    exec: Arc<Executor>,
    settings: SshSettings,
}

impl SshTransport {
    pub fn new(exec: Arc<Executor>, settings: SshSettings) -> Self {
        Self { exec, settings }
    }

    /// Full local argv for running `remote_argv` on `target`
    pub fn command(&self, target: &Target, remote_argv: &[&str], timeout: Duration) -> CommandSpec {
        let connect_secs = self.settings.command_timeout.as_secs().max(1);
        CommandSpec::new(self.settings.ssh_program.clone(), timeout)
            .arg("-q")
            .args(self.settings.options.iter().cloned())
            .args(["-o".to_string(), format!("ConnectTimeout={}", connect_secs)])
            .arg("--")
            .arg(target.login())
            .arg(remote_command_line(remote_argv))
    }

    fn run(
        &self,
        target: &Target,
        remote_argv: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, TransportError> {
        let spec = self.command(target, remote_argv, timeout);
        Ok(self.exec.run(&spec)?)
    }

    fn remote_failure(op: &'static str, target: &Target, out: CommandOutput) -> TransportError {
        if let Some(signal) = out.signal {
            return TransportError::Killed {
                op,
                address: target.address.clone(),
                signal,
            };
        }
        let stderr = if out.code == SSH_FAILURE_EXIT && out.stderr.is_empty() {
            "ssh connection failed".to_string()
        } else {
            out.stderr
        };
        TransportError::Remote {
            op,
            address: target.address.clone(),
            code: out.code,
            stderr,
        }
    }
}

impl Transport for SshTransport {
    fn dir_exists(&self, target: &Target, path: &str) -> Result<bool, TransportError> {
        let out = self.run(
            target,
            &["test", "-d", path],
            self.settings.command_timeout,
        )?;
        match out.code {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(Self::remote_failure("directory check", target, out)),
        }
    }

    fn create_dir(&self, target: &Target, path: &str) -> Result<DirStatus, TransportError> {
        let out = self.run(
            target,
            &["mkdir", "-p", "--", path],
            self.settings.command_timeout,
        )?;
        if out.success() {
            Ok(DirStatus::Ensured)
        } else {
            Err(Self::remote_failure("mkdir", target, out))
        }
    }

    fn remote_digest(
        &self,
        target: &Target,
        path: &str,
        kind: ChecksumType,
    ) -> Result<RemoteDigest, TransportError> {
        let out = self.run(
            target,
            &["sh", "-c", DIGEST_SCRIPT, "sh", kind.remote_program(), path],
            self.settings.command_timeout,
        )?;
        match out.code {
            0 => parse_digest_output(&out.stdout, kind)
                .map(RemoteDigest::Present)
                .ok_or_else(|| TransportError::Protocol {
                    op: "remote digest",
                    address: target.address.clone(),
                    output: out.stdout,
                }),
            ABSENT_EXIT => Ok(RemoteDigest::Absent),
            _ => Err(Self::remote_failure("remote digest", target, out)),
        }
    }

    fn put_file(
        &self,
        target: &Target,
        local: &Path,
        path: &str,
        atomic: bool,
    ) -> Result<u64, TransportError> {
        let size = std::fs::metadata(local)
            .map_err(|source| TransportError::Io {
                op: "stat source",
                source,
            })?
            .len();

        let tmp;
        let remote_argv: Vec<&str> = if atomic {
            tmp = temp_name(path);
            vec!["sh", "-c", PUT_ATOMIC_SCRIPT, "sh", tmp.as_str(), path]
        } else {
            vec!["sh", "-c", PUT_SCRIPT, "sh", path]
        };

        let spec = self
            .command(target, &remote_argv, self.settings.transfer_timeout)
            .stdin_file(local);
        let out = self.exec.run(&spec)?;
        if out.success() {
            Ok(size)
        } else {
            Err(Self::remote_failure("transfer", target, out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> SshTransport {
        let settings = SshSettings {
            ssh_program: "ssh".into(),
            options: vec!["-o".into(), "BatchMode=yes".into()],
            command_timeout: Duration::from_secs(7),
            transfer_timeout: Duration::from_secs(60),
        };
        SshTransport::new(Arc::new(Executor::new().unwrap()), settings)
    }

    #[test]
    fn test_command_layout() {
        let t = transport();
        let target = Target::new("10.1.1.5", "support", "/srv");
        let spec = t.command(&target, &["mkdir", "-p", "--", "/srv/a dir"], Duration::from_secs(7));
        assert_eq!(spec.program(), "ssh");
        assert_eq!(
            spec.argv(),
            &[
                "-q",
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=7",
                "--",
                "support@10.1.1.5",
                "mkdir -p -- '/srv/a dir'",
            ]
        );
    }

    #[test]
    fn test_hostile_path_stays_one_word() {
        let t = transport();
        let target = Target::new("h", "u", "/");
        let spec = t.command(&target, &["test", "-d", "/x; rm -rf ~"], Duration::from_secs(1));
        assert_eq!(spec.argv().last().unwrap(), "test -d '/x; rm -rf ~'");
    }

    #[test]
    fn test_digest_script_uses_absent_exit() {
        assert!(DIGEST_SCRIPT.contains(&format!("exit {}", ABSENT_EXIT)));
    }

    #[test]
    fn test_connection_failure_message() {
        let target = Target::new("h", "u", "/");
        let out = CommandOutput {
            code: SSH_FAILURE_EXIT,
            signal: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        let err = SshTransport::remote_failure("mkdir", &target, out);
        assert!(err.to_string().contains("ssh connection failed"));
    }

    #[test]
    fn test_killed_transfer_names_the_signal() {
        let target = Target::new("h", "u", "/");
        let out = CommandOutput {
            code: -1,
            signal: Some(2),
            stdout: String::new(),
            stderr: String::new(),
        };
        let err = SshTransport::remote_failure("transfer", &target, out);
        assert!(matches!(err, TransportError::Killed { signal: 2, .. }));
        assert_eq!(err.to_string(), "transfer on h killed by signal 2");
    }
}

use std::path::{Path, PathBuf};

use crate::cmd::{self, Captured, Invocation, Runner};
use crate::error::{ConnectivityError, Result};
use crate::params::ParameterSet;

/// Seconds ssh waits for the TCP connection before giving up.
pub const CONNECT_TIMEOUT_SECS: u32 = 10;

/// Exit code ssh uses for its own errors.
const SSH_FAILURE_CODE: i32 = 255;

/// SSH session wrapper for executing commands and transferring
/// files to a remote host.
pub struct SshSession<'a> {
    runner: &'a dyn Runner,
    host: String,
    user: String,
    key: Option<PathBuf>,
}

impl<'a> SshSession<'a> {
    #[must_use]
    pub fn new(runner: &'a dyn Runner, host: &str, user: &str) -> Self {
        Self {
            runner,
            host: host.to_string(),
            user: user.to_string(),
            key: None,
        }
    }

    #[must_use]
    pub fn for_params(runner: &'a dyn Runner, params: &ParameterSet) -> Self {
        Self::new(runner, params.server_host(), params.ssh_user()).with_key(params.ssh_key_path())
    }

    #[must_use]
    pub fn with_key(mut self, key_path: &Path) -> Self {
        self.key = Some(key_path.to_path_buf());
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether remote commands run as root and need no `sudo`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.user == "root"
    }

    /// Prefix `args` with non-interactive `sudo` unless logged in as
    /// root.
    #[must_use]
    pub fn privileged<'s>(&self, args: &[&'s str]) -> Vec<&'s str> {
        let mut out = Vec::with_capacity(args.len() + 2);
        if !self.is_root() {
            out.extend_from_slice(&["sudo", "-n"]);
        }
        out.extend_from_slice(args);
        out
    }

    /// Execute a command on the remote host and capture its output.
    /// Each argument is quoted for the remote shell.
    pub fn exec(&self, args: &[&str]) -> Result<String> {
        cmd::run(self.runner, &self.ssh_invocation(&remote_command(args)))
    }

    /// Like [`Self::exec`] but returns the raw result, successful or not.
    pub fn exec_raw(&self, args: &[&str]) -> Result<Captured> {
        self.runner.capture(&self.ssh_invocation(&remote_command(args)))
    }

    /// Like [`Self::exec_raw`] but a failure of ssh itself (exit 255)
    /// is an error, so the remote command's status can be trusted.
    pub fn exec_status(&self, args: &[&str]) -> Result<Captured> {
        let output = self.exec_raw(args)?;
        if output.code == Some(SSH_FAILURE_CODE) {
            return Err(classify_failure(&self.host, output.code, &output.stderr).into());
        }
        Ok(output)
    }

    /// Execute a command on the remote host with `data` on its stdin.
    pub fn exec_with_stdin(&self, args: &[&str], data: Vec<u8>) -> Result<String> {
        let inv = self.ssh_invocation(&remote_command(args)).stdin(data);
        cmd::run(self.runner, &inv)
    }

    /// Copy a local file to the remote host.
    pub fn scp_to(&self, local_path: &Path, remote_path: &str) -> Result<()> {
        let inv = Invocation::new("scp")
            .args(self.base_args())
            .arg(local_path.display().to_string())
            .arg(format!("{}:{remote_path}", self.destination()));
        cmd::run(self.runner, &inv)?;
        Ok(())
    }

    /// Run a no-op on the remote host. Success means the host is
    /// reachable, the key is accepted and a shell can be started.
    pub fn probe(&self) -> std::result::Result<(), ConnectivityError> {
        let output = self
            .runner
            .capture(&self.ssh_invocation("true"))
            .map_err(|e| ConnectivityError::Unreachable {
                host: self.host.clone(),
                reason: e.to_string(),
            })?;

        if output.success() {
            Ok(())
        } else {
            Err(classify_failure(&self.host, output.code, &output.stderr))
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn ssh_invocation(&self, remote: &str) -> Invocation {
        Invocation::new("ssh")
            .args(self.base_args())
            .arg(self.destination())
            .arg(remote)
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}"),
        ];
        if let Some(key) = &self.key {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args
    }
}

/// Map a failed ssh run onto a connectivity error. ssh itself exits
/// with 255; any other code comes from the remote command.
#[must_use]
pub fn classify_failure(host: &str, code: Option<i32>, stderr: &str) -> ConnectivityError {
    let host = host.to_string();
    let lower = stderr.to_ascii_lowercase();

    if lower.contains("permission denied") || lower.contains("too many authentication failures") {
        ConnectivityError::AuthRejected(host)
    } else if lower.contains("connection refused") {
        ConnectivityError::Refused(host)
    } else if lower.contains("timed out") {
        ConnectivityError::TimedOut(host)
    } else if lower.contains("could not resolve hostname") || lower.contains("name or service not known") {
        ConnectivityError::UnknownHost(host)
    } else if lower.contains("host key verification failed") {
        ConnectivityError::HostKeyMismatch(host)
    } else {
        let reason = match code {
            Some(SSH_FAILURE_CODE) | None => stderr.lines().last().unwrap_or("ssh failed").to_string(),
            Some(c) => format!("remote no-op exited with {c}"),
        };
        ConnectivityError::Unreachable { host, reason }
    }
}

/// Join arguments into one remote shell command, quoting each one that
/// is not made of plain characters.
#[must_use]
pub fn remote_command(args: &[&str]) -> String {
    args.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::scripted::{ScriptedRunner, fail};
    use crate::error::Error;

    #[test]
    fn probe_uses_batch_mode_and_timeout() {
        let runner = ScriptedRunner::new();
        let ssh = SshSession::new(&runner, "203.0.113.10", "deploy").with_key(Path::new("/k/id"));

        ssh.probe().unwrap();

        assert_eq!(
            runner.commands(),
            vec![
                "ssh -o BatchMode=yes -o StrictHostKeyChecking=accept-new \
                 -o ConnectTimeout=10 -i /k/id deploy@203.0.113.10 true"
            ]
        );
    }

    #[test]
    fn probe_distinguishes_auth_from_network() {
        let runner = ScriptedRunner::new().on(
            "true",
            fail(255, "deploy@203.0.113.10: Permission denied (publickey)."),
        );
        let ssh = SshSession::new(&runner, "203.0.113.10", "deploy");

        assert!(matches!(ssh.probe(), Err(ConnectivityError::AuthRejected(_))));

        let runner = ScriptedRunner::new().on(
            "true",
            fail(255, "ssh: connect to host 203.0.113.10 port 22: Connection timed out"),
        );
        let ssh = SshSession::new(&runner, "203.0.113.10", "deploy");

        assert!(matches!(ssh.probe(), Err(ConnectivityError::TimedOut(_))));
    }

    #[test]
    fn classify_other_failures() {
        assert!(matches!(
            classify_failure("h", Some(255), "ssh: connect to host h port 22: Connection refused"),
            ConnectivityError::Refused(_)
        ));
        assert!(matches!(
            classify_failure("h", Some(255), "ssh: Could not resolve hostname h: Name or service not known"),
            ConnectivityError::UnknownHost(_)
        ));
        assert!(matches!(
            classify_failure("h", Some(255), "Host key verification failed."),
            ConnectivityError::HostKeyMismatch(_)
        ));
        match classify_failure("h", Some(1), "") {
            ConnectivityError::Unreachable { reason, .. } => {
                assert_eq!(reason, "remote no-op exited with 1");
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn exec_status_separates_ssh_failure_from_remote_status() {
        let runner = ScriptedRunner::new()
            .on("is-active", fail(3, ""))
            .on("docker ps", fail(255, "Connection to h closed by remote host."));
        let ssh = SshSession::new(&runner, "h", "deploy");

        let inactive = ssh.exec_status(&["systemctl", "is-active", "nginx"]).unwrap();
        assert_eq!(inactive.code, Some(3));

        let err = ssh.exec_status(&["docker", "ps"]).unwrap_err();
        assert!(matches!(
            err,
            Error::Connectivity(ConnectivityError::Unreachable { ref reason, .. })
                if reason.contains("closed by remote host")
        ));
    }

    #[test]
    fn privileged_prefixes_sudo_for_non_root() {
        let runner = ScriptedRunner::new();

        let deploy = SshSession::new(&runner, "h", "deploy");
        let root = SshSession::new(&runner, "h", "root");

        assert_eq!(deploy.privileged(&["nginx", "-t"]), vec!["sudo", "-n", "nginx", "-t"]);
        assert_eq!(root.privileged(&["nginx", "-t"]), vec!["nginx", "-t"]);
    }

    #[test]
    fn remote_command_quotes_only_when_needed() {
        assert_eq!(
            remote_command(&["docker", "ps", "--format", "{{.Names}}"]),
            "docker ps --format '{{.Names}}'"
        );
        assert_eq!(remote_command(&["echo", "it's"]), "echo 'it'\\''s'");
        assert_eq!(remote_command(&["printf", ""]), "printf ''");
    }

    #[test]
    fn exec_with_stdin_sends_payload() {
        let runner = ScriptedRunner::new();
        let ssh = SshSession::new(&runner, "h", "root");

        ssh.exec_with_stdin(&["bash", "-s", "--", "root"], b"echo hi\n".to_vec())
            .unwrap();

        let calls = runner.invocations();
        assert_eq!(calls[0].stdin.as_deref(), Some(&b"echo hi\n"[..]));
        assert!(calls[0].to_string().ends_with("root@h bash -s -- root"));
    }
}

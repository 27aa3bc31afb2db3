use crate::error::{Error, Result};
use crate::ssh::SshSession;

/// A provisioner prepares a host so that containers and the nginx
/// front end can be deployed to it.
pub trait Provisioner {
    /// Short name used in step reports.
    fn name(&self) -> &'static str;

    /// Make sure the host is ready. Must be safe to run repeatedly.
    fn provision(&self, ssh: &SshSession<'_>, deploy_user: &str) -> Result<()>;
}

/// Provisions Debian/Ubuntu hosts with apt: installs Docker, nginx and
/// curl when missing, enables both services, and adds the deploy user
/// to the `docker` group.
#[derive(Debug, Clone, Copy, Default)]
pub struct AptProvisioner;

impl AptProvisioner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    #[must_use]
    pub const fn script() -> &'static str {
        include_str!("../scripts/provision-server.sh")
    }
}

impl Provisioner for AptProvisioner {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn provision(&self, ssh: &SshSession<'_>, deploy_user: &str) -> Result<()> {
        tracing::info!(host = ssh.host(), "provisioning docker and nginx");

        // The script goes over stdin; only the user name is an argument.
        let output = ssh
            .exec_with_stdin(
                &["bash", "-s", "--", deploy_user],
                Self::script().as_bytes().to_vec(),
            )
            .map_err(|e| Error::Provision(e.reason()))?;

        for line in output.lines() {
            tracing::info!("  {line}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::scripted::{ScriptedRunner, fail};

    #[test]
    fn script_is_piped_not_interpolated() {
        let runner = ScriptedRunner::new();
        let ssh = SshSession::new(&runner, "203.0.113.10", "deploy");

        AptProvisioner::new().provision(&ssh, "deploy").unwrap();

        let calls = runner.invocations();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].to_string().ends_with("deploy@203.0.113.10 bash -s -- deploy"));
        let stdin = String::from_utf8(calls[0].stdin.clone().unwrap()).unwrap();
        assert!(stdin.contains("usermod -aG docker"));
    }

    #[test]
    fn script_is_idempotent_by_construction() {
        let script = AptProvisioner::script();

        assert!(script.contains("command -v docker"));
        assert!(script.contains("command -v nginx"));
        assert!(script.contains("systemctl enable --now docker"));
        assert!(script.contains("systemctl enable --now nginx"));
        assert!(script.contains("grep -qx docker"));
    }

    #[test]
    fn script_never_prompts_for_a_sudo_password() {
        let script = AptProvisioner::script();

        assert!(script.contains("SUDO=\"sudo -n\""));
        assert!(!script.contains("SUDO=\"sudo\""));
    }

    #[test]
    fn failure_maps_to_provision_error() {
        let runner = ScriptedRunner::new().on("bash -s", fail(100, "E: Unable to locate package nginx"));
        let ssh = SshSession::new(&runner, "h", "root");

        let err = AptProvisioner::new().provision(&ssh, "root").unwrap_err();

        match err {
            Error::Provision(reason) => assert!(reason.contains("Unable to locate package")),
            other => panic!("unexpected error: {other}"),
        }
    }
}

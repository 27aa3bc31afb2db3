use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::artifacts::container_name;
use crate::error::{Error, Result};
use crate::ssh::SshSession;

/// Outcome of the three post-deploy checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub container_running: bool,
    pub nginx_active: bool,
    pub http_ok: bool,
    /// Reason the HTTP probe failed, if it did.
    pub http_detail: Option<String>,
}

impl VerificationReport {
    /// Container and nginx state are hard requirements; the HTTP probe
    /// is informational.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.container_running && self.nginx_active
    }
}

/// Checks that a deployment is live on the host.
#[derive(Debug, Clone)]
pub struct Verifier {
    settle: Duration,
}

impl Verifier {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            settle: Duration::from_secs(5),
        }
    }

    /// Delay before the HTTP probe, giving the app time to start.
    #[must_use]
    pub const fn settle(mut self, delay: Duration) -> Self {
        self.settle = delay;
        self
    }

    /// Run every check and report. Does not fail on check results;
    /// see [`Self::verify`].
    pub fn inspect(&self, ssh: &SshSession<'_>, derived_name: &str, app_port: u16) -> Result<VerificationReport> {
        let container = container_name(derived_name);

        let names = ssh.exec_status(&[
            "docker",
            "ps",
            "--filter",
            &format!("name={container}"),
            "--filter",
            "status=running",
            "--format",
            "{{.Names}}",
        ])?;
        let container_running = names.success()
            && names
                .stdout_text()
                .lines()
                .any(|name| name.contains(&container));

        let nginx = ssh.exec_status(&["systemctl", "is-active", "nginx"])?;
        let nginx_active = nginx.stdout_text() == "active";

        if !self.settle.is_zero() {
            tracing::info!(seconds = self.settle.as_secs(), "waiting before health check");
            thread::sleep(self.settle);
        }

        let url = format!("http://localhost:{app_port}");
        let probe = ssh.exec_status(&["curl", "-fsS", "-o", "/dev/null", "--max-time", "10", &url])?;
        let (http_ok, http_detail) = if probe.success() {
            (true, None)
        } else {
            let detail = if probe.stderr.is_empty() {
                format!("curl exited with {:?}", probe.code)
            } else {
                probe.stderr.clone()
            };
            (false, Some(detail))
        };

        Ok(VerificationReport {
            container_running,
            nginx_active,
            http_ok,
            http_detail,
        })
    }

    /// Run every check; fail if the container or nginx is not running.
    /// A failing HTTP probe is logged as a warning only.
    pub fn verify(&self, ssh: &SshSession<'_>, derived_name: &str, app_port: u16) -> Result<VerificationReport> {
        let report = self.inspect(ssh, derived_name, app_port)?;

        if report.container_running {
            tracing::info!(container = %container_name(derived_name), "container is running");
        }
        if report.nginx_active {
            tracing::info!("nginx is active");
        }
        if let Some(detail) = &report.http_detail {
            tracing::warn!(port = app_port, %detail, "health check failed");
        } else {
            tracing::info!(port = app_port, "health check passed");
        }

        match (report.container_running, report.nginx_active) {
            (true, true) => Ok(report),
            (false, true) => Err(Error::Verification(format!(
                "container {} is not running",
                container_name(derived_name)
            ))),
            (true, false) => Err(Error::Verification("nginx is not active".into())),
            (false, false) => Err(Error::Verification(format!(
                "container {} is not running and nginx is not active",
                container_name(derived_name)
            ))),
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

use std::fs;

use crate::artifacts::{DeployArtifacts, RemoteLayout, STAGING_DIR};
use crate::cmd::Runner;
use crate::error::{DeployStep, Error, Result};
use crate::repo::{self, RepositoryHandle};
use crate::ssh::SshSession;

/// A deployer ships a synced repository and its generated artifacts to
/// the remote host and brings the new version live.
pub trait Deployer {
    /// Short name used in step reports.
    fn name(&self) -> &'static str;

    fn deploy(
        &self,
        runner: &dyn Runner,
        ssh: &SshSession<'_>,
        handle: &RepositoryHandle,
        artifacts: &DeployArtifacts,
    ) -> Result<()>;
}

/// Build and run the image on the host with plain `docker`, fronted by
/// an nginx site.
///
/// Sub-steps run in a fixed order and the first failure aborts the
/// rest. Re-running converges: the deploy script removes the old
/// container before starting the new one and the site symlink is
/// force-replaced.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerNginx;

impl DockerNginx {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Deployer for DockerNginx {
    fn name(&self) -> &'static str {
        "docker+nginx"
    }

    fn deploy(
        &self,
        runner: &dyn Runner,
        ssh: &SshSession<'_>,
        handle: &RepositoryHandle,
        artifacts: &DeployArtifacts,
    ) -> Result<()> {
        let layout = RemoteLayout::new(&handle.derived_name);

        step(DeployStep::Stage, || {
            ssh.exec(&["rm", "-rf", &layout.build_context])?;
            ssh.exec(&["mkdir", "-p", &layout.build_context])?;
            Ok(())
        })?;

        step(DeployStep::UploadSource, || {
            let tarball = repo::archive(runner, handle)?;
            tracing::info!(bytes = tarball.len(), "uploading build context");
            ssh.exec_with_stdin(&["tar", "-x", "-C", &layout.build_context], tarball)?;
            Ok(())
        })?;

        step(DeployStep::Transfer, || transfer(ssh, &layout, artifacts))?;

        step(DeployStep::RunScript, || {
            let output = ssh.exec(&["bash", &layout.script_path])?;
            for line in output.lines() {
                tracing::info!("  {line}");
            }
            Ok(())
        })?;

        step(DeployStep::InstallConfig, || {
            ssh.exec(&ssh.privileged(&[
                "install",
                "-m",
                "0644",
                &layout.nginx_upload_path,
                &layout.site_available,
            ]))?;
            Ok(())
        })?;

        step(DeployStep::EnableSite, || {
            ssh.exec(&ssh.privileged(&["ln", "-sf", &layout.site_available, &layout.site_enabled]))?;
            Ok(())
        })?;

        step(DeployStep::TestConfig, || {
            ssh.exec(&ssh.privileged(&["nginx", "-t"]))?;
            Ok(())
        })?;

        step(DeployStep::Reload, || {
            ssh.exec(&ssh.privileged(&["systemctl", "reload", "nginx"]))?;
            Ok(())
        })?;

        Ok(())
    }
}

/// Write the artifacts to a local temporary directory, copy them into
/// the staging directory, then delete the local copies.
fn transfer(ssh: &SshSession<'_>, layout: &RemoteLayout, artifacts: &DeployArtifacts) -> Result<()> {
    let local = tempfile::Builder::new().prefix("dockside-").tempdir()?;

    let script = local.path().join("deploy.sh");
    let nginx = local.path().join("site.conf");
    fs::write(&script, &artifacts.deploy_script)?;
    fs::write(&nginx, &artifacts.nginx_config)?;

    tracing::info!(staging = STAGING_DIR, "transferring deploy script and nginx config");
    ssh.scp_to(&script, &layout.script_path)?;
    ssh.scp_to(&nginx, &layout.nginx_upload_path)?;

    local.close()?;
    Ok(())
}

fn step(step: DeployStep, f: impl FnOnce() -> Result<()>) -> Result<()> {
    tracing::info!(step = %step, "deploy");
    f().map_err(|e| {
        tracing::error!(step = %step, error = %e, "deploy step failed");
        Error::Deploy {
            step,
            reason: e.reason(),
        }
    })
}

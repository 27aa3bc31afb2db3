use std::path::PathBuf;

use crate::artifacts::{self, DeployArtifacts};
use crate::cmd::Runner;
use crate::deploy::{Deployer, DockerNginx};
use crate::error::Result;
use crate::params::ParameterSet;
use crate::provision::Provisioner;
use crate::repo::{RepositoryHandle, RepositorySync};
use crate::report::{Outcome, RunReport, Step};
use crate::ssh::SshSession;
use crate::verify::{VerificationReport, Verifier};

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub repository: RepositoryHandle,
    pub url: String,
    pub verification: Option<VerificationReport>,
}

/// Deployment pipeline: sync, probe, provision, render, deploy, verify.
///
/// Steps run strictly in that order. The first failing step ends the
/// run; nothing already applied is rolled back.
///
/// ```no_run
/// use dockside::cmd::System;
/// use dockside::params::ParameterSet;
/// use dockside::report::RunReport;
/// use dockside::{AptProvisioner, Pipeline, Verifier};
///
/// # fn demo(params: ParameterSet) -> dockside::error::Result<()> {
/// let pipeline = Pipeline::new(params, &System)
///     .workdir("/var/lib/dockside")
///     .provision(AptProvisioner::new())
///     .verify(Verifier::new());
///
/// let mut report = RunReport::new();
/// let deployment = pipeline.run(&mut report)?;
/// println!("{}", deployment.url);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<'a> {
    params: ParameterSet,
    runner: &'a dyn Runner,
    workdir: PathBuf,
    provisioner: Option<Box<dyn Provisioner>>,
    deployer: Box<dyn Deployer>,
    verifier: Option<Verifier>,
}

impl<'a> Pipeline<'a> {
    #[must_use]
    pub fn new(params: ParameterSet, runner: &'a dyn Runner) -> Self {
        Self {
            params,
            runner,
            workdir: PathBuf::from("."),
            provisioner: None,
            deployer: Box::new(DockerNginx::new()),
            verifier: None,
        }
    }

    /// Directory the repository is cloned into.
    #[must_use]
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = dir.into();
        self
    }

    #[must_use]
    pub fn provision(mut self, provisioner: impl Provisioner + 'static) -> Self {
        self.provisioner = Some(Box::new(provisioner));
        self
    }

    #[must_use]
    pub fn deploy(mut self, deployer: impl Deployer + 'static) -> Self {
        self.deployer = Box::new(deployer);
        self
    }

    #[must_use]
    pub fn verify(mut self, verifier: Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    #[must_use]
    pub const fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Run every configured step, recording each outcome in `report`.
    pub fn run(&self, report: &mut RunReport) -> Result<Deployment> {
        let params = &self.params;

        let handle = track(report, Step::SyncRepository, || {
            RepositorySync::new(self.runner, &self.workdir).sync(params)
        }, |h| {
            format!("{} at {} ({})", h.derived_name, h.local_path.display(), params.branch())
        })?;

        let ssh = SshSession::for_params(self.runner, params);

        track(report, Step::ProbeConnectivity, || Ok(ssh.probe()?), |_| {
            format!("{}@{} reachable", params.ssh_user(), params.server_host())
        })?;

        if let Some(provisioner) = &self.provisioner {
            track(report, Step::Provision, || provisioner.provision(&ssh, params.ssh_user()), |_| {
                format!("host ready ({})", provisioner.name())
            })?;
        } else {
            report.record(Step::Provision, Outcome::Skipped, "not requested");
        }

        let artifacts = self.render();
        report.record(
            Step::RenderArtifacts,
            Outcome::Success,
            format!(
                "deploy script and nginx site for {} -> 127.0.0.1:{}",
                params.domain_name(),
                params.app_port()
            ),
        );

        track(report, Step::Deploy, || {
            self.deployer.deploy(self.runner, &ssh, &handle, &artifacts)
        }, |_| {
            format!("{} deployed via {}", handle.derived_name, self.deployer.name())
        })?;

        let verification = if let Some(verifier) = &self.verifier {
            match verifier.verify(&ssh, &handle.derived_name, params.app_port()) {
                Ok(v) if v.http_ok => {
                    report.record(Step::Verify, Outcome::Success, "container, nginx and HTTP checks passed");
                    Some(v)
                }
                Ok(v) => {
                    let detail = v.http_detail.clone().unwrap_or_default();
                    report.record(Step::Verify, Outcome::Warning, format!("health check failed: {detail}"));
                    Some(v)
                }
                Err(e) => {
                    report.record(Step::Verify, Outcome::Failure, e.to_string());
                    return Err(e);
                }
            }
        } else {
            report.record(Step::Verify, Outcome::Skipped, "not requested");
            None
        };

        let url = params.access_url();
        report.url = Some(url.clone());

        Ok(Deployment {
            repository: handle,
            url,
            verification,
        })
    }

    /// Artifacts for this deployment without touching the network or
    /// the filesystem.
    #[must_use]
    pub fn render(&self) -> DeployArtifacts {
        artifacts::render(
            self.params.derived_name(),
            self.params.app_port(),
            self.params.domain_name(),
        )
    }

    /// Only probe SSH connectivity.
    pub fn check(&self) -> Result<()> {
        SshSession::for_params(self.runner, &self.params).probe()?;
        Ok(())
    }

    /// Only run the verifier against an existing deployment.
    pub fn status(&self, verifier: &Verifier) -> Result<VerificationReport> {
        let ssh = SshSession::for_params(self.runner, &self.params);
        ssh.probe()?;
        verifier.verify(&ssh, self.params.derived_name(), self.params.app_port())
    }
}

fn track<T>(
    report: &mut RunReport,
    step: Step,
    f: impl FnOnce() -> Result<T>,
    describe: impl FnOnce(&T) -> String,
) -> Result<T> {
    tracing::debug!(step = step.as_str(), "starting");
    match f() {
        Ok(value) => {
            report.record(step, Outcome::Success, describe(&value));
            Ok(value)
        }
        Err(e) => {
            report.record(step, Outcome::Failure, e.to_string());
            Err(e)
        }
    }
}

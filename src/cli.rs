use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::artifacts::{self, RemoteLayout};
use crate::cmd::System;
use crate::config::{RunOptions, Settings};
use crate::error::Result;
use crate::params::ParameterSet;
use crate::pipeline::Pipeline;
use crate::provision::AptProvisioner;
use crate::report::RunReport;
use crate::verify::Verifier;

#[derive(Debug, Parser)]
#[command(name = "dockside")]
#[command(version, about = "Deploy a Dockerfile repository to a server behind nginx")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log every external command (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sync the repository and deploy it to the server
    Deploy {
        #[command(flatten)]
        target: TargetArgs,

        /// Install and enable Docker and nginx on the server first
        #[arg(long)]
        provision: bool,

        /// Check container, nginx and HTTP health afterwards
        #[arg(long)]
        verify: bool,

        /// Directory the repository is cloned into
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Seconds to wait before the HTTP health check
        #[arg(long)]
        settle: Option<u64>,

        /// Print the step report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Preview the generated deploy script and nginx config
    Render {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Check SSH connectivity to the server
    Check {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show whether the deployed container and nginx are running
    Status {
        #[command(flatten)]
        target: TargetArgs,

        /// Seconds to wait before the HTTP health check
        #[arg(long)]
        settle: Option<u64>,
    },
}

/// Where and what to deploy. Flags override the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct TargetArgs {
    /// YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Git repository URL (https://...)
    #[arg(long = "repo")]
    pub repository: Option<String>,

    /// Branch to deploy [default: main]
    #[arg(long)]
    pub branch: Option<String>,

    /// SSH login user
    #[arg(long = "user")]
    pub ssh_user: Option<String>,

    /// Server IPv4 address or hostname
    #[arg(long = "host")]
    pub server: Option<String>,

    /// SSH private key file
    #[arg(long = "key")]
    pub ssh_key: Option<PathBuf>,

    /// Port the application listens on inside the container
    #[arg(long)]
    pub port: Option<u32>,

    /// Domain name served by nginx
    #[arg(long)]
    pub domain: Option<String>,

    /// Environment variable holding the git access token
    #[arg(long)]
    pub token_env: Option<String>,
}

impl TargetArgs {
    /// Config file settings with flags layered on top.
    pub fn settings(&self) -> Result<Settings> {
        let base = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        Ok(base.merge(Settings {
            repository: self.repository.clone(),
            branch: self.branch.clone(),
            ssh_user: self.ssh_user.clone(),
            server: self.server.clone(),
            ssh_key: self.ssh_key.clone(),
            port: self.port,
            domain: self.domain.clone(),
            token_env: self.token_env.clone(),
            ..Settings::default()
        }))
    }
}

fn validated(settings: &Settings) -> Result<ParameterSet> {
    let raw = settings.to_raw(|key| std::env::var(key).ok())?;
    ParameterSet::validate(raw)
}

/// Dispatch a parsed command line. On success returns the text to
/// print on stdout.
pub fn execute(cli: &Cli) -> Result<String> {
    match &cli.command {
        Command::Deploy {
            target,
            provision,
            verify,
            workdir,
            settle,
            json,
        } => {
            let settings = target.settings()?.merge(Settings {
                provision: provision.then_some(true),
                verify: verify.then_some(true),
                workdir: workdir.clone(),
                settle_secs: *settle,
                ..Settings::default()
            });
            cmd_deploy(validated(&settings)?, &settings.run_options(), *json)
        }
        Command::Render { target } => cmd_render(&target.settings()?),
        Command::Check { target } => {
            let params = validated(&target.settings()?)?;
            Pipeline::new(params, &System).check()?;
            Ok("SSH connection OK".to_string())
        }
        Command::Status { target, settle } => {
            let settings = target.settings()?;
            let params = validated(&settings)?;
            let settle = settle.map_or_else(|| settings.run_options().settle, Duration::from_secs);
            let report = Pipeline::new(params, &System).status(&Verifier::new().settle(settle))?;
            Ok(serde_json::to_string_pretty(&report)?)
        }
    }
}

fn cmd_deploy(params: ParameterSet, options: &RunOptions, json: bool) -> Result<String> {
    let mut pipeline = Pipeline::new(params, &System).workdir(&options.workdir);
    if options.provision {
        pipeline = pipeline.provision(AptProvisioner::new());
    }
    if options.verify {
        pipeline = pipeline.verify(Verifier::new().settle(options.settle));
    }

    let mut report = RunReport::new();
    let deployment = pipeline.run(&mut report)?;

    if json {
        Ok(report.to_json()?)
    } else {
        Ok(deployment.url)
    }
}

fn cmd_render(settings: &Settings) -> Result<String> {
    let (name, port, domain) = settings.render_inputs()?;
    let rendered = artifacts::render(&name, port, &domain);
    let layout = RemoteLayout::new(&name);

    eprintln!("=== Dry run: no changes will be made ===");
    eprintln!();
    eprintln!("--- Actions that would be performed ---");
    eprintln!("1. Clone or fast-forward {name} and require a Dockerfile");
    eprintln!("2. Upload the build context to {}", layout.build_context);
    eprintln!("3. Build image {} and run {}", layout.image, layout.container);
    eprintln!("4. Install nginx site {}", layout.site_available);
    eprintln!("5. Link {} and reload nginx", layout.site_enabled);
    eprintln!();

    Ok(format!(
        "# --- {} ---\n{}\n# --- {} ---\n{}",
        layout.script_path, rendered.deploy_script, layout.site_available, rendered.nginx_config
    ))
}

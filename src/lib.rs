//! Deploy a Dockerfile-based git repository to a single server.
//!
//! Dockside clones (or fast-forwards) a private repository, checks
//! that the server is reachable over SSH, optionally installs Docker
//! and nginx, then builds and runs the image on the server behind an
//! nginx reverse proxy for a domain name.
//!
//! # Overview
//!
//! A deployment is a [`Pipeline`] over a validated [`ParameterSet`]:
//!
//! 1. **Sync** - clone the branch or fast-forward an existing checkout
//!    ([`RepositorySync`])
//! 2. **Probe** - one SSH round trip to prove the server is usable
//! 3. **Provision** (optional) - install and enable Docker and nginx
//!    ([`AptProvisioner`])
//! 4. **Render** - generate the deploy script and nginx site config
//!    ([`artifacts`])
//! 5. **Deploy** - upload the build context and artifacts, run the
//!    script, install and reload the site ([`DockerNginx`])
//! 6. **Verify** (optional) - container, nginx and HTTP checks
//!    ([`Verifier`])
//!
//! Steps run in that order and the first failure ends the run. Every
//! external tool (`git`, `ssh`, `scp`) is invoked through a
//! [`Runner`](cmd::Runner), so the whole pipeline can be driven
//! against scripted command output in tests.
//!
//! # Example
//!
//! ```sh
//! export DOCKSIDE_GIT_TOKEN=ghp_...
//! dockside deploy --repo https://github.com/acme/myapp.git \
//!     --user deploy --host 203.0.113.10 --key ~/.ssh/id_ed25519 \
//!     --port 8080 --domain example.com --provision --verify
//!
//! # Preview the generated files
//! dockside render --repo https://github.com/acme/myapp.git \
//!     --port 8080 --domain example.com
//! ```

// Allow noisy pedantic lints that don't add value for a
// deployment tool crate.
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod artifacts;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod deploy;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod provision;
pub mod repo;
pub mod report;
pub mod ssh;
pub mod verify;

pub use artifacts::DeployArtifacts;
pub use config::Settings;
pub use deploy::DockerNginx;
pub use error::{Error, Result};
pub use params::ParameterSet;
pub use pipeline::{Deployment, Pipeline};
pub use provision::AptProvisioner;
pub use repo::{RepositoryHandle, RepositorySync};
pub use report::RunReport;
pub use verify::{VerificationReport, Verifier};

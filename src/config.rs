//! Deployment settings from a YAML file, CLI flags and the environment.
//!
//! Settings are layered: values from the config file are overridden by
//! flags. The access token is only ever read from an environment
//! variable, never from the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::params::{self, RawParameters, Secret};
use crate::repo;

pub const DEFAULT_TOKEN_ENV: &str = "DOCKSIDE_GIT_TOKEN";
pub const DEFAULT_SETTLE_SECS: u64 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub repository: Option<String>,
    pub branch: Option<String>,
    pub ssh_user: Option<String>,
    pub server: Option<String>,
    pub ssh_key: Option<PathBuf>,
    pub port: Option<u32>,
    pub domain: Option<String>,
    pub token_env: Option<String>,
    pub provision: Option<bool>,
    pub verify: Option<bool>,
    pub workdir: Option<PathBuf>,
    pub settle_secs: Option<u64>,
}

/// Pipeline switches that are not part of the deployment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub provision: bool,
    pub verify: bool,
    pub workdir: PathBuf,
    pub settle: Duration,
}

impl Settings {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&content)
    }

    /// Overlay `other` on top of `self`; set fields in `other` win.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            repository: other.repository.or(self.repository),
            branch: other.branch.or(self.branch),
            ssh_user: other.ssh_user.or(self.ssh_user),
            server: other.server.or(self.server),
            ssh_key: other.ssh_key.or(self.ssh_key),
            port: other.port.or(self.port),
            domain: other.domain.or(self.domain),
            token_env: other.token_env.or(self.token_env),
            provision: other.provision.or(self.provision),
            verify: other.verify.or(self.verify),
            workdir: other.workdir.or(self.workdir),
            settle_secs: other.settle_secs.or(self.settle_secs),
        }
    }

    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            provision: self.provision.unwrap_or(false),
            verify: self.verify.unwrap_or(false),
            workdir: self.workdir.clone().unwrap_or_else(|| PathBuf::from(".")),
            settle: Duration::from_secs(self.settle_secs.unwrap_or(DEFAULT_SETTLE_SECS)),
        }
    }

    /// Assemble unvalidated parameters, reading the token from the
    /// environment through `env`.
    pub fn to_raw(&self, env: impl Fn(&str) -> Option<String>) -> Result<RawParameters> {
        let token_env = self.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
        let auth_token = env(token_env).filter(|t| !t.is_empty()).map(Secret::new);
        if auth_token.is_none() {
            return Err(Error::validation(
                "token",
                format!("environment variable {token_env} is not set"),
            ));
        }

        let ssh_key = require(self.ssh_key.as_ref(), "ssh_key", "--key")?;

        Ok(RawParameters {
            repository_url: require(self.repository.as_ref(), "repository", "--repo")?.clone(),
            auth_token,
            branch: self.branch.clone(),
            ssh_user: require(self.ssh_user.as_ref(), "ssh_user", "--user")?.clone(),
            server_host: require(self.server.as_ref(), "server", "--host")?.clone(),
            ssh_key_path: expand_home(ssh_key, &env),
            app_port: *require(self.port.as_ref(), "port", "--port")?,
            domain_name: require(self.domain.as_ref(), "domain", "--domain")?.clone(),
        })
    }

    /// Inputs for a dry-run render: derived name, port and domain.
    /// Needs no credentials.
    pub fn render_inputs(&self) -> Result<(String, u16, String)> {
        let url = require(self.repository.as_ref(), "repository", "--repo")?;
        let name = repo::derive_name(url)?;

        let port = params::validate_port(*require(self.port.as_ref(), "port", "--port")?)?;
        let domain = params::validate_domain(require(self.domain.as_ref(), "domain", "--domain")?)?;

        Ok((name, port, domain))
    }
}

fn require<'s, T>(value: Option<&'s T>, key: &str, flag: &str) -> Result<&'s T> {
    value.ok_or_else(|| {
        Error::Config(format!(
            "missing required setting '{key}' (pass {flag} or set `{key}:` in the config file)"
        ))
    })
}

/// Expand a leading `~/` using `HOME` from `env`.
fn expand_home(path: &Path, env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    match (path.strip_prefix("~"), env("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v).to_string())
        }
    }

    #[test]
    fn expand_home_only_touches_tilde_prefix() {
        let env = env_with(&[("HOME", "/home/ops")]);

        assert_eq!(
            expand_home(Path::new("~/.ssh/id"), &env),
            PathBuf::from("/home/ops/.ssh/id")
        );
        assert_eq!(expand_home(Path::new("/k/id"), &env), PathBuf::from("/k/id"));
        assert_eq!(expand_home(Path::new("~other/id"), &env), PathBuf::from("~other/id"));
    }

    #[test]
    fn token_comes_from_named_env_var() {
        let settings = Settings {
            repository: Some("https://git.example.com/a/b.git".into()),
            ssh_user: Some("deploy".into()),
            server: Some("203.0.113.10".into()),
            ssh_key: Some("/k/id".into()),
            port: Some(8080),
            domain: Some("example.com".into()),
            token_env: Some("CI_TOKEN".into()),
            ..Settings::default()
        };

        let raw = settings.to_raw(env_with(&[("CI_TOKEN", "abc")])).unwrap();
        assert_eq!(raw.auth_token.unwrap().expose(), "abc");

        let err = settings.to_raw(env_with(&[(DEFAULT_TOKEN_ENV, "abc")])).unwrap_err();
        assert!(err.to_string().contains("CI_TOKEN is not set"));
    }
}

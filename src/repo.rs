use std::path::{Path, PathBuf};

use crate::cmd::{self, Invocation, Runner};
use crate::error::{Error, RepoError, Result};
use crate::params::{ParameterSet, Secret};

/// A synced local working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    pub local_path: PathBuf,
    pub derived_name: String,
}

impl RepositoryHandle {
    #[must_use]
    pub fn dockerfile(&self) -> PathBuf {
        self.local_path.join("Dockerfile")
    }
}

/// Derive the container / image / nginx site name from a repository
/// URL: the last path segment without a `.git` suffix, lower-cased.
///
/// The result only contains `[a-z0-9_.-]` and starts with an
/// alphanumeric, so it is usable as a directory name, Docker container
/// name, image repository and nginx site file name.
///
/// ```
/// use dockside::repo::derive_name;
///
/// assert_eq!(derive_name("https://github.com/acme/MyApp.git")?, "myapp");
/// assert_eq!(derive_name("https://gitlab.com/group/sub/api-server/")?, "api-server");
/// # Ok::<(), dockside::error::Error>(())
/// ```
pub fn derive_name(url: &str) -> Result<String> {
    let trimmed = url.trim_end_matches('/');
    let base = trimmed.rsplit('/').next().unwrap_or_default();
    let name = base.strip_suffix(".git").unwrap_or(base).to_ascii_lowercase();

    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && name.len() <= 128;

    if valid {
        Ok(name)
    } else {
        Err(Error::validation(
            "repository URL",
            format!("cannot derive a container name from '{url}'"),
        ))
    }
}

/// Variable the credential helper reads the token from.
const TOKEN_VAR: &str = "DOCKSIDE_GIT_PASSWORD";

/// Inline credential helper answering `get` with the token as an
/// `oauth2` password. The token itself stays in the environment.
const CREDENTIAL_HELPER: &str =
    "!f() { test \"$1\" = get || return 0; echo username=oauth2; echo \"password=$DOCKSIDE_GIT_PASSWORD\"; }; f";

/// Environment that authenticates git over HTTP with the token,
/// without putting it in argv, the URL or `.git/config`. The empty
/// first helper clears any helpers from the user's git config.
fn auth_env(token: &Secret) -> [(&'static str, String); 7] {
    [
        ("GIT_TERMINAL_PROMPT", "0".to_string()),
        ("GIT_CONFIG_COUNT", "2".to_string()),
        ("GIT_CONFIG_KEY_0", "credential.helper".to_string()),
        ("GIT_CONFIG_VALUE_0", String::new()),
        ("GIT_CONFIG_KEY_1", "credential.helper".to_string()),
        ("GIT_CONFIG_VALUE_1", CREDENTIAL_HELPER.to_string()),
        (TOKEN_VAR, token.expose().to_string()),
    ]
}

/// Clone-or-update of the deployment repository.
pub struct RepositorySync<'a> {
    runner: &'a dyn Runner,
    workdir: PathBuf,
}

impl<'a> RepositorySync<'a> {
    #[must_use]
    pub fn new(runner: &'a dyn Runner, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
        }
    }

    /// Make `workdir/<derived name>` an up-to-date clone of the
    /// repository at the requested branch, and require a `Dockerfile`
    /// at its root.
    pub fn sync(&self, params: &ParameterSet) -> Result<RepositoryHandle> {
        let derived_name = derive_name(params.repository_url())?;
        let local_path = self.workdir.join(&derived_name);

        if local_path.exists() {
            self.update(params, &local_path)?;
        } else {
            self.clone_fresh(params, &local_path)?;
        }

        let handle = RepositoryHandle {
            local_path,
            derived_name,
        };

        if !handle.dockerfile().is_file() {
            return Err(RepoError::MissingDockerfile(handle.local_path.display().to_string()).into());
        }

        Ok(handle)
    }

    fn clone_fresh(&self, params: &ParameterSet, path: &Path) -> Result<()> {
        tracing::info!(
            branch = params.branch(),
            path = %path.display(),
            "cloning repository"
        );

        let inv = self
            .git(params)
            .args(["clone", "--branch", params.branch(), "--single-branch", "--"])
            .arg(params.repository_url())
            .arg(path.display().to_string());

        cmd::run(self.runner, &inv).map_err(|e| map_failed(e, RepoError::Clone))?;
        Ok(())
    }

    fn update(&self, params: &ParameterSet, path: &Path) -> Result<()> {
        if !path.join(".git").exists() {
            return Err(RepoError::NotARepository(path.display().to_string()).into());
        }

        tracing::info!(
            branch = params.branch(),
            path = %path.display(),
            "updating existing clone"
        );

        let dir = path.display().to_string();
        let branch = params.branch();

        // A single-branch clone only tracks the branch it was cloned at,
        // so fetch the requested one explicitly before switching.
        let fetch = self
            .git(params)
            .args(["-C", dir.as_str(), "fetch", "origin", branch]);
        cmd::run(self.runner, &fetch).map_err(|e| map_failed(e, RepoError::Pull))?;

        let local_ref = format!("refs/heads/{branch}");
        let exists = self
            .git(params)
            .args(["-C", dir.as_str(), "rev-parse", "--verify", "--quiet", local_ref.as_str()]);
        let checkout = if self.runner.capture(&exists)?.success() {
            self.git(params)
                .args(["-C", dir.as_str(), "checkout", branch, "--"])
        } else {
            tracing::info!(branch, "switching to a branch not checked out before");
            self.git(params)
                .args(["-C", dir.as_str(), "checkout", "-b", branch, "FETCH_HEAD"])
        };
        cmd::run(self.runner, &checkout).map_err(|e| map_failed(e, RepoError::Pull))?;

        let pull = self
            .git(params)
            .args(["-C", dir.as_str(), "pull", "--ff-only", "origin", branch]);
        cmd::run(self.runner, &pull).map_err(|e| map_failed(e, RepoError::Pull))?;

        Ok(())
    }

    fn git(&self, params: &ParameterSet) -> Invocation {
        auth_env(params.auth_token())
            .into_iter()
            .fold(Invocation::new("git"), |inv, (k, v)| inv.env(k, v))
    }
}

/// Tar stream of the committed tree at `HEAD`, without `.git`.
pub fn archive(runner: &dyn Runner, handle: &RepositoryHandle) -> Result<Vec<u8>> {
    let dir = handle.local_path.display().to_string();
    let inv = Invocation::new("git").args([
        "-C",
        dir.as_str(),
        "archive",
        "--format=tar",
        "HEAD",
    ]);
    Ok(cmd::run_raw(runner, &inv)?.stdout)
}

fn map_failed(err: Error, wrap: fn(String) -> RepoError) -> Error {
    match err {
        Error::CommandFailed { .. } => wrap(err.reason()).into(),
        other => other,
    }
}

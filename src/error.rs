use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error("provisioning failed: {0}")]
    Provision(String),

    #[error("deploy step '{step}' failed: {reason}")]
    Deploy { step: DeployStep, reason: String },

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("command failed ({}): {command}", exit_label(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Short human-readable reason, preferring the stderr of a failed
    /// command over the command line itself.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::CommandFailed { stderr, .. } if !stderr.is_empty() => {
                stderr.lines().last().unwrap_or_default().to_string()
            }
            other => other.to_string(),
        }
    }
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "killed by signal".to_string(), |c| format!("exit {c}"))
}

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("git clone failed: {0}")]
    Clone(String),

    #[error("git pull failed (history is not a fast-forward or conflicts): {0}")]
    Pull(String),

    #[error("{0} exists but is not a git repository")]
    NotARepository(String),

    #[error("no Dockerfile at the root of {0}")]
    MissingDockerfile(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectivityError {
    #[error("SSH authentication rejected by {0}")]
    AuthRejected(String),

    #[error("SSH connection refused by {0}")]
    Refused(String),

    #[error("SSH connection to {0} timed out")]
    TimedOut(String),

    #[error("cannot resolve host {0}")]
    UnknownHost(String),

    #[error("host key verification failed for {0}")]
    HostKeyMismatch(String),

    #[error("SSH to {host} failed: {reason}")]
    Unreachable { host: String, reason: String },
}

/// Named sub-steps of the remote deploy sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployStep {
    Stage,
    UploadSource,
    Transfer,
    RunScript,
    InstallConfig,
    EnableSite,
    TestConfig,
    Reload,
}

impl DeployStep {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::UploadSource => "upload-source",
            Self::Transfer => "transfer",
            Self::RunScript => "run-script",
            Self::InstallConfig => "install-config",
            Self::EnableSite => "enable-site",
            Self::TestConfig => "test-config",
            Self::Reload => "reload",
        }
    }
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

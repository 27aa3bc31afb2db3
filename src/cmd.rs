use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// A single external command: program, argument array, and the
/// environment it runs in. Arguments are passed to the OS verbatim,
/// never through a shell.
#[derive(Clone, Default)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
}

impl Invocation {
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an environment variable. Values are never rendered by
    /// `Display` or `Debug`, so this is the channel for secrets.
    #[must_use]
    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.env.push((key.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn stdin(mut self, data: Vec<u8>) -> Self {
        self.stdin = Some(data);
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Invocation")
            .field("command", &self.to_string())
            .field("cwd", &self.cwd)
            .field("env", &env_keys)
            .field("stdin_bytes", &self.stdin.as_ref().map(Vec::len))
            .finish()
    }
}

/// Exit code and captured streams of a finished command.
#[derive(Debug, Clone, Default)]
pub struct Captured {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl Captured {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    #[must_use]
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// Executes external commands. The pipeline only ever talks to the
/// outside world through this trait.
pub trait Runner {
    fn capture(&self, invocation: &Invocation) -> Result<Captured>;
}

/// Runs commands as child processes of this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct System;

impl Runner for System {
    fn capture(&self, invocation: &Invocation) -> Result<Captured> {
        use std::io::Write;

        tracing::debug!(command = %invocation, "exec");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CommandNotFound(invocation.program.clone())
            } else {
                Error::Io(e)
            }
        })?;

        // Stdin is fed from its own thread so a chatty child cannot stall
        // on a full stdout pipe while we are still writing.
        let output = std::thread::scope(|scope| {
            if let (Some(data), Some(mut pipe)) = (invocation.stdin.as_deref(), child.stdin.take()) {
                scope.spawn(move || {
                    if let Err(e) = pipe.write_all(data) {
                        tracing::debug!(error = %e, "child closed stdin early");
                    }
                });
            }
            child.wait_with_output()
        })?;

        Ok(Captured {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Run a command and return its trimmed stdout. Fails if the command
/// returns a non-zero exit code.
pub fn run(runner: &dyn Runner, invocation: &Invocation) -> Result<String> {
    run_raw(runner, invocation).map(|out| out.stdout_text())
}

/// Like [`run`] but keeps stdout as raw bytes.
pub fn run_raw(runner: &dyn Runner, invocation: &Invocation) -> Result<Captured> {
    let output = runner.capture(invocation)?;
    if output.success() {
        Ok(output)
    } else {
        if !output.stderr.is_empty() {
            tracing::debug!(stderr = %output.stderr, "command failed");
        }
        Err(Error::CommandFailed {
            command: invocation.to_string(),
            code: output.code,
            stderr: output.stderr,
        })
    }
}

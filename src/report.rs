use serde::Serialize;

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    SyncRepository,
    ProbeConnectivity,
    Provision,
    RenderArtifacts,
    Deploy,
    Verify,
}

impl Step {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SyncRepository => "sync-repository",
            Self::ProbeConnectivity => "probe-connectivity",
            Self::Provision => "provision",
            Self::RenderArtifacts => "render-artifacts",
            Self::Deploy => "deploy",
            Self::Verify => "verify",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Warning,
    Failure,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    pub step: Step,
    pub outcome: Outcome,
    pub message: String,
}

/// Step results of one pipeline invocation, in order. Every result is
/// also emitted as a log event when recorded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RunReport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: Step, outcome: Outcome, message: impl Into<String>) {
        let message = message.into();
        let name = step.as_str();
        match outcome {
            Outcome::Success => tracing::info!(step = name, "{message}"),
            Outcome::Skipped => tracing::info!(step = name, "skipped: {message}"),
            Outcome::Warning => tracing::warn!(step = name, "{message}"),
            Outcome::Failure => tracing::error!(step = name, "{message}"),
        }
        self.steps.push(StepResult {
            step,
            outcome,
            message,
        });
    }

    #[must_use]
    pub fn outcome_of(&self, step: Step) -> Option<Outcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| r.outcome)
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        self.steps.iter().any(|r| r.outcome == Outcome::Failure)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

use std::fmt;

/// Lifecycle of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Running,
    /// Cancellation was observed; the job is winding down
    Cancelling,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Cancelling => "cancelling",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State and progress of one export, owned by the orchestrator
///
/// Progress only moves forward and stays within [0, 1]. Illegal transitions are
/// ignored and reported as `false`.
#[derive(Debug, Clone, Default)]
pub struct ExportJob {
    state: JobState,
    progress: f64,
}

impl ExportJob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn start(&mut self) -> bool {
        self.transition(JobState::Idle, JobState::Running)
    }

    /// Record progress; returns the stored value (never lower than before)
    pub fn advance(&mut self, progress: f64) -> f64 {
        if self.state == JobState::Running && progress.is_finite() {
            self.progress = self.progress.max(progress.clamp(0.0, 1.0));
        }
        self.progress
    }

    pub fn begin_cancel(&mut self) -> bool {
        self.transition(JobState::Running, JobState::Cancelling)
    }

    pub fn succeed(&mut self) -> bool {
        if self.transition(JobState::Running, JobState::Succeeded) {
            self.progress = 1.0;
            true
        } else {
            false
        }
    }

    pub fn fail(&mut self) -> bool {
        match self.state {
            JobState::Idle | JobState::Running | JobState::Cancelling => {
                self.state = JobState::Failed;
                true
            }
            JobState::Succeeded | JobState::Failed => false,
        }
    }

    fn transition(&mut self, from: JobState, to: JobState) -> bool {
        if self.state == from {
            self.state = to;
            true
        } else {
            false
        }
    }
}

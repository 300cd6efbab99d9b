use govern_core::{RunContext, Stage, StageError, StageOutput, TelemetrySink};

type StageFn = dyn Fn(&RunContext) -> Result<StageOutput, StageError> + Send + Sync;

/// Stage backed by a closure, for ad-hoc pipelines
pub struct FnStage {
    name: String,
    governs: bool,
    func: Box<StageFn>,
}

impl FnStage {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&RunContext) -> Result<StageOutput, StageError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            governs: true,
            func: Box::new(func),
        }
    }

    /// Mark the stage as not contributing to the governance decision
    pub fn ungoverned(mut self) -> Self {
        self.governs = false;
        self
    }
}

impl std::fmt::Debug for FnStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage")
            .field("name", &self.name)
            .field("governs", &self.governs)
            .finish()
    }
}

impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn governs(&self) -> bool {
        self.governs
    }

    fn run(&self, ctx: &RunContext, _telemetry: &dyn TelemetrySink) -> Result<StageOutput, StageError> {
        (self.func)(ctx)
    }
}

use crate::error::BuildError;
use crate::step::Step;

/// Ordered list of steps run strictly one after another. The first failing
/// step aborts the rest.
#[derive(Debug, Default)]
pub struct CompilationPipeline {
    steps: Vec<Step>,
}

impl CompilationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, step: impl Into<Step>) -> Result<(), BuildError> {
        let step = step.into();
        if !step.is_invocable() {
            return Err(BuildError::NotInvocable(step.description()));
        }

        self.steps.push(step);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.steps.iter().map(Step::description).collect()
    }

    /// Runs every step in insertion order and returns how many ran.
    pub async fn compile(self) -> Result<usize, BuildError> {
        let mut executed = 0;

        for step in self.steps {
            step.invoke().await?;
            executed += 1;
        }

        Ok(executed)
    }
}

use std::fmt;

use crate::error::BuildError;
use crate::executor::CompilationUnit;

pub type Action = Box<dyn FnOnce() -> Result<(), BuildError> + Send + Sync>;

/// A zero-input unit of work in a build: either an external tool run or a
/// plain side effect such as creating a directory.
pub enum Step {
    Unit(CompilationUnit),
    Action { description: String, action: Action },
}

impl Step {
    pub fn action<F>(description: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Result<(), BuildError> + Send + Sync + 'static,
    {
        Step::Action {
            description: description.into(),
            action: Box::new(action),
        }
    }

    pub fn description(&self) -> String {
        match self {
            Step::Unit(unit) => unit.command().join(" "),
            Step::Action { description, .. } => description.clone(),
        }
    }

    pub fn is_invocable(&self) -> bool {
        match self {
            Step::Unit(unit) => unit.is_invocable(),
            Step::Action { .. } => true,
        }
    }

    pub async fn invoke(self) -> Result<(), BuildError> {
        match self {
            Step::Unit(unit) => unit.invoke().await.map(|_| ()),
            Step::Action { action, .. } => action(),
        }
    }
}

impl From<CompilationUnit> for Step {
    fn from(unit: CompilationUnit) -> Self {
        Step::Unit(unit)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Unit(unit) => f.debug_tuple("Unit").field(unit).finish(),
            Step::Action { description, .. } => f
                .debug_struct("Action")
                .field("description", description)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_descriptions() {
        let unit = Step::from(CompilationUnit::new("bibtex", "paper.aux"));
        assert_eq!(unit.description(), "bibtex paper.aux");

        let action = Step::action("create build directory", || Ok(()));
        assert_eq!(action.to_string(), "create build directory");
    }

    #[tokio::test]
    async fn test_action_result_propagates() {
        let step = Step::action("fail", || Err(BuildError::Config("boom".to_string())));
        assert!(step.invoke().await.unwrap_err().is_config());
    }
}

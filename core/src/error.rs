use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    ProcessFailure(String),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("step '{0}' cannot be invoked")]
    NotInvocable(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl BuildError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        BuildError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, BuildError::Config(_))
    }

    pub fn is_process_failure(&self) -> bool {
        matches!(self, BuildError::ProcessFailure(_))
    }
}

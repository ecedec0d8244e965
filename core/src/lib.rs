pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod logger;
pub mod pipeline;
pub mod policy;
pub mod project;
pub mod step;

pub use cli::Cli;
pub use command::{Compiler, CompilerKind, CompilerOptions};
pub use config::Settings;
pub use error::BuildError;
pub use executor::{CompilationUnit, ExecutionResult};
pub use logger::{LogLevel, Logger, LoggerKind};
pub use pipeline::CompilationPipeline;
pub use policy::{ReturnCode, ReturnCodePolicy};
pub use project::Project;
pub use step::Step;

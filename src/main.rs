use anyhow::{Context, Result};
use clap::Parser;
use compiletex_core::{Cli, LogLevel, Project, Settings};

fn print_plan(project: &Project) -> Result<()> {
    let pipeline = project
        .pipeline()
        .context("Failed to assemble build steps")?;

    println!("Build plan for {}:", project.filepath().display());
    for (index, description) in pipeline.descriptions().iter().enumerate() {
        println!("  {}. {}", index + 1, description);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.directory {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to change directory to {}", dir.display()))?;
    }

    let settings = Settings::from_cli(&cli)?;
    let project = Project::from_settings(&settings).context("Failed to resolve project")?;
    let logger = project.logger().clone();

    if cli.dry_run {
        return print_plan(&project);
    }

    if let Err(err) = project.compile().await {
        logger.log(LogLevel::Error, "Build failed!");
        return Err(err).with_context(|| format!("Failed to build {}", project.filepath().display()));
    }

    logger.info("Build completed successfully!");

    Ok(())
}

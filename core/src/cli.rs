use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "compiletex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(
        value_name = "MAINTEX",
        help = "Main TeX document (read from compiletexrc when omitted)"
    )]
    pub maintex: Option<PathBuf>,

    #[arg(
        short = 'C',
        long = "directory",
        value_name = "DIR",
        help = "Run as if started in DIR"
    )]
    pub directory: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "TOML settings file")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "COMPILER", help = "pdflatex, xelatex, lualatex or a path to one")]
    pub latex: Option<String>,

    #[arg(long, value_name = "COMMAND", help = "Bibliography processor")]
    pub bibtex: Option<String>,

    #[arg(
        long,
        value_name = "DIR",
        conflicts_with = "in_place",
        help = "Build directory for generated files"
    )]
    pub builddir: Option<String>,

    #[arg(long, help = "Build next to the main document")]
    pub in_place: bool,

    #[arg(long, value_name = "LOGGER", help = "stdout or null")]
    pub logger: Option<String>,

    #[arg(long, value_name = "SECONDS", help = "Timeout for each tool invocation")]
    pub timeout: Option<u64>,

    #[arg(short, long, help = "Suppress progress output")]
    pub quiet: bool,

    #[arg(long, help = "Print the build steps without running them")]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positional_document() {
        let cli = Cli::parse_from(["compiletex", "paper.tex", "--dry-run"]);
        assert_eq!(cli.maintex, Some(PathBuf::from("paper.tex")));
        assert!(cli.dry_run);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_builddir_conflicts_with_in_place() {
        let result = Cli::try_parse_from(["compiletex", "--builddir", "out", "--in-place"]);
        assert!(result.is_err());
    }
}

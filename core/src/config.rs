use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::command::Compiler;
use crate::error::BuildError;
use crate::logger::LoggerKind;
use crate::Cli;

pub const RC_FILE_NAME: &str = "compiletexrc";

/// Flat option mapping a build is resolved from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub latex: Compiler,
    #[serde(default = "default_bibtex")]
    pub bibtex: String,
    #[serde(default)]
    pub maintex: Option<PathBuf>,
    #[serde(default = "default_logger")]
    pub logger: LoggerKind,
    #[serde(default = "default_builddir")]
    pub builddir: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            latex: Compiler::default(),
            bibtex: default_bibtex(),
            maintex: None,
            logger: default_logger(),
            builddir: default_builddir(),
            timeout: default_timeout(),
        }
    }
}

fn default_bibtex() -> String {
    "bibtex".to_string()
}

fn default_logger() -> LoggerKind {
    LoggerKind::Stdout
}

fn default_builddir() -> Option<String> {
    Some("texbuild".to_string())
}

fn default_timeout() -> u64 {
    5
}

impl Settings {
    /// Resolves settings the way the command line asks for: a positional
    /// document wins outright, otherwise the rc file of the current
    /// directory is read. Option flags are applied last.
    pub fn from_cli(cli: &Cli) -> anyhow::Result<Self> {
        let dir = std::env::current_dir().context("Failed to read current directory")?;
        Self::from_cli_in(cli, &dir)
    }

    pub fn from_cli_in(cli: &Cli, dir: &Path) -> anyhow::Result<Self> {
        let mut settings = if let Some(config) = &cli.config {
            Self::load_from_file(config)?
        } else if cli.maintex.is_some() {
            Self::default()
        } else {
            let rc = dir.join(RC_FILE_NAME);
            if !rc.exists() {
                return Err(BuildError::Config(format!(
                    "no tex file provided and no {} found in {}",
                    RC_FILE_NAME,
                    dir.display()
                ))
                .into());
            }
            Self::load_rc(&rc)?
        };

        settings.apply_cli(cli)?;
        settings.main_document()?;

        Ok(settings)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        settings.maintex = settings
            .maintex
            .map(|maintex| match maintex.to_str() {
                Some(raw) => expand_path(raw),
                None => maintex,
            });

        Ok(settings)
    }

    pub fn load_rc<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

        Self::parse_rc(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    /// Parses `key = value` lines. Unknown keys, blank lines and `#` comments
    /// are skipped.
    pub fn parse_rc(content: &str) -> Result<Self, BuildError> {
        let mut settings = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                settings.set(key.trim(), value.trim())?;
            }
        }

        Ok(settings)
    }

    /// Sets one option by name, returning `false` for an unrecognized key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<bool, BuildError> {
        match key {
            "latex" => self.latex = value.parse()?,
            "bibtex" => self.bibtex = value.to_string(),
            "maintex" => {
                self.maintex = (!value.is_empty()).then(|| expand_path(value));
            }
            "logger" => self.logger = value.parse()?,
            "builddir" => {
                self.builddir = (!value.is_empty()).then(|| value.to_string());
            }
            "timeout" => {
                self.timeout = value.parse().map_err(|_| {
                    BuildError::Config(format!("invalid timeout '{}'", value))
                })?;
            }
            _ => return Ok(false),
        }

        Ok(true)
    }

    fn apply_cli(&mut self, cli: &Cli) -> Result<(), BuildError> {
        if let Some(maintex) = &cli.maintex {
            self.maintex = Some(maintex.clone());
        }
        if let Some(latex) = &cli.latex {
            self.latex = latex.parse()?;
        }
        if let Some(bibtex) = &cli.bibtex {
            self.bibtex = bibtex.clone();
        }
        if let Some(builddir) = &cli.builddir {
            self.builddir = Some(builddir.clone());
        }
        if cli.in_place {
            self.builddir = None;
        }
        if let Some(logger) = &cli.logger {
            self.logger = logger.parse()?;
        }
        if cli.quiet {
            self.logger = LoggerKind::Null;
        }
        if let Some(timeout) = cli.timeout {
            self.timeout = timeout;
        }

        Ok(())
    }

    pub fn main_document(&self) -> Result<&Path, BuildError> {
        match self.maintex.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(BuildError::Config("no tex file provided".to_string())),
        }
    }

    pub fn build_directory(&self) -> Option<PathBuf> {
        self.builddir
            .as_deref()
            .filter(|dir| !dir.is_empty())
            .map(expand_path)
    }
}

pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

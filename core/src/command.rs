use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilerKind {
    PdfLatex,
    XeLatex,
    LuaLatex,
}

impl CompilerKind {
    pub fn all() -> Vec<CompilerKind> {
        vec![
            CompilerKind::PdfLatex,
            CompilerKind::XeLatex,
            CompilerKind::LuaLatex,
        ]
    }

    pub fn command(&self) -> &'static str {
        match self {
            CompilerKind::PdfLatex => "pdflatex",
            CompilerKind::XeLatex => "xelatex",
            CompilerKind::LuaLatex => "lualatex",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "pdflatex" | "pdflatexcompiler" => Some(CompilerKind::PdfLatex),
            "xelatex" | "xelatexcompiler" => Some(CompilerKind::XeLatex),
            "lualatex" | "lualatexcompiler" => Some(CompilerKind::LuaLatex),
            _ => None,
        }
    }
}

impl fmt::Display for CompilerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    pub builddir: Option<PathBuf>,
}

/// Typesetting tool adapter selected by the `latex` setting.
///
/// The setting is either a backend name (`pdflatex`, `xelatex`, `lualatex`)
/// or a path to one of those executables, in which case the path is what gets
/// spawned and the file name picks the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Compiler {
    kind: CompilerKind,
    executable: Option<String>,
}

impl Compiler {
    pub fn new(kind: CompilerKind) -> Self {
        Self {
            kind,
            executable: None,
        }
    }

    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = Some(executable.into());
        self
    }

    pub fn kind(&self) -> CompilerKind {
        self.kind
    }

    pub fn command(&self) -> String {
        self.executable
            .clone()
            .unwrap_or_else(|| self.kind.command().to_string())
    }

    pub fn arguments(&self, options: &CompilerOptions) -> Vec<String> {
        let mut opts = Vec::new();

        if let Some(builddir) = &options.builddir {
            opts.extend(self.alternate_builddir_options(builddir));
        }

        opts
    }

    fn alternate_builddir_options(&self, builddir: &Path) -> Vec<String> {
        let builddir = builddir.display();
        match self.kind {
            CompilerKind::PdfLatex => vec![
                format!("-aux-directory={}", builddir),
                format!("-output-directory={}", builddir),
            ],
            CompilerKind::XeLatex | CompilerKind::LuaLatex => {
                vec![format!("-output-directory={}", builddir)]
            }
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(CompilerKind::PdfLatex)
    }
}

impl FromStr for Compiler {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if let Some(kind) = CompilerKind::from_name(value) {
            return Ok(Self::new(kind));
        }

        let stem = Path::new(value)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();

        match CompilerKind::from_name(stem) {
            Some(kind) => Ok(Self::new(kind).with_executable(value)),
            None => Err(BuildError::Config(format!(
                "unknown latex compiler '{}' (expected one of: pdflatex, xelatex, lualatex)",
                value
            ))),
        }
    }
}

impl TryFrom<String> for Compiler {
    type Error = BuildError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Compiler> for String {
    fn from(compiler: Compiler) -> Self {
        compiler.command()
    }
}

impl fmt::Display for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_names() {
        for kind in CompilerKind::all() {
            let compiler: Compiler = kind.command().parse().unwrap();
            assert_eq!(compiler.kind(), kind);
            assert_eq!(compiler.command(), kind.command());
        }
        assert_eq!(
            "PdfLatexCompiler".parse::<Compiler>().unwrap().kind(),
            CompilerKind::PdfLatex
        );
        assert!("latexmk".parse::<Compiler>().is_err());
    }

    #[test]
    fn test_compiler_from_executable_path() {
        let compiler: Compiler = "/opt/texlive/bin/xelatex".parse().unwrap();
        assert_eq!(compiler.kind(), CompilerKind::XeLatex);
        assert_eq!(compiler.command(), "/opt/texlive/bin/xelatex");
    }

    #[test]
    fn test_no_arguments_without_builddir() {
        let compiler = Compiler::default();
        assert!(compiler.arguments(&CompilerOptions::default()).is_empty());
    }

    #[test]
    fn test_pdflatex_builddir_arguments() {
        let options = CompilerOptions {
            builddir: Some(PathBuf::from("/doc/texbuild")),
        };
        assert_eq!(
            Compiler::default().arguments(&options),
            vec![
                "-aux-directory=/doc/texbuild",
                "-output-directory=/doc/texbuild"
            ]
        );
    }

    #[test]
    fn test_xelatex_builddir_arguments() {
        let options = CompilerOptions {
            builddir: Some(PathBuf::from("/doc/texbuild")),
        };
        assert_eq!(
            Compiler::new(CompilerKind::XeLatex).arguments(&options),
            vec!["-output-directory=/doc/texbuild"]
        );
    }
}

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::command::{Compiler, CompilerOptions};
use crate::config::Settings;
use crate::error::BuildError;
use crate::executor::CompilationUnit;
use crate::logger::Logger;
use crate::pipeline::CompilationPipeline;
use crate::policy::ReturnCodePolicy;
use crate::step::Step;

pub const BIBLIOGRAPHY_EXTENSION: &str = "bib";

/// Number of main-document passes after the bibliography run.
pub const RERUN_PASSES: usize = 2;

/// A resolved document build. Derives the step sequence of one build from
/// the main document, the build directory and the bibliography sources
/// found next to the document.
#[derive(Debug, Clone)]
pub struct Project {
    filepath: PathBuf,
    builddir: PathBuf,
    separate_builddir: bool,
    compiler: Compiler,
    bibtex: String,
    texargs: Vec<String>,
    timeout: Duration,
    logger: Logger,
}

impl Project {
    pub fn new(settings: &Settings, logger: Logger) -> Result<Self, BuildError> {
        let cwd = std::env::current_dir()
            .map_err(|e| BuildError::io("failed to read current directory", e))?;
        Self::resolve(settings, logger, &cwd)
    }

    /// Resolves relative paths in `settings` against `cwd`.
    pub fn resolve(settings: &Settings, logger: Logger, cwd: &Path) -> Result<Self, BuildError> {
        let filepath = absolutize(cwd, settings.main_document()?);
        if filepath.file_name().is_none() {
            return Err(BuildError::Config(format!(
                "'{}' does not name a tex file",
                filepath.display()
            )));
        }

        let configured = settings
            .build_directory()
            .map(|dir| absolutize(cwd, &dir));
        let texargs = settings.latex.arguments(&CompilerOptions {
            builddir: configured.clone(),
        });

        let document_dir = parent_dir(&filepath);
        let (builddir, separate_builddir) = match configured {
            Some(dir) => {
                let separate = dir != document_dir;
                (dir, separate)
            }
            None => (document_dir, false),
        };

        Ok(Self {
            filepath,
            builddir,
            separate_builddir,
            compiler: settings.latex.clone(),
            bibtex: settings.bibtex.clone(),
            texargs,
            timeout: Duration::from_secs(settings.timeout),
            logger,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, BuildError> {
        Self::new(settings, Logger::from_kind(settings.logger))
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// Directory holding the main document.
    pub fn path(&self) -> PathBuf {
        parent_dir(&self.filepath)
    }

    pub fn build_dir(&self) -> &Path {
        &self.builddir
    }

    pub fn has_separate_build_dir(&self) -> bool {
        self.separate_builddir
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn main_texfile(&self) -> String {
        self.filepath
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn reference_auxiliary_filename(&self) -> String {
        Path::new(&self.main_texfile())
            .with_extension("aux")
            .to_string_lossy()
            .into_owned()
    }

    pub fn bibfiles(&self) -> Result<Vec<PathBuf>, BuildError> {
        find_bibfiles(&self.path())
    }

    pub fn has_bibtex(&self) -> Result<bool, BuildError> {
        Ok(!self.bibfiles()?.is_empty())
    }

    pub fn main_file_compilation(&self) -> CompilationUnit {
        let logger = self.logger.clone();
        let filepath = self.filepath.clone();

        CompilationUnit::new(self.compiler.command(), self.filepath.display().to_string())
            .with_args(self.texargs.clone())
            .with_cwd(self.path())
            .with_timeout(self.timeout)
            .with_logger(self.logger.clone())
            .with_pre_hook(move || {
                logger.info(&format!("compiling tex file '{}'", filepath.display()));
            })
    }

    pub fn reference_compilation(&self) -> CompilationUnit {
        let logger = self.logger.clone();
        let auxfile = self.builddir.join(self.reference_auxiliary_filename());

        CompilationUnit::new(self.bibtex.clone(), self.reference_auxiliary_filename())
            .with_cwd(self.builddir.clone())
            .with_timeout(self.timeout)
            .with_logger(self.logger.clone())
            .with_policy(ReturnCodePolicy::new([0], [2]))
            .with_pre_hook(move || {
                logger.info(&format!(
                    "compiling auxiliary reference file '{}'",
                    auxfile.display()
                ));
            })
    }

    fn build_dir_step(&self) -> Step {
        let builddir = self.builddir.clone();
        let logger = self.logger.clone();

        Step::action(
            format!("create build directory '{}'", builddir.display()),
            move || create_build_dir(&builddir, &logger).map(|_| ()),
        )
    }

    fn bibfile_symlinks_step(&self, bibfiles: Vec<PathBuf>) -> Step {
        let builddir = self.builddir.clone();
        let document_dir = self.path();
        let logger = self.logger.clone();

        Step::action(
            format!("link bibliography files into '{}'", builddir.display()),
            move || {
                create_bibfile_symlinks(&bibfiles, &builddir, &document_dir, &logger).map(|_| ())
            },
        )
    }

    pub fn pipeline(&self) -> Result<CompilationPipeline, BuildError> {
        let mut compilation = CompilationPipeline::new();

        if self.separate_builddir {
            compilation.add(self.build_dir_step())?;
        }

        compilation.add(self.main_file_compilation())?;

        let bibfiles = self.bibfiles()?;
        if !bibfiles.is_empty() {
            if self.separate_builddir {
                compilation.add(self.bibfile_symlinks_step(bibfiles))?;
            }
            compilation.add(self.reference_compilation())?;
            for _ in 0..RERUN_PASSES {
                compilation.add(self.main_file_compilation())?;
            }
        }

        Ok(compilation)
    }

    pub async fn compile(&self) -> Result<(), BuildError> {
        self.pipeline()?.compile().await.map(|_| ())
    }
}

/// Creates `dir` unless it already exists. Returns whether it was created.
pub fn create_build_dir(dir: &Path, logger: &Logger) -> Result<bool, BuildError> {
    if dir.exists() {
        return Ok(false);
    }

    logger.info(&format!("creating build directory '{}'", dir.display()));
    std::fs::create_dir(dir).map_err(|e| {
        BuildError::io(
            format!("failed to create build directory '{}'", dir.display()),
            e,
        )
    })?;

    Ok(true)
}

/// Links each bibliography file into `builddir`, leaving existing entries
/// untouched. Does nothing when `builddir` is the document directory.
/// Returns the number of links created.
pub fn create_bibfile_symlinks(
    bibfiles: &[PathBuf],
    builddir: &Path,
    document_dir: &Path,
    logger: &Logger,
) -> Result<usize, BuildError> {
    if builddir == document_dir {
        return Ok(0);
    }

    let mut created = 0;
    for bibfile in bibfiles {
        let Some(name) = bibfile.file_name() else {
            continue;
        };
        let target = builddir.join(name);
        if target.symlink_metadata().is_ok() {
            continue;
        }

        logger.info(&format!(
            "creating symlink from '{}' to '{}'",
            bibfile.display(),
            target.display()
        ));
        symlink(bibfile, &target).map_err(|e| {
            BuildError::io(
                format!("failed to link '{}' to '{}'", bibfile.display(), target.display()),
                e,
            )
        })?;
        created += 1;
    }

    Ok(created)
}

/// Bibliography sources directly inside `dir`, sorted by path.
pub fn find_bibfiles(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| BuildError::io(format!("failed to scan '{}'", dir.display()), e))?;

    let mut bibfiles: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(BIBLIOGRAPHY_EXTENSION)
        })
        .collect();
    bibfiles.sort();

    Ok(bibfiles)
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Joins `path` onto `base` when relative and folds `.` and `..` lexically.
fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CompilerKind;

    fn settings(maintex: &str, builddir: Option<&str>) -> Settings {
        Settings {
            maintex: Some(PathBuf::from(maintex)),
            builddir: builddir.map(str::to_string),
            ..Settings::default()
        }
    }

    #[test]
    fn test_auxiliary_filename() {
        let project =
            Project::resolve(&settings("paper.tex", None), Logger::null(), Path::new("/doc"))
                .unwrap();
        assert_eq!(project.reference_auxiliary_filename(), "paper.aux");
        assert_eq!(project.main_texfile(), "paper.tex");
    }

    #[test]
    fn test_build_dir_defaults_to_document_dir() {
        let project = Project::resolve(
            &settings("./chapters/../paper.tex", None),
            Logger::null(),
            Path::new("/doc"),
        )
        .unwrap();

        assert_eq!(project.filepath(), Path::new("/doc/paper.tex"));
        assert_eq!(project.path(), PathBuf::from("/doc"));
        assert_eq!(project.build_dir(), Path::new("/doc"));
        assert!(!project.has_separate_build_dir());
    }

    #[test]
    fn test_configured_build_dir_is_absolute() {
        let project = Project::resolve(
            &settings("thesis/main.tex", Some("texbuild")),
            Logger::null(),
            Path::new("/work"),
        )
        .unwrap();

        assert_eq!(project.build_dir(), Path::new("/work/texbuild"));
        assert_eq!(project.path(), PathBuf::from("/work/thesis"));
        assert!(project.has_separate_build_dir());

        let unit = project.main_file_compilation();
        assert_eq!(
            unit.command(),
            vec![
                "pdflatex",
                "-aux-directory=/work/texbuild",
                "-output-directory=/work/texbuild",
                "/work/thesis/main.tex",
            ]
        );
        assert_eq!(unit.cwd(), Some(Path::new("/work/thesis")));
        assert_eq!(unit.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_reference_compilation_warns_on_two() {
        let mut settings = settings("paper.tex", Some("out"));
        settings.bibtex = "biber".to_string();
        let project = Project::resolve(&settings, Logger::null(), Path::new("/doc")).unwrap();

        let unit = project.reference_compilation();
        assert_eq!(unit.command(), vec!["biber", "paper.aux"]);
        assert_eq!(unit.cwd(), Some(Path::new("/doc/out")));
        assert_eq!(unit.policy(), &ReturnCodePolicy::new([0], [2]));
    }

    #[test]
    fn test_missing_document_is_config_error() {
        let settings = Settings::default();
        let err = Project::resolve(&settings, Logger::null(), Path::new("/doc")).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_plan_without_bibliography() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("paper.tex"), "").unwrap();

        let project = Project::resolve(&settings("paper.tex", None), Logger::null(), dir.path())
            .unwrap();
        let pipeline = project.pipeline().unwrap();

        assert!(!project.has_bibtex().unwrap());
        assert_eq!(pipeline.len(), 1);
        assert!(pipeline.descriptions()[0].starts_with("pdflatex "));
    }

    #[test]
    fn test_plan_without_bibliography_with_build_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("paper.tex"), "").unwrap();

        let project =
            Project::resolve(&settings("paper.tex", Some("build")), Logger::null(), dir.path())
                .unwrap();
        let descriptions = project.pipeline().unwrap().descriptions();

        assert_eq!(descriptions.len(), 2);
        assert!(descriptions[0].starts_with("create build directory"));
        assert!(descriptions[1].starts_with("pdflatex "));
    }

    #[test]
    fn test_plan_with_bibliography() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("paper.tex"), "").unwrap();
        std::fs::write(dir.path().join("refs.bib"), "").unwrap();

        let mut settings = settings("paper.tex", Some("build"));
        settings.latex = Compiler::new(CompilerKind::LuaLatex);
        let project = Project::resolve(&settings, Logger::null(), dir.path()).unwrap();
        assert!(project.has_bibtex().unwrap());
        let descriptions = project.pipeline().unwrap().descriptions();

        assert_eq!(descriptions.len(), 6);
        assert!(descriptions[0].starts_with("create build directory"));
        assert!(descriptions[1].starts_with("lualatex "));
        assert!(descriptions[2].starts_with("link bibliography files"));
        assert_eq!(descriptions[3], "bibtex paper.aux");
        assert_eq!(descriptions[4], descriptions[1]);
        assert_eq!(descriptions[5], descriptions[1]);
    }

    #[test]
    fn test_plan_with_bibliography_in_place() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("paper.tex"), "").unwrap();
        std::fs::write(dir.path().join("refs.bib"), "").unwrap();

        let project = Project::resolve(&settings("paper.tex", None), Logger::null(), dir.path())
            .unwrap();
        let descriptions = project.pipeline().unwrap().descriptions();

        assert_eq!(descriptions.len(), 4);
        assert_eq!(descriptions[1], "bibtex paper.aux");
    }

    #[test]
    fn test_find_bibfiles() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.bib"), "").unwrap();
        std::fs::write(dir.path().join("a.bib"), "").unwrap();
        std::fs::write(dir.path().join("paper.tex"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested.bib")).unwrap();

        let bibfiles = find_bibfiles(dir.path()).unwrap();
        assert_eq!(
            bibfiles,
            vec![dir.path().join("a.bib"), dir.path().join("b.bib")]
        );
    }

    #[test]
    fn test_create_build_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let builddir = dir.path().join("texbuild");
        let logger = Logger::buffer();

        assert!(create_build_dir(&builddir, &logger).unwrap());
        assert!(!create_build_dir(&builddir, &logger).unwrap());
        assert!(builddir.is_dir());
        assert_eq!(logger.lines().len(), 1);
        assert!(logger.lines()[0].contains("creating build directory"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let builddir = dir.path().join("build");
        std::fs::create_dir(&builddir).unwrap();
        std::fs::write(dir.path().join("a.bib"), "a").unwrap();
        std::fs::write(dir.path().join("b.bib"), "b").unwrap();
        std::fs::write(builddir.join("b.bib"), "local").unwrap();

        let bibfiles = find_bibfiles(dir.path()).unwrap();
        let logger = Logger::buffer();

        let created = create_bibfile_symlinks(&bibfiles, &builddir, dir.path(), &logger).unwrap();
        assert_eq!(created, 1);
        assert!(builddir.join("a.bib").symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(builddir.join("b.bib")).unwrap(), "local");

        let created = create_bibfile_symlinks(&bibfiles, &builddir, dir.path(), &logger).unwrap();
        assert_eq!(created, 0);
        assert_eq!(logger.lines().len(), 1);
    }

    #[test]
    fn test_symlinks_skipped_for_document_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bib"), "a").unwrap();
        let bibfiles = find_bibfiles(dir.path()).unwrap();

        let created =
            create_bibfile_symlinks(&bibfiles, dir.path(), dir.path(), &Logger::null()).unwrap();
        assert_eq!(created, 0);
    }
}

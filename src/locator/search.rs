//! Prioritized model search
//!
//! Search order (first existing, readable file wins):
//! 1. User-configured path
//! 2. `<cwd>/model.h5`
//! 3. `<app root>/model.h5`
//! 4. `<executable dir>/model.h5`
//! 5. `<parent of app root>/model.h5`
//! 6. `<dev source tree>/model.h5` (dev mode only)
//! 7. `<resources dir>/model.h5`

use crate::config::Config;
use crate::locator::picker::{FileFilter, ModelPicker};
use crate::validation::ModelValidator;
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Default model file name
pub const MODEL_FILE_NAME: &str = "model.h5";

/// Where a candidate path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    UserConfigured,
    WorkingDirectory,
    AppRoot,
    ExecutableDir,
    AppRootParent,
    DevSourceTree,
    Resources,
}

impl CandidateSource {
    pub fn label(&self) -> &'static str {
        match self {
            CandidateSource::UserConfigured => "configured path",
            CandidateSource::WorkingDirectory => "working directory",
            CandidateSource::AppRoot => "application root",
            CandidateSource::ExecutableDir => "executable directory",
            CandidateSource::AppRootParent => "parent of application root",
            CandidateSource::DevSourceTree => "development source tree",
            CandidateSource::Resources => "resources directory",
        }
    }
}

/// One location on the search path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub source: CandidateSource,
    pub path: PathBuf,
}

/// Directories the locator searches. Unknown roots are simply skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRoots {
    pub user_path: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub app_root: Option<PathBuf>,
    pub exe_dir: Option<PathBuf>,
    /// Only set in dev mode
    pub dev_root: Option<PathBuf>,
    pub resources_dir: Option<PathBuf>,
}

impl SearchRoots {
    /// Build roots from configuration and the running process
    pub fn from_config(config: &Config) -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));

        let app_root = config
            .paths
            .app_root
            .as_deref()
            .map(Config::expand_path)
            .or_else(|| exe_dir.clone());

        let dev_root = if config.dev_mode {
            Some(
                config
                    .paths
                    .dev_root
                    .as_deref()
                    .map(Config::expand_path)
                    .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR"))),
            )
        } else {
            None
        };

        let resources_dir = config
            .paths
            .resources_dir
            .as_deref()
            .map(Config::expand_path)
            .or_else(|| exe_dir.as_deref().map(platform_resources_dir));

        Self {
            user_path: config.remembered_model(),
            cwd: std::env::current_dir().ok(),
            app_root,
            exe_dir,
            dev_root,
            resources_dir,
        }
    }

    /// Ordered candidate list
    pub fn candidates(&self) -> Vec<Candidate> {
        let in_dir = |dir: &Option<PathBuf>, source| {
            dir.as_ref().map(|d| Candidate {
                source,
                path: d.join(MODEL_FILE_NAME),
            })
        };

        let app_parent = self
            .app_root
            .as_ref()
            .and_then(|root| root.parent().map(Path::to_path_buf));

        [
            self.user_path.clone().map(|path| Candidate {
                source: CandidateSource::UserConfigured,
                path,
            }),
            in_dir(&self.cwd, CandidateSource::WorkingDirectory),
            in_dir(&self.app_root, CandidateSource::AppRoot),
            in_dir(&self.exe_dir, CandidateSource::ExecutableDir),
            in_dir(&app_parent, CandidateSource::AppRootParent),
            in_dir(&self.dev_root, CandidateSource::DevSourceTree),
            in_dir(&self.resources_dir, CandidateSource::Resources),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn platform_resources_dir(exe_dir: &Path) -> PathBuf {
    if cfg!(target_os = "macos") {
        exe_dir.join("..").join("Resources")
    } else {
        exe_dir.join("resources")
    }
}

/// Finds the model file on the search path
#[derive(Debug, Clone)]
pub struct ModelLocator {
    roots: SearchRoots,
    validator: ModelValidator,
}

impl ModelLocator {
    pub fn new(roots: SearchRoots) -> Self {
        Self {
            roots,
            validator: ModelValidator::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(SearchRoots::from_config(config))
    }

    pub fn roots(&self) -> &SearchRoots {
        &self.roots
    }

    /// Ordered search path
    pub fn candidates(&self) -> Vec<Candidate> {
        self.roots.candidates()
    }

    /// Highest-priority existing, readable model file. `None` is a normal
    /// outcome, not an error.
    pub fn locate(&self) -> Option<PathBuf> {
        self.locate_candidate().map(|c| c.path)
    }

    /// Like `locate`, also reporting which location matched
    pub fn locate_candidate(&self) -> Option<Candidate> {
        let found = self.candidates().into_iter().find(|c| is_readable_file(&c.path));
        match &found {
            Some(c) => tracing::info!(path = %c.path.display(), source = c.source.label(), "model located"),
            None => tracing::warn!("no model file found on search path"),
        }
        found
    }

    /// Ask the user to pick a model file.
    ///
    /// A pick that fails validation is only returned if the user confirms.
    pub fn browse(&self, picker: &dyn ModelPicker) -> Option<PathBuf> {
        let filters = [
            FileFilter::new("Keras model", &["h5"]),
            FileFilter::new("All files", &["*"]),
        ];

        let path = picker.pick_file("Select model file", &filters)?;
        let report = self.validator.validate(&path);

        match report.message() {
            None => Some(path),
            Some(problem) => {
                let prompt = format!(
                    "{} failed validation ({}). Use it anyway?",
                    path.display(),
                    problem
                );
                if picker.confirm(&prompt) {
                    tracing::warn!(path = %path.display(), %problem, "using model that failed validation");
                    Some(path)
                } else {
                    None
                }
            }
        }
    }
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

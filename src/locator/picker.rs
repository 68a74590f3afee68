//! File picker seam
//!
//! The desktop shell supplies a native dialog; the terminal host uses a
//! line-editor prompt.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};

/// Named extension filter, e.g. `Keras model (*.h5)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub name: String,
    /// Extensions without the dot; `*` matches anything
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn new(name: &str, extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }

    pub fn matches(&self, path: &Path) -> bool {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.extensions
            .iter()
            .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(&ext))
    }

    fn describe(&self) -> String {
        let patterns: Vec<String> = self.extensions.iter().map(|e| format!("*.{}", e)).collect();
        format!("{} ({})", self.name, patterns.join(", "))
    }
}

/// User-facing file selection
pub trait ModelPicker {
    /// Let the user choose a file; `None` on cancellation
    fn pick_file(&self, title: &str, filters: &[FileFilter]) -> Option<PathBuf>;

    /// Yes/no confirmation
    fn confirm(&self, message: &str) -> bool;
}

/// Terminal implementation backed by rustyline
#[derive(Debug, Default)]
pub struct TerminalPicker;

impl TerminalPicker {
    pub fn new() -> Self {
        Self
    }

    fn read_line(prompt: &str) -> Option<String> {
        let mut editor = DefaultEditor::new().ok()?;
        match editor.readline(prompt) {
            Ok(line) => Some(line.trim().to_string()),
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
            Err(err) => {
                tracing::warn!(%err, "readline failed");
                None
            }
        }
    }
}

impl ModelPicker for TerminalPicker {
    fn pick_file(&self, title: &str, filters: &[FileFilter]) -> Option<PathBuf> {
        println!("{}", title.bold());
        for filter in filters {
            println!("  {}", filter.describe().dimmed());
        }
        println!("  {}", "(empty line cancels)".dimmed());

        loop {
            let line = Self::read_line("path> ")?;
            if line.is_empty() {
                return None;
            }

            let path = crate::config::Config::expand_path(line.trim_matches('"'));
            if !path.is_file() {
                println!("{} {}", "No such file:".red(), path.display());
                continue;
            }
            if !filters.is_empty() && !filters.iter().any(|f| f.matches(&path)) {
                println!("{} {}", "File type not accepted:".red(), path.display());
                continue;
            }
            return Some(path);
        }
    }

    fn confirm(&self, message: &str) -> bool {
        println!("{} {}", "⚠".yellow(), message);
        matches!(
            Self::read_line("[y/N]> ").map(|answer| answer.to_lowercase()).as_deref(),
            Some("y") | Some("yes")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches_extension() {
        let filter = FileFilter::new("Keras model", &["h5"]);
        assert!(filter.matches(Path::new("/models/model.h5")));
        assert!(filter.matches(Path::new("/models/MODEL.H5")));
        assert!(!filter.matches(Path::new("/models/model.json")));
    }

    #[test]
    fn test_wildcard_filter() {
        let filter = FileFilter::new("All files", &["*"]);
        assert!(filter.matches(Path::new("anything.bin")));
        assert!(filter.matches(Path::new("no_extension")));
    }

    #[test]
    fn test_filter_description() {
        let filter = FileFilter::new("Keras model", &["h5"]);
        assert_eq!(filter.describe(), "Keras model (*.h5)");
    }
}

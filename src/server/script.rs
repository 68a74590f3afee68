//! Bundled server script installation
//!
//! Packaged builds ship the server script read-only next to the binary; it
//! is copied to the configured script path on first run. Failure is
//! logged and otherwise ignored.

use std::fs;
use std::path::{Path, PathBuf};

/// Copy `bundled` to `target` unless a copy already exists there.
///
/// Returns the installed path, or `None` if installation failed.
pub fn install_bundled_script(bundled: &Path, target: &Path) -> Option<PathBuf> {
    let target = target.to_path_buf();

    if target.is_file() {
        return Some(target);
    }

    if !bundled.is_file() {
        tracing::warn!(path = %bundled.display(), "bundled server script missing");
        return None;
    }

    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let installed = fs::create_dir_all(parent).and_then(|_| fs::copy(bundled, &target));
    match installed {
        Ok(bytes) => {
            tracing::info!(target_path = %target.display(), bytes, "installed server script");
            Some(target)
        }
        Err(e) => {
            tracing::warn!(error = %e, target_path = %target.display(), "could not install server script");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_copies_once() {
        let dir = TempDir::new().unwrap();
        let bundled = dir.path().join("model_server.py");
        fs::write(&bundled, "print('v1')").unwrap();
        let target = dir.path().join("runtime").join("model_server.py");

        let installed = install_bundled_script(&bundled, &target).unwrap();
        assert_eq!(installed, target);
        assert_eq!(fs::read_to_string(&installed).unwrap(), "print('v1')");

        // Existing copies are left alone
        fs::write(&bundled, "print('v2')").unwrap();
        let again = install_bundled_script(&bundled, &target).unwrap();
        assert_eq!(fs::read_to_string(again).unwrap(), "print('v1')");
    }

    #[test]
    fn test_missing_bundle_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(install_bundled_script(&dir.path().join("absent.py"), &dir.path().join("model_server.py")).is_none());
    }

    #[test]
    fn test_install_uses_target_name() {
        let dir = TempDir::new().unwrap();
        let bundled = dir.path().join("classifier_server_v2.py");
        fs::write(&bundled, "print('serve')").unwrap();
        let target = dir.path().join("runtime").join("model_server.py");

        assert_eq!(install_bundled_script(&bundled, &target), Some(target.clone()));
        assert!(target.is_file());
        assert!(!dir.path().join("runtime").join("classifier_server_v2.py").exists());
    }
}

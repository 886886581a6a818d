//! Discovery and management of the `.gonogo/` directory.
//!
//! The `.gonogo/` directory holds the engine's database, config, and
//! execution journals. This module finds it by walking up the directory
//! tree and creates it when initializing a new project.

use crate::config::ConfigError;
use std::path::{Path, PathBuf};

/// The name of the engine's metadata directory.
const GONOGO_DIR_NAME: &str = ".gonogo";

/// Environment variable that can override the metadata directory.
const GONOGO_DIR_ENV: &str = "GONOGO_DIR";

/// Walk up the directory tree from `start` looking for a `.gonogo/` directory.
///
/// The `GONOGO_DIR` environment variable is checked first (highest priority).
/// Returns `None` if the filesystem root is reached without finding one.
pub fn find_gonogo_dir(start: &Path) -> Option<PathBuf> {
    if let Ok(env_dir) = std::env::var(GONOGO_DIR_ENV) {
        let env_path = PathBuf::from(&env_dir);
        if env_path.is_dir() {
            return Some(env_path);
        }
    }

    let start = match start.canonicalize() {
        Ok(p) => p,
        Err(_) => return None,
    };

    let mut current = start.as_path();
    loop {
        let candidate = current.join(GONOGO_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) if parent != current => {
                current = parent;
            }
            _ => break, // Reached filesystem root.
        }
    }

    None
}

/// Like [`find_gonogo_dir`], converting `None` into
/// [`ConfigError::GonogoDirNotFound`].
pub fn find_gonogo_dir_or_error(start: &Path) -> Result<PathBuf, ConfigError> {
    find_gonogo_dir(start).ok_or(ConfigError::GonogoDirNotFound)
}

/// Ensure a `.gonogo/` directory exists at the given path.
///
/// If `path` itself is not called `.gonogo`, a `.gonogo/` subdirectory is
/// created under it. Returns the path to the `.gonogo/` directory.
pub fn ensure_gonogo_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let gonogo_dir = if path.ends_with(GONOGO_DIR_NAME) {
        path.to_path_buf()
    } else {
        path.join(GONOGO_DIR_NAME)
    };

    std::fs::create_dir_all(&gonogo_dir)?;
    Ok(gonogo_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_in_temp() {
        let dir = tempfile::tempdir().unwrap();
        let gonogo = dir.path().join(".gonogo");
        std::fs::create_dir(&gonogo).unwrap();

        let found = find_gonogo_dir(dir.path()).unwrap();
        assert_eq!(
            found.canonicalize().unwrap(),
            gonogo.canonicalize().unwrap()
        );
    }

    #[test]
    fn find_from_nested_child() {
        let dir = tempfile::tempdir().unwrap();
        let gonogo = dir.path().join(".gonogo");
        std::fs::create_dir(&gonogo).unwrap();

        let child = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&child).unwrap();

        let found = find_gonogo_dir(&child).unwrap();
        assert_eq!(
            found.canonicalize().unwrap(),
            gonogo.canonicalize().unwrap()
        );
    }

    #[test]
    fn ensure_creates_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = ensure_gonogo_dir(dir.path()).unwrap();
        assert!(first.is_dir());
        assert!(first.ends_with(".gonogo"));
        let second = ensure_gonogo_dir(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn ensure_accepts_already_named_path() {
        let dir = tempfile::tempdir().unwrap();
        let gonogo = dir.path().join(".gonogo");
        let result = ensure_gonogo_dir(&gonogo).unwrap();
        assert_eq!(result, gonogo);
    }
}

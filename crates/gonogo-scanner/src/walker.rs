//! Test-file enumeration: walkdir + include/exclude glob sets.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;
use walkdir::WalkDir;

use gonogo_config::ScannerConfig;

use crate::{Result, ScanError};

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| ScanError::BadGlob {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| ScanError::BadGlob {
        pattern: patterns.join(","),
        reason: e.to_string(),
    })
}

/// Enumerates candidate test files under `root`, returning paths relative
/// to it (forward slashes). Files must match an include glob and no
/// exclude glob. Unreadable directories are skipped, not fatal.
pub fn collect_test_files(root: &Path, config: &ScannerConfig) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(ScanError::RootMissing(root.display().to_string()));
    }

    let include = build_globset(&config.include)?;
    let exclude = build_globset(&config.exclude)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match entry.path().strip_prefix(root) {
            Ok(r) => r.to_path_buf(),
            Err(_) => continue,
        };
        if exclude.is_match(&rel) {
            continue;
        }
        if include.is_match(&rel) {
            files.push(rel);
        }
    }

    files.sort();
    Ok(files)
}

/// Normalizes a relative path to the forward-slash form used in test IDs.
pub fn normalize_rel_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn collects_matching_files_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "tests/test_auth.py");
        touch(dir.path(), "tests/helpers.py");
        touch(dir.path(), "src/checkout_test.py");
        touch(dir.path(), "README.md");

        let files = collect_test_files(dir.path(), &ScannerConfig::default()).unwrap();
        let names: Vec<String> = files.iter().map(|p| normalize_rel_path(p)).collect();
        assert_eq!(names, vec!["src/checkout_test.py", "tests/test_auth.py"]);
    }

    #[test]
    fn exclude_globs_win() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "tests/test_auth.py");
        touch(dir.path(), ".venv/lib/test_vendored.py");

        let files = collect_test_files(dir.path(), &ScannerConfig::default()).unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("nope");
        let err = collect_test_files(&gone, &ScannerConfig::default()).unwrap_err();
        assert!(matches!(err, ScanError::RootMissing(_)));
    }

    #[test]
    fn bad_glob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ScannerConfig {
            include: vec!["[".into()],
            exclude: vec![],
        };
        let err = collect_test_files(dir.path(), &config).unwrap_err();
        assert!(matches!(err, ScanError::BadGlob { .. }));
    }
}

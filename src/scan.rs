//! Walks a checkout and aggregates classifier counts.

use std::path::Path;

use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

use crate::classify::classify;
use crate::error::ScanError;
use crate::models::{ScanResult, SkippedFile};

pub const DEFAULT_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &["node_modules", ".git"];

/// Which files a scan reads.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Extensions (without the dot) whose files are classified.
    pub extensions: Vec<String>,
    /// Directory names that are pruned without descending.
    pub excluded_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|dir| dir.to_string()).collect(),
        }
    }
}

impl ScanConfig {
    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.excluded_dirs.iter().any(|dir| dir == name))
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|allowed| allowed == ext))
    }
}

/// Classify every matching file under `root`. One unreadable entry fails the
/// whole scan.
pub fn scan(root: &Path, config: &ScanConfig) -> Result<ScanResult, ScanError> {
    std::fs::read_dir(root).map_err(|source| ScanError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    let mut result = ScanResult::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !config.is_excluded_dir(entry));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() || !config.matches_extension(entry.path()) {
            continue;
        }
        // Links are read through; a link to a directory is neither walked nor read.
        if entry.path_is_symlink() {
            let target = std::fs::metadata(entry.path()).map_err(|source| ScanError::Io {
                path: entry.path().to_path_buf(),
                source,
            })?;
            if !target.is_file() {
                continue;
            }
        }

        let bytes = std::fs::read(entry.path()).map_err(|source| ScanError::Io {
            path: entry.path().to_path_buf(),
            source,
        })?;
        let counts = classify(&String::from_utf8_lossy(&bytes));
        trace!(
            path = %entry.path().display(),
            tests = counts.test_count,
            skips = counts.skip_count,
            "classified file"
        );

        result.files_scanned += 1;
        result.total_tests += counts.test_count;
        result.skipped_count += counts.skip_count;

        if counts.skip_count > 0 {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            result.skipped_files.push(SkippedFile {
                relative_path: relative.to_string_lossy().into_owned(),
                skip_count: counts.skip_count,
            });
        }
    }

    result.skipped_files.sort_by(|a, b| {
        b.skip_count
            .cmp(&a.skip_count)
            .then_with(|| a.relative_path.cmp(&b.relative_path))
    });

    debug!(
        root = %root.display(),
        files = result.files_scanned,
        tests = result.total_tests,
        skipped = result.skipped_count,
        "scan complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, contents: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn aggregates_counts_across_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.spec.ts", "describe('a', () => { it('x', f); it.skip('y', f); });");
        write(dir.path(), "src/nested/b.test.jsx", "test('b', f); test.flaky('c', f); it.skip('d', f);");
        write(dir.path(), "c.js", "it('plain', f);");

        let result = scan(dir.path(), &ScanConfig::default()).unwrap();

        assert_eq!(result.files_scanned, 3);
        assert_eq!(result.total_tests, 4);
        assert_eq!(result.skipped_count, 3);
        assert_eq!(result.skipped_files.len(), 2);
        assert_eq!(result.skipped_files[0].skip_count, 2);
        assert!(result.skipped_files[0].relative_path.ends_with("b.test.jsx"));
        assert_eq!(result.skipped_files[1].skip_count, 1);
    }

    #[test]
    fn never_counts_dependency_or_vcs_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "node_modules/lib/index.js", "it.skip('dep', f); it('dep', f);");
        write(dir.path(), "packages/app/node_modules/x.ts", "it.skip('dep', f);");
        write(dir.path(), ".git/hooks/pre-commit.js", "test.flaky('hook', f);");
        write(dir.path(), "app.ts", "it('own', f);");

        let result = scan(dir.path(), &ScanConfig::default()).unwrap();

        assert_eq!(result.files_scanned, 1);
        assert_eq!(result.total_tests, 1);
        assert_eq!(result.skipped_count, 0);
        assert!(result.skipped_files.is_empty());
    }

    #[test]
    fn skips_files_with_other_extensions() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "README.md", "it.skip('docs', f);");
        write(dir.path(), "spec.mjs", "it.skip('module', f);");
        write(dir.path(), "spec.tsx", "it('component', f);");

        let result = scan(dir.path(), &ScanConfig::default()).unwrap();

        assert_eq!(result.files_scanned, 1);
        assert_eq!(result.skipped_count, 0);
    }

    #[test]
    fn honours_custom_configuration() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "vendor/x.py", "test('vendored')");
        write(dir.path(), "node_modules/y.py", "test.skip('now included')");

        let config = ScanConfig {
            extensions: vec!["py".to_string()],
            excluded_dirs: vec!["vendor".to_string()],
        };
        let result = scan(dir.path(), &config).unwrap();

        assert_eq!(result.files_scanned, 1);
        assert_eq!(result.skipped_count, 1);
    }

    #[test]
    fn tolerates_invalid_utf8() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bin.js"), b"\xff\xfe it.skip('x', f);").unwrap();

        let result = scan(dir.path(), &ScanConfig::default()).unwrap();
        assert_eq!(result.skipped_count, 1);
    }

    #[cfg(unix)]
    #[test]
    fn counts_symlinked_source_files() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "real.txt", "it.skip('x', f);");
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.js")).unwrap();

        let result = scan(dir.path(), &ScanConfig::default()).unwrap();

        assert_eq!(result.files_scanned, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.skipped_files[0].relative_path, "link.js");
    }

    #[cfg(unix)]
    #[test]
    fn does_not_descend_into_symlinked_directories() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        write(outside.path(), "lib/outside.test.js", "it.skip('elsewhere', f);");
        write(dir.path(), "own.test.js", "it('own', f);");
        std::os::unix::fs::symlink(outside.path().join("lib"), dir.path().join("lib")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("lib"), dir.path().join("dir.js")).unwrap();

        let result = scan(dir.path(), &ScanConfig::default()).unwrap();

        assert_eq!(result.files_scanned, 1);
        assert_eq!(result.skipped_count, 0);
    }

    #[cfg(unix)]
    #[test]
    fn dangling_source_link_fails_the_scan() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.js"), dir.path().join("broken.js")).unwrap();

        let err = scan(dir.path(), &ScanConfig::default()).unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }

    #[test]
    fn missing_root_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = scan(&dir.path().join("gone"), &ScanConfig::default()).unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }
}

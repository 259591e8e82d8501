use moss_core::{Error, FileReader};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct FsReader {}

impl FileReader for FsReader {
    fn read(&self, path: &str) -> Result<String, Error> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(content),
            Err(err) => Err(format!("failed to read file {}: {}", path, err).into()),
        }
    }
}

/// Collect every Moss source file under `root`, sorted so re-indexing is
/// deterministic.
pub fn walk_workspace(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map_or(false, |ext| ext == "moss"))
        .collect()
}

/// Whether `path` is excluded from all update events.
///
/// Absolute patterns anchor at the workspace root (`/vendor` matches
/// `<root>/vendor/...` but not `<root>/lib/vendor/...`); relative patterns
/// match any path component (`test` matches `<root>/lib/test/a.moss`).
/// Matches respect component boundaries in both cases.
pub fn is_file_ignored(
    root_path: &str,
    path: &str,
    absolute_ignore: &[String],
    relative_ignore: &[String],
) -> bool {
    let relative = match path.strip_prefix(root_path) {
        Some(rest) => rest,
        None => return false,
    };
    // Normalized to always carry a leading slash
    let relative = if relative.starts_with('/') {
        relative.to_string()
    } else {
        format!("/{relative}")
    };

    for pattern in absolute_ignore {
        if at_component_boundary(&relative, pattern, 0) {
            return true;
        }
    }

    for pattern in relative_ignore {
        let anchored = format!("/{pattern}");
        let mut search = 0;
        while let Some(found) = relative[search..].find(&anchored) {
            let start = search + found;
            if at_component_boundary(&relative, &anchored, start) {
                return true;
            }
            search = start + 1;
        }
    }

    false
}

fn at_component_boundary(haystack: &str, pattern: &str, start: usize) -> bool {
    if !haystack[start..].starts_with(pattern) {
        return false;
    }
    match haystack.as_bytes().get(start + pattern.len()) {
        None => true,
        Some(b'/') => true,
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn absolute_patterns_anchor_at_the_root() {
        let abs = vec!["/vendor".to_string()];
        assert!(is_file_ignored("/w", "/w/vendor/a.moss", &abs, &[]));
        assert!(!is_file_ignored("/w", "/w/lib/vendor/a.moss", &abs, &[]));
        assert!(!is_file_ignored("/w", "/w/vendored/a.moss", &abs, &[]));
    }

    #[test]
    fn relative_patterns_match_any_component() {
        let rel = vec!["test".to_string()];
        assert!(is_file_ignored("/w", "/w/lib/test/a.moss", &[], &rel));
        assert!(is_file_ignored("/w", "/w/test/a.moss", &[], &rel));
        assert!(!is_file_ignored("/w", "/w/lib/tested/a.moss", &[], &rel));
    }

    #[test]
    fn out_of_root_paths_are_not_ignored_here() {
        assert!(!is_file_ignored(
            "/w",
            "/elsewhere/test/a.moss",
            &[],
            &["test".to_string()]
        ));
    }

    #[test]
    fn walk_finds_only_moss_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("b.moss"), "x = 1\n").unwrap();
        fs::write(dir.path().join("a.moss"), "y = 2\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();
        fs::write(dir.path().join("sub/c.moss"), "z = 3\n").unwrap();

        let found: Vec<String> = walk_workspace(dir.path())
            .into_iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        assert_eq!(found, vec!["a.moss", "b.moss", "sub/c.moss"]);
    }
}

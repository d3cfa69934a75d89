//! Scan-root resolution: absolute, lexically cleaned, de-duplicated,
//! existence-checked.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum RootError {
    #[error("path '{0}' does not exist")]
    NotFound(String),

    #[error("stat failed for '{input}': {source}")]
    Stat {
        input: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to determine working directory: {0}")]
    WorkingDirectory(#[source] std::io::Error),

    #[error("no valid paths")]
    Empty,
}

/// One top-level path argument, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRoot {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Resolve CLI path arguments against the process working directory.
/// No arguments means `.`.
pub fn resolve_roots<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<ScanRoot>, RootError> {
    let cwd = std::env::current_dir().map_err(RootError::WorkingDirectory)?;
    resolve_roots_in(&cwd, inputs)
}

/// Resolve path arguments against `base`.
pub fn resolve_roots_in<S: AsRef<str>>(base: &Path, inputs: &[S]) -> Result<Vec<ScanRoot>, RootError> {
    let inputs: Vec<&str> = if inputs.is_empty() {
        vec!["."]
    } else {
        inputs.iter().map(AsRef::as_ref).collect()
    };

    let mut seen = HashSet::new();
    let mut roots = Vec::new();
    for input in inputs {
        let path = clean(&base.join(input));
        if seen.contains(&path) {
            continue;
        }
        let metadata = std::fs::metadata(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                RootError::NotFound(input.to_string())
            } else {
                RootError::Stat {
                    input: input.to_string(),
                    source,
                }
            }
        })?;
        seen.insert(path.clone());
        roots.push(ScanRoot {
            path,
            is_dir: metadata.is_dir(),
        });
    }

    if roots.is_empty() {
        return Err(RootError::Empty);
    }
    Ok(roots)
}

/// Lexically normalize a path: drop `.`, resolve `..` against preceding
/// components. Symlinks are not consulted.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` above the root is the root
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_clean() {
        assert_eq!(clean(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean(Path::new("/a/b/")), PathBuf::from("/a/b"));
        assert_eq!(clean(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn test_resolve_dedups_and_classifies() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();

        let roots = resolve_roots_in(dir.path(), &["src", "./src", "a.txt", "src/../src"]).unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].path, dir.path().join("src"));
        assert!(roots[0].is_dir);
        assert_eq!(roots[1].path, dir.path().join("a.txt"));
        assert!(!roots[1].is_dir);
    }

    #[test]
    fn test_missing_path_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_roots_in(dir.path(), &["nope"]).unwrap_err();
        assert_eq!(err.to_string(), "path 'nope' does not exist");
    }

    #[test]
    fn test_no_inputs_means_current_directory() {
        let dir = tempfile::tempdir().unwrap();
        let empty: [&str; 0] = [];
        let roots = resolve_roots_in(dir.path(), &empty).unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].path, dir.path());
    }
}

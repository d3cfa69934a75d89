//! On-disk fixture trees.
//!
//! [`FixtureTree`] owns a temporary directory that is deleted when the value
//! is dropped. Paths passed to its builders are relative to the tree root and
//! use `/` separators; parent directories are created as needed.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tempfile::TempDir;

/// A 1x1 grayscale PNG, base64-encoded.
pub const PNG_1X1: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR4nGNgYAAAAAMAASsJTYQAAAAASUVORK5CYII=";

/// Decoded bytes of [`PNG_1X1`].
pub fn png_bytes() -> Vec<u8> {
    STANDARD
        .decode(PNG_1X1)
        .expect("PNG fixture is valid base64")
}

pub struct FixtureTree {
    dir: TempDir,
}

impl FixtureTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Root of the tree.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of `rel` inside the tree.
    pub fn join(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write a file with the given contents.
    pub fn file(&self, rel: &str, contents: impl AsRef<[u8]>) -> &Self {
        let path = self.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create fixture parent");
        }
        fs::write(&path, contents).expect("failed to write fixture file");
        self
    }

    /// Create an (empty) directory.
    pub fn dir(&self, rel: &str) -> &Self {
        fs::create_dir_all(self.join(rel)).expect("failed to create fixture dir");
        self
    }

    /// Write the 1x1 PNG fixture.
    pub fn png(&self, rel: &str) -> &Self {
        self.file(rel, png_bytes())
    }

    /// Write a file of `len` bytes of repeating ASCII text.
    pub fn sized_text(&self, rel: &str, len: usize) -> &Self {
        let body: Vec<u8> = b"abcdefghij".iter().copied().cycle().take(len).collect();
        self.file(rel, body)
    }
}

impl Default for FixtureTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_create_files() {
        let tree = FixtureTree::new();
        tree.file("a/b/c.txt", "hi").dir("empty").png("img/x.png").sized_text("big.txt", 25);
        assert_eq!(fs::read_to_string(tree.join("a/b/c.txt")).unwrap(), "hi");
        assert!(tree.join("empty").is_dir());
        assert_eq!(&fs::read(tree.join("img/x.png")).unwrap()[..4], b"\x89PNG");
        assert_eq!(fs::metadata(tree.join("big.txt")).unwrap().len(), 25);
    }
}

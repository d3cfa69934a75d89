//! Builds the ignore layers for a scan root.

use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use super::{
    GITIGNORE_FILE, IGNORE_FILE, IgnoreError, IgnoreLayers, IgnoreRuleSet, RuleSetBuilder,
    check_pattern, parse_ignore_text,
};

/// Pattern added unless the git directory is explicitly included.
const GIT_DIR_PATTERN: &str = ".git/";

/// Which ignore sources are active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreOptions {
    /// Read `.ignore` files.
    pub use_ignore_file: bool,
    /// Read `.gitignore` files.
    pub use_gitignore: bool,
    /// List `.git/` directories instead of excluding them.
    pub include_git: bool,
    /// CLI exclusions, applied at the scan root's top level only.
    pub exclusions: Vec<String>,
}

impl Default for IgnoreOptions {
    fn default() -> Self {
        Self {
            use_ignore_file: true,
            use_gitignore: true,
            include_git: false,
            exclusions: Vec::new(),
        }
    }
}

/// Resolves ignore rules for scan roots and for nested directories.
#[derive(Debug, Clone)]
pub struct IgnoreResolver {
    options: IgnoreOptions,
    /// CLI exclusions anchored to the scan root.
    exclusions: Vec<String>,
}

impl IgnoreResolver {
    /// Check the CLI exclusions up front so bad globs fail before traversal.
    pub fn new(options: IgnoreOptions) -> Result<Self, IgnoreError> {
        let mut exclusions = Vec::with_capacity(options.exclusions.len());
        for name in &options.exclusions {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let line = if name.starts_with('/') {
                name.to_string()
            } else {
                format!("/{name}")
            };
            check_pattern(&line)?;
            exclusions.push(line);
        }
        Ok(Self {
            options,
            exclusions,
        })
    }

    pub fn options(&self) -> &IgnoreOptions {
        &self.options
    }

    /// Whether any ignore file is read at all.
    pub fn reads_ignore_files(&self) -> bool {
        self.options.use_ignore_file || self.options.use_gitignore
    }

    /// Layers for the directory root `root` (absolute, cleaned).
    ///
    /// Precedence, lowest first: ancestor files farthest-first, root files,
    /// then whatever the walk stacks on top. CLI exclusions and `.git/`
    /// apply regardless of any ignore file.
    pub fn resolve(&self, root: &Path) -> Result<IgnoreLayers, IgnoreError> {
        let mut files = Vec::new();
        let ancestors: Vec<&Path> = root.ancestors().skip(1).collect();
        for ancestor in ancestors.into_iter().rev() {
            if let Some(rules) = self.load_dir(ancestor)? {
                debug!(
                    ancestor = %ancestor.display(),
                    exclude = rules.exclude_patterns().len(),
                    "applying ancestor ignore rules"
                );
                files.push(rules);
            }
        }
        if let Some(rules) = self.load_dir(root)? {
            files.push(rules);
        }

        let mut forced = RuleSetBuilder::new(root);
        for line in &self.exclusions {
            forced.add_exclude(line.as_str());
        }
        if !self.options.include_git {
            forced.add_exclude(GIT_DIR_PATTERN);
        }
        let forced = forced.build()?;

        debug!(
            root = %root.display(),
            files = files.len(),
            forced = forced.exclude_patterns().len(),
            "resolved ignore rules"
        );
        Ok(IgnoreLayers::new(root, forced, files))
    }

    /// Rules declared by ignore files directly inside `dir`, for layering
    /// during the walk. `None` when the directory declares nothing.
    pub fn load_nested(&self, dir: &Path) -> Result<Option<IgnoreRuleSet>, IgnoreError> {
        self.load_dir(dir)
    }

    /// `.gitignore` lines first so `.ignore` lines take precedence.
    fn load_dir(&self, dir: &Path) -> Result<Option<IgnoreRuleSet>, IgnoreError> {
        let mut builder = RuleSetBuilder::new(dir);
        let mut found = false;
        if self.options.use_gitignore
            && let Some(text) = read_ignore_file(&dir.join(GITIGNORE_FILE))?
        {
            builder.extend(parse_ignore_text(&text, false));
            found = true;
        }
        if self.options.use_ignore_file
            && let Some(text) = read_ignore_file(&dir.join(IGNORE_FILE))?
        {
            builder.extend(parse_ignore_text(&text, true));
            found = true;
        }
        if !found {
            return Ok(None);
        }
        let rules = builder.build()?;
        Ok((!rules.is_empty()).then_some(rules))
    }
}

/// Read an ignore file; a missing file is not an error.
fn read_ignore_file(path: &Path) -> Result<Option<String>, IgnoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(IgnoreError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

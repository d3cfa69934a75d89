//! Layered ignore rules.
//!
//! Patterns follow gitignore semantics through [`ignore::gitignore`]: the
//! last matching line of a file wins, `!` re-includes, a leading or inner
//! `/` anchors to the declaring directory and `**` spans directories. The
//! only extension is the reveal set of `.ignore` files.
//!
//! An [`IgnoreRuleSet`] holds the rules one directory declares. The
//! [`IgnoreResolver`] builds the scan root's [`IgnoreLayers`] (ancestor
//! files, root files, CLI exclusions, `.git/`) and the traversal engine
//! stacks nested rule sets on top while it walks.

mod resolver;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ::ignore::Match;
use ::ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::warn;

pub use resolver::{IgnoreOptions, IgnoreResolver};

/// Name of the tool-specific ignore file.
pub const IGNORE_FILE: &str = ".ignore";
/// Name of the git ignore file.
pub const GITIGNORE_FILE: &str = ".gitignore";
/// Section header that switches an `.ignore` file into reveal mode.
pub const BINARY_SECTION: &str = "[binary]";
/// Per-line reveal directive.
pub const SHOW_BINARY_DIRECTIVE: &str = "show-binary-content:";

/// Errors from loading or compiling ignore rules.
#[derive(Debug, thiserror::Error)]
pub enum IgnoreError {
    #[error("invalid ignore pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: ::ignore::Error,
    },

    #[error("failed to compile ignore rules for {}: {source}", base.display())]
    Compile {
        base: PathBuf,
        #[source]
        source: ::ignore::Error,
    },

    #[error("failed to read ignore file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whether `name` is one of the ignore files, which are never listed.
pub fn is_service_file(name: &str) -> bool {
    name == IGNORE_FILE || name == GITIGNORE_FILE
}

/// Reject a line gitignore cannot compile.
pub fn check_pattern(line: &str) -> Result<(), IgnoreError> {
    GitignoreBuilder::new("")
        .add_line(None, line)
        .map(|_| ())
        .map_err(|source| IgnoreError::Pattern {
            pattern: line.to_string(),
            source,
        })
}

// ── Parsing ─────────────────────────────────────────────────────────────

/// Lines of one ignore file, split into exclusion and reveal lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedIgnoreFile {
    pub exclude: Vec<String>,
    pub reveal: Vec<String>,
}

/// Split the text of an ignore file into exclusion and reveal lines.
///
/// When `allow_reveal` is set (`.ignore` files), a `[binary]` line switches
/// all following lines into the reveal set and `show-binary-content:`
/// adds a single reveal line.
pub fn parse_ignore_text(text: &str, allow_reveal: bool) -> ParsedIgnoreFile {
    let mut parsed = ParsedIgnoreFile::default();
    let mut in_binary_section = false;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if allow_reveal && trimmed == BINARY_SECTION {
            in_binary_section = true;
            continue;
        }
        let (pattern, reveal) = match trimmed.strip_prefix(SHOW_BINARY_DIRECTIVE) {
            Some(rest) if allow_reveal => (rest.trim(), true),
            _ => (trimmed, in_binary_section),
        };
        if pattern.is_empty() {
            continue;
        }
        if reveal {
            parsed.reveal.push(pattern.to_string());
        } else {
            parsed.exclude.push(pattern.to_string());
        }
    }
    parsed
}

// ── Rule sets ───────────────────────────────────────────────────────────

/// Compiled exclusion and reveal rules declared in one directory.
#[derive(Debug, Clone)]
pub struct IgnoreRuleSet {
    exclude: Gitignore,
    reveal: Gitignore,
    exclude_sources: Vec<String>,
    reveal_sources: Vec<String>,
}

impl IgnoreRuleSet {
    /// Directory the rules are anchored to.
    pub fn base(&self) -> &Path {
        self.exclude.path()
    }

    /// Exclusion lines in order, duplicates reported once.
    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_sources
    }

    /// Reveal lines in order, duplicates reported once.
    pub fn reveal_patterns(&self) -> &[String] {
        &self.reveal_sources
    }

    pub fn is_empty(&self) -> bool {
        self.exclude_sources.is_empty() && self.reveal_sources.is_empty()
    }

    /// Whether `path` (absolute, under [`base`](Self::base)) is excluded by
    /// these rules alone.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        matched_within(&self.exclude, self.base(), path, is_dir).is_ignore()
    }

    /// Whether a binary at `path` is revealed by these rules alone.
    pub fn is_revealed(&self, path: &Path, is_dir: bool) -> bool {
        matched_within(&self.reveal, self.base(), path, is_dir).is_ignore()
    }
}

/// Collects lines for one directory and compiles them.
#[derive(Debug, Clone)]
pub struct RuleSetBuilder {
    base: PathBuf,
    exclude: Vec<String>,
    reveal: Vec<String>,
}

impl RuleSetBuilder {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            exclude: Vec::new(),
            reveal: Vec::new(),
        }
    }

    pub fn add_exclude(&mut self, line: impl Into<String>) -> &mut Self {
        self.exclude.push(line.into());
        self
    }

    pub fn add_reveal(&mut self, line: impl Into<String>) -> &mut Self {
        self.reveal.push(line.into());
        self
    }

    /// Append a parsed ignore file; its lines take precedence over earlier ones.
    pub fn extend(&mut self, parsed: ParsedIgnoreFile) -> &mut Self {
        self.exclude.extend(parsed.exclude);
        self.reveal.extend(parsed.reveal);
        self
    }

    /// Compile the collected lines. Lines that are not valid globs are
    /// logged and skipped.
    pub fn build(self) -> Result<IgnoreRuleSet, IgnoreError> {
        let (exclude, exclude_sources) = compile(&self.base, self.exclude)?;
        let (reveal, reveal_sources) = compile(&self.base, self.reveal)?;
        Ok(IgnoreRuleSet {
            exclude,
            reveal,
            exclude_sources,
            reveal_sources,
        })
    }
}

fn compile(base: &Path, lines: Vec<String>) -> Result<(Gitignore, Vec<String>), IgnoreError> {
    let mut builder = GitignoreBuilder::new(base);
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for line in lines {
        if let Err(e) = builder.add_line(None, &line) {
            warn!(pattern = %line, error = %e, "skipping ignore pattern");
            continue;
        }
        if seen.insert(line.clone()) {
            sources.push(line);
        }
    }
    let gitignore = builder.build().map_err(|source| IgnoreError::Compile {
        base: base.to_path_buf(),
        source,
    })?;
    Ok((gitignore, sources))
}

/// Match `path` and its parents strictly below `scope`.
///
/// Rules anchored at `scope` itself go through
/// [`Gitignore::matched_path_or_any_parents`]. Rules declared in an ancestor
/// of `scope` never test `scope` or anything above it, so an ancestor rule
/// naming the scan root does not hide the whole scan.
fn matched_within<'a>(
    gitignore: &'a Gitignore,
    scope: &Path,
    path: &Path,
    is_dir: bool,
) -> Match<&'a ::ignore::gitignore::Glob> {
    if gitignore.is_empty() || path == scope || !path.starts_with(scope) {
        return Match::None;
    }
    if gitignore.path() == scope {
        return gitignore.matched_path_or_any_parents(path, is_dir);
    }
    let mut current = path;
    let mut current_is_dir = is_dir;
    loop {
        let matched = gitignore.matched(current, current_is_dir);
        if !matched.is_none() {
            return matched;
        }
        match current.parent() {
            Some(parent) if parent != scope && parent.starts_with(scope) => {
                current = parent;
                current_is_dir = true;
            }
            _ => return Match::None,
        }
    }
}

// ── Layers ──────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Layer {
    /// Directory below which the rules apply.
    scope: PathBuf,
    rules: IgnoreRuleSet,
}

/// Rule sets in effect for the directories currently open in the walk.
/// Cloning shares the layers.
#[derive(Debug, Clone)]
pub struct IgnoreLayers {
    /// CLI exclusions and `.git/`; no ignore file can re-include them.
    forced: Arc<Layer>,
    /// Ignore-file rule sets, lowest precedence first.
    layers: Vec<Arc<Layer>>,
}

impl IgnoreLayers {
    /// Layers for a scan root. `files` are ordered lowest precedence first
    /// and all apply below `root`, wherever they were declared.
    pub fn new(root: &Path, forced: IgnoreRuleSet, files: Vec<IgnoreRuleSet>) -> Self {
        let scoped = |rules| {
            Arc::new(Layer {
                scope: root.to_path_buf(),
                rules,
            })
        };
        Self {
            forced: scoped(forced),
            layers: files.into_iter().map(scoped).collect(),
        }
    }

    /// A copy with `rules` scoped to the directory `dir`, taking precedence
    /// over every existing layer.
    pub fn with_nested(&self, dir: &Path, rules: IgnoreRuleSet) -> Self {
        let mut layers = self.layers.clone();
        layers.push(Arc::new(Layer {
            scope: dir.to_path_buf(),
            rules,
        }));
        Self {
            forced: Arc::clone(&self.forced),
            layers,
        }
    }

    /// Number of ignore-file layers.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Whether the entry at `path` is excluded. The deepest layer with a
    /// matching line decides.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        let forced = &self.forced;
        if matched_within(&forced.rules.exclude, &forced.scope, path, is_dir).is_ignore() {
            return true;
        }
        self.decide(path, is_dir, |rules| &rules.exclude)
    }

    /// Whether a binary at `path` should have its payload included.
    pub fn is_revealed(&self, path: &Path, is_dir: bool) -> bool {
        self.decide(path, is_dir, |rules| &rules.reveal)
    }

    fn decide(&self, path: &Path, is_dir: bool, pick: impl Fn(&IgnoreRuleSet) -> &Gitignore) -> bool {
        for layer in self.layers.iter().rev() {
            let matched = matched_within(pick(&layer.rules), &layer.scope, path, is_dir);
            if !matched.is_none() {
                return matched.is_ignore();
            }
        }
        false
    }
}

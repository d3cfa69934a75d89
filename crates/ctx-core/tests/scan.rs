//! End-to-end traversal behaviour over real fixture trees.

use std::path::Path;
use std::sync::Arc;

use ctx_core::classify::EntryClassifier;
use ctx_core::event::{ContentEncoding, Entry, EntryKind, Event, Summary, WarningCode};
use ctx_core::ignore::{IgnoreOptions, IgnoreResolver};
use ctx_core::roots::{ScanRoot, resolve_roots_in};
use ctx_core::tokens::{TokenCount, TokenCounter, TokenError};
use ctx_core::traverse::{TraversalEngine, TraversalOptions};
use ctx_test_utils::FixtureTree;
use ctx_test_utils::fixture::png_bytes;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn engine_with(options: IgnoreOptions, include_content: bool) -> TraversalEngine {
    TraversalEngine::new(
        IgnoreResolver::new(options).unwrap(),
        EntryClassifier::default(),
        None,
        TraversalOptions {
            include_content,
            ..TraversalOptions::default()
        },
    )
}

fn scan_all(engine: &TraversalEngine, base: &Path, inputs: &[&str]) -> Vec<Event> {
    let mut events = Vec::new();
    for root in resolve_roots_in(base, inputs).unwrap() {
        engine
            .scan(&root, &mut events, &CancellationToken::new())
            .unwrap();
    }
    events
}

fn exit_summary(events: &[Event], dir: &Path) -> Summary {
    events
        .iter()
        .find_map(|e| match e {
            Event::DirectoryExit { path, summary } if path == dir => Some(summary.clone()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no exit for {}", dir.display()))
}

fn file_names(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::FileEntry(entry) => Some(entry.name.clone()),
            _ => None,
        })
        .collect()
}

#[test_log::test]
fn test_scenario_a_directory_summaries() {
    let tree = FixtureTree::new();
    tree.file("a.txt", "hello").file("sub/b.txt", "0123456789");

    let events = scan_all(&engine_with(IgnoreOptions::default(), false), tree.path(), &["."]);

    let root = exit_summary(&events, tree.path());
    assert_eq!((root.total_files, root.total_size_bytes), (2, 15));
    let sub = exit_summary(&events, &tree.join("sub"));
    assert_eq!((sub.total_files, sub.total_size_bytes), (1, 10));
}

#[test_log::test]
fn test_scenario_b_revealed_binary() {
    let tree = FixtureTree::new();
    tree.file(".ignore", "[binary]\nfixture.png\n").png("fixture.png");

    let events = scan_all(&engine_with(IgnoreOptions::default(), true), tree.path(), &["."]);

    let entry = events
        .iter()
        .find_map(|e| match e {
            Event::FileEntry(entry) => Some(entry.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(entry.kind, EntryKind::Binary);
    assert_eq!(entry.mime_type, "image/png");

    let payload: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            Event::ContentChunk(chunk) if chunk.path == entry.path => {
                assert_eq!(chunk.encoding, ContentEncoding::Base64);
                Some(chunk.data.clone())
            }
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(payload, png_bytes());
}

#[test_log::test]
fn test_unrevealed_binary_is_omitted() {
    let tree = FixtureTree::new();
    tree.png("image.png");

    let events = scan_all(&engine_with(IgnoreOptions::default(), true), tree.path(), &["."]);

    let chunks: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::ContentChunk(chunk) => Some(chunk),
            _ => None,
        })
        .collect();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].encoding, ContentEncoding::Omitted);
    assert!(chunks[0].data.is_empty() && chunks[0].is_final);
}

#[test_log::test]
fn test_ancestor_gitignore_applies_below_scan_root() {
    let tree = FixtureTree::new();
    tree.file(".gitignore", "project/build/\n*.log\n")
        .file("project/build/out.txt", "artifact")
        .file("project/src/main.rs", "fn main() {}")
        .file("project/src/debug.log", "noise");

    let events = scan_all(
        &engine_with(IgnoreOptions::default(), false),
        &tree.join("project"),
        &["."],
    );

    assert_eq!(file_names(&events), vec!["main.rs".to_string()]);
    assert!(events.iter().all(|e| !e.path().ends_with("build")));
}

#[test_log::test]
fn test_ancestor_rule_for_other_subtree_is_dropped() {
    let tree = FixtureTree::new();
    tree.file(".gitignore", "/other/keep.txt\n")
        .file("project/keep.txt", "k");

    let events = scan_all(
        &engine_with(IgnoreOptions::default(), false),
        &tree.join("project"),
        &["."],
    );
    assert_eq!(file_names(&events), vec!["keep.txt".to_string()]);
}

#[test_log::test]
fn test_negation_reincludes_across_layers() {
    let tree = FixtureTree::new();
    tree.file(".gitignore", "*.log\n!keep.log\n")
        .file("drop.log", "d")
        .file("keep.log", "k")
        .file("pkg/.ignore", "!trace.log\n")
        .file("pkg/other.log", "o")
        .file("pkg/trace.log", "t");

    let events = scan_all(&engine_with(IgnoreOptions::default(), false), tree.path(), &["."]);
    assert_eq!(
        file_names(&events),
        vec!["keep.log".to_string(), "trace.log".to_string()]
    );
}

#[test_log::test]
fn test_explicit_file_bypasses_ignore_rules() {
    let tree = FixtureTree::new();
    tree.file(".ignore", "secret.txt\n")
        .file("secret.txt", "s")
        .file("open.txt", "o");

    let events = scan_all(
        &engine_with(IgnoreOptions::default(), false),
        tree.path(),
        &[".", "secret.txt"],
    );
    // the directory scan hides it, the explicit root shows it
    assert_eq!(
        file_names(&events),
        vec!["open.txt".to_string(), "secret.txt".to_string()]
    );
    assert!(matches!(events.last(), Some(Event::FileEntry(e)) if e.name == "secret.txt"));
}

#[test_log::test]
fn test_cli_exclusion_is_root_only() {
    let tree = FixtureTree::new();
    tree.file("build/top.txt", "t").file("src/build/nested.txt", "n");

    let options = IgnoreOptions {
        exclusions: vec!["build".to_string()],
        ..IgnoreOptions::default()
    };
    let events = scan_all(&engine_with(options, false), tree.path(), &["."]);
    assert_eq!(file_names(&events), vec!["nested.txt".to_string()]);
}

#[test_log::test]
fn test_nested_ignore_is_scoped_to_its_subtree() {
    let tree = FixtureTree::new();
    tree.file("a/.ignore", "*.tmp\n")
        .file("a/x.tmp", "x")
        .file("a/y.txt", "y")
        .file("b/z.tmp", "z");

    let events = scan_all(&engine_with(IgnoreOptions::default(), false), tree.path(), &["."]);
    assert_eq!(file_names(&events), vec!["y.txt".to_string(), "z.tmp".to_string()]);
}

#[test_log::test]
fn test_toggles_disable_ignore_sources() {
    let tree = FixtureTree::new();
    tree.file(".gitignore", "g.txt\n")
        .file(".ignore", "i.txt\n")
        .file("g.txt", "g")
        .file("i.txt", "i")
        .file(".git/HEAD", "ref");

    let options = IgnoreOptions {
        use_gitignore: false,
        use_ignore_file: false,
        include_git: true,
        exclusions: Vec::new(),
    };
    let events = scan_all(&engine_with(options, false), tree.path(), &["."]);
    assert_eq!(
        file_names(&events),
        vec!["HEAD".to_string(), "g.txt".to_string(), "i.txt".to_string()]
    );

    let events = scan_all(&engine_with(IgnoreOptions::default(), false), tree.path(), &["."]);
    assert!(file_names(&events).is_empty());
}

#[test_log::test]
fn test_every_exit_follows_its_descendants() {
    let tree = FixtureTree::new();
    tree.file("a/b/c/d.txt", "d")
        .file("a/b/e.txt", "e")
        .file("a/f.txt", "f")
        .file("g/h.txt", "h");

    let events = scan_all(&engine_with(IgnoreOptions::default(), false), tree.path(), &["."]);
    for (exit_index, event) in events.iter().enumerate() {
        let Event::DirectoryExit { path: dir, .. } = event else {
            continue;
        };
        let enter_index = events
            .iter()
            .position(|e| matches!(e, Event::DirectoryEnter(entry) if &entry.path == dir))
            .unwrap();
        for (index, other) in events.iter().enumerate() {
            if other.path().starts_with(dir) && other.path() != dir.as_path() {
                assert!(enter_index < index && index < exit_index, "{} escapes {}", other.path().display(), dir.display());
            }
        }
    }
}

#[test_log::test]
fn test_peak_depth_independent_of_file_count() {
    let tree = FixtureTree::new();
    for i in 0..200 {
        tree.file(&format!("wide/f{i:03}.txt"), "x");
    }
    tree.file("deep/1/2/3/leaf.txt", "x");

    let engine = engine_with(IgnoreOptions::default(), false);
    let root = ScanRoot {
        path: tree.path().to_path_buf(),
        is_dir: true,
    };
    let mut events = Vec::new();
    let stats = engine
        .scan(&root, &mut events, &CancellationToken::new())
        .unwrap();
    assert_eq!(stats.files, 201);
    // root, deep, 1, 2, 3
    assert_eq!(stats.peak_depth, 5);
}

#[test_log::test]
fn test_missing_root_is_rejected_before_scanning() {
    let tree = FixtureTree::new();
    let err = resolve_roots_in(tree.path(), &["nope"]).unwrap_err();
    assert_eq!(err.to_string(), "path 'nope' does not exist");
}

#[test_log::test]
fn test_large_text_file_is_streamed_in_chunks() {
    let tree = FixtureTree::new();
    let len = TraversalOptions::default().chunk_size * 2 + 10;
    tree.sized_text("big.txt", len).dir("empty");

    let events = scan_all(&engine_with(IgnoreOptions::default(), true), tree.path(), &["."]);

    let chunks: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::ContentChunk(chunk) => Some(chunk),
            _ => None,
        })
        .collect();
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(chunks[2].is_final && !chunks[1].is_final);
    assert_eq!(chunks.iter().map(|c| c.data.len()).sum::<usize>(), len);

    let empty = exit_summary(&events, &tree.join("empty"));
    assert_eq!((empty.total_files, empty.total_size_bytes), (0, 0));
    let root = exit_summary(&events, tree.path());
    assert_eq!(root.total_size_bytes, len as u64);
}

/// Counts one token per byte, declines content starting with `skip` and
/// fails on content starting with `fail`.
struct ByteCounter;

impl TokenCounter for ByteCounter {
    fn model(&self) -> &str {
        "bytes"
    }

    fn count(&self, bytes: &[u8]) -> Result<TokenCount, TokenError> {
        if bytes.starts_with(b"fail") {
            return Err(TokenError::Count("backend unavailable".to_string()));
        }
        if bytes.starts_with(b"skip") {
            return Ok(TokenCount {
                tokens: 0,
                counted: false,
            });
        }
        Ok(TokenCount {
            tokens: bytes.len() as u64,
            counted: true,
        })
    }
}

fn file_entry(events: &[Event], name: &str) -> Entry {
    events
        .iter()
        .find_map(|e| match e {
            Event::FileEntry(entry) if entry.name == name => Some(entry.clone()),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no entry for {name}"))
}

#[test_log::test]
fn test_token_count_failures_become_warnings() {
    let tree = FixtureTree::new();
    tree.file("counted.txt", "hello")
        .file("sub/declined.txt", "skip me")
        .file("sub/failed.txt", "fail me");
    let engine = TraversalEngine::new(
        IgnoreResolver::new(IgnoreOptions::default()).unwrap(),
        EntryClassifier::default(),
        Some(Arc::new(ByteCounter)),
        TraversalOptions::default(),
    );

    let events = scan_all(&engine, tree.path(), &["."]);

    let warnings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Warning(w) => Some((w.code, w.path.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        warnings,
        vec![
            (WarningCode::TokenCount, tree.join("sub/declined.txt")),
            (WarningCode::TokenCount, tree.join("sub/failed.txt")),
        ]
    );

    for name in ["declined.txt", "failed.txt"] {
        let entry = file_entry(&events, name);
        assert_eq!((entry.tokens, entry.model), (0, None));
    }
    let counted = file_entry(&events, "counted.txt");
    assert_eq!((counted.tokens, counted.model.as_deref()), (5, Some("bytes")));

    let sub = exit_summary(&events, &tree.join("sub"));
    assert_eq!((sub.total_files, sub.total_tokens, sub.token_model), (2, 0, None));
    let root = exit_summary(&events, tree.path());
    assert_eq!(root.total_files, 3);
    assert_eq!(root.total_tokens, 5);
    assert_eq!(root.token_model.as_deref(), Some("bytes"));
}

#[cfg(unix)]
#[test_log::test]
fn test_unreadable_subdirectory_is_warning() {
    use std::os::unix::fs::PermissionsExt;

    let tree = FixtureTree::new();
    tree.file("a.txt", "a")
        .file("locked/hidden.txt", "h")
        .file("z.txt", "z");
    let locked = tree.join("locked");
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
    if std::fs::read_dir(&locked).is_ok() {
        // privileged users ignore directory permissions
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let events = scan_all(&engine_with(IgnoreOptions::default(), false), tree.path(), &["."]);
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

    let warnings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Warning(w) => Some((w.code, w.path.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(warnings, vec![(WarningCode::DirectoryUnreadable, locked.clone())]);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::DirectoryEnter(entry) if entry.path == locked
    )));
    assert_eq!(exit_summary(&events, &locked), Summary::default());
    assert_eq!(file_names(&events), vec!["a.txt", "z.txt"]);

    let root = exit_summary(&events, tree.path());
    assert_eq!((root.total_files, root.total_size_bytes), (2, 2));
}

//! Single-pass depth-first traversal.
//!
//! The engine walks one scan root, gated by the ignore layers and the
//! classifier, and emits [`Event`]s in pre-order (`DirectoryEnter`) and
//! post-order (`DirectoryExit`). Recursion is an explicit frame stack so the
//! live state is one child list and one accumulator per open directory.

pub mod aggregate;

use std::ffi::OsString;
use std::fs::{self, FileType};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::classify::{Classification, EntryClassifier};
use crate::event::{
    ContentChunk, ContentEncoding, Entry, EntryKind, Event, Warning, WarningCode, display_name,
};
use crate::ignore::{IgnoreError, IgnoreLayers, IgnoreResolver, is_service_file};
use crate::roots::ScanRoot;
use crate::tokens::{TokenCount, TokenCounter};

pub use aggregate::AccumulatorStack;

/// Default content chunk size: 48 KiB, a multiple of 3 so per-chunk base64
/// concatenates into the base64 of the whole payload.
pub const DEFAULT_CHUNK_SIZE: usize = 48 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum TraversalError {
    #[error(transparent)]
    Ignore(#[from] IgnoreError),

    #[error("failed to read scan root {}: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("traversal cancelled")]
    Cancelled,

    #[error("event consumer closed")]
    SinkClosed,
}

/// Destination for emitted events.
pub trait EventSink {
    fn emit(&mut self, event: Event) -> Result<(), TraversalError>;
}

impl EventSink for Vec<Event> {
    fn emit(&mut self, event: Event) -> Result<(), TraversalError> {
        self.push(event);
        Ok(())
    }
}

/// What the engine emits beyond structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalOptions {
    /// Emit `ContentChunk`s for every file.
    pub include_content: bool,
    /// Payload bytes per chunk; rounded down to a multiple of 3.
    pub chunk_size: usize,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            include_content: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Counters for one scan, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub directories: u64,
    pub files: u64,
    pub warnings: u64,
    /// Deepest simultaneous nesting of open directories.
    pub peak_depth: usize,
}

#[derive(Debug)]
struct Child {
    os_name: OsString,
    name: String,
    path: PathBuf,
    file_type: FileType,
}

struct Frame {
    path: PathBuf,
    children: std::vec::IntoIter<Child>,
    layers: IgnoreLayers,
}

/// Walks scan roots and emits the event sequence.
pub struct TraversalEngine {
    resolver: IgnoreResolver,
    classifier: EntryClassifier,
    counter: Option<Arc<dyn TokenCounter>>,
    options: TraversalOptions,
}

impl TraversalEngine {
    pub fn new(
        resolver: IgnoreResolver,
        classifier: EntryClassifier,
        counter: Option<Arc<dyn TokenCounter>>,
        mut options: TraversalOptions,
    ) -> Self {
        options.chunk_size = (options.chunk_size / 3).max(1) * 3;
        Self {
            resolver,
            classifier,
            counter,
            options,
        }
    }

    pub fn options(&self) -> &TraversalOptions {
        &self.options
    }

    /// Emit the full event sequence for one root.
    ///
    /// Returns `Err` only for fatal conditions; degraded entries become
    /// `Warning` events.
    pub fn scan(
        &self,
        root: &ScanRoot,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
    ) -> Result<ScanStats, TraversalError> {
        if cancel.is_cancelled() {
            return Err(TraversalError::Cancelled);
        }
        let mut stats = ScanStats::default();
        if root.is_dir {
            self.scan_directory(&root.path, sink, cancel, &mut stats)?;
        } else {
            // explicit file arguments bypass ignore and reveal rules
            let mut stack = AccumulatorStack::new();
            self.visit_file(&root.path, false, &mut stack, sink, &mut stats)?;
        }
        debug!(
            root = %root.path.display(),
            directories = stats.directories,
            files = stats.files,
            warnings = stats.warnings,
            "scan complete"
        );
        Ok(stats)
    }

    fn scan_directory(
        &self,
        root: &Path,
        sink: &mut dyn EventSink,
        cancel: &CancellationToken,
        stats: &mut ScanStats,
    ) -> Result<(), TraversalError> {
        let layers = self.resolver.resolve(root)?;
        let listing = read_children(root).map_err(|source| TraversalError::Root {
            path: root.to_path_buf(),
            source,
        })?;

        let mut stack = AccumulatorStack::new();
        let mut frames = Vec::new();
        self.enter(root, &mut stack, sink, stats)?;
        self.report_skipped(listing.skipped, sink, stats)?;
        frames.push(Frame {
            path: root.to_path_buf(),
            children: listing.children.into_iter(),
            layers,
        });

        while let Some(frame) = frames.last_mut() {
            if cancel.is_cancelled() {
                return Err(TraversalError::Cancelled);
            }

            let Some(child) = frame.children.next() else {
                let summary = stack.close().unwrap_or_default();
                if let Some(done) = frames.pop() {
                    sink.emit(Event::DirectoryExit {
                        path: done.path,
                        summary,
                    })?;
                }
                continue;
            };

            if is_service_file(&child.name) {
                continue;
            }

            let is_dir = match resolve_is_dir(&child) {
                Ok(Some(is_dir)) => is_dir,
                Ok(None) => {
                    debug!(path = %child.path.display(), "skipping symlinked directory");
                    continue;
                }
                Err(e) => {
                    self.warning(sink, stats, WarningCode::MetadataUnavailable, &child.path, e.to_string())?;
                    continue;
                }
            };

            if frame.layers.is_excluded(&child.path, is_dir) {
                debug!(path = %child.path.display(), "excluded");
                continue;
            }

            if !is_dir {
                let revealed = frame.layers.is_revealed(&child.path, false);
                self.visit_file(&child.path, revealed, &mut stack, sink, stats)?;
                continue;
            }

            let (listing, layers) = match read_children(&child.path) {
                Ok(listing) => {
                    let layers = match self.resolver.load_nested(&child.path) {
                        Ok(Some(nested)) => frame.layers.with_nested(&child.path, nested),
                        Ok(None) => frame.layers.clone(),
                        Err(e) => {
                            let layers = frame.layers.clone();
                            self.warning(sink, stats, WarningCode::IgnoreFileUnreadable, &child.path, e.to_string())?;
                            layers
                        }
                    };
                    (listing, layers)
                }
                Err(e) => {
                    let layers = frame.layers.clone();
                    self.warning(
                        sink,
                        stats,
                        WarningCode::DirectoryUnreadable,
                        &child.path,
                        format!("failed to read directory: {e}"),
                    )?;
                    (Listing::default(), layers)
                }
            };

            self.enter(&child.path, &mut stack, sink, stats)?;
            self.report_skipped(listing.skipped, sink, stats)?;
            frames.push(Frame {
                path: child.path,
                children: listing.children.into_iter(),
                layers,
            });
        }

        stats.peak_depth = stack.peak_depth();
        Ok(())
    }

    fn enter(
        &self,
        path: &Path,
        stack: &mut AccumulatorStack,
        sink: &mut dyn EventSink,
        stats: &mut ScanStats,
    ) -> Result<(), TraversalError> {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
        debug!(path = %path.display(), "entering directory");
        stack.open();
        stats.directories += 1;
        sink.emit(Event::DirectoryEnter(Entry::directory(path.to_path_buf(), modified)))
    }

    fn visit_file(
        &self,
        path: &Path,
        revealed: bool,
        stack: &mut AccumulatorStack,
        sink: &mut dyn EventSink,
        stats: &mut ScanStats,
    ) -> Result<(), TraversalError> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                return self.warning(sink, stats, WarningCode::FileUnreadable, path, e.to_string());
            }
        };
        let Classification { kind, mime_type } = match self.classifier.classify_path(path) {
            Ok(c) => c,
            Err(e) => {
                return self.warning(sink, stats, WarningCode::FileUnreadable, path, e.to_string());
            }
        };

        let is_binary = kind == EntryKind::Binary;
        let wants_content = self.options.include_content && (!is_binary || revealed);
        let wants_tokens = self.counter.is_some() && !is_binary;
        let content = if wants_content || wants_tokens {
            match fs::read(path) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    return self.warning(sink, stats, WarningCode::FileUnreadable, path, e.to_string());
                }
            }
        } else {
            None
        };

        let (tokens, model) = match (&self.counter, content.as_deref()) {
            (Some(counter), Some(bytes)) if !is_binary => match counter.count(bytes) {
                Ok(TokenCount {
                    tokens,
                    counted: true,
                }) => (tokens, (tokens > 0).then(|| counter.model().to_string())),
                Ok(_) => {
                    self.warning(sink, stats, WarningCode::TokenCount, path, "tokenizer did not count content")?;
                    (0, None)
                }
                Err(e) => {
                    self.warning(sink, stats, WarningCode::TokenCount, path, e.to_string())?;
                    (0, None)
                }
            },
            _ => (0, None),
        };

        let entry = Entry {
            path: path.to_path_buf(),
            name: display_name(path),
            kind,
            mime_type,
            size: metadata.len(),
            modified_at: metadata.modified().ok(),
            tokens,
            model,
        };
        stack.add_entry(&entry);
        stats.files += 1;
        sink.emit(Event::FileEntry(entry))?;

        if self.options.include_content {
            let encoding = match (is_binary, revealed) {
                (false, _) => ContentEncoding::Utf8,
                (true, true) => ContentEncoding::Base64,
                (true, false) => ContentEncoding::Omitted,
            };
            self.emit_chunks(path, content.unwrap_or_default(), encoding, sink)?;
        }
        Ok(())
    }

    /// Emit `content` as chunks and release it. Always emits a final chunk.
    fn emit_chunks(
        &self,
        path: &Path,
        content: Vec<u8>,
        encoding: ContentEncoding,
        sink: &mut dyn EventSink,
    ) -> Result<(), TraversalError> {
        let bounds = match encoding {
            ContentEncoding::Utf8 => utf8_chunk_bounds(&content, self.options.chunk_size),
            ContentEncoding::Base64 => fixed_chunk_bounds(content.len(), self.options.chunk_size),
            ContentEncoding::Omitted => Vec::new(),
        };
        if bounds.is_empty() {
            return sink.emit(Event::ContentChunk(ContentChunk {
                path: path.to_path_buf(),
                index: 0,
                data: Vec::new(),
                encoding,
                is_final: true,
            }));
        }
        let last = bounds.len() - 1;
        for (index, (start, end)) in bounds.into_iter().enumerate() {
            sink.emit(Event::ContentChunk(ContentChunk {
                path: path.to_path_buf(),
                index: index as u32,
                data: content[start..end].to_vec(),
                encoding,
                is_final: index == last,
            }))?;
        }
        Ok(())
    }

    fn report_skipped(
        &self,
        skipped: Vec<Skipped>,
        sink: &mut dyn EventSink,
        stats: &mut ScanStats,
    ) -> Result<(), TraversalError> {
        for Skipped {
            path,
            code,
            message,
        } in skipped
        {
            self.warning(sink, stats, code, &path, message)?;
        }
        Ok(())
    }

    fn warning(
        &self,
        sink: &mut dyn EventSink,
        stats: &mut ScanStats,
        code: WarningCode,
        path: &Path,
        message: impl Into<String>,
    ) -> Result<(), TraversalError> {
        let message = message.into();
        debug!(code = %code, path = %path.display(), "{message}");
        stats.warnings += 1;
        sink.emit(Event::Warning(Warning::new(code, path, message)))
    }
}

/// A directory listing. Entries that could not be read are reported in
/// `skipped` instead of failing the whole listing.
#[derive(Debug, Default)]
struct Listing {
    children: Vec<Child>,
    skipped: Vec<Skipped>,
}

#[derive(Debug)]
struct Skipped {
    path: PathBuf,
    code: WarningCode,
    message: String,
}

/// One raw `read_dir` entry before its file type is known to be readable.
struct RawEntry {
    os_name: OsString,
    path: PathBuf,
    file_type: std::io::Result<FileType>,
}

/// Directory children sorted by name (byte order).
fn read_children(dir: &Path) -> std::io::Result<Listing> {
    let entries = fs::read_dir(dir)?.map(|entry| {
        entry.map(|entry| RawEntry {
            os_name: entry.file_name(),
            path: entry.path(),
            file_type: entry.file_type(),
        })
    });
    Ok(collect_children(dir, entries))
}

fn collect_children(
    dir: &Path,
    entries: impl IntoIterator<Item = std::io::Result<RawEntry>>,
) -> Listing {
    let mut listing = Listing::default();
    for entry in entries {
        let raw = match entry {
            Ok(raw) => raw,
            Err(e) => {
                listing.skipped.push(Skipped {
                    path: dir.to_path_buf(),
                    code: WarningCode::DirectoryUnreadable,
                    message: format!("failed to read directory entry: {e}"),
                });
                continue;
            }
        };
        match raw.file_type {
            Ok(file_type) => listing.children.push(Child {
                name: raw.os_name.to_string_lossy().into_owned(),
                os_name: raw.os_name,
                path: raw.path,
                file_type,
            }),
            Err(e) => listing.skipped.push(Skipped {
                path: raw.path,
                code: WarningCode::MetadataUnavailable,
                message: e.to_string(),
            }),
        }
    }
    listing.children.sort_by(|a, b| a.os_name.cmp(&b.os_name));
    listing
}

/// `Some(is_dir)` for entries to visit, `None` for symlinked directories.
fn resolve_is_dir(child: &Child) -> std::io::Result<Option<bool>> {
    if !child.file_type.is_symlink() {
        return Ok(Some(child.file_type.is_dir()));
    }
    let target = fs::metadata(&child.path)?;
    Ok((!target.is_dir()).then_some(false))
}

fn fixed_chunk_bounds(len: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    (0..len)
        .step_by(chunk_size)
        .map(|start| (start, (start + chunk_size).min(len)))
        .collect()
}

/// Chunk bounds that never split a UTF-8 sequence.
fn utf8_chunk_bounds(content: &[u8], chunk_size: usize) -> Vec<(usize, usize)> {
    let mut bounds = Vec::new();
    let mut start = 0;
    while start < content.len() {
        let mut end = (start + chunk_size).min(content.len());
        while end < content.len() && end > start && is_continuation(content[end]) {
            end -= 1;
        }
        if end == start {
            // a single char wider than the chunk: take the whole char
            end = (start + chunk_size).min(content.len());
            while end < content.len() && is_continuation(content[end]) {
                end += 1;
            }
        }
        bounds.push((start, end));
        start = end;
    }
    bounds
}

fn is_continuation(b: u8) -> bool {
    b & 0b1100_0000 == 0b1000_0000
}

//! Output renderers.
//!
//! Each renderer is a fold over the [`Event`] sequence that writes
//! incrementally to its output. All four agree on which entries appear,
//! how they nest, and which summary fields they carry; they differ only in
//! encoding. Warnings go to a separate side-channel writer.

pub mod format;
pub mod json;
pub mod raw;
pub mod toon;
pub mod xml;

use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::event::{Entry, EntryKind, Event, Summary, Warning};

pub use json::JsonRenderer;
pub use raw::RawRenderer;
pub use toon::ToonRenderer;
pub use xml::XmlRenderer;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected {event} event for {path}")]
    Protocol { event: &'static str, path: String },

    #[error("Invalid format value '{0}'")]
    UnknownFormat(String),
}

impl RenderError {
    pub(crate) fn protocol(event: &Event) -> Self {
        RenderError::Protocol {
            event: event.tag(),
            path: event.path().display().to_string(),
        }
    }
}

/// Output encoding selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Raw,
    Json,
    Xml,
    Toon,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Toon,
        OutputFormat::Raw,
        OutputFormat::Json,
        OutputFormat::Xml,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Raw => "raw",
            OutputFormat::Json => "json",
            OutputFormat::Xml => "xml",
            OutputFormat::Toon => "toon",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "json" => Ok(OutputFormat::Json),
            "xml" => Ok(OutputFormat::Xml),
            "toon" => Ok(OutputFormat::Toon),
            _ => Err(RenderError::UnknownFormat(s.to_string())),
        }
    }
}

/// Which view is being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Structure only (`ctx tree`).
    Tree,
    /// Structure plus file bodies (`ctx content`).
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub mode: RenderMode,
    /// Emit per-directory and run-wide summary fields.
    pub include_summary: bool,
}

impl RenderOptions {
    /// File nodes carry a `content` field and wait for their final chunk.
    pub fn includes_content(&self) -> bool {
        self.mode == RenderMode::Content
    }
}

/// A consumer of the event sequence.
pub trait Renderer {
    /// Fold one event. `FatalError` events are handled by the session and
    /// never reach a renderer.
    fn handle(&mut self, event: &Event) -> Result<(), RenderError>;

    /// Write trailing output and flush.
    fn finish(&mut self) -> Result<(), RenderError>;
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn handle(&mut self, event: &Event) -> Result<(), RenderError> {
        (**self).handle(event)
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        (**self).finish()
    }
}

/// Build the renderer for `format` writing to `out`, with warnings on `side`.
pub fn build_renderer<W, E>(
    format: OutputFormat,
    options: RenderOptions,
    out: W,
    side: E,
) -> Box<dyn Renderer + Send>
where
    W: Write + Send + 'static,
    E: Write + Send + 'static,
{
    match format {
        OutputFormat::Raw => Box::new(RawRenderer::new(out, side, options)),
        OutputFormat::Json => Box::new(JsonRenderer::new(out, side, options)),
        OutputFormat::Xml => Box::new(XmlRenderer::new(out, side, options)),
        OutputFormat::Toon => Box::new(ToonRenderer::new(out, side, options)),
    }
}

/// Print a warning line on the side channel.
pub(crate) fn write_warning<E: Write>(side: &mut E, warning: &Warning) -> Result<(), RenderError> {
    writeln!(side, "{warning}")?;
    Ok(())
}

// ── Shared node fields ──────────────────────────────────────────────────

/// A scalar node field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldValue<'a> {
    Str(Cow<'a, str>),
    Num(u64),
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Num(n) => write!(f, "{n}"),
        }
    }
}

/// Leading fields of a node, in schema order. Directories carry no size,
/// mime type, or token fields here; their totals follow the children.
pub(crate) fn entry_fields(entry: &Entry) -> Vec<(&'static str, FieldValue<'_>)> {
    let mut fields = vec![
        ("path", FieldValue::Str(entry.path.to_string_lossy())),
        ("name", FieldValue::Str(Cow::Borrowed(entry.name.as_str()))),
        ("type", FieldValue::Str(Cow::Borrowed(entry.kind.as_str()))),
    ];
    let is_dir = entry.kind == EntryKind::Directory;
    if !is_dir {
        fields.push(("size", FieldValue::Num(entry.size)));
    }
    if let Some(modified) = entry.modified_at {
        fields.push((
            "lastModified",
            FieldValue::Str(Cow::Owned(format::format_timestamp(modified))),
        ));
    }
    if !is_dir {
        fields.push(("mimeType", FieldValue::Str(Cow::Borrowed(entry.mime_type.as_str()))));
        if entry.tokens > 0 {
            fields.push(("tokens", FieldValue::Num(entry.tokens)));
            if let Some(model) = &entry.model {
                fields.push(("model", FieldValue::Str(Cow::Borrowed(model.as_str()))));
            }
        }
    }
    fields
}

/// Summary fields appended to a directory node once it closes.
pub(crate) fn summary_fields(summary: &Summary) -> Vec<(&'static str, FieldValue<'_>)> {
    let mut fields = vec![
        ("totalFiles", FieldValue::Num(summary.total_files)),
        ("totalSize", FieldValue::Num(summary.total_size_bytes)),
    ];
    if summary.total_tokens > 0 {
        fields.push(("totalTokens", FieldValue::Num(summary.total_tokens)));
        if let Some(model) = &summary.token_model {
            fields.push(("model", FieldValue::Str(Cow::Borrowed(model.as_str()))));
        }
    }
    fields
}

/// Run-wide totals: the sum of every root's summary and of explicit file
/// roots.
#[derive(Debug, Default)]
pub(crate) struct RunTotals {
    summary: Summary,
}

impl RunTotals {
    /// Fold an event observed at nesting `depth` (number of directories open
    /// before the event was applied).
    pub(crate) fn observe(&mut self, event: &Event, depth: usize) {
        match event {
            Event::DirectoryExit { summary, .. } if depth == 1 => self.summary.absorb(summary),
            Event::FileEntry(entry) if depth == 0 => self.summary.add_entry(entry),
            _ => {}
        }
    }

    pub(crate) fn summary(&self) -> &Summary {
        &self.summary
    }
}

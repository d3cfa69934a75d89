//! Plain-text renderer.
//!
//! Tree mode prints an indented listing with per-directory `Summary:` lines.
//! Content mode prints each file between `File:` and `End of file:` markers;
//! binaries whose payload was withheld are left out entirely.

use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::format::format_file_size;
use super::{RenderError, RenderMode, RenderOptions, Renderer, RunTotals, write_warning};
use crate::event::{ContentEncoding, Entry, EntryKind, Event, Summary};

const SEPARATOR: &str = "----------------------------------------";
const MIME_LABEL: &str = "Mime Type: ";

struct PendingFile {
    entry: Entry,
    header_written: bool,
}

pub struct RawRenderer<W: Write, E: Write> {
    out: W,
    side: E,
    options: RenderOptions,
    depth: usize,
    totals: RunTotals,
    pending: Option<PendingFile>,
}

impl<W: Write, E: Write> RawRenderer<W, E> {
    pub fn new(out: W, side: E, options: RenderOptions) -> Self {
        Self {
            out,
            side,
            options,
            depth: 0,
            totals: RunTotals::default(),
            pending: None,
        }
    }

    pub fn into_parts(self) -> (W, E) {
        (self.out, self.side)
    }

    fn indent(&self, depth: usize) -> String {
        "  ".repeat(depth)
    }

    fn tree_file(&mut self, entry: &Entry) -> Result<(), RenderError> {
        let prefix = self.indent(self.depth);
        let path = entry.path.display();
        match entry.kind {
            EntryKind::Binary => writeln!(
                self.out,
                "{prefix}[Binary] {path} ({MIME_LABEL}{})",
                entry.mime_type
            )?,
            _ if entry.tokens > 0 => {
                writeln!(self.out, "{prefix}[File] {path} ({} tokens)", entry.tokens)?
            }
            _ => writeln!(self.out, "{prefix}[File] {path}")?,
        }
        Ok(())
    }

    fn content_header(&mut self, entry: &Entry) -> Result<(), RenderError> {
        writeln!(self.out, "File: {}", entry.path.display())?;
        if entry.kind == EntryKind::Binary {
            writeln!(self.out, "{MIME_LABEL}{}", entry.mime_type)?;
        }
        Ok(())
    }

    fn chunk(&mut self, event: &Event) -> Result<(), RenderError> {
        let Event::ContentChunk(chunk) = event else {
            return Ok(());
        };
        if self.options.mode != RenderMode::Content {
            return Ok(());
        }
        let Some(mut pending) = self.pending.take() else {
            return Err(RenderError::protocol(event));
        };
        if pending.entry.path != chunk.path {
            return Err(RenderError::protocol(event));
        }

        if chunk.encoding == ContentEncoding::Omitted {
            if !chunk.is_final {
                self.pending = Some(pending);
            }
            return Ok(());
        }
        if !pending.header_written {
            self.content_header(&pending.entry)?;
            pending.header_written = true;
        }
        match chunk.encoding {
            ContentEncoding::Base64 => self.out.write_all(STANDARD.encode(&chunk.data).as_bytes())?,
            _ => self.out.write_all(&chunk.data)?,
        }
        if chunk.is_final {
            writeln!(self.out)?;
            writeln!(self.out, "End of file: {}", pending.entry.path.display())?;
            writeln!(self.out, "{SEPARATOR}")?;
        } else {
            self.pending = Some(pending);
        }
        Ok(())
    }
}

/// `Summary: 2 files, 15b[, 40 tokens]`.
fn summary_line(summary: &Summary) -> String {
    let label = if summary.total_files == 1 { "file" } else { "files" };
    let mut line = format!(
        "Summary: {} {label}, {}",
        summary.total_files,
        format_file_size(summary.total_size_bytes)
    );
    if summary.total_tokens > 0 {
        line.push_str(&format!(", {} tokens", summary.total_tokens));
    }
    line
}

impl<W: Write, E: Write> Renderer for RawRenderer<W, E> {
    fn handle(&mut self, event: &Event) -> Result<(), RenderError> {
        self.totals.observe(event, self.depth);
        match event {
            Event::Warning(warning) => write_warning(&mut self.side, warning),
            Event::FatalError(_) => Ok(()),
            Event::DirectoryEnter(entry) => {
                if self.options.mode == RenderMode::Tree {
                    let prefix = self.indent(self.depth);
                    writeln!(self.out, "{prefix}{}", entry.path.display())?;
                }
                self.depth += 1;
                Ok(())
            }
            Event::DirectoryExit { summary, .. } => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or_else(|| RenderError::protocol(event))?;
                if self.options.mode == RenderMode::Tree && self.options.include_summary {
                    let prefix = self.indent(self.depth);
                    writeln!(self.out, "{prefix}  {}", summary_line(summary))?;
                }
                Ok(())
            }
            Event::FileEntry(entry) => match self.options.mode {
                RenderMode::Tree => self.tree_file(entry),
                RenderMode::Content => {
                    let header_written = entry.kind != EntryKind::Binary;
                    if header_written {
                        self.content_header(entry)?;
                    }
                    self.pending = Some(PendingFile {
                        entry: entry.clone(),
                        header_written,
                    });
                    Ok(())
                }
            },
            Event::ContentChunk(_) => self.chunk(event),
        }
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        if self.options.include_summary {
            let mut line = summary_line(self.totals.summary());
            if let Some(model) = &self.totals.summary().token_model {
                line.push_str(&format!(" (model: {model})"));
            }
            writeln!(self.out, "{line}")?;
            writeln!(self.out)?;
        }
        self.out.flush()?;
        self.side.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ContentChunk, Summary, Warning, WarningCode};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn entry(path: &str, kind: EntryKind, size: u64) -> Entry {
        let path = PathBuf::from(path);
        Entry {
            name: crate::event::display_name(&path),
            path,
            kind,
            mime_type: match kind {
                EntryKind::Binary => "image/png".to_string(),
                _ => "text/plain; charset=utf-8".to_string(),
            },
            size,
            modified_at: None,
            tokens: 0,
            model: None,
        }
    }

    fn summary(files: u64, bytes: u64) -> Summary {
        Summary {
            total_files: files,
            total_size_bytes: bytes,
            ..Summary::default()
        }
    }

    fn chunk(path: &str, data: &[u8], encoding: ContentEncoding) -> Event {
        Event::ContentChunk(ContentChunk {
            path: PathBuf::from(path),
            index: 0,
            data: data.to_vec(),
            encoding,
            is_final: true,
        })
    }

    fn render(mode: RenderMode, events: &[Event]) -> (String, String) {
        let options = RenderOptions {
            mode,
            include_summary: true,
        };
        let mut renderer = RawRenderer::new(Vec::new(), Vec::new(), options);
        for event in events {
            renderer.handle(event).unwrap();
        }
        renderer.finish().unwrap();
        let (out, side) = renderer.into_parts();
        (String::from_utf8(out).unwrap(), String::from_utf8(side).unwrap())
    }

    #[test]
    fn test_tree_listing() {
        let events = vec![
            Event::DirectoryEnter(Entry::directory(PathBuf::from("/r"), None)),
            Event::FileEntry(entry("/r/a.txt", EntryKind::File, 5)),
            Event::DirectoryEnter(Entry::directory(PathBuf::from("/r/sub"), None)),
            Event::FileEntry(entry("/r/sub/b.txt", EntryKind::File, 10)),
            Event::DirectoryExit {
                path: PathBuf::from("/r/sub"),
                summary: summary(1, 10),
            },
            Event::DirectoryExit {
                path: PathBuf::from("/r"),
                summary: summary(2, 15),
            },
        ];
        let (out, _) = render(RenderMode::Tree, &events);
        assert_eq!(
            out,
            "/r\n  [File] /r/a.txt\n  /r/sub\n    [File] /r/sub/b.txt\n    Summary: 1 file, 10b\n  Summary: 2 files, 15b\nSummary: 2 files, 15b\n\n"
        );
    }

    #[test]
    fn test_tree_binary_and_tokens() {
        let mut text = entry("/r/a.txt", EntryKind::File, 5);
        text.tokens = 7;
        let events = vec![
            Event::FileEntry(text),
            Event::FileEntry(entry("/r/i.png", EntryKind::Binary, 9)),
        ];
        let (out, _) = render(RenderMode::Tree, &events);
        assert!(out.contains("[File] /r/a.txt (7 tokens)\n"));
        assert!(out.contains("[Binary] /r/i.png (Mime Type: image/png)\n"));
        assert!(out.contains("Summary: 2 files, 14b, 7 tokens\n"));
    }

    #[test]
    fn test_content_blocks_and_omitted_binary() {
        let events = vec![
            Event::FileEntry(entry("/r/a.txt", EntryKind::File, 5)),
            chunk("/r/a.txt", b"hello", ContentEncoding::Utf8),
            Event::FileEntry(entry("/r/i.png", EntryKind::Binary, 3)),
            chunk("/r/i.png", b"", ContentEncoding::Omitted),
            Event::FileEntry(entry("/r/j.png", EntryKind::Binary, 3)),
            chunk("/r/j.png", b"abc", ContentEncoding::Base64),
        ];
        let (out, _) = render(RenderMode::Content, &events);
        let expected = format!(
            "File: /r/a.txt\nhello\nEnd of file: /r/a.txt\n{SEPARATOR}\n\
             File: /r/j.png\nMime Type: image/png\nYWJj\nEnd of file: /r/j.png\n{SEPARATOR}\n\
             Summary: 3 files, 11b\n\n"
        );
        assert_eq!(out, expected);
        assert!(!out.contains("/r/i.png"));
    }

    #[test]
    fn test_content_mode_ends_with_run_summary() {
        let events = vec![
            Event::DirectoryEnter(Entry::directory(PathBuf::from("/r"), None)),
            Event::FileEntry(entry("/r/a.txt", EntryKind::File, 5)),
            chunk("/r/a.txt", b"hello", ContentEncoding::Utf8),
            Event::DirectoryEnter(Entry::directory(PathBuf::from("/r/sub"), None)),
            Event::FileEntry(entry("/r/sub/b.txt", EntryKind::File, 10)),
            chunk("/r/sub/b.txt", b"0123456789", ContentEncoding::Utf8),
            Event::DirectoryExit {
                path: PathBuf::from("/r/sub"),
                summary: summary(1, 10),
            },
            Event::DirectoryExit {
                path: PathBuf::from("/r"),
                summary: summary(2, 15),
            },
        ];
        let (out, _) = render(RenderMode::Content, &events);
        // no directory listing is replayed after the streamed files
        let expected = format!(
            "File: /r/a.txt\nhello\nEnd of file: /r/a.txt\n{SEPARATOR}\n\
             File: /r/sub/b.txt\n0123456789\nEnd of file: /r/sub/b.txt\n{SEPARATOR}\n\
             Summary: 2 files, 15b\n\n"
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn test_warnings_go_to_side_channel() {
        let events = vec![Event::Warning(Warning::new(
            WarningCode::FileUnreadable,
            "/r/locked.txt",
            "permission denied",
        ))];
        let (out, side) = render(RenderMode::Tree, &events);
        assert_eq!(side, "Warning: /r/locked.txt: permission denied\n");
        assert!(!out.contains("locked"));
    }

    #[test]
    fn test_chunk_without_entry_is_protocol_error() {
        let options = RenderOptions {
            mode: RenderMode::Content,
            include_summary: false,
        };
        let mut renderer = RawRenderer::new(Vec::new(), Vec::new(), options);
        let err = renderer
            .handle(&chunk("/r/a.txt", b"x", ContentEncoding::Utf8))
            .unwrap_err();
        assert!(matches!(err, RenderError::Protocol { event: "chunk", .. }));
    }
}

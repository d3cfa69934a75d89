//! Toon renderer: indentation-structured `key: value` records.
//!
//! Roots and children are `- ` items. A node's first field carries the item
//! marker and the remaining fields are indented one level below it. The
//! `children:` key is written lazily at the first child, so empty
//! directories carry none. Array lengths are not written because they are
//! unknown until `DirectoryExit`.

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{
    FieldValue, RenderError, RenderOptions, Renderer, RunTotals, entry_fields, summary_fields,
    write_warning,
};
use crate::event::{ContentEncoding, Event};

const INDENT: &str = "  ";

#[derive(Debug)]
struct Frame {
    /// Indentation of this node's `- ` marker.
    level: usize,
    children: usize,
}

pub struct ToonRenderer<W: Write, E: Write> {
    out: W,
    side: E,
    options: RenderOptions,
    frames: Vec<Frame>,
    totals: RunTotals,
    roots_written: bool,
    open_content: Option<PathBuf>,
}

impl<W: Write, E: Write> ToonRenderer<W, E> {
    pub fn new(out: W, side: E, options: RenderOptions) -> Self {
        Self {
            out,
            side,
            options,
            frames: Vec::new(),
            totals: RunTotals::default(),
            roots_written: false,
            open_content: None,
        }
    }

    pub fn into_parts(self) -> (W, E) {
        (self.out, self.side)
    }

    fn write_roots_header(&mut self) -> Result<(), RenderError> {
        if !self.roots_written {
            self.roots_written = true;
            self.out.write_all(b"roots:\n")?;
        }
        Ok(())
    }

    /// Indentation level for a new item, writing `children:` when it is the
    /// parent's first child.
    fn begin_item(&mut self) -> Result<usize, RenderError> {
        match self.frames.last_mut() {
            Some(parent) => {
                let first = parent.children == 0;
                parent.children += 1;
                let level = parent.level;
                if first {
                    writeln!(self.out, "{}children:", INDENT.repeat(level + 1))?;
                }
                Ok(level + 2)
            }
            None => {
                self.write_roots_header()?;
                Ok(1)
            }
        }
    }

    fn write_item(&mut self, level: usize, fields: &[(&str, FieldValue<'_>)]) -> Result<(), RenderError> {
        let mut iter = fields.iter();
        if let Some((key, value)) = iter.next() {
            writeln!(self.out, "{}- {key}: {}", INDENT.repeat(level), scalar(value))?;
        }
        self.write_fields(level + 1, iter.as_slice())
    }

    fn write_fields(&mut self, level: usize, fields: &[(&str, FieldValue<'_>)]) -> Result<(), RenderError> {
        let prefix = INDENT.repeat(level);
        for (key, value) in fields {
            writeln!(self.out, "{prefix}{key}: {}", scalar(value))?;
        }
        Ok(())
    }
}

fn scalar(value: &FieldValue<'_>) -> String {
    match value {
        FieldValue::Num(n) => n.to_string(),
        FieldValue::Str(s) => {
            if needs_quote(s) {
                let mut quoted = String::with_capacity(s.len() + 2);
                quoted.push('"');
                push_escaped(&mut quoted, s);
                quoted.push('"');
                quoted
            } else {
                s.to_string()
            }
        }
    }
}

/// Bare strings are limited to `[A-Za-z0-9-_./\@~+]`; anything else, and the
/// empty string, is quoted.
fn needs_quote(value: &str) -> bool {
    value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '\\' | '@' | '~' | '+'))
}

/// Escape `text` for the inside of a double-quoted string.
fn push_escaped(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0b}' => out.push_str("\\v"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x80 && c.is_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
}

impl<W: Write, E: Write> Renderer for ToonRenderer<W, E> {
    fn handle(&mut self, event: &Event) -> Result<(), RenderError> {
        self.totals.observe(event, self.frames.len());
        match event {
            Event::Warning(warning) => write_warning(&mut self.side, warning),
            Event::FatalError(_) => Ok(()),
            Event::DirectoryEnter(entry) => {
                let level = self.begin_item()?;
                self.write_item(level, &entry_fields(entry))?;
                self.frames.push(Frame { level, children: 0 });
                Ok(())
            }
            Event::DirectoryExit { summary, .. } => {
                let Some(frame) = self.frames.pop() else {
                    return Err(RenderError::protocol(event));
                };
                if self.options.include_summary {
                    self.write_fields(frame.level + 1, &summary_fields(summary))?;
                }
                Ok(())
            }
            Event::FileEntry(entry) => {
                let level = self.begin_item()?;
                self.write_item(level, &entry_fields(entry))?;
                if self.options.includes_content() {
                    write!(self.out, "{}content: \"", INDENT.repeat(level + 1))?;
                    self.open_content = Some(entry.path.clone());
                }
                Ok(())
            }
            Event::ContentChunk(chunk) => {
                if !self.options.includes_content() {
                    return Ok(());
                }
                if self.open_content.as_ref() != Some(&chunk.path) {
                    return Err(RenderError::protocol(event));
                }
                match chunk.encoding {
                    ContentEncoding::Utf8 => {
                        let mut piece = String::with_capacity(chunk.data.len());
                        push_escaped(&mut piece, &String::from_utf8_lossy(&chunk.data));
                        self.out.write_all(piece.as_bytes())?;
                    }
                    ContentEncoding::Base64 => {
                        self.out.write_all(STANDARD.encode(&chunk.data).as_bytes())?;
                    }
                    ContentEncoding::Omitted => {}
                }
                if chunk.is_final {
                    self.open_content = None;
                    self.out.write_all(b"\"\n")?;
                }
                Ok(())
            }
        }
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        self.write_roots_header()?;
        if self.options.include_summary {
            self.out.write_all(b"summary:\n")?;
            let summary = self.totals.summary().clone();
            self.write_fields(1, &summary_fields(&summary))?;
        }
        self.out.flush()?;
        self.side.flush()?;
        Ok(())
    }
}

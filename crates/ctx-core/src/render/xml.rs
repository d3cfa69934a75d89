//! XML renderer.
//!
//! Every scan root is one `<node>` element with its fields as child
//! elements; several roots are written as consecutive `<node>` elements.
//! Directory totals follow `<children>` because they are only known at
//! `DirectoryExit`.

use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use quick_xml::escape::escape;

use super::{
    FieldValue, RenderError, RenderOptions, Renderer, entry_fields, summary_fields, write_warning,
};
use crate::event::{ContentEncoding, Event};

const INDENT: &str = "  ";

/// Escape `text` for an element body. Characters XML 1.0 cannot carry
/// (C0 controls other than tab, LF and CR, plus U+FFFE and U+FFFF) become
/// U+FFFD.
fn xml_text(text: &str) -> Cow<'_, str> {
    let forbidden = |c: char| {
        matches!(
            c,
            '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}'
        )
    };
    if !text.contains(forbidden) {
        return escape(text);
    }
    let cleaned: String = text
        .chars()
        .map(|c| if forbidden(c) { char::REPLACEMENT_CHARACTER } else { c })
        .collect();
    Cow::Owned(escape(cleaned.as_str()).into_owned())
}

#[derive(Debug)]
struct Frame {
    level: usize,
    children: usize,
}

struct OpenContent {
    path: PathBuf,
    level: usize,
}

pub struct XmlRenderer<W: Write, E: Write> {
    out: W,
    side: E,
    options: RenderOptions,
    frames: Vec<Frame>,
    open_content: Option<OpenContent>,
}

impl<W: Write, E: Write> XmlRenderer<W, E> {
    pub fn new(out: W, side: E, options: RenderOptions) -> Self {
        Self {
            out,
            side,
            options,
            frames: Vec::new(),
            open_content: None,
        }
    }

    pub fn into_parts(self) -> (W, E) {
        (self.out, self.side)
    }

    fn indent(&mut self, level: usize) -> Result<(), RenderError> {
        self.out.write_all(INDENT.repeat(level).as_bytes())?;
        Ok(())
    }

    /// Open a `<node>` and return its indentation level.
    fn begin_node(&mut self) -> Result<usize, RenderError> {
        let level = match self.frames.last_mut() {
            Some(parent) => {
                let first = parent.children == 0;
                parent.children += 1;
                let level = parent.level + 2;
                if first {
                    self.out.write_all(b"\n")?;
                }
                level
            }
            None => 0,
        };
        self.indent(level)?;
        self.out.write_all(b"<node>\n")?;
        Ok(level)
    }

    fn end_node(&mut self, level: usize) -> Result<(), RenderError> {
        self.indent(level)?;
        self.out.write_all(b"</node>\n")?;
        Ok(())
    }

    fn write_fields(&mut self, level: usize, fields: &[(&str, FieldValue<'_>)]) -> Result<(), RenderError> {
        for (key, value) in fields {
            self.indent(level)?;
            let text = value.to_string();
            writeln!(self.out, "<{key}>{}</{key}>", xml_text(&text))?;
        }
        Ok(())
    }
}

impl<W: Write, E: Write> Renderer for XmlRenderer<W, E> {
    fn handle(&mut self, event: &Event) -> Result<(), RenderError> {
        match event {
            Event::Warning(warning) => write_warning(&mut self.side, warning),
            Event::FatalError(_) => Ok(()),
            Event::DirectoryEnter(entry) => {
                let level = self.begin_node()?;
                self.write_fields(level + 1, &entry_fields(entry))?;
                self.indent(level + 1)?;
                self.out.write_all(b"<children>")?;
                self.frames.push(Frame { level, children: 0 });
                Ok(())
            }
            Event::DirectoryExit { summary, .. } => {
                let Some(frame) = self.frames.pop() else {
                    return Err(RenderError::protocol(event));
                };
                if frame.children > 0 {
                    self.indent(frame.level + 1)?;
                }
                self.out.write_all(b"</children>\n")?;
                if self.options.include_summary {
                    self.write_fields(frame.level + 1, &summary_fields(summary))?;
                }
                self.end_node(frame.level)
            }
            Event::FileEntry(entry) => {
                let level = self.begin_node()?;
                self.write_fields(level + 1, &entry_fields(entry))?;
                if self.options.includes_content() {
                    self.indent(level + 1)?;
                    self.out.write_all(b"<content>")?;
                    self.open_content = Some(OpenContent {
                        path: entry.path.clone(),
                        level,
                    });
                    Ok(())
                } else {
                    self.end_node(level)
                }
            }
            Event::ContentChunk(chunk) => {
                if !self.options.includes_content() {
                    return Ok(());
                }
                let level = match &self.open_content {
                    Some(open) if open.path == chunk.path => open.level,
                    _ => return Err(RenderError::protocol(event)),
                };
                match chunk.encoding {
                    ContentEncoding::Utf8 => {
                        let text = String::from_utf8_lossy(&chunk.data);
                        self.out.write_all(xml_text(&text).as_bytes())?;
                    }
                    ContentEncoding::Base64 => {
                        self.out.write_all(STANDARD.encode(&chunk.data).as_bytes())?;
                    }
                    ContentEncoding::Omitted => {}
                }
                if chunk.is_final {
                    self.open_content = None;
                    self.out.write_all(b"</content>\n")?;
                    self.end_node(level)?;
                }
                Ok(())
            }
        }
    }

    fn finish(&mut self) -> Result<(), RenderError> {
        self.out.flush()?;
        self.side.flush()?;
        Ok(())
    }
}

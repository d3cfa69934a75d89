//! Line-delimited JSON renderer.
//!
//! Each scan root becomes one compact JSON object on its own line. A
//! directory's object is opened at `DirectoryEnter` with its `children`
//! array; the array is closed and the summary fields appended at
//! `DirectoryExit`. In content mode a file's `content` string is streamed
//! chunk by chunk.

use std::io::Write;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::{
    FieldValue, RenderError, RenderOptions, Renderer, entry_fields, summary_fields, write_warning,
};
use crate::event::{ContentEncoding, Event};

#[derive(Debug, Default)]
struct Frame {
    children: usize,
}

pub struct JsonRenderer<W: Write, E: Write> {
    out: W,
    side: E,
    options: RenderOptions,
    frames: Vec<Frame>,
    /// File whose `content` string is open.
    open_content: Option<PathBuf>,
}

impl<W: Write, E: Write> JsonRenderer<W, E> {
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

    /// Separator before a node inside its parent's `children` array.
    fn begin_node(&mut self) -> Result<(), RenderError> {
        if let Some(parent) = self.frames.last_mut() {
            if parent.children > 0 {
                self.out.write_all(b",")?;
            }
            parent.children += 1;
        }
        Ok(())
    }

    fn write_fields(&mut self, fields: &[(&str, FieldValue<'_>)]) -> Result<(), RenderError> {
        for (index, (key, value)) in fields.iter().enumerate() {
            if index > 0 {
                self.out.write_all(b",")?;
            }
            write!(self.out, "\"{key}\":")?;
            match value {
                FieldValue::Str(s) => serde_json::to_writer(&mut self.out, s.as_ref())?,
                FieldValue::Num(n) => write!(self.out, "{n}")?,
            }
        }
        Ok(())
    }

    /// Close a node; a root-level node ends its line.
    fn end_node(&mut self) -> Result<(), RenderError> {
        self.out.write_all(b"}")?;
        if self.frames.is_empty() {
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }

    fn write_string_piece(&mut self, text: &str) -> Result<(), RenderError> {
        let quoted = serde_json::to_string(text)?;
        self.out.write_all(&quoted.as_bytes()[1..quoted.len() - 1])?;
        Ok(())
    }
}

impl<W: Write, E: Write> Renderer for JsonRenderer<W, E> {
    fn handle(&mut self, event: &Event) -> Result<(), RenderError> {
        match event {
            Event::Warning(warning) => write_warning(&mut self.side, warning),
            Event::FatalError(_) => Ok(()),
            Event::DirectoryEnter(entry) => {
                self.begin_node()?;
                self.out.write_all(b"{")?;
                self.write_fields(&entry_fields(entry))?;
                self.out.write_all(b",\"children\":[")?;
                self.frames.push(Frame::default());
                Ok(())
            }
            Event::DirectoryExit { summary, .. } => {
                if self.frames.pop().is_none() {
                    return Err(RenderError::protocol(event));
                }
                self.out.write_all(b"]")?;
                if self.options.include_summary {
                    self.out.write_all(b",")?;
                    self.write_fields(&summary_fields(summary))?;
                }
                self.end_node()
            }
            Event::FileEntry(entry) => {
                self.begin_node()?;
                self.out.write_all(b"{")?;
                self.write_fields(&entry_fields(entry))?;
                if self.options.includes_content() {
                    self.out.write_all(b",\"content\":\"")?;
                    self.open_content = Some(entry.path.clone());
                    Ok(())
                } else {
                    self.end_node()
                }
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
                        self.write_string_piece(&String::from_utf8_lossy(&chunk.data))?
                    }
                    ContentEncoding::Base64 => {
                        self.out.write_all(STANDARD.encode(&chunk.data).as_bytes())?
                    }
                    ContentEncoding::Omitted => {}
                }
                if chunk.is_final {
                    self.open_content = None;
                    self.out.write_all(b"\"")?;
                    self.end_node()?;
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

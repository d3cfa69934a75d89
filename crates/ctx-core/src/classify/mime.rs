//! Content-based mime sniffing over a bounded prefix.
//!
//! Follows the WHATWG sniffing order for the signatures that matter for
//! source trees: exact magic numbers first, then markup, then a text/binary
//! fallback.

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Exact byte-prefix signatures. `None` in the mask position means "any byte".
const MAGIC: &[(&[Option<u8>], &str)] = &[
    (&exact(b"%PDF-"), "application/pdf"),
    (&exact(b"%!PS-Adobe-"), "application/postscript"),
    (&exact(b"\xFE\xFF"), "text/plain; charset=utf-16be"),
    (&exact(b"\xFF\xFE"), "text/plain; charset=utf-16le"),
    (&exact(b"\xEF\xBB\xBF"), TEXT_PLAIN),
    (&exact(b"\x00\x00\x01\x00"), "image/x-icon"),
    (&exact(b"\x00\x00\x02\x00"), "image/x-icon"),
    (&exact(b"BM"), "image/bmp"),
    (&exact(b"GIF87a"), "image/gif"),
    (&exact(b"GIF89a"), "image/gif"),
    (&exact(b"\x89PNG\x0D\x0A\x1A\x0A"), "image/png"),
    (&exact(b"\xFF\xD8\xFF"), "image/jpeg"),
    (
        &[
            Some(b'R'), Some(b'I'), Some(b'F'), Some(b'F'), None, None, None, None,
            Some(b'W'), Some(b'E'), Some(b'B'), Some(b'P'), Some(b'V'), Some(b'P'),
        ],
        "image/webp",
    ),
    (
        &[
            Some(b'R'), Some(b'I'), Some(b'F'), Some(b'F'), None, None, None, None,
            Some(b'W'), Some(b'A'), Some(b'V'), Some(b'E'),
        ],
        "audio/wave",
    ),
    (&exact(b"OggS\x00"), "application/ogg"),
    (&exact(b"ID3"), "audio/mpeg"),
    (&exact(b"\x1A\x45\xDF\xA3"), "video/webm"),
    (&exact(b"wOFF"), "font/woff"),
    (&exact(b"wOF2"), "font/woff2"),
    (&exact(b"\x1F\x8B\x08"), "application/x-gzip"),
    (&exact(b"PK\x03\x04"), "application/zip"),
    (&exact(b"Rar!\x1A\x07\x00"), "application/x-rar-compressed"),
    (&exact(b"Rar!\x1A\x07\x01\x00"), "application/x-rar-compressed"),
    (&exact(b"\x00\x61\x73\x6D"), "application/wasm"),
];

/// HTML opening tags recognised after leading whitespace (case-insensitive).
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

const fn exact<const N: usize>(bytes: &[u8; N]) -> [Option<u8>; N] {
    let mut out = [None; N];
    let mut i = 0;
    while i < N {
        out[i] = Some(bytes[i]);
        i += 1;
    }
    out
}

fn has_signature(data: &[u8], signature: &[Option<u8>]) -> bool {
    data.len() >= signature.len()
        && signature
            .iter()
            .zip(data)
            .all(|(expected, actual)| expected.is_none_or(|b| b == *actual))
}

fn is_html_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() < tag.len() + 1 {
        return false;
    }
    let matches = data
        .iter()
        .zip(tag)
        .all(|(d, t)| d.to_ascii_uppercase() == *t);
    matches && matches!(data[tag.len()], b' ' | b'>')
}

/// Bytes that never appear in plain text.
fn is_binary_control(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

/// Sniff the mime type of a content prefix.
pub fn sniff(data: &[u8]) -> &'static str {
    if data.is_empty() {
        return TEXT_PLAIN;
    }
    if let Some((_, mime)) = MAGIC.iter().find(|(sig, _)| has_signature(data, sig)) {
        return mime;
    }

    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let trimmed = &data[start..];
    if HTML_TAGS.iter().any(|tag| is_html_tag(trimmed, tag)) {
        return "text/html; charset=utf-8";
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    if data.iter().any(|b| is_binary_control(*b)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

//! Fuzz target for ignore-file parsing and matching.
//!
//! Run with: cargo +nightly fuzz run fuzz_ignore_parser
//!
//! The first line of the input is treated as a relative path; the rest is
//! parsed as a `.ignore` file and matched against that path.

#![no_main]

use std::path::PathBuf;

use ctx_core::ignore::{RuleSetBuilder, parse_ignore_text};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let (rel, text) = s.split_once('\n').unwrap_or((s, ""));

    let base = PathBuf::from("/fuzz");
    let mut path = base.clone();
    path.extend(rel.split('/').filter(|s| !s.is_empty() && *s != "." && *s != ".."));

    let mut builder = RuleSetBuilder::new(&base);
    builder.extend(parse_ignore_text(text, true));
    let Ok(rules) = builder.build() else {
        return;
    };
    let _ = rules.is_excluded(&path, false);
    let _ = rules.is_excluded(&path, true);
    let _ = rules.is_revealed(&path, false);
});

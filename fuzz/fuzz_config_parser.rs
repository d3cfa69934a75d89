//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text through `AppConfig::parse()` and, for accepted
//! input, through settings resolution for both commands.

#![no_main]

use ctx_config::{AppConfig, CommandKind, StreamOverrides};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = AppConfig::parse(s) {
        for kind in [CommandKind::Tree, CommandKind::Content] {
            let _ = config.stream_settings(kind, StreamOverrides::default());
        }
        let _ = config.effective().to_toml();
    }
});

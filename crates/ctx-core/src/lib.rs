#![deny(unsafe_code)]

//! ctx core engine.
//!
//! Walks scan roots exactly once, applying layered ignore rules and
//! classifying every entry, and turns the walk into an ordered stream of
//! [`Event`]s. A bounded [`EventSession`] feeds that stream to one of four
//! renderers without ever holding the whole tree in memory.

/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Binary detection and mime sniffing over a bounded prefix.
pub mod classify;
/// Entries, summaries, and the event protocol.
pub mod event;
/// `.ignore` / `.gitignore` rules, ancestor rules, and layering.
pub mod ignore;
/// Raw, JSON, XML, and toon renderers.
pub mod render;
/// Scan-root resolution from command-line paths.
pub mod roots;
/// Producer/consumer session over a bounded channel.
pub mod session;
/// Token-counting seam and the tiktoken backend.
pub mod tokens;
/// Depth-first traversal engine and summary accumulators.
pub mod traverse;

pub use classify::EntryClassifier;
pub use event::{Entry, EntryKind, Event, Summary};
pub use self::ignore::{IgnoreOptions, IgnoreResolver};
pub use render::{OutputFormat, RenderMode, RenderOptions, Renderer, build_renderer};
pub use roots::{ScanRoot, resolve_roots};
pub use session::{EventSession, SessionError, SessionOutcome};
pub use tokens::{TiktokenCounter, TokenCounter};
pub use traverse::{TraversalEngine, TraversalOptions};

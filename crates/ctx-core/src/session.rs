//! Event session: one traversal producer and one renderer consumer joined by
//! a bounded channel.
//!
//! Both sides run on blocking threads; the producer blocks when the channel
//! is full, which throttles the walk to the renderer's pace. The first error
//! from either side is recorded and the shared [`CancellationToken`] stops
//! the peer.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::build_info;
use crate::event::{Event, FatalError};
use crate::render::{RenderError, Renderer};
use crate::roots::ScanRoot;
use crate::traverse::{EventSink, ScanStats, TraversalEngine, TraversalError};

/// Default event channel bound.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{0}")]
    Fatal(String),

    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    #[error("traversal failed: {0}")]
    Traversal(#[from] TraversalError),

    #[error("session task failed: {0}")]
    Join(String),
}

/// What the consumer saw during a completed session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOutcome {
    pub roots: usize,
    pub directories: u64,
    pub files: u64,
    pub warnings: u64,
    /// Deepest directory nesting reached by any root.
    pub peak_depth: usize,
}

/// First-error-wins slot shared by both sides.
#[derive(Clone, Default)]
struct FirstError(Arc<Mutex<Option<SessionError>>>);

impl FirstError {
    fn record(&self, err: SessionError) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn is_set(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn take(&self) -> Option<SessionError> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Producer side of the channel.
struct ChannelSink {
    tx: mpsc::Sender<Event>,
}

impl EventSink for ChannelSink {
    fn emit(&mut self, event: Event) -> Result<(), TraversalError> {
        self.tx
            .blocking_send(event)
            .map_err(|_| TraversalError::SinkClosed)
    }
}

/// Runs roots through an engine into a renderer.
#[derive(Debug, Clone)]
pub struct EventSession {
    capacity: usize,
}

impl Default for EventSession {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventSession {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Scan `roots` in order and render every event.
    ///
    /// Roots are scanned sequentially so one root's events fully precede
    /// the next. On success the renderer is returned after `finish`.
    pub async fn run<R>(
        &self,
        engine: Arc<TraversalEngine>,
        roots: Vec<ScanRoot>,
        renderer: R,
    ) -> Result<(R, SessionOutcome), SessionError>
    where
        R: Renderer + Send + 'static,
    {
        info!(
            version = build_info::LONG_VERSION,
            roots = roots.len(),
            capacity = self.capacity,
            content = engine.options().include_content,
            "session started"
        );

        let (tx, rx) = mpsc::channel(self.capacity);
        let cancel = CancellationToken::new();
        let errors = FirstError::default();
        let root_count = roots.len();

        let producer = {
            let cancel = cancel.clone();
            let errors = errors.clone();
            tokio::task::spawn_blocking(move || produce(&engine, &roots, tx, &cancel, &errors))
        };
        let consumer = {
            let cancel = cancel.clone();
            let errors = errors.clone();
            tokio::task::spawn_blocking(move || consume(renderer, rx, &cancel, &errors))
        };

        let (produced, consumed) = tokio::join!(producer, consumer);
        let stats = produced.map_err(|e| SessionError::Join(e.to_string()))?;
        let (renderer, mut outcome) = consumed.map_err(|e| SessionError::Join(e.to_string()))?;

        if let Some(err) = errors.take() {
            info!(error = %err, "session aborted");
            return Err(err);
        }

        outcome.roots = root_count;
        outcome.peak_depth = stats.peak_depth;
        info!(
            roots = outcome.roots,
            directories = outcome.directories,
            files = outcome.files,
            warnings = outcome.warnings,
            "session finished"
        );
        Ok((renderer, outcome))
    }
}

fn produce(
    engine: &TraversalEngine,
    roots: &[ScanRoot],
    tx: mpsc::Sender<Event>,
    cancel: &CancellationToken,
    errors: &FirstError,
) -> ScanStats {
    let mut sink = ChannelSink { tx };
    let mut total = ScanStats::default();
    for root in roots {
        match engine.scan(root, &mut sink, cancel) {
            Ok(stats) => {
                total.directories += stats.directories;
                total.files += stats.files;
                total.warnings += stats.warnings;
                total.peak_depth = total.peak_depth.max(stats.peak_depth);
            }
            Err(err @ (TraversalError::Cancelled | TraversalError::SinkClosed)) => {
                // the consumer already recorded why it stopped
                debug!(root = %root.path.display(), "producer stopped: {err}");
                errors.record(err.into());
                break;
            }
            Err(err) => {
                let fatal = FatalError {
                    path: root.path.clone(),
                    message: err.to_string(),
                };
                if sink.emit(Event::FatalError(fatal)).is_err() {
                    errors.record(err.into());
                }
                cancel.cancel();
                break;
            }
        }
    }
    total
}

fn consume<R: Renderer>(
    mut renderer: R,
    mut rx: mpsc::Receiver<Event>,
    cancel: &CancellationToken,
    errors: &FirstError,
) -> (R, SessionOutcome) {
    let mut outcome = SessionOutcome::default();
    while let Some(event) = rx.blocking_recv() {
        match &event {
            Event::FatalError(fatal) => {
                errors.record(SessionError::Fatal(format!(
                    "{}: {}",
                    fatal.path.display(),
                    fatal.message
                )));
                cancel.cancel();
                break;
            }
            Event::Warning(_) => outcome.warnings += 1,
            Event::DirectoryEnter(_) => outcome.directories += 1,
            Event::FileEntry(_) => outcome.files += 1,
            _ => {}
        }
        if let Err(err) = renderer.handle(&event) {
            errors.record(err.into());
            cancel.cancel();
            break;
        }
    }
    // unblock a producer waiting on a full channel
    rx.close();

    if !errors.is_set()
        && let Err(err) = renderer.finish()
    {
        errors.record(err.into());
    }
    (renderer, outcome)
}

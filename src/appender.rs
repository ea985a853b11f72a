use crate::event::LogEvent;
use crate::registry::MetadataRegistry;
use crate::render::Renderer;
use crate::sink::LineSink;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Per-event pipeline: render one line and hand it to the sink.
///
/// Never fails towards the caller. A line that cannot be rendered or
/// written is counted in `dropped_events` and reported once on stderr.
pub struct Appender {
    renderer: Renderer,
    registry: Arc<MetadataRegistry>,
    sink: Arc<dyn LineSink>,
    /// Total events seen by the appender.
    pub total_events: Arc<AtomicU64>,
    /// Events whose line was lost to a render or write failure.
    pub dropped_events: Arc<AtomicU64>,
    reported: AtomicBool,
}

impl Appender {
    pub fn new(renderer: Renderer, registry: Arc<MetadataRegistry>, sink: Arc<dyn LineSink>) -> Self {
        Appender {
            renderer,
            registry,
            sink,
            total_events: Arc::new(AtomicU64::new(0)),
            dropped_events: Arc::new(AtomicU64::new(0)),
            reported: AtomicBool::new(false),
        }
    }

    pub fn renderer(&self) -> Renderer {
        self.renderer
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn append(&self, event: &LogEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let result = match self.renderer.render(event, &self.registry) {
            Ok(line) => self.sink.write_line(&line).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        if let Err(reason) = result {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            if !self.reported.swap(true, Ordering::Relaxed) {
                eprintln!("dropping log line: {}", reason);
            }
        }
    }
}

impl std::fmt::Debug for Appender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Appender")
            .field("renderer", &self.renderer)
            .field("registry", &self.registry)
            .field("total_events", &self.total_events)
            .field("dropped_events", &self.dropped_events)
            .finish_non_exhaustive()
    }
}

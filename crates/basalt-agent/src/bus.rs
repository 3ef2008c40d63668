use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use basalt_events::{EventKind, LogEvent};

type Handler = Arc<dyn Fn(&LogEvent) -> anyhow::Result<()> + Send + Sync>;

/// In-process publish/subscribe connecting extractor output to its consumers.
///
/// `publish` runs every handler registered for the event's kind synchronously
/// on the calling context, in registration order. A handler returning an
/// error is logged individually and never stops the remaining handlers or the
/// tailing loop. The registration lock is released before dispatch, so a
/// handler may publish or subscribe on the same bus.
#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<EventKind, Vec<Handler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&LogEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    pub fn publish(&self, event: &LogEvent) {
        let for_kind: Vec<Handler> = {
            let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
            match handlers.get(&event.kind()) {
                Some(for_kind) => for_kind.clone(),
                None => return,
            }
        };
        for (idx, handler) in for_kind.iter().enumerate() {
            if let Err(e) = handler(event) {
                tracing::warn!(
                    kind = ?event.kind(),
                    handler = idx,
                    error = %e,
                    "event handler failed"
                );
            }
        }
    }
}

//! Pluggable event delivery, alongside `tracing`.
//!
//! Every error and warning the indexing pipeline and resolver produce is
//! both logged via `tracing` and, if the caller registered one, handed to an
//! `EventCallback` — the mechanism a host application uses to surface corpus
//! problems without scraping logs.

use crate::error::Severity;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Warning,
    Error,
}

impl From<Severity> for EventLevel {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Warning => EventLevel::Warning,
            Severity::Error => EventLevel::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub level: EventLevel,
    pub path: Option<String>,
    pub message: String,
}

pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
pub struct EventSink {
    callback: RwLock<Option<EventCallback>>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_callback(&self, callback: Option<EventCallback>) {
        *self.callback.write() = callback;
    }

    /// Deliver `event` to both the registered callback (if any) and the
    /// process' tracing subscriber.
    pub fn emit(&self, event: Event) {
        match event.level {
            EventLevel::Warning => tracing::warn!(path = ?event.path, "{}", event.message),
            EventLevel::Error => tracing::error!(path = ?event.path, "{}", event.message),
        }
        if let Some(callback) = self.callback.read().as_ref() {
            callback(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callback_receives_emitted_events() {
        let sink = EventSink::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        sink.set_callback(Some(Arc::new(move |_event: &Event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })));
        sink.emit(Event {
            level: EventLevel::Warning,
            path: Some("cdm:/a.cdm.json".to_string()),
            message: "test".to_string(),
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

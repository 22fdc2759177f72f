//! Observability for record stores.
//!
//! Three pieces, none of which may affect execution:
//!
//! - Structured JSON logging, synchronous and deterministic.
//! - Lifecycle events with fixed names and severities.
//! - An injectable metrics registry for transfer accounting.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event at its own severity.
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_event_does_not_panic() {
        log_event(Event::StoreOpened);
        log_event_with_fields(Event::BufferFlushed, &[("records", "4")]);
    }
}

//! Structured event logging
//!
//! The server reports its lifecycle as named events with a flat list of
//! attributes rather than preformatted text, so the application decides
//! how (and whether) the events are rendered or shipped. Events currently
//! emitted: `accepted`, `closed`, `request`, `response`, `timeout`,
//! `parse_error`, `overflow`, `io_error`.

/// A sink for structured server events
///
/// `enabled()` is checked before the attribute list is built, so a
/// disabled logger costs nothing per event.
pub trait Logger: Send + Sync + 'static {
    fn enabled(&self) -> bool {
        true
    }
    fn log(&self, event: &str, attrs: &[(&str, String)]);
}

/// A logger that discards all events
pub struct NopLogger;

impl Logger for NopLogger {
    fn enabled(&self) -> bool {
        false
    }
    fn log(&self, _event: &str, _attrs: &[(&str, String)]) {}
}

/// The default logger, forwarding events to the `log` facade at debug
/// level
///
/// Attributes are rendered as `key=value` pairs after the event name.
pub struct DebugLogger;

impl Logger for DebugLogger {
    fn enabled(&self) -> bool {
        log_enabled!(log::Level::Debug)
    }
    fn log(&self, event: &str, attrs: &[(&str, String)]) {
        let mut line = String::with_capacity(64);
        for (name, value) in attrs {
            line.push(' ');
            line.push_str(name);
            line.push('=');
            line.push_str(value);
        }
        debug!("{}{}", event, line);
    }
}

use std::slice::Iter;
use std::time::SystemTime;

/// A timestamped event record attached to a span.
///
/// Each record holds a set of string fields in insertion order.
/// The main use is recording exceptions raised by the instrumented
/// operation: see `EventLog::error` for the conventional field layout.
///
/// If no timestamp is set one is assigned when the record is attached
/// to a span.
#[derive(Debug, Default)]
pub struct EventLog {
    fields: Vec<(String, String)>,
    timestamp: Option<SystemTime>,
}

impl EventLog {
    /// Creates an empty event record.
    pub fn new() -> EventLog {
        EventLog {
            fields: Vec::new(),
            timestamp: None,
        }
    }

    /// Creates the conventional error record for a raised exception.
    ///
    /// The record carries an `event=error` marker plus the error kind,
    /// message and (when available) stack trace, all as opaque strings.
    pub fn error(kind: &str, message: &str, stack_trace: Option<&str>) -> EventLog {
        let mut log = EventLog::new()
            .field("event", "error")
            .field("error.kind", kind)
            .field("message", message);
        if let Some(stack) = stack_trace {
            log = log.field("stack", stack);
        }
        log
    }
}

impl EventLog {
    /// Sets the timestamp associated with the record.
    pub fn at(mut self, timestamp: SystemTime) -> EventLog {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the timestamp to now if not set.
    pub fn at_or_now(&mut self) {
        if self.timestamp.is_none() {
            self.timestamp = Some(SystemTime::now());
        }
    }

    /// Append a field to the record.
    pub fn field(mut self, key: &str, value: &str) -> EventLog {
        self.fields.push((String::from(key), String::from(value)));
        self
    }

    /// The first value recorded for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over fields in insertion order.
    pub fn iter(&self) -> Iter<(String, String)> {
        self.fields.iter()
    }

    /// Access the (optional) timestamp for the record.
    pub fn timestamp(&self) -> Option<&SystemTime> {
        self.timestamp.as_ref()
    }
}

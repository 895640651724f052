use std::slice::Iter;

/// Ordered key/value tags attached to a span.
///
/// Tags are stored in insertion order and duplicate keys are allowed:
/// interceptors may set the same key more than once (repeated query
/// parameters, retried statements) and consumers want to see every value
/// in the order it was recorded.
#[derive(Debug, Default)]
pub struct SpanTags(Vec<(String, String)>);

impl SpanTags {
    /// Returns a new empty tag list.
    pub fn new() -> SpanTags {
        SpanTags(Vec::new())
    }
}

impl SpanTags {
    /// Append a tag, keeping any previous value for the same key.
    pub fn tag(&mut self, key: &str, value: &str) {
        self.0.push((String::from(key), String::from(value)));
    }

    /// The first value recorded for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over all tags in insertion order.
    pub fn iter(&self) -> Iter<(String, String)> {
        self.0.iter()
    }

    /// Number of recorded tags, duplicates included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no tags have been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

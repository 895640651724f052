use std::time::SystemTime;

use crate::segment::SegmentRef;

pub mod log;
pub mod tag;

use self::log::EventLog;
use self::tag::SpanTags;

/// The three kinds of operations a span can describe.
///
/// Entry spans record inbound requests, exit spans record outbound calls
/// (and are the only kind carrying a `peer` address), local spans record
/// purely in-process work. Behavior differences are dispatched by matching
/// on this enum.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SpanKind {
    Entry,
    Exit { peer: String },
    Local,
}

/// Category of the instrumented technology.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SpanLayer {
    Unknown,
    Http,
    Database,
    Rpc,
    MessageQueue,
    Cache,
}

impl Default for SpanLayer {
    fn default() -> SpanLayer {
        SpanLayer::Unknown
    }
}

/// The record of one timed operation inside a trace segment.
///
/// A `Span` is to a distributed trace what a stack frame is to a stack
/// trace. Spans are created by a `TracingContext` and live on its active
/// stack until the matching `stop_span`, at which point they move into the
/// owning segment and can no longer be reached by instrumentation code.
#[derive(Debug)]
pub struct Span {
    span_id: u32,
    parent_span_id: Option<u32>,
    operation_name: String,
    start_time: SystemTime,
    end_time: Option<SystemTime>,
    kind: SpanKind,
    layer: SpanLayer,
    component_id: u32,
    tags: SpanTags,
    logs: Vec<EventLog>,
    error_occurred: bool,
    refs: Vec<SegmentRef>,
    async_pending: bool,
}

impl Span {
    pub(crate) fn new(
        span_id: u32,
        parent_span_id: Option<u32>,
        operation_name: &str,
        kind: SpanKind,
    ) -> Span {
        Span {
            span_id,
            parent_span_id,
            operation_name: String::from(operation_name),
            start_time: SystemTime::now(),
            end_time: None,
            kind,
            layer: SpanLayer::default(),
            component_id: 0,
            tags: SpanTags::new(),
            logs: Vec::new(),
            error_occurred: false,
            refs: Vec::new(),
            async_pending: false,
        }
    }
}

impl Span {
    /// Sequence number of this span, unique within its segment.
    pub fn span_id(&self) -> u32 {
        self.span_id
    }

    /// Id of the span that was active when this one was created.
    ///
    /// `None` for the segment root.
    pub fn parent_span_id(&self) -> Option<u32> {
        self.parent_span_id
    }

    /// Returns the operation name.
    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Updates the operation name.
    ///
    /// The name may be overwritten until the span finishes; interceptors
    /// often refine it once more details of the request are known.
    pub fn set_operation_name(&mut self, name: &str) {
        self.operation_name = String::from(name);
    }

    /// The time the span was created.
    pub fn start_time(&self) -> &SystemTime {
        &self.start_time
    }

    /// The time the span finished, unset while it is in progress.
    pub fn end_time(&self) -> Option<&SystemTime> {
        self.end_time.as_ref()
    }

    /// The kind of operation this span describes.
    pub fn kind(&self) -> &SpanKind {
        &self.kind
    }

    /// The remote address of the call, set only on exit spans.
    pub fn peer(&self) -> Option<&str> {
        match self.kind {
            SpanKind::Exit { ref peer } => Some(peer),
            _ => None,
        }
    }

    /// Category of the instrumented technology.
    pub fn layer(&self) -> SpanLayer {
        self.layer
    }

    pub fn set_layer(&mut self, layer: SpanLayer) {
        self.layer = layer;
    }

    /// Numeric id of the instrumented component, 0 when unset.
    pub fn component_id(&self) -> u32 {
        self.component_id
    }

    pub fn set_component(&mut self, component_id: u32) {
        self.component_id = component_id;
    }

    /// Append a tag to the span.
    ///
    /// Tags are opaque key/value strings supplied by the instrumentation
    /// layer; they are stored verbatim and never validated.
    pub fn tag(&mut self, key: &str, value: &str) {
        self.tags.tag(key, value);
    }

    /// Access the tags attached to this span.
    pub fn tags(&self) -> &SpanTags {
        &self.tags
    }

    /// Attach an event record to the span.
    pub fn log(&mut self, mut log: EventLog) {
        log.at_or_now();
        self.logs.push(log);
    }

    /// Record a raised exception on the span.
    ///
    /// Appends the conventional error record and marks the span as failed.
    /// The instrumentation layer still propagates the exception to the host
    /// application; the span only keeps a copy of it.
    pub fn log_error(&mut self, kind: &str, message: &str, stack_trace: Option<&str>) {
        self.log(EventLog::error(kind, message, stack_trace));
        self.error_occurred = true;
    }

    /// Access the event records attached to this span.
    pub fn logs(&self) -> &[EventLog] {
        &self.logs
    }

    /// True if any exception was logged on this span.
    pub fn error_occurred(&self) -> bool {
        self.error_occurred
    }

    /// Cross-segment references carried by this span.
    ///
    /// Only entry spans and segment roots carry references.
    pub fn refs(&self) -> &[SegmentRef] {
        &self.refs
    }

    /// True between `prepare_for_async` and the matching async finish.
    pub fn is_async_pending(&self) -> bool {
        self.async_pending
    }
}

impl Span {
    pub(crate) fn attach_ref(&mut self, segment_ref: SegmentRef) {
        self.refs.push(segment_ref);
    }

    pub(crate) fn mark_async_pending(&mut self) {
        self.async_pending = true;
    }

    pub(crate) fn clear_async_pending(&mut self) {
        self.async_pending = false;
    }

    /// Set the end time, exactly once.
    ///
    /// Returns false (and leaves the span untouched) if it was already set.
    pub(crate) fn finish(&mut self, end_time: SystemTime) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        self.end_time = Some(end_time);
        true
    }
}

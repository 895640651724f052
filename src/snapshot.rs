use crate::id::GlobalId;

/// In-process linkage value for cross-thread hand-off.
///
/// Same logical identity as a `ContextCarrier` but typed: it is copied by
/// value to the destination thread (closure capture, message field) and
/// consumed by `TracingContext::continued`, with no encoding or decoding
/// on the way. Immutable after `capture`.
///
/// The snapshot holds identifiers only, never the captured span itself:
/// spans stay owned by the capturing thread's stack and `continued` needs
/// nothing beyond these fields to build the cross-thread reference.
#[derive(Clone, Debug)]
pub struct ContextSnapshot {
    sampled: bool,
    trace_id: GlobalId,
    parent_segment_id: GlobalId,
    parent_span_id: u32,
    parent_service: String,
    parent_service_instance: String,
    parent_endpoint: String,
}

impl ContextSnapshot {
    pub(crate) fn new(
        sampled: bool,
        trace_id: GlobalId,
        parent_segment_id: GlobalId,
        parent_span_id: u32,
        parent_service: &str,
        parent_service_instance: &str,
        parent_endpoint: &str,
    ) -> ContextSnapshot {
        ContextSnapshot {
            sampled,
            trace_id,
            parent_segment_id,
            parent_span_id,
            parent_service: String::from(parent_service),
            parent_service_instance: String::from(parent_service_instance),
            parent_endpoint: String::from(parent_endpoint),
        }
    }

    pub fn sampled(&self) -> bool {
        self.sampled
    }

    pub fn trace_id(&self) -> GlobalId {
        self.trace_id
    }

    pub fn parent_segment_id(&self) -> GlobalId {
        self.parent_segment_id
    }

    /// Id of the span that was active when the snapshot was captured.
    pub fn parent_span_id(&self) -> u32 {
        self.parent_span_id
    }

    pub fn parent_service(&self) -> &str {
        &self.parent_service
    }

    pub fn parent_service_instance(&self) -> &str {
        &self.parent_service_instance
    }

    /// Operation name of the originating segment's root span.
    pub fn parent_endpoint(&self) -> &str {
        &self.parent_endpoint
    }
}

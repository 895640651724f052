use std::mem;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::SystemTime;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use log::warn;

use crate::errors::Error;
use crate::errors::Result;
use crate::id::GlobalId;
use crate::span::Span;

/// How a segment reference relates two segments.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RefType {
    /// The parent segment ran in another process (carrier hand-off).
    CrossProcess,
    /// The parent segment ran on another thread (snapshot hand-off).
    CrossThread,
}

/// Linkage metadata connecting a segment to its causal parent.
///
/// Attached to the root span of the child segment; purely descriptive and
/// never mutated after attachment.
#[derive(Clone, Debug)]
pub struct SegmentRef {
    pub ref_type: RefType,
    pub trace_id: GlobalId,
    pub parent_segment_id: GlobalId,
    pub parent_span_id: u32,
    pub parent_service: String,
    pub parent_service_instance: String,
    pub parent_endpoint: String,
    pub network_address: String,
}

/// A finished trace segment as handed to the export sink.
///
/// Carries the segment identity and the full ordered span list. Delivered
/// at most once per segment; retry and backpressure are the sink's problem.
#[derive(Debug)]
pub struct FinishedSegment {
    trace_id: GlobalId,
    segment_id: GlobalId,
    service: String,
    service_instance: String,
    spans: Vec<Span>,
}

impl FinishedSegment {
    /// Identifier shared by every segment of the originating request.
    pub fn trace_id(&self) -> GlobalId {
        self.trace_id
    }

    /// Identifier of this segment.
    pub fn segment_id(&self) -> GlobalId {
        self.segment_id
    }

    /// Name of the owning service.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Instance identity of the owning process.
    pub fn service_instance(&self) -> &str {
        &self.service_instance
    }

    /// Spans in the order they were stopped, root included.
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }
}

/// Type alias for a `crossbeam_channel::Receiver` of `FinishedSegment`s.
pub type SegmentReceiver = Receiver<FinishedSegment>;

/// Type alias for a `crossbeam_channel::Sender` of `FinishedSegment`s.
pub type SegmentSender = Sender<FinishedSegment>;

/// A span mutation recorded through an async token.
///
/// Async-pending spans live in the segment state once `stop_span` has run,
/// or still on the creating thread's stack before that, so mutations go
/// through the segment rather than a direct span reference.
#[derive(Debug)]
pub(crate) enum SpanMutation {
    Rename(String),
    Tag(String, String),
    Error {
        kind: String,
        message: String,
        stack_trace: Option<String>,
    },
}

impl SpanMutation {
    fn apply(self, span: &mut Span) {
        match self {
            SpanMutation::Rename(name) => span.set_operation_name(&name),
            SpanMutation::Tag(key, value) => span.tag(&key, &value),
            SpanMutation::Error {
                kind,
                message,
                stack_trace,
            } => span.log_error(&kind, &message, stack_trace.as_deref()),
        }
    }
}

/// State of a segment that is shared with async finish tokens.
#[derive(Debug, Default)]
struct SegmentState {
    spans: Vec<Span>,
    async_pending: usize,
    /// Async finishes that arrived before their span was archived:
    /// `(span_id, end_time)` applied when the span lands.
    early_finished: Vec<(u32, SystemTime)>,
    /// Mutations recorded through async tokens before their span was
    /// archived, applied in order when the span lands.
    early_mutations: Vec<(u32, SpanMutation)>,
    root_stopped: bool,
    finished: bool,
}

/// One execution context's ordered, append-only collection of spans.
///
/// The identity fields are immutable; the span list and finish bookkeeping
/// live behind a mutex because an async finish may arrive from another
/// thread. Finalization is a check-and-set on the `finished` flag under
/// that mutex, so the segment is handed to the export channel exactly once
/// even when `stop_span` and an async finish race.
#[derive(Debug)]
pub struct TraceSegment {
    segment_id: GlobalId,
    trace_id: GlobalId,
    service: String,
    service_instance: String,
    state: Mutex<SegmentState>,
}

impl TraceSegment {
    pub(crate) fn new(trace_id: GlobalId, service: &str, service_instance: &str) -> TraceSegment {
        TraceSegment {
            segment_id: GlobalId::generate(),
            trace_id,
            service: String::from(service),
            service_instance: String::from(service_instance),
            state: Mutex::new(SegmentState::default()),
        }
    }

    pub fn segment_id(&self) -> GlobalId {
        self.segment_id
    }

    pub fn trace_id(&self) -> GlobalId {
        self.trace_id
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn service_instance(&self) -> &str {
        &self.service_instance
    }
}

impl TraceSegment {
    /// Lock the shared state, recovering from poisoning.
    ///
    /// A panic in a host thread holding the lock must not take the whole
    /// engine down with it.
    fn state(&self) -> MutexGuard<SegmentState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Count one span that entered the async-pending state.
    pub(crate) fn register_async(&self) {
        let mut state = self.state();
        state.async_pending += 1;
    }

    /// Append a stopped span and, when the active stack has emptied,
    /// attempt finalization. Returns true if this call finalized the
    /// segment.
    pub(crate) fn archive(&self, mut span: Span, stack_empty: bool, sender: &SegmentSender) -> bool {
        let mut state = self.state();
        if span.is_async_pending() {
            // Mutations recorded through the async token before the span
            // landed are applied first, in the order they were made.
            while let Some(position) = state
                .early_mutations
                .iter()
                .position(|(id, _)| *id == span.span_id())
            {
                let (_, mutation) = state.early_mutations.remove(position);
                mutation.apply(&mut span);
            }
            // The matching async finish may already have run on another
            // thread; apply its end time now that the span is landing.
            if let Some(position) = state
                .early_finished
                .iter()
                .position(|(id, _)| *id == span.span_id())
            {
                let (_, end_time) = state.early_finished.remove(position);
                span.clear_async_pending();
                span.finish(end_time);
                state.async_pending -= 1;
            }
        }
        state.spans.push(span);
        if stack_empty {
            state.root_stopped = true;
        }
        self.try_finalize(&mut state, sender)
    }

    /// Complete an async-pending span from any thread, exactly once.
    pub(crate) fn finish_async_span(&self, span_id: u32, sender: &SegmentSender) -> Result<()> {
        let mut state = self.state();
        if state.early_finished.iter().any(|(id, _)| *id == span_id) {
            return Err(Error::AlreadyFinished(span_id));
        }
        match state.spans.iter_mut().find(|s| s.span_id() == span_id) {
            Some(span) => {
                if !span.is_async_pending() {
                    return Err(Error::AlreadyFinished(span_id));
                }
                span.clear_async_pending();
                span.finish(SystemTime::now());
                state.async_pending -= 1;
                self.try_finalize(&mut state, sender);
                Ok(())
            }
            None => {
                // stop_span has not archived the span yet; park the end
                // time so it is applied when the span lands.
                state.early_finished.push((span_id, SystemTime::now()));
                Ok(())
            }
        }
    }

    /// Mutate an async-pending span from any thread.
    ///
    /// An async-pending span is not finished, so it may still be renamed,
    /// tagged or have an error logged through its token. Once the span has
    /// actually finished any further mutation is rejected.
    pub(crate) fn mutate_async_span(&self, span_id: u32, mutation: SpanMutation) -> Result<()> {
        let mut state = self.state();
        if state.early_finished.iter().any(|(id, _)| *id == span_id) {
            return Err(Error::AlreadyFinished(span_id));
        }
        match state.spans.iter_mut().find(|s| s.span_id() == span_id) {
            Some(span) => {
                if !span.is_async_pending() {
                    return Err(Error::AlreadyFinished(span_id));
                }
                mutation.apply(span);
                Ok(())
            }
            None => {
                // stop_span has not archived the span yet; park the
                // mutation so it is applied when the span lands.
                state.early_mutations.push((span_id, mutation));
                Ok(())
            }
        }
    }

    fn try_finalize(&self, state: &mut SegmentState, sender: &SegmentSender) -> bool {
        if state.finished || !state.root_stopped || state.async_pending != 0 {
            return false;
        }
        state.finished = true;
        let finished = FinishedSegment {
            trace_id: self.trace_id,
            segment_id: self.segment_id,
            service: self.service.clone(),
            service_instance: self.service_instance.clone(),
            spans: mem::take(&mut state.spans),
        };
        if sender.send(finished).is_err() {
            warn!(
                "segment receiver dropped, finished segment {} lost",
                self.segment_id
            );
        }
        true
    }
}

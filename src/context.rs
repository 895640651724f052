use std::sync::Arc;
use std::time::SystemTime;

use log::warn;

use crate::carrier::ContextCarrier;
use crate::errors::Error;
use crate::errors::Result;
use crate::id::GlobalId;
use crate::segment::RefType;
use crate::segment::SegmentRef;
use crate::segment::SegmentSender;
use crate::segment::SpanMutation;
use crate::segment::TraceSegment;
use crate::snapshot::ContextSnapshot;
use crate::span::Span;
use crate::span::SpanKind;

/// The per-execution-context facade of the tracing engine.
///
/// One `TracingContext` belongs to exactly one logical thread or fiber and
/// is never shared: the active-span stack needs no locking because all
/// entry/exit/local operations happen on the owning thread. State crosses
/// a thread boundary only through the explicit `capture`/`continued` pair
/// (immutable snapshot, copied by value) or through an `AsyncSpan` token.
///
/// The trace segment is created lazily on the first span and dropped from
/// the context as soon as the stack returns to empty, so a long-lived
/// context (a pooled worker thread) serves one segment per request.
///
/// Protocol errors on the hot path are recovered locally: a `stop_span` on
/// an empty stack or a malformed carrier never panics and never alters the
/// host application's control flow.
#[derive(Debug)]
pub struct TracingContext {
    service: String,
    service_instance: String,
    sampled: bool,
    sender: SegmentSender,
    segment: Option<Arc<TraceSegment>>,
    /// Cross-thread reference stored by `continued`, attached to the next
    /// created (root) span.
    continuation: Option<SegmentRef>,
    stack: Vec<Span>,
    next_span_id: u32,
}

impl TracingContext {
    pub(crate) fn new(
        service: &str,
        service_instance: &str,
        sampled: bool,
        sender: SegmentSender,
    ) -> TracingContext {
        TracingContext {
            service: String::from(service),
            service_instance: String::from(service_instance),
            sampled,
            sender,
            segment: None,
            continuation: None,
            stack: Vec::new(),
            next_span_id: 0,
        }
    }
}

impl TracingContext {
    /// Starts an entry span recording an inbound request.
    ///
    /// If a decoded carrier with `sampled=true` is supplied its identity is
    /// attached to the segment root as a cross-process reference and its
    /// trace id is adopted. Without a carrier (absent or decoded from a
    /// malformed header) a new trace is started instead; bad carrier data
    /// can never fail this call.
    pub fn create_entry_span(
        &mut self,
        operation_name: &str,
        carrier: Option<&ContextCarrier>,
    ) -> &mut Span {
        let carrier = carrier.filter(|carrier| carrier.sampled());
        self.ensure_segment(carrier.map(|carrier| carrier.trace_id()));
        let mut span = self.next_span(operation_name, SpanKind::Entry);
        if let Some(carrier) = carrier {
            let reference = SegmentRef {
                ref_type: RefType::CrossProcess,
                trace_id: carrier.trace_id(),
                parent_segment_id: carrier.parent_segment_id(),
                parent_span_id: carrier.parent_span_id(),
                parent_service: String::from(carrier.parent_service()),
                parent_service_instance: String::from(carrier.parent_service_instance()),
                parent_endpoint: String::from(carrier.parent_endpoint()),
                network_address: String::from(carrier.target_address()),
            };
            // Refs always live on the segment root, even when the entry
            // span is nested under an already active span.
            match self.stack.first_mut() {
                Some(root) => root.attach_ref(reference),
                None => span.attach_ref(reference),
            }
        }
        self.push(span)
    }

    /// Starts an exit span recording an outbound call to `peer`.
    ///
    /// Also builds the carrier to inject into the outbound request: it
    /// encodes the current trace and segment identity, the service
    /// identity, this span's id and operation name as the parent endpoint,
    /// and `peer` as the address the callee is reachable at.
    pub fn create_exit_span(
        &mut self,
        operation_name: &str,
        peer: &str,
    ) -> (&mut Span, ContextCarrier) {
        let segment = self.ensure_segment(None);
        let span = self.next_span(operation_name, SpanKind::Exit {
            peer: String::from(peer),
        });
        let carrier = ContextCarrier::new(
            self.sampled,
            segment.trace_id(),
            segment.segment_id(),
            span.span_id(),
            &self.service,
            &self.service_instance,
            operation_name,
            peer,
        );
        (self.push(span), carrier)
    }

    /// Starts a local span recording purely in-process work.
    pub fn create_local_span(&mut self, operation_name: &str) -> &mut Span {
        self.ensure_segment(None);
        let span = self.next_span(operation_name, SpanKind::Local);
        self.push(span)
    }

    /// Finishes the span on top of the active stack.
    ///
    /// The span's end time is set (unless it is async-pending) and the span
    /// moves into the owning segment. When the stack returns to empty the
    /// segment is finalized and delivered to the export channel, provided
    /// no span in it is still async-pending. Returns true if this call
    /// finalized the segment.
    ///
    /// A `stop_span` without a matching create is a bug in the calling
    /// interceptor; it is logged and ignored.
    pub fn stop_span(&mut self) -> bool {
        let mut span = match self.stack.pop() {
            Some(span) => span,
            None => {
                warn!("stop_span called on an empty active-span stack");
                return false;
            }
        };
        if !span.is_async_pending() {
            span.finish(SystemTime::now());
        }
        let segment = match self.segment.as_ref() {
            Some(segment) => Arc::clone(segment),
            // A span cannot exist without its segment.
            None => {
                warn!("active span without a segment, discarding span");
                return false;
            }
        };
        let stack_empty = self.stack.is_empty();
        let finalized = segment.archive(span, stack_empty, &self.sender);
        if stack_empty {
            // The context is ready for the next request; async tokens keep
            // the segment alive through their own handle.
            self.segment = None;
            self.next_span_id = 0;
        }
        finalized
    }

    /// Detaches completion of the active span from this thread.
    ///
    /// The span stays on the stack and `stop_span` must still be called
    /// once for it, but segment finalization is deferred until the returned
    /// token's `finish` runs. The token must be retained by the caller,
    /// typically attached to whatever object completes asynchronously.
    pub fn prepare_for_async(&mut self) -> Result<AsyncSpan> {
        let segment = match self.segment.as_ref() {
            Some(segment) => Arc::clone(segment),
            None => return Err(Error::NoActiveSpan),
        };
        let span = self.stack.last_mut().ok_or(Error::NoActiveSpan)?;
        if span.is_async_pending() {
            return Err(Error::AlreadyPending(span.span_id()));
        }
        span.mark_async_pending();
        segment.register_async();
        Ok(AsyncSpan {
            span_id: span.span_id(),
            segment,
            sender: self.sender.clone(),
        })
    }

    /// Snapshots the active span's identity for cross-thread hand-off.
    ///
    /// Returns `None` when no span is active.
    pub fn capture(&self) -> Option<ContextSnapshot> {
        let segment = self.segment.as_ref()?;
        let active = self.stack.last()?;
        // The root is popped last, so it is still on the stack here.
        let endpoint = self
            .stack
            .first()
            .map(|root| root.operation_name())
            .unwrap_or("");
        Some(ContextSnapshot::new(
            self.sampled,
            segment.trace_id(),
            segment.segment_id(),
            active.span_id(),
            &self.service,
            &self.service_instance,
            endpoint,
        ))
    }

    /// Establishes causal linkage from a snapshot captured on another
    /// thread.
    ///
    /// Must be called before any span is created on this context: the
    /// snapshot's trace id is adopted and a cross-thread reference is
    /// attached to the next (root) span. Calling it on a context that
    /// already has an active segment is a logic error in the calling
    /// instrumentation; it is reported and the context is left untouched.
    pub fn continued(&mut self, snapshot: ContextSnapshot) -> Result<()> {
        if self.segment.is_some() || !self.stack.is_empty() {
            warn!("continued called on a context with an active segment");
            return Err(Error::ContextAlreadyActive);
        }
        self.sampled = snapshot.sampled();
        self.continuation = Some(SegmentRef {
            ref_type: RefType::CrossThread,
            trace_id: snapshot.trace_id(),
            parent_segment_id: snapshot.parent_segment_id(),
            parent_span_id: snapshot.parent_span_id(),
            parent_service: String::from(snapshot.parent_service()),
            parent_service_instance: String::from(snapshot.parent_service_instance()),
            parent_endpoint: String::from(snapshot.parent_endpoint()),
            network_address: String::new(),
        });
        Ok(())
    }

    /// The span on top of the active stack, if any.
    ///
    /// Callers must tolerate `None`: an interceptor whose before/after
    /// calls are mismatched gets nothing to tag rather than a crash.
    pub fn active_span(&mut self) -> Option<&mut Span> {
        self.stack.last_mut()
    }

    /// Number of spans currently on the active stack.
    pub fn active_depth(&self) -> usize {
        self.stack.len()
    }
}

impl TracingContext {
    fn ensure_segment(&mut self, adopted_trace_id: Option<GlobalId>) -> Arc<TraceSegment> {
        if self.segment.is_none() {
            let trace_id = adopted_trace_id
                .or_else(|| self.continuation.as_ref().map(|r| r.trace_id))
                .unwrap_or_else(GlobalId::generate);
            self.segment = Some(Arc::new(TraceSegment::new(
                trace_id,
                &self.service,
                &self.service_instance,
            )));
        }
        match self.segment.as_ref() {
            Some(segment) => Arc::clone(segment),
            None => unreachable!("segment was just created"),
        }
    }

    fn next_span(&mut self, operation_name: &str, kind: SpanKind) -> Span {
        let parent_span_id = self.stack.last().map(|span| span.span_id());
        let span_id = self.next_span_id;
        self.next_span_id += 1;
        let mut span = Span::new(span_id, parent_span_id, operation_name, kind);
        if parent_span_id.is_none() {
            if let Some(reference) = self.continuation.take() {
                span.attach_ref(reference);
            }
        }
        span
    }

    fn push(&mut self, span: Span) -> &mut Span {
        self.stack.push(span);
        match self.stack.last_mut() {
            Some(span) => span,
            None => unreachable!("span was just pushed"),
        }
    }
}

/// Token to complete an async-pending span from any thread.
///
/// Minted by `TracingContext::prepare_for_async`; holds the span's id and
/// a shared handle to its segment, so completion does not depend on the
/// creating thread's context still existing. Consuming the token in
/// `finish` makes a second completion impossible.
///
/// An async-pending span is not finished yet, so the token also allows the
/// completing code to refine it: an asynchronous driver typically learns
/// the final operation name, statement text or failure only when the
/// result resolves, after `stop_span` has already run.
#[derive(Debug)]
pub struct AsyncSpan {
    span_id: u32,
    segment: Arc<TraceSegment>,
    sender: SegmentSender,
}

impl AsyncSpan {
    /// Id of the span this token completes.
    pub fn span_id(&self) -> u32 {
        self.span_id
    }

    /// Updates the span's operation name.
    ///
    /// Allowed until `finish`; afterwards `Error::AlreadyFinished`.
    pub fn set_operation_name(&self, name: &str) -> Result<()> {
        self.segment
            .mutate_async_span(self.span_id, SpanMutation::Rename(String::from(name)))
    }

    /// Appends a tag to the span.
    ///
    /// Allowed until `finish`; afterwards `Error::AlreadyFinished`.
    pub fn tag(&self, key: &str, value: &str) -> Result<()> {
        self.segment.mutate_async_span(
            self.span_id,
            SpanMutation::Tag(String::from(key), String::from(value)),
        )
    }

    /// Records a raised exception on the span and marks it as failed.
    ///
    /// Allowed until `finish`; afterwards `Error::AlreadyFinished`.
    pub fn log_error(&self, kind: &str, message: &str, stack_trace: Option<&str>) -> Result<()> {
        self.segment.mutate_async_span(self.span_id, SpanMutation::Error {
            kind: String::from(kind),
            message: String::from(message),
            stack_trace: stack_trace.map(String::from),
        })
    }

    /// Clears the pending state, sets the span's end time and re-checks
    /// the segment's finish condition, delivering the segment if this was
    /// the last pending span.
    pub fn finish(self) -> Result<()> {
        self.segment.finish_async_span(self.span_id, &self.sender)
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::super::carrier::ContextCarrier;
    use super::super::errors::Error;
    use super::super::segment::RefType;
    use super::super::segment::SegmentReceiver;
    use super::super::span::SpanKind;
    use super::super::span::SpanLayer;
    use super::TracingContext;

    fn context() -> (TracingContext, SegmentReceiver) {
        let (sender, receiver) = unbounded();
        (TracingContext::new("orders", "orders-1", true, sender), receiver)
    }

    #[test]
    fn well_nested_spans_balance_the_stack() {
        let (mut context, receiver) = context();
        context.create_entry_span("GET /orders", None);
        context.create_local_span("load-session");
        context.create_exit_span("SELECT orders", "db1:5432");
        assert_eq!(context.active_depth(), 3);
        assert!(!context.stop_span());
        assert!(!context.stop_span());
        assert!(context.stop_span());
        assert_eq!(context.active_depth(), 0);

        let segment = receiver.try_recv().unwrap();
        assert_eq!(segment.spans().len(), 3);
        for span in segment.spans() {
            assert!(span.end_time().is_some());
        }
    }

    #[test]
    fn span_ids_are_sequential_and_parented() {
        let (mut context, receiver) = context();
        context.create_entry_span("root", None);
        context.create_local_span("child");
        context.create_local_span("grandchild");
        context.stop_span();
        context.stop_span();
        context.stop_span();

        let segment = receiver.try_recv().unwrap();
        // Spans land in stop order, innermost first.
        let ids: Vec<(u32, Option<u32>)> = segment
            .spans()
            .iter()
            .map(|s| (s.span_id(), s.parent_span_id()))
            .collect();
        assert_eq!(ids, [(2, Some(1)), (1, Some(0)), (0, None)]);
    }

    #[test]
    fn carrier_round_trip_links_segments() {
        let (mut caller, caller_receiver) = context();
        caller.create_entry_span("GET /orders", None);
        let (_, carrier) = caller.create_exit_span("GET /inventory", "inv1:8080");
        let header = carrier.encode();
        caller.stop_span();
        caller.stop_span();
        let caller_segment = caller_receiver.try_recv().unwrap();

        let (sender, receiver) = unbounded();
        let mut callee = TracingContext::new("inventory", "inv-1", true, sender);
        let decoded = ContextCarrier::decode(&header).unwrap();
        callee.create_entry_span("GET /inventory", Some(&decoded));
        callee.stop_span();
        let callee_segment = receiver.try_recv().unwrap();

        assert_eq!(callee_segment.trace_id(), caller_segment.trace_id());
        let root = &callee_segment.spans()[0];
        assert_eq!(root.refs().len(), 1);
        let reference = &root.refs()[0];
        assert_eq!(reference.ref_type, RefType::CrossProcess);
        assert_eq!(reference.trace_id, caller_segment.trace_id());
        assert_eq!(reference.parent_segment_id, caller_segment.segment_id());
        assert_eq!(reference.parent_span_id, 1);
        assert_eq!(reference.parent_service, "orders");
        assert_eq!(reference.parent_endpoint, "GET /inventory");
        assert_eq!(reference.network_address, "inv1:8080");
    }

    #[test]
    fn unsampled_carrier_starts_a_fresh_trace() {
        let (sender, receiver) = unbounded();
        let mut upstream_context = TracingContext::new("svc", "svc-1", false, sender);
        let (_, carrier) = upstream_context.create_exit_span("call", "peer:80");
        assert!(!carrier.sampled());
        upstream_context.stop_span();
        let upstream = receiver.try_recv().unwrap();

        let (mut callee, callee_receiver) = context();
        callee.create_entry_span("serve", Some(&carrier));
        callee.stop_span();
        let segment = callee_receiver.try_recv().unwrap();
        assert!(segment.spans()[0].refs().is_empty());
        assert_ne!(segment.trace_id(), upstream.trace_id());
    }

    #[test]
    fn malformed_header_is_tolerated() {
        let (mut context, receiver) = context();
        let decoded = ContextCarrier::decode("not a carrier at all");
        context.create_entry_span("serve", decoded.as_ref());
        context.stop_span();
        let segment = receiver.try_recv().unwrap();
        assert!(segment.spans()[0].refs().is_empty());
    }

    #[test]
    fn stop_span_underflow_is_recovered() {
        let (mut context, receiver) = context();
        assert!(!context.stop_span());
        // The context must still be usable afterwards.
        context.create_local_span("work");
        assert!(context.stop_span());
        assert_eq!(receiver.try_recv().unwrap().spans().len(), 1);
    }

    #[test]
    fn active_span_is_none_without_spans() {
        let (mut context, _receiver) = context();
        assert!(context.active_span().is_none());
        context.create_local_span("work");
        assert_eq!(context.active_span().unwrap().operation_name(), "work");
        context.stop_span();
        assert!(context.active_span().is_none());
    }

    #[test]
    fn async_finish_defers_and_delivers_once() {
        let (mut context, receiver) = context();
        context.create_entry_span("consume", None);
        let token = context.prepare_for_async().unwrap();
        assert!(!context.stop_span());
        assert!(receiver.is_empty());

        token.finish().unwrap();
        let segment = receiver.try_recv().unwrap();
        assert_eq!(segment.spans().len(), 1);
        assert!(segment.spans()[0].end_time().is_some());
        assert!(receiver.is_empty());
    }

    #[test]
    fn async_finish_from_another_thread() {
        let (mut context, receiver) = context();
        context.create_entry_span("consume", None);
        let token = context.prepare_for_async().unwrap();
        context.stop_span();

        let handle = std::thread::spawn(move || token.finish());
        handle.join().unwrap().unwrap();
        assert_eq!(receiver.try_iter().count(), 1);
    }

    #[test]
    fn async_span_mutable_until_finished() {
        let (mut context, receiver) = context();
        context.create_entry_span("run-async", None);
        let token = context.prepare_for_async().unwrap();
        context.stop_span();

        token.set_operation_name("run-async/resolved").unwrap();
        token.tag("db.statement", "SELECT 1").unwrap();
        token.log_error("TimeoutError", "query timed out", None).unwrap();
        token.finish().unwrap();

        let segment = receiver.try_recv().unwrap();
        let span = &segment.spans()[0];
        assert_eq!(span.operation_name(), "run-async/resolved");
        assert_eq!(span.tags().get("db.statement"), Some("SELECT 1"));
        assert!(span.error_occurred());
        let log = &span.logs()[0];
        assert_eq!(log.get("error.kind"), Some("TimeoutError"));
    }

    #[test]
    fn async_span_mutation_before_stop_is_kept() {
        let (mut context, receiver) = context();
        context.create_entry_span("run-async", None);
        let token = context.prepare_for_async().unwrap();
        token.set_operation_name("run-async/eager").unwrap();
        context.stop_span();
        token.finish().unwrap();

        let segment = receiver.try_recv().unwrap();
        assert_eq!(segment.spans()[0].operation_name(), "run-async/eager");
    }

    #[test]
    fn prepare_for_async_requires_active_span() {
        let (mut context, _receiver) = context();
        match context.prepare_for_async() {
            Err(Error::NoActiveSpan) => (),
            other => panic!("expected NoActiveSpan, got {:?}", other),
        }
    }

    #[test]
    fn prepare_for_async_twice_rejected() {
        let (mut context, _receiver) = context();
        context.create_local_span("work");
        let _token = context.prepare_for_async().unwrap();
        match context.prepare_for_async() {
            Err(Error::AlreadyPending(0)) => (),
            other => panic!("expected AlreadyPending, got {:?}", other),
        }
    }

    #[test]
    fn capture_and_continued_link_threads() {
        let (mut parent, parent_receiver) = context();
        parent.create_entry_span("GET /orders", None);
        let snapshot = parent.capture().unwrap();

        let (sender, receiver) = unbounded();
        let mut worker = TracingContext::new("orders", "orders-1", true, sender);
        worker.continued(snapshot).unwrap();
        worker.create_local_span("load-in-background");
        worker.stop_span();

        parent.stop_span();
        let parent_segment = parent_receiver.try_recv().unwrap();
        let worker_segment = receiver.try_recv().unwrap();

        assert_eq!(worker_segment.trace_id(), parent_segment.trace_id());
        let root = &worker_segment.spans()[0];
        assert_eq!(root.refs().len(), 1);
        let reference = &root.refs()[0];
        assert_eq!(reference.ref_type, RefType::CrossThread);
        assert_eq!(reference.parent_segment_id, parent_segment.segment_id());
        assert_eq!(reference.parent_span_id, 0);
        assert_eq!(reference.parent_endpoint, "GET /orders");
    }

    #[test]
    fn capture_without_active_span_is_none() {
        let (context, _receiver) = context();
        assert!(context.capture().is_none());
    }

    #[test]
    fn continued_on_active_context_is_reported() {
        let (mut parent, _parent_receiver) = context();
        parent.create_entry_span("GET /orders", None);
        let snapshot = parent.capture().unwrap();

        let (mut busy, _receiver) = context();
        busy.create_local_span("already-running");
        match busy.continued(snapshot) {
            Err(Error::ContextAlreadyActive) => (),
            other => panic!("expected ContextAlreadyActive, got {:?}", other),
        }
        // The running span is unaffected.
        assert_eq!(busy.active_depth(), 1);
        assert!(busy.active_span().unwrap().refs().is_empty());
    }

    #[test]
    fn context_serves_multiple_requests_in_sequence() {
        let (mut context, receiver) = context();
        context.create_entry_span("first", None);
        context.stop_span();
        context.create_entry_span("second", None);
        context.stop_span();

        let first = receiver.try_recv().unwrap();
        let second = receiver.try_recv().unwrap();
        assert_ne!(first.segment_id(), second.segment_id());
        assert_ne!(first.trace_id(), second.trace_id());
        assert_eq!(second.spans()[0].span_id(), 0);
    }

    #[test]
    fn failed_exit_span_scenario() {
        let (mut context, receiver) = context();
        context.create_entry_span("GET /orders", None);
        let trace_id = context.capture().unwrap().trace_id();

        let (span, _carrier) = context.create_exit_span("Elasticsearch/Get", "es1:9200");
        span.set_layer(SpanLayer::Database);
        span.log_error("RuntimeError", "all shards failed", None);
        context.stop_span();
        context.stop_span();

        let segment = receiver.try_recv().unwrap();
        assert_eq!(segment.trace_id(), trace_id);
        assert_eq!(segment.spans().len(), 2);
        let exit = &segment.spans()[0];
        assert_eq!(exit.operation_name(), "Elasticsearch/Get");
        assert_eq!(exit.peer(), Some("es1:9200"));
        assert!(matches!(exit.kind(), SpanKind::Exit { .. }));
        assert!(exit.error_occurred());
        assert_eq!(exit.logs().len(), 1);
        assert_eq!(exit.logs()[0].get("error.kind"), Some("RuntimeError"));
        assert_eq!(exit.logs()[0].get("message"), Some("all shards failed"));
    }
}

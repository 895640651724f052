use crossbeam_channel::unbounded;

use crate::context::TracingContext;
use crate::segment::SegmentReceiver;
use crate::segment::SegmentSender;

/// Process-level entry point of the tracing engine.
///
/// Holds the static identity of the monitored process and the sending end
/// of the export channel. The receiving end, returned by `Tracer::new`,
/// gathers `FinishedSegment`s so they can be shipped to the backend
/// (see `utils::ReporterThread` for a ready-made consumer).
///
/// A `Tracer` is cheap to clone; each logical thread or fiber mints its
/// own `TracingContext` from it.
///
/// # Examples
///
/// ```
/// use apmtrace::Tracer;
///
/// let (tracer, receiver) = Tracer::new("orders", "orders-1");
/// let mut context = tracer.context();
/// context.create_entry_span("GET /orders", None);
/// context.stop_span();
/// let segment = receiver.recv().unwrap();
/// assert_eq!(segment.service(), "orders");
/// ```
#[derive(Clone, Debug)]
pub struct Tracer {
    service: String,
    service_instance: String,
    sender: SegmentSender,
}

impl Tracer {
    /// Creates a tracer for the given service identity.
    ///
    /// Returns the tracer and the receiving end of the export channel.
    pub fn new(service: &str, service_instance: &str) -> (Tracer, SegmentReceiver) {
        let (sender, receiver) = unbounded();
        let tracer = Tracer {
            service: String::from(service),
            service_instance: String::from(service_instance),
            sender,
        };
        (tracer, receiver)
    }

    /// Name of the monitored service.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Instance identity of the monitored process.
    pub fn service_instance(&self) -> &str {
        &self.service_instance
    }

    /// Mints a sampled `TracingContext` for one execution context.
    pub fn context(&self) -> TracingContext {
        self.context_with_sampling(true)
    }

    /// Mints a `TracingContext` with an explicit sampling decision.
    ///
    /// The decision is consumed as-is and carried into outbound carriers;
    /// the engine has no sampling policy of its own.
    pub fn context_with_sampling(&self, sampled: bool) -> TracingContext {
        TracingContext::new(
            &self.service,
            &self.service_instance,
            sampled,
            self.sender.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Tracer;

    #[test]
    fn contexts_share_the_export_channel() {
        let (tracer, receiver) = Tracer::new("orders", "orders-1");
        let mut first = tracer.context();
        let mut second = tracer.clone().context();

        first.create_entry_span("GET /a", None);
        first.stop_span();
        second.create_entry_span("GET /b", None);
        second.stop_span();

        let segments: Vec<_> = receiver.try_iter().collect();
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.service() == "orders"));
        assert!(segments.iter().all(|s| s.service_instance() == "orders-1"));
    }

    #[test]
    fn sampling_decision_reaches_the_carrier() {
        let (tracer, _receiver) = Tracer::new("orders", "orders-1");
        let mut context = tracer.context_with_sampling(false);
        let (_, carrier) = context.create_exit_span("call", "peer:80");
        assert!(!carrier.sampled());
    }
}

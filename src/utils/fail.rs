use std::any::type_name;
use std::error::Error;

use crate::span::Span;

/// Trait to make failing spans on error easier and nicer.
///
/// The most common use is on [`Result`] instances in combination with the
/// `?` operator: the error is recorded on the span and still propagated to
/// the host application, so instrumentation never changes control flow.
///
/// # Examples
///
/// ```
/// use std::num::ParseIntError;
///
/// use apmtrace::Span;
/// use apmtrace::Tracer;
/// use apmtrace::utils::FailSpan;
///
/// fn work(span: &mut Span) -> Result<i32, ParseIntError> {
///     let ten: i32 = "10".parse().fail_span(span)?;
///     let two: i32 = "2".parse().fail_span(span)?;
///     Ok(ten * two)
/// }
///
/// let (tracer, _receiver) = Tracer::new("orders", "orders-1");
/// let mut context = tracer.context();
/// let result = work(context.create_local_span("work")).unwrap();
/// context.stop_span();
/// assert_eq!(result, 20);
/// ```
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub trait FailSpan {
    /// Records the error, if any, on the given span.
    ///
    /// The span gets the conventional error record (type name as the kind,
    /// `Display` rendering as the message) and is marked as failed.
    /// Nothing is done on `Ok`.
    fn fail_span(self, span: &mut Span) -> Self;
}

impl<T, E> FailSpan for Result<T, E>
where
    E: Error,
{
    fn fail_span(self, span: &mut Span) -> Result<T, E> {
        if let Err(ref error) = self {
            span.log_error(type_name::<E>(), &error.to_string(), None);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::fmt;

    use crossbeam_channel::unbounded;

    use super::super::super::context::TracingContext;
    use super::FailSpan;

    #[derive(Debug)]
    struct SomeError;
    impl Error for SomeError {}
    impl fmt::Display for SomeError {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "some error happened")
        }
    }

    fn fail() -> Result<(), SomeError> {
        Err(SomeError)
    }

    fn succeed() -> Result<(), SomeError> {
        Ok(())
    }

    #[test]
    fn fail_spans() {
        let (sender, receiver) = unbounded();
        let mut context = TracingContext::new("orders", "orders-1", true, sender);
        let span = context.create_local_span("work");
        assert!(fail().fail_span(span).is_err());
        context.stop_span();

        let segment = receiver.try_recv().unwrap();
        let span = &segment.spans()[0];
        assert!(span.error_occurred());
        assert_eq!(span.logs().len(), 1);
        let log = &span.logs()[0];
        assert_eq!(log.get("event"), Some("error"));
        assert_eq!(log.get("message"), Some("some error happened"));
        assert!(log.get("error.kind").unwrap().ends_with("SomeError"));
    }

    #[test]
    fn ok_results_leave_the_span_alone() {
        let (sender, receiver) = unbounded();
        let mut context = TracingContext::new("orders", "orders-1", true, sender);
        let span = context.create_local_span("work");
        assert!(succeed().fail_span(span).is_ok());
        context.stop_span();

        let segment = receiver.try_recv().unwrap();
        assert!(!segment.spans()[0].error_occurred());
        assert!(segment.spans()[0].logs().is_empty());
    }
}

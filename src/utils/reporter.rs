use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::thread::Builder;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use log::error;

use crate::segment::FinishedSegment;
use crate::segment::SegmentReceiver;

const STOP_DELAY_SEC_DEFAULT: u64 = 2;
const RECV_TIMEOUT_MSEC_DEFAULT: u64 = 50;

/// A basic segment reporter backed by a background thread.
///
/// The reporter spawns a thread that loops until stopped and waits for
/// `FinishedSegment`s. Every received segment is passed to the `ReporterFn`
/// closure, which is responsible for shipping it to the backend; the
/// engine itself delivers each segment at most once and never retries.
///
/// The `ReporterThread` also supports clean shutdown of the receiver
/// thread. When `ReporterThread::stop` is called or an instance is dropped:
///
///   1. The calling thread is paused for the `stop_delay` duration, giving
///      the reporter thread time to drain segments still in the channel.
///   2. The background thread is told to shut down and is joined.
///   3. As soon as any segment is processed or receiving times out the
///      thread stops. Receiving times out every 50 milliseconds.
pub struct ReporterThread {
    stop_delay: Duration,
    stopping: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ReporterThread {
    /// Creates a new reporter waiting for segments on the `receiver`.
    ///
    /// The reporter starts with a spawned thread and runs until stopped or
    /// dropped.
    pub fn new<ReporterFn>(receiver: SegmentReceiver, mut reporter: ReporterFn) -> ReporterThread
    where
        ReporterFn: FnMut(FinishedSegment) + Send + 'static,
    {
        let stopping = Arc::new(AtomicBool::new(false));
        let inner_stopping = Arc::clone(&stopping);

        let thread = Builder::new()
            .name("apmtrace-reporter".into())
            .spawn(move || {
                while !inner_stopping.load(Ordering::Relaxed) {
                    let timeout = Duration::from_millis(RECV_TIMEOUT_MSEC_DEFAULT);
                    match receiver.recv_timeout(timeout) {
                        Ok(segment) => reporter(segment),
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .expect("Failed to spawn reporter thread");

        ReporterThread {
            stop_delay: Duration::from_secs(STOP_DELAY_SEC_DEFAULT),
            stopping,
            thread_handle: Some(thread),
        }
    }

    /// Version of `new` that also sets the `stop_delay`.
    pub fn new_with_duration<ReporterFn>(
        receiver: SegmentReceiver,
        stop_delay: Duration,
        reporter: ReporterFn,
    ) -> ReporterThread
    where
        ReporterFn: FnMut(FinishedSegment) + Send + 'static,
    {
        let mut reporter = ReporterThread::new(receiver, reporter);
        reporter.stop_delay(stop_delay);
        reporter
    }

    /// Updates the `stop_delay` for when the thread is stopped.
    pub fn stop_delay(&mut self, stop_delay: Duration) {
        self.stop_delay = stop_delay;
    }

    /// Stops the background thread and joins it.
    pub fn stop(&mut self) {
        if let Some(thread) = self.thread_handle.take() {
            thread::sleep(self.stop_delay);
            self.stopping.store(true, Ordering::Relaxed);
            if thread.join().is_err() {
                error!("reporter thread panicked before it could be joined");
            }
        }
    }
}

impl Drop for ReporterThread {
    fn drop(&mut self) {
        self.stop()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::super::super::segment::FinishedSegment;
    use super::super::super::tracer::Tracer;
    use super::ReporterThread;

    #[test]
    fn receive_segment() {
        let (tracer, receiver) = Tracer::new("orders", "orders-1");
        let segments: Arc<Mutex<Vec<FinishedSegment>>> = Arc::new(Mutex::new(Vec::new()));

        let inner_segments = Arc::clone(&segments);
        let mut reporter = ReporterThread::new_with_duration(
            receiver,
            Duration::from_millis(50),
            move |segment| {
                inner_segments.lock().unwrap().push(segment);
            },
        );

        let mut context = tracer.context();
        context.create_entry_span("GET /orders", None);
        context.stop_span();
        reporter.stop();

        let segments = segments.lock().unwrap();
        assert_eq!(1, segments.len());
        assert_eq!(segments[0].service(), "orders");
    }
}

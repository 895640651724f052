//! This example shows how to continue a trace on worker threads.
//!
//! The request thread captures a `ContextSnapshot` of its active span and
//! hands one copy to each worker. Workers continue the trace in their own
//! context: their segments belong to the same trace and reference the
//! capturing span, so the backend can stitch the thread hop back together.
use std::thread;
use std::time::Duration;

use apmtrace::Tracer;
use apmtrace::utils::ReporterThread;

fn main() {
    // Create a tracer and the reporter thread.
    let (tracer, receiver) = Tracer::new("cross-thread", "cross-thread-1");
    let mut reporter = ReporterThread::new(receiver, |segment| {
        eprintln!("[{}] {:#?}", segment.trace_id(), segment);
    });
    reporter.stop_delay(Duration::from_secs(1));

    // The request thread opens the root span and captures a snapshot of it.
    let mut context = tracer.context();
    context.create_entry_span("GET /fanout", None);
    let snapshot = context.capture().unwrap();

    // Now spawn some workers that continue the trace.
    let mut threads: Vec<thread::JoinHandle<()>> = Vec::new();
    for i in 1..4 {
        let name = format!("worker#{}", i);
        let tracer = tracer.clone();
        let snapshot = snapshot.clone();
        threads.push(
            thread::Builder::new()
                .name(name)
                .spawn(move || {
                    // Each worker gets its own context; `continued` links the
                    // next root span back to the capturing thread.
                    let mut context = tracer.context();
                    context.continued(snapshot).unwrap();
                    context.create_local_span("fanout-work");
                    context.active_span().unwrap().tag("worker.index", &i.to_string());

                    thread::sleep(Duration::from_millis(100 * i));
                    context.stop_span();
                    println!("Worker {} done", i);
                })
                .expect("Failed to spawn worker thread"),
        );
    }

    // Wait for the workers, then close the request's own segment.
    for thread in threads {
        thread.join().unwrap();
    }
    context.stop_span();
}

//! This example shows how to trace one request on a single thread.
//!
//! The steps to use apmtrace are:
//!
//!   1. Set up a tracer (there should only be one tracer instance: clone it as needed).
//!   2. Mint a `TracingContext` for the execution context serving the request.
//!   3. Create entry/exit/local spans to represent operations, stopping each in
//!      LIFO order.
//!   4. Consume finished segments from the receiver and ship them to a backend.
//!
//! Each step is shown and explained in the code and comments below.
//!
//! As this example aims at showing the basics it prints finished segments to
//! standard error instead of shipping them anywhere.
use std::time::Duration;

use apmtrace::CARRIER_HEADER;
use apmtrace::Tracer;
use apmtrace::utils::ReporterThread;

fn main() {
    println!("Welcome to apmtrace!");

    // First we create a tracer with the identity of the monitored process.
    // The second half of the pair is the receiving end of the export channel.
    let (tracer, receiver) = Tracer::new("quickstart", "quickstart-1");

    // Then we start a reporter thread that prints every finished segment.
    let mut reporter = ReporterThread::new(receiver, |segment| {
        eprintln!("{:#?}", segment);
    });
    reporter.stop_delay(Duration::from_secs(1));

    // Each request is served inside its own context.
    // The entry span is the segment root; `None` means no inbound header.
    let mut context = tracer.context();
    context.create_entry_span("GET /orders", None);

    // Nested operations become local spans.
    context.create_local_span("load-order");
    context.active_span().unwrap().tag("order.id", "12345");
    context.stop_span();

    // Calls to other processes become exit spans; the returned carrier is
    // the header value to send along with the outbound request.
    let (_, carrier) = context.create_exit_span("SELECT orders", "db:5432");
    println!("outbound header: {}: {}", CARRIER_HEADER, carrier.encode());
    context.stop_span();

    // Stopping the entry span closes the segment and delivers it to the
    // receiver, where the reporter thread picks it up.
    context.stop_span();

    // Dropping the reporter drains the channel and joins its thread.
    drop(reporter);
}

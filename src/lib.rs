//! Distributed trace context and span lifecycle engine.
//!
//! The crate creates, correlates and finalizes timed [`Span`] records,
//! groups them into [`FinishedSegment`]s and propagates trace identity
//! across thread boundaries ([`ContextSnapshot`]) and process boundaries
//! ([`ContextCarrier`]). Per-library interceptors drive the engine through
//! a [`TracingContext`]; finished segments come out of the channel returned
//! by [`Tracer::new`].

mod carrier;
mod context;
mod errors;
mod id;
mod segment;
mod snapshot;
mod span;
mod tracer;

pub mod utils;

pub use self::carrier::ContextCarrier;
pub use self::carrier::CARRIER_HEADER;

pub use self::context::AsyncSpan;
pub use self::context::TracingContext;

pub use self::errors::Error;
pub use self::errors::Result;

pub use self::id::GlobalId;

pub use self::segment::FinishedSegment;
pub use self::segment::RefType;
pub use self::segment::SegmentReceiver;
pub use self::segment::SegmentRef;
pub use self::segment::SegmentSender;

pub use self::snapshot::ContextSnapshot;

pub use self::span::log::EventLog;
pub use self::span::tag::SpanTags;
pub use self::span::Span;
pub use self::span::SpanKind;
pub use self::span::SpanLayer;

pub use self::tracer::Tracer;

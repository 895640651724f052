use log::debug;

use crate::id::GlobalId;

/// Header key the encoded carrier travels under.
pub const CARRIER_HEADER: &str = "apm-trace-context";

const DELIMITER: char = '-';
const FIELD_COUNT: usize = 8;

/// Cross-process linkage value, immutable once built.
///
/// Built by `TracingContext::create_exit_span` and injected into the
/// outbound request as a single header value; the receiving side decodes
/// it and attaches a cross-process reference to its entry span.
#[derive(Clone, Debug)]
pub struct ContextCarrier {
    sampled: bool,
    trace_id: GlobalId,
    parent_segment_id: GlobalId,
    parent_span_id: u32,
    parent_service: String,
    parent_service_instance: String,
    parent_endpoint: String,
    target_address: String,
}

impl ContextCarrier {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        sampled: bool,
        trace_id: GlobalId,
        parent_segment_id: GlobalId,
        parent_span_id: u32,
        parent_service: &str,
        parent_service_instance: &str,
        parent_endpoint: &str,
        target_address: &str,
    ) -> ContextCarrier {
        ContextCarrier {
            sampled,
            trace_id,
            parent_segment_id,
            parent_span_id,
            parent_service: String::from(parent_service),
            parent_service_instance: String::from(parent_service_instance),
            parent_endpoint: String::from(parent_endpoint),
            target_address: String::from(target_address),
        }
    }
}

impl ContextCarrier {
    pub fn sampled(&self) -> bool {
        self.sampled
    }

    pub fn trace_id(&self) -> GlobalId {
        self.trace_id
    }

    pub fn parent_segment_id(&self) -> GlobalId {
        self.parent_segment_id
    }

    pub fn parent_span_id(&self) -> u32 {
        self.parent_span_id
    }

    pub fn parent_service(&self) -> &str {
        &self.parent_service
    }

    pub fn parent_service_instance(&self) -> &str {
        &self.parent_service_instance
    }

    /// Operation name of the span that produced this carrier.
    pub fn parent_endpoint(&self) -> &str {
        &self.parent_endpoint
    }

    /// The address the child is reachable at, as seen by the parent.
    ///
    /// Used by receivers to detect self-loops.
    pub fn target_address(&self) -> &str {
        &self.target_address
    }

    /// Encode the carrier as a single header value.
    ///
    /// Fields appear in a fixed order, joined by `-`, each field escaped
    /// for the delimiter character.
    pub fn encode(&self) -> String {
        let fields = [
            String::from(if self.sampled { "1" } else { "0" }),
            self.trace_id.to_string(),
            self.parent_segment_id.to_string(),
            self.parent_span_id.to_string(),
            escape(&self.parent_service),
            escape(&self.parent_service_instance),
            escape(&self.parent_endpoint),
            escape(&self.target_address),
        ];
        fields.join("-")
    }

    /// Decode a header value produced by `encode`.
    ///
    /// Any malformed input yields `None`, which receivers treat as "not
    /// sampled": the entry span is created with no reference and the host
    /// application is never disturbed by bad carrier data.
    pub fn decode(value: &str) -> Option<ContextCarrier> {
        let fields: Vec<&str> = value.split(DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            debug!("discarding carrier with {} fields", fields.len());
            return None;
        }
        let sampled = match fields[0] {
            "1" => true,
            "0" => false,
            _ => {
                debug!("discarding carrier with invalid sampled flag");
                return None;
            }
        };
        let trace_id = fields[1].parse::<GlobalId>().ok()?;
        let parent_segment_id = fields[2].parse::<GlobalId>().ok()?;
        let parent_span_id = fields[3].parse::<u32>().ok()?;
        Some(ContextCarrier {
            sampled,
            trace_id,
            parent_segment_id,
            parent_span_id,
            parent_service: unescape(fields[4]),
            parent_service_instance: unescape(fields[5]),
            parent_endpoint: unescape(fields[6]),
            target_address: unescape(fields[7]),
        })
    }
}

fn escape(field: &str) -> String {
    field.replace('%', "%25").replace('-', "%2D")
}

fn unescape(field: &str) -> String {
    field.replace("%2D", "-").replace("%25", "%")
}

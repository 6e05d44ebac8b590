use std::sync::OnceLock;

use regex::Regex;

use crate::{TransportError, TransportStatus};

fn rst_stream() -> &'static Regex {
    static RST_STREAM: OnceLock<Regex> = OnceLock::new();
    // The pattern is a literal; a compile failure here is a programming error.
    RST_STREAM.get_or_init(|| {
        Regex::new(r"(?i)\brst[^0-9a-zA-Z]stream\b").expect("RST_STREAM pattern must compile")
    })
}

/// Whether a transport failure may be retried against another attempt.
///
/// Only unavailable nodes, exhausted resources, and internal errors caused by
/// a reset HTTP/2 stream are transient. Everything else is fatal.
pub fn should_retry_transport(err: &TransportError) -> bool {
    match err.status {
        TransportStatus::Unavailable | TransportStatus::ResourceExhausted => true,
        TransportStatus::Internal => rst_stream().is_match(&err.message),
        _ => false,
    }
}

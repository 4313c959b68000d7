//! Servlet log line classifier.
//!
//! One log line describes one step of one request's life. A *general-form*
//! line is `<servlet> <timestamp> id=<id>[-ka] <payload>` where the field
//! before `id=` is five whitespace-separated tokens: the servlet name plus
//! four timestamp tokens (`08/05/13 19:34:35.622 CEST +0200`). Failure
//! traces arrive as separate unkeyed lines (an exception header followed by
//! `at ...` frames) and are attributed to a request by the lifecycle engine,
//! not here.
//!
//! Classification is a pure function of the line; it carries no state.

pub mod payload;

pub use payload::{MATCHERS, Payload, match_payload};

use crate::util::time::parse_log_timestamp_usecs;

/// Suffix marking a keep-alive attempt on the request id. Stripped from the
/// routing key; informational only.
const KEEPALIVE_SUFFIX: &str = "-ka";

/// What one raw line turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// A general-form keyed line with a recognized (or unmatched) payload.
    Request(RequestEvent),
    /// The header line of a failure trace (contains the exception marker).
    Trace,
    /// A trace continuation frame; silently ignored.
    TraceFrame,
    /// Blank line; ignored.
    Empty,
    /// Matches no known shape; reported, then dropped.
    Unrecognized,
}

/// A classified general-form line.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    /// Routing key: servlet name + id with the keep-alive suffix stripped.
    pub key: String,
    pub servlet: String,
    /// Log-embedded timestamp, when it parsed.
    pub timestamp_usecs: Option<i64>,
    /// The id carried the keep-alive suffix.
    pub keepalive: bool,
    pub payload: Payload,
}

/// Classifies one raw log line.
pub fn classify(line: &str) -> LineEvent {
    let line = line.trim();
    if line.is_empty() {
        return LineEvent::Empty;
    }

    if let Some(event) = parse_general_form(line) {
        return LineEvent::Request(event);
    }

    // "xception" catches both `Exception` and `exception` headers.
    if line.contains("xception") {
        return LineEvent::Trace;
    }
    if line.starts_with("at ") {
        return LineEvent::TraceFrame;
    }

    LineEvent::Unrecognized
}

/// Splits the general form: servlet token, four timestamp tokens,
/// `id=<id>`, payload. Returns `None` when the shape does not hold.
fn parse_general_form(line: &str) -> Option<RequestEvent> {
    let mut rest = line;
    let mut head = [""; 5];
    for slot in &mut head {
        let (token, tail) = rest.split_once(' ')?;
        if token.is_empty() {
            return None;
        }
        *slot = token;
        rest = tail;
    }

    let (id_token, payload) = rest.split_once(' ')?;
    let id_raw = id_token.strip_prefix("id=")?;
    if id_raw.is_empty() {
        return None;
    }
    let (id, keepalive) = match id_raw.strip_suffix(KEEPALIVE_SUFFIX) {
        Some(stripped) => (stripped, true),
        None => (id_raw, false),
    };

    let servlet = head[0];
    Some(RequestEvent {
        key: format!("{servlet}{id}"),
        servlet: servlet.to_string(),
        // head[3..5] are the zone name and offset; not parsed.
        timestamp_usecs: parse_log_timestamp_usecs(head[1], head[2]),
        keepalive,
        payload: match_payload(payload),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_LINE: &str = "FrontierPrep 08/05/13 19:34:35.622 CEST +0200 id=293476 servlet_version:3.30 start threads:1 query /type=frontier_request:1:DEFAULT raddr 127.0.0.1 frontier-id: CMSSW_5_3_8_patch1 2.8.5";

    #[test]
    fn classifies_general_form_line() {
        let LineEvent::Request(event) = classify(START_LINE) else {
            panic!("expected a request event");
        };
        assert_eq!(event.key, "FrontierPrep293476");
        assert_eq!(event.servlet, "FrontierPrep");
        assert!(!event.keepalive);
        assert!(event.timestamp_usecs.is_some());
        assert!(matches!(event.payload, Payload::Start { .. }));
    }

    #[test]
    fn keepalive_suffix_is_stripped_from_the_key() {
        let line =
            "FrontierProd 08/05/13 19:34:35.622 CEST +0200 id=293476-ka DB acquire sent keepalive 2";
        let LineEvent::Request(event) = classify(line) else {
            panic!("expected a request event");
        };
        assert_eq!(event.key, "FrontierProd293476");
        assert!(event.keepalive);
        assert_eq!(event.payload, Payload::KeepaliveAck { kaacq: 2 });
    }

    #[test]
    fn unparseable_timestamp_yields_none_but_still_classifies() {
        let line = "FrontierProd about nineteen thirty CEST id=7 Executing DB query";
        let LineEvent::Request(event) = classify(line) else {
            panic!("expected a request event");
        };
        assert_eq!(event.timestamp_usecs, None);
        assert_eq!(event.payload, Payload::Executing);
    }

    #[test]
    fn exception_header_is_a_trace() {
        assert_eq!(
            classify("java.lang.Exception: X-frontier-id header missing"),
            LineEvent::Trace
        );
    }

    #[test]
    fn trace_frames_and_blank_lines_are_ignored_shapes() {
        assert_eq!(
            classify("        at gov.fnal.frontier.Frontier.logClientDesc(Frontier.java:429)"),
            LineEvent::TraceFrame
        );
        assert_eq!(classify("   "), LineEvent::Empty);
        assert_eq!(classify(""), LineEvent::Empty);
    }

    #[test]
    fn anything_else_is_unrecognized() {
        assert_eq!(classify("-- MARK --"), LineEvent::Unrecognized);
        assert_eq!(
            classify("FrontierPrep 08/05/13 19:34:35.622"),
            LineEvent::Unrecognized
        );
    }

    #[test]
    fn classification_is_idempotent() {
        assert_eq!(classify(START_LINE), classify(START_LINE));
    }

    #[test]
    fn general_form_wins_over_exception_marker() {
        // A keyed Error payload mentioning an exception is still keyed.
        let line =
            "FrontierProd 08/05/13 19:34:35.622 CEST +0200 id=11 Error ClientAbortException seen";
        assert!(matches!(classify(line), LineEvent::Request(_)));
    }
}

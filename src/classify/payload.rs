//! Payload matcher cascade for general-form servlet log lines.
//!
//! Matchers are tried in a fixed priority order and the first match wins;
//! the order is a contract, not an implementation detail, and is asserted
//! in the tests. Each matcher is an independent function so it can be
//! exercised on its own.

/// One recognized payload, with fields already coerced to their types.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `servlet_version:<v> start threads:<n> query <q> raddr <addr> frontier-id: <rest>`
    Start {
        version: String,
        threads_start: u64,
        query: String,
        who: String,
        fid: String,
        forward: Option<String>,
        via: Option<String>,
    },
    /// `DB connection acquired active=<n> msecs=<n>`
    DbAcquired { active_acq: u64, msecs_acq: u64 },
    /// `DB query finished msecs=<n>`
    DbFinished { msecs_finish: u64 },
    /// `rows=<n>, full size=<n>`
    RowsSize { rows: u64, size: u64 },
    /// `stop threads=<n> msecs=<n>`
    Stop { threads_stop: u64, msecs_stop: u64 },
    /// `SQL <text>`
    Sql { sql: String },
    /// `Acquiring DB <text>`
    Acquiring { dbacq: String },
    /// `Executing DB query`
    Executing,
    /// `DB acquire sent keepalive <n>`
    KeepaliveAck { kaacq: u64 },
    /// `Error <text>`
    Error { error: String },
    /// `Client <text>`
    Client { client: String },
    /// None of the patterns matched.
    Unmatched,
}

type Matcher = fn(&str) -> Option<Payload>;

/// The cascade, in priority order. First match wins; later matchers are
/// not attempted.
pub const MATCHERS: &[(&str, Matcher)] = &[
    ("start", match_start),
    ("db-acquired", match_db_acquired),
    ("db-finished", match_db_finished),
    ("rows-size", match_rows_size),
    ("stop", match_stop),
    ("sql", match_sql),
    ("acquiring", match_acquiring),
    ("executing", match_executing),
    ("keepalive-ack", match_keepalive_ack),
    ("error", match_error),
    ("client", match_client),
];

/// Runs the cascade over one payload.
pub fn match_payload(payload: &str) -> Payload {
    for (_, matcher) in MATCHERS {
        if let Some(event) = matcher(payload) {
            return event;
        }
    }
    Payload::Unmatched
}

/// Parses the leading decimal digits of `s`, ignoring any trailing text.
/// Requires at least one digit.
fn parse_leading_u64(s: &str) -> Option<u64> {
    let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    s[..digits].parse().ok()
}

fn match_start(payload: &str) -> Option<Payload> {
    let rest = payload.strip_prefix("servlet_version:")?;
    let (version, rest) = rest.split_once(' ')?;
    let rest = rest.strip_prefix("start threads:")?;
    let (threads, rest) = rest.split_once(' ')?;
    let threads_start = threads.parse().ok()?;
    let rest = rest.strip_prefix("query ")?;
    let (query, rest) = rest.split_once(' ')?;
    let rest = rest.strip_prefix("raddr ")?;
    let (who, rest) = rest.split_once(' ')?;
    let complement = rest.strip_prefix("frontier-id: ")?;

    let (fid, forward, via) = split_frontier_id(complement);
    Some(Payload::Start {
        version: version.to_string(),
        threads_start,
        query: query.to_string(),
        who: who.to_string(),
        fid,
        forward,
        via,
    })
}

/// Dissects the `frontier-id:` remainder on `:` boundaries.
///
/// Segment 0, minus any embedded forwarding marker words, is the client
/// software identity (`fid`). When the second-to-last segment ends with the
/// `x-forwarded-for` marker, the final segment is the forwarded address.
/// The middle segments, rejoined with `:` and with marker words stripped,
/// describe the proxy chain (`via`).
fn split_frontier_id(complement: &str) -> (String, Option<String>, Option<String>) {
    let parts: Vec<&str> = complement.split(':').collect();

    let fid = parts[0]
        .replace(" x-forwarded-for", "")
        .replace(" via", "");

    let mut forward = None;
    let mut via = None;
    if parts.len() > 1 {
        if parts[parts.len() - 2].ends_with(" x-forwarded-for") {
            forward = Some(parts[parts.len() - 1].to_string());
        }
        via = Some(parts[1..parts.len() - 1].join(":").replace("x-forwarded-for", ""));
    }

    (fid, forward, via)
}

fn match_db_acquired(payload: &str) -> Option<Payload> {
    let rest = payload.strip_prefix("DB connection acquired active=")?;
    let (active, rest) = rest.split_once(' ')?;
    let active_acq = active.parse().ok()?;
    let msecs_acq = parse_leading_u64(rest.strip_prefix("msecs=")?)?;
    Some(Payload::DbAcquired {
        active_acq,
        msecs_acq,
    })
}

fn match_db_finished(payload: &str) -> Option<Payload> {
    let msecs = payload.strip_prefix("DB query finished msecs=")?;
    Some(Payload::DbFinished {
        msecs_finish: parse_leading_u64(msecs)?,
    })
}

fn match_rows_size(payload: &str) -> Option<Payload> {
    let rest = payload.strip_prefix("rows=")?;
    let (rows, rest) = rest.split_once(", full size=")?;
    Some(Payload::RowsSize {
        rows: rows.parse().ok()?,
        size: parse_leading_u64(rest)?,
    })
}

fn match_stop(payload: &str) -> Option<Payload> {
    let rest = payload.strip_prefix("stop threads=")?;
    let (threads, rest) = rest.split_once(' ')?;
    let threads_stop = threads.parse().ok()?;
    let msecs_stop = parse_leading_u64(rest.strip_prefix("msecs=")?)?;
    Some(Payload::Stop {
        threads_stop,
        msecs_stop,
    })
}

fn match_sql(payload: &str) -> Option<Payload> {
    payload.strip_prefix("SQL ").map(|sql| Payload::Sql {
        sql: sql.to_string(),
    })
}

fn match_acquiring(payload: &str) -> Option<Payload> {
    payload
        .strip_prefix("Acquiring DB ")
        .map(|dbacq| Payload::Acquiring {
            dbacq: dbacq.to_string(),
        })
}

fn match_executing(payload: &str) -> Option<Payload> {
    payload
        .starts_with("Executing DB query")
        .then_some(Payload::Executing)
}

fn match_keepalive_ack(payload: &str) -> Option<Payload> {
    let count = payload.strip_prefix("DB acquire sent keepalive ")?;
    Some(Payload::KeepaliveAck {
        kaacq: parse_leading_u64(count)?,
    })
}

fn match_error(payload: &str) -> Option<Payload> {
    payload.strip_prefix("Error ").map(|error| Payload::Error {
        error: error.to_string(),
    })
}

fn match_client(payload: &str) -> Option<Payload> {
    payload
        .strip_prefix("Client ")
        .map(|client| Payload::Client {
            client: client.to_string(),
        })
}

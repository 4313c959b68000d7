//! The reconstructed request record: fixed typed schema, lifecycle enums,
//! and the optional-field partial update applied by the lifecycle engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state. Only ever advances: queued -> executing -> finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Queued,
    Executing,
    Finished,
}

impl RecordState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::Queued => "queued",
            RecordState::Executing => "executing",
            RecordState::Finished => "finished",
        }
    }
}

/// How a request finished. Set exactly when the state reaches `Finished`.
///
/// `TimedOut` is reserved for external supervisors; no parsed line
/// produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishMode {
    Ok,
    TimedOut,
    Aborted,
}

impl FinishMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishMode::Ok => "ok",
            FinishMode::TimedOut => "timed-out",
            FinishMode::Aborted => "aborted",
        }
    }
}

/// One reconstructed request.
///
/// Created only by a *start* line; mutated in place by every later line
/// that resolves to its key; destroyed only by window eviction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub servlet: String,
    pub version: String,
    pub query: String,
    pub who: String,
    pub fid: String,
    pub forward: Option<String>,
    pub via: Option<String>,
    pub state: RecordState,
    pub finish_mode: Option<FinishMode>,
    pub threads_start: u64,
    pub threads_stop: Option<u64>,
    pub msecs_acq: Option<u64>,
    pub msecs_finish: Option<u64>,
    pub msecs_stop: Option<u64>,
    pub rows: Option<u64>,
    pub size: Option<u64>,
    pub active_acq: Option<u64>,
    /// Last keep-alive delta seen on the wire.
    pub kaacq: Option<u64>,
    /// Accumulated keep-alive count (sum of the deltas).
    pub keepalives: u64,
    pub error: Option<String>,
    pub sql: Option<String>,
    pub dbacq: Option<String>,
    /// First-seen client diagnostic; later ones are conflicts.
    pub client: Option<String>,
    /// Set exactly once, at creation. Microseconds.
    pub time_start: i64,
    pub time_stop: Option<i64>,
}

/// Fields from a *start* line, used to allocate a record.
#[derive(Debug, Clone)]
pub struct StartFields {
    pub servlet: String,
    pub version: String,
    pub threads_start: u64,
    pub query: String,
    pub who: String,
    pub fid: String,
    pub forward: Option<String>,
    pub via: Option<String>,
}

impl Record {
    /// Allocates a freshly started record: queued, zero keep-alives,
    /// `time_start` fixed at `timestamp_usecs`.
    pub fn started(fields: StartFields, timestamp_usecs: i64) -> Self {
        Record {
            servlet: fields.servlet,
            version: fields.version,
            query: fields.query,
            who: fields.who,
            fid: fields.fid,
            forward: fields.forward,
            via: fields.via,
            state: RecordState::Queued,
            finish_mode: None,
            threads_start: fields.threads_start,
            threads_stop: None,
            msecs_acq: None,
            msecs_finish: None,
            msecs_stop: None,
            rows: None,
            size: None,
            active_acq: None,
            kaacq: None,
            keepalives: 0,
            error: None,
            sql: None,
            dbacq: None,
            client: None,
            time_start: timestamp_usecs,
            time_stop: None,
        }
    }

    /// Merges `update` into the record: fields present in the update
    /// replace same-named fields, absent fields are untouched.
    pub fn apply(&mut self, update: RecordUpdate) {
        if let Some(v) = update.state {
            self.state = v;
        }
        if let Some(v) = update.finish_mode {
            self.finish_mode = Some(v);
        }
        if let Some(v) = update.threads_stop {
            self.threads_stop = Some(v);
        }
        if let Some(v) = update.msecs_acq {
            self.msecs_acq = Some(v);
        }
        if let Some(v) = update.msecs_finish {
            self.msecs_finish = Some(v);
        }
        if let Some(v) = update.msecs_stop {
            self.msecs_stop = Some(v);
        }
        if let Some(v) = update.rows {
            self.rows = Some(v);
        }
        if let Some(v) = update.size {
            self.size = Some(v);
        }
        if let Some(v) = update.active_acq {
            self.active_acq = Some(v);
        }
        if let Some(v) = update.kaacq {
            self.kaacq = Some(v);
        }
        if let Some(v) = update.keepalives {
            self.keepalives = v;
        }
        if let Some(v) = update.error {
            self.error = Some(v);
        }
        if let Some(v) = update.sql {
            self.sql = Some(v);
        }
        if let Some(v) = update.dbacq {
            self.dbacq = Some(v);
        }
        if let Some(v) = update.client {
            self.client = Some(v);
        }
        if let Some(v) = update.time_stop {
            self.time_stop = Some(v);
        }
    }

    /// By-name read access for rule-driven consumers (statistics, display).
    /// Returns `None` for unknown names and for fields not yet populated.
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "servlet" => Some(FieldValue::Str(&self.servlet)),
            "version" => Some(FieldValue::Str(&self.version)),
            "query" => Some(FieldValue::Str(&self.query)),
            "who" => Some(FieldValue::Str(&self.who)),
            "fid" => Some(FieldValue::Str(&self.fid)),
            "forward" => self.forward.as_deref().map(FieldValue::Str),
            "via" => self.via.as_deref().map(FieldValue::Str),
            "state" => Some(FieldValue::Str(self.state.as_str())),
            "finish_mode" => self.finish_mode.map(|m| FieldValue::Str(m.as_str())),
            "threads_start" => Some(FieldValue::Int(self.threads_start as i64)),
            "threads_stop" => self.threads_stop.map(|v| FieldValue::Int(v as i64)),
            "msecs_acq" => self.msecs_acq.map(|v| FieldValue::Int(v as i64)),
            "msecs_finish" => self.msecs_finish.map(|v| FieldValue::Int(v as i64)),
            "msecs_stop" => self.msecs_stop.map(|v| FieldValue::Int(v as i64)),
            "rows" => self.rows.map(|v| FieldValue::Int(v as i64)),
            "size" => self.size.map(|v| FieldValue::Int(v as i64)),
            "active_acq" => self.active_acq.map(|v| FieldValue::Int(v as i64)),
            "kaacq" => self.kaacq.map(|v| FieldValue::Int(v as i64)),
            "keepalives" => Some(FieldValue::Int(self.keepalives as i64)),
            "error" => self.error.as_deref().map(FieldValue::Str),
            "sql" => self.sql.as_deref().map(FieldValue::Str),
            "dbacq" => self.dbacq.as_deref().map(FieldValue::Str),
            "client" => self.client.as_deref().map(FieldValue::Str),
            "time_start" => Some(FieldValue::Int(self.time_start)),
            "time_stop" => self.time_stop.map(FieldValue::Int),
            _ => None,
        }
    }
}

/// A typed field value as seen through by-name access.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Str(&'a str),
    Int(i64),
}

impl FieldValue<'_> {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Str(_) => None,
        }
    }

    /// String-form comparison, as rule files express values as text.
    pub fn matches(&self, text: &str) -> bool {
        match self {
            FieldValue::Str(v) => *v == text,
            FieldValue::Int(v) => v.to_string() == text,
        }
    }
}

impl fmt::Display for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(v) => f.write_str(v),
            FieldValue::Int(v) => write!(f, "{v}"),
        }
    }
}

/// Partial update: only fields present here are written.
///
/// Identity fields fixed at creation (servlet, version, query, who, fid,
/// forward, via, time_start) are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub state: Option<RecordState>,
    pub finish_mode: Option<FinishMode>,
    pub threads_stop: Option<u64>,
    pub msecs_acq: Option<u64>,
    pub msecs_finish: Option<u64>,
    pub msecs_stop: Option<u64>,
    pub rows: Option<u64>,
    pub size: Option<u64>,
    pub active_acq: Option<u64>,
    pub kaacq: Option<u64>,
    pub keepalives: Option<u64>,
    pub error: Option<String>,
    pub sql: Option<String>,
    pub dbacq: Option<String>,
    pub client: Option<String>,
    pub time_stop: Option<i64>,
}

//! Stateful correlation of servlet log lines into request records, bounded
//! by a sliding time window.
//!
//! One `Watcher` owns the whole pipeline for one log stream: classify each
//! line, drive the addressed record through its lifecycle, then evict from
//! the front of the history queue until the retained span fits the window.
//! Lines must be fed strictly in arrival order — line order is the only
//! correlation signal for trailing failure traces.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::classify::{LineEvent, Payload, RequestEvent, classify};
use crate::record::{FinishMode, Record, RecordState, RecordStore, RecordUpdate, StartFields};
use crate::util::time::{TimestampMode, now_usecs};

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Length of the trailing window, in seconds.
    pub window_length_secs: u64,
    /// Log-embedded timestamps (replay-safe) or arrival time.
    pub timestamp_mode: TimestampMode,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            window_length_secs: 60,
            timestamp_mode: TimestampMode::LogEmbedded,
        }
    }
}

/// The most recently touched keyed record, used to attribute unkeyed
/// failure-trace lines. The timestamp rides along so trace finishes stay
/// on the log clock when replaying.
struct LastActive {
    key: String,
    timestamp_usecs: i64,
}

pub struct Watcher {
    window_length_usecs: i64,
    timestamp_mode: TimestampMode,
    store: RecordStore,
    /// Keys in start-arrival order; eviction order. May hold duplicate
    /// entries for restarted keys.
    history: VecDeque<String>,
    /// Smallest start time among retained records, maintained
    /// incrementally (min-updated on start, advanced on eviction).
    oldest_start_usecs: Option<i64>,
    /// Largest timestamp observed at any finish event.
    newest_stop_usecs: Option<i64>,
    last_active: Option<LastActive>,
}

impl Watcher {
    pub fn new(config: WatcherConfig) -> Self {
        Self {
            window_length_usecs: config.window_length_secs as i64 * 1_000_000,
            timestamp_mode: config.timestamp_mode,
            store: RecordStore::new(),
            history: VecDeque::new(),
            oldest_start_usecs: None,
            newest_stop_usecs: None,
            last_active: None,
        }
    }

    /// Ingests one raw log line: classify, correlate, evict.
    pub fn advance(&mut self, line: &str) {
        match classify(line) {
            LineEvent::Request(event) => self.apply_request(event),
            LineEvent::Trace => self.apply_trace(),
            LineEvent::TraceFrame | LineEvent::Empty => {}
            LineEvent::Unrecognized => warn!(line, "unrecognized input line"),
        }
        self.evict();
    }

    fn apply_request(&mut self, event: RequestEvent) {
        let RequestEvent {
            key,
            servlet,
            timestamp_usecs,
            payload,
            ..
        } = event;
        let timestamp = self.resolve_timestamp(timestamp_usecs);

        match payload {
            Payload::Start {
                version,
                threads_start,
                query,
                who,
                fid,
                forward,
                via,
            } => {
                if self.oldest_start_usecs.is_none_or(|t| t > timestamp) {
                    self.oldest_start_usecs = Some(timestamp);
                }

                let record = Record::started(
                    StartFields {
                        servlet,
                        version,
                        threads_start,
                        query,
                        who,
                        fid,
                        forward,
                        via,
                    },
                    timestamp,
                );
                if self.store.insert(key.clone(), record).is_some() {
                    warn!(%key, "restart while still tracked; previous record replaced");
                }
                self.history.push_back(key.clone());
                self.last_active = Some(LastActive {
                    key,
                    timestamp_usecs: timestamp,
                });
            }
            Payload::Unmatched => {
                // A known key means the line belongs to a tracked request
                // and still counts as activity on it; an unknown key has
                // nothing to attach to and is dropped quietly.
                if self.store.contains(&key) {
                    warn!(%key, "unrecognized payload for tracked request");
                    self.last_active = Some(LastActive {
                        key,
                        timestamp_usecs: timestamp,
                    });
                }
            }
            payload => {
                if !self.store.contains(&key) {
                    trace!(%key, "event for untracked request dropped");
                    return;
                }
                self.last_active = Some(LastActive {
                    key: key.clone(),
                    timestamp_usecs: timestamp,
                });
                self.apply_keyed(&key, timestamp, payload);
            }
        }
    }

    /// Applies a non-start payload to a record known to exist.
    fn apply_keyed(&mut self, key: &str, timestamp_usecs: i64, payload: Payload) {
        let mut update = RecordUpdate::default();
        let mut finish = None;

        match payload {
            Payload::DbAcquired {
                active_acq,
                msecs_acq,
            } => {
                update.active_acq = Some(active_acq);
                update.msecs_acq = Some(msecs_acq);
            }
            Payload::DbFinished { msecs_finish } => update.msecs_finish = Some(msecs_finish),
            Payload::RowsSize { rows, size } => {
                update.rows = Some(rows);
                update.size = Some(size);
            }
            Payload::Stop {
                threads_stop,
                msecs_stop,
            } => {
                update.threads_stop = Some(threads_stop);
                update.msecs_stop = Some(msecs_stop);
                finish = Some(FinishMode::Ok);
            }
            Payload::Sql { sql } => update.sql = Some(sql),
            Payload::Acquiring { dbacq } => update.dbacq = Some(dbacq),
            Payload::Executing => {
                // States only advance; a finished record stays finished.
                if self.store.get(key).map(|r| r.state) == Some(RecordState::Queued) {
                    update.state = Some(RecordState::Executing);
                }
            }
            Payload::KeepaliveAck { kaacq } => {
                if let Some(record) = self.store.get(key) {
                    update.kaacq = Some(kaacq);
                    update.keepalives = Some(record.keepalives + kaacq);
                }
            }
            Payload::Error { error } => update.error = Some(error),
            Payload::Client { client } => {
                if let Some(existing) = self.store.get(key).and_then(|r| r.client.as_deref()) {
                    warn!(key, existing, discarded = %client, "duplicate client message");
                    return;
                }
                update.client = Some(client);
            }
            // Handled by the caller; defensive no-op here.
            Payload::Start { .. } | Payload::Unmatched => return,
        }

        self.store.update(key, update);
        if let Some(mode) = finish {
            self.finish(key, timestamp_usecs, mode);
        }
    }

    /// An unkeyed failure trace finishes the last active record as aborted.
    fn apply_trace(&mut self) {
        let Some(last) = &self.last_active else {
            trace!("failure trace with no active request dropped");
            return;
        };
        let timestamp = match self.timestamp_mode {
            TimestampMode::Ingestion => now_usecs(),
            TimestampMode::LogEmbedded => last.timestamp_usecs,
        };
        let key = last.key.clone();
        self.finish(&key, timestamp, FinishMode::Aborted);
    }

    /// Terminal transition. The only path that advances `newest_stop`.
    fn finish(&mut self, key: &str, timestamp_usecs: i64, mode: FinishMode) {
        let Some(record) = self.store.get(key) else {
            debug!(key, "finish for untracked request dropped");
            return;
        };
        if record.state == RecordState::Finished {
            debug!(key, "already finished; first finish kept");
            return;
        }

        self.store.update(
            key,
            RecordUpdate {
                time_stop: Some(timestamp_usecs),
                state: Some(RecordState::Finished),
                finish_mode: Some(mode),
                ..Default::default()
            },
        );

        if self.newest_stop_usecs.is_none_or(|t| t < timestamp_usecs) {
            self.newest_stop_usecs = Some(timestamp_usecs);
        }
    }

    /// Pops from the front of the history queue until the retained span
    /// fits the window. The popped record's own start time becomes the new
    /// `oldest_start`; a popped key that is already gone (duplicate entry
    /// from a restart) leaves `oldest_start` untouched and the loop
    /// continues.
    fn evict(&mut self) {
        while self.window_span_usecs() > self.window_length_usecs {
            let Some(dropped) = self.history.pop_front() else {
                break;
            };
            if let Some(started) = self.store.get(&dropped).map(|r| r.time_start) {
                self.oldest_start_usecs = Some(started);
                self.store.delete(&dropped);
            }
        }
    }

    fn resolve_timestamp(&self, log_timestamp: Option<i64>) -> i64 {
        match self.timestamp_mode {
            TimestampMode::LogEmbedded => log_timestamp.unwrap_or_else(now_usecs),
            TimestampMode::Ingestion => now_usecs(),
        }
    }

    fn window_span_usecs(&self) -> i64 {
        match (self.oldest_start_usecs, self.newest_stop_usecs) {
            (Some(oldest), Some(newest)) if newest > oldest => newest - oldest,
            _ => 0,
        }
    }

    /// Current retained span in seconds.
    pub fn window_span_secs(&self) -> f64 {
        self.window_span_usecs() as f64 * 1e-6
    }

    /// Entries in the history queue (restarted keys count twice).
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Distinct records currently retained.
    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.store.get(key)
    }

    /// Stable, read-only view of the retained records for downstream
    /// consumers (statistics, display).
    pub fn records(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.store.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::time::parse_log_timestamp_usecs;

    const START_PAYLOAD: &str = "servlet_version:3.30 start threads:1 query /type=frontier_request:1:DEFAULT raddr 127.0.0.1 frontier-id: CMSSW_5_3_8 2.8.5";

    fn line(time: &str, id: &str, payload: &str) -> String {
        format!("FrontierPrep 08/05/13 {time} CEST +0200 id={id} {payload}")
    }

    fn usecs(time: &str) -> i64 {
        parse_log_timestamp_usecs("08/05/13", time).unwrap()
    }

    fn watcher(window_length_secs: u64) -> Watcher {
        Watcher::new(WatcherConfig {
            window_length_secs,
            timestamp_mode: TimestampMode::LogEmbedded,
        })
    }

    #[test]
    fn start_creates_exactly_one_record() {
        let mut w = watcher(60);
        w.advance(&line("19:34:35.622", "293476", START_PAYLOAD));

        assert_eq!(w.record_count(), 1);
        assert_eq!(w.history_len(), 1);
        let record = w.get("FrontierPrep293476").unwrap();
        assert_eq!(record.state, RecordState::Queued);
        assert_eq!(record.keepalives, 0);
        assert_eq!(record.time_start, usecs("19:34:35.622"));
        assert_eq!(record.threads_start, 1);
    }

    #[test]
    fn stop_finalizes_the_record() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        w.advance(&line("19:00:05.000", "1", "stop threads=1 msecs=120"));

        let record = w.get("FrontierPrep1").unwrap();
        assert_eq!(record.state, RecordState::Finished);
        assert_eq!(record.finish_mode, Some(FinishMode::Ok));
        assert_eq!(record.threads_stop, Some(1));
        assert_eq!(record.msecs_stop, Some(120));
        assert_eq!(record.time_stop, Some(usecs("19:00:05.000")));
        assert!((w.window_span_secs() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn lifecycle_advances_through_executing() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        w.advance(&line("19:00:01.000", "1", "Executing DB query"));
        assert_eq!(
            w.get("FrontierPrep1").unwrap().state,
            RecordState::Executing
        );

        w.advance(&line("19:00:02.000", "1", "stop threads=1 msecs=120"));
        assert_eq!(w.get("FrontierPrep1").unwrap().state, RecordState::Finished);
    }

    #[test]
    fn executing_never_regresses_a_finished_record() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        w.advance(&line("19:00:01.000", "1", "stop threads=1 msecs=10"));
        w.advance(&line("19:00:02.000", "1", "Executing DB query"));

        assert_eq!(w.get("FrontierPrep1").unwrap().state, RecordState::Finished);
    }

    #[test]
    fn second_finish_keeps_the_first_mode() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        w.advance("java.lang.Exception: X-frontier-id header missing");
        w.advance(&line("19:00:03.000", "1", "stop threads=1 msecs=10"));

        let record = w.get("FrontierPrep1").unwrap();
        assert_eq!(record.finish_mode, Some(FinishMode::Aborted));
        // The stop line's measurements still land on the record.
        assert_eq!(record.threads_stop, Some(1));
        assert_eq!(record.time_stop, Some(usecs("19:00:00.000")));
    }

    #[test]
    fn keepalives_accumulate() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        w.advance(&line("19:00:01.000", "1-ka", "DB acquire sent keepalive 2"));
        w.advance(&line("19:00:02.000", "1-ka", "DB acquire sent keepalive 3"));

        let record = w.get("FrontierPrep1").unwrap();
        assert_eq!(record.keepalives, 5);
        assert_eq!(record.kaacq, Some(3));
    }

    #[test]
    fn trace_aborts_the_last_active_record() {
        let mut w = watcher(60);
        w.advance(&line("19:34:35.622", "293476", START_PAYLOAD));
        w.advance("-- unrelated noise --");
        w.advance("java.lang.Exception: X-frontier-id header missing");
        w.advance("        at gov.fnal.frontier.Frontier.logClientDesc(Frontier.java:429)");

        let record = w.get("FrontierPrep293476").unwrap();
        assert_eq!(record.state, RecordState::Finished);
        assert_eq!(record.finish_mode, Some(FinishMode::Aborted));
        assert_eq!(record.time_stop, Some(usecs("19:34:35.622")));
    }

    #[test]
    fn trace_follows_the_most_recently_touched_key() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        w.advance(&line("19:00:01.000", "2", START_PAYLOAD));
        // An unmatched payload for a tracked key still counts as activity.
        w.advance(&line("19:00:02.000", "1", "DB connection released remaining=5"));
        w.advance("java.lang.Exception: connection reset");

        assert_eq!(
            w.get("FrontierPrep1").unwrap().finish_mode,
            Some(FinishMode::Aborted)
        );
        assert_eq!(w.get("FrontierPrep2").unwrap().state, RecordState::Queued);
    }

    #[test]
    fn orphan_trace_is_dropped() {
        let mut w = watcher(60);
        w.advance("java.lang.Exception: nothing to correlate to");
        assert_eq!(w.record_count(), 0);
    }

    #[test]
    fn orphan_keyed_events_are_dropped() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "9", "stop threads=1 msecs=120"));
        w.advance(&line("19:00:01.000", "9", "DB query finished msecs=5"));
        assert_eq!(w.record_count(), 0);
        assert_eq!(w.history_len(), 0);
    }

    #[test]
    fn client_conflict_keeps_the_first_message() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        w.advance(&line("19:00:01.000", "1", "Client disconnected early"));
        w.advance(&line("19:00:02.000", "1", "Client went away again"));

        assert_eq!(
            w.get("FrontierPrep1").unwrap().client.as_deref(),
            Some("disconnected early")
        );
    }

    #[test]
    fn window_invariant_holds_after_every_line() {
        let mut w = watcher(60);
        let lines = [
            line("19:00:00.000", "1", START_PAYLOAD),
            line("19:00:10.000", "1", "stop threads=1 msecs=100"),
            line("19:00:30.000", "2", START_PAYLOAD),
            line("19:01:30.000", "2", "stop threads=1 msecs=100"),
            line("19:02:00.000", "3", START_PAYLOAD),
            line("19:03:30.000", "3", "stop threads=1 msecs=100"),
        ];
        for l in &lines {
            w.advance(l);
            assert!(
                w.history_len() == 0 || w.window_span_secs() <= 60.0,
                "span {} with {} queued",
                w.window_span_secs(),
                w.history_len()
            );
        }
    }

    #[test]
    fn eviction_is_fifo_by_start_arrival() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        w.advance(&line("19:01:30.000", "2", START_PAYLOAD));
        w.advance(&line("19:01:40.000", "3", START_PAYLOAD));
        w.advance(&line("19:01:50.000", "3", "stop threads=1 msecs=100"));

        // Span 110s: the two oldest starts go, the newest survives.
        assert!(w.get("FrontierPrep1").is_none());
        assert!(w.get("FrontierPrep2").is_none());
        assert!(w.get("FrontierPrep3").is_some());
        assert_eq!(w.history_len(), 1);
    }

    #[test]
    fn records_never_die_on_the_processing_path() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        w.advance(&line("19:00:10.000", "1", "stop threads=1 msecs=100"));
        // Finishing alone never deletes; only window pressure does.
        assert_eq!(w.record_count(), 1);
    }

    #[test]
    fn restart_overwrites_and_double_enqueues() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "5", START_PAYLOAD));
        w.advance(&line("19:00:10.000", "5", START_PAYLOAD));

        assert_eq!(w.record_count(), 1);
        assert_eq!(w.history_len(), 2);
        assert_eq!(
            w.get("FrontierPrep5").unwrap().time_start,
            usecs("19:00:10.000")
        );
    }

    #[test]
    fn duplicate_queue_entries_evict_safely() {
        let mut w = watcher(60);
        w.advance(&line("19:00:00.000", "5", START_PAYLOAD));
        w.advance(&line("19:00:10.000", "5", START_PAYLOAD));
        w.advance(&line("19:02:00.000", "5", "stop threads=1 msecs=100"));

        // First pop evicts the live record; the stale duplicate entry must
        // not disturb oldest_start or crash.
        assert_eq!(w.record_count(), 0);
        assert_eq!(w.history_len(), 0);
        assert!((w.window_span_secs() - 110.0).abs() < 1e-6);
    }

    #[test]
    fn span_is_zero_before_any_finish() {
        let mut w = watcher(60);
        assert_eq!(w.window_span_secs(), 0.0);
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        assert_eq!(w.window_span_secs(), 0.0);
    }

    #[test]
    fn ingestion_mode_stamps_arrival_time() {
        let before = now_usecs();
        let mut w = Watcher::new(WatcherConfig {
            window_length_secs: 60,
            timestamp_mode: TimestampMode::Ingestion,
        });
        // The embedded 2013 timestamp must be ignored.
        w.advance(&line("19:00:00.000", "1", START_PAYLOAD));
        assert!(w.get("FrontierPrep1").unwrap().time_start >= before);
    }
}

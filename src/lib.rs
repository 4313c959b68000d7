//! frontier-watch — reconstructs request lifecycles from Frontier server logs.
//!
//! A Frontier Tomcat servlet reports each request over several, possibly
//! interleaved log lines sharing an `id=`. This library correlates those
//! lines into per-request records and keeps a sliding time window of recent
//! activity in bounded memory. Shared between:
//! - `watch-tomcat` - servlet log watcher with periodic rankings
//! - `watch-squid` - one-shot parser for the matching squid access log
//!
//! Modules:
//! - `classify` — line classifier: general-form split plus the ordered
//!   payload matcher cascade
//! - `record` — request record schema, partial updates, keyed store
//! - `watcher` — lifecycle engine, history queue, window evictor
//! - `stats` — filter/group/weight aggregation over retained records
//! - `squid` — independent squid access-log single-line parser
//! - `source` — line sources: stdin and a rotating-file tailer
//! - `util` — timestamps and cooperative cancellation

pub mod classify;
pub mod record;
pub mod source;
pub mod squid;
pub mod stats;
pub mod util;
pub mod watcher;

//! Shared utilities: timestamps and cooperative cancellation.

pub mod cancel;
pub mod time;

pub use cancel::CancelToken;
pub use time::{TimestampMode, now_usecs, parse_log_timestamp_usecs};

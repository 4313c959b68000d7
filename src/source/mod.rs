//! Line sources for the ingestion loop.
//!
//! The loop blocks only while waiting for the next line; the cancellation
//! token is checked at that boundary. Standard input ends the loop at EOF,
//! follow mode polls the file and naps between empty polls.

pub mod tailer;

pub use tailer::LogTailer;

use std::io::{self, BufRead};
use std::time::Duration;

use crate::util::cancel::CancelToken;

/// Pause between empty polls in follow mode.
const FOLLOW_IDLE: Duration = Duration::from_millis(250);

pub enum LineSource {
    Stdin,
    Follow(LogTailer),
}

impl LineSource {
    /// Feeds `sink` one line at a time until end of input or cancellation.
    ///
    /// An interrupted read (signal during shutdown) ends the loop cleanly
    /// rather than surfacing as an error.
    pub fn drain(&mut self, cancel: &CancelToken, mut sink: impl FnMut(&str)) -> io::Result<()> {
        match self {
            LineSource::Stdin => {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    match line {
                        Ok(line) => sink(&line),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
            LineSource::Follow(tailer) => {
                while !cancel.is_cancelled() {
                    let lines = tailer.poll()?;
                    if lines.is_empty() {
                        cancel.sleep(FOLLOW_IDLE);
                        continue;
                    }
                    for line in &lines {
                        sink(line);
                    }
                }
                Ok(())
            }
        }
    }
}

//! Follow-mode reader for a growing log file.
//!
//! Starts at the end of the file and drains newly appended lines on each
//! poll. Rotation is detected by inode change (Linux) or truncation; a
//! temporarily missing file (rotation in progress) reads as no data.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Upper bound on lines drained per poll, so a large backlog cannot pin
/// the ingestion loop (or memory) in one call.
const MAX_LINES_PER_POLL: usize = 10_000;

pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    inode: u64,
}

impl LogTailer {
    /// Opens `path` for following, positioned at the current end of file.
    /// Fails if the file cannot be stat'd.
    pub fn follow(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = fs::metadata(&path)?;
        Ok(Self {
            offset: metadata.len(),
            inode: inode_of(&metadata),
            path,
        })
    }

    /// Drains lines appended since the last poll, at most
    /// `MAX_LINES_PER_POLL` of them. Returns an empty vec when there is
    /// nothing new or the file is momentarily gone.
    pub fn poll(&mut self) -> io::Result<Vec<String>> {
        let metadata = match fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let current_inode = inode_of(&metadata);
        if current_inode != self.inode || metadata.len() < self.offset {
            // Rotated or truncated: restart from the top of the new file.
            self.inode = current_inode;
            self.offset = 0;
        }

        if metadata.len() <= self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;

        let reader = BufReader::new(&file);
        let mut lines = Vec::new();
        for line in reader.lines() {
            lines.push(line?);
            if lines.len() >= MAX_LINES_PER_POLL {
                break;
            }
        }

        self.offset = file.stream_position()?;
        Ok(lines)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn inode_of(metadata: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ino()
}

/// Non-Unix fallback; rotation detection then rests on truncation alone.
#[cfg(not(unix))]
fn inode_of(_metadata: &fs::Metadata) -> u64 {
    0
}

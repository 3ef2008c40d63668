use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Outcome of one poll tick.
#[derive(Debug, PartialEq, Eq)]
pub enum TailPoll {
    /// Complete lines appended since the last poll, in file order.
    Lines(Vec<String>),
    /// The file could not be read (or created when missing). Transient: the
    /// caller retries on its next tick, position is left unchanged.
    Unavailable,
}

/// Incrementally reads newly appended bytes of a growing log file.
///
/// The byte position only moves forward, except when the file shrinks
/// (rotation/truncation), which resets it to 0 and re-reads from the start.
/// A trailing line with no `\n` terminator is held back in `carry` until it
/// completes; the extractor never sees a half-written line. The carry is
/// raw bytes so a write cut inside a multi-byte character is held back the
/// same way, and it is dropped on truncation since its continuation no
/// longer exists.
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    position: u64,
    carry: Vec<u8>,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            position: 0,
            carry: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Skip history already in the file; subsequent polls only yield lines
    /// appended after this call.
    pub async fn seek_to_end(&mut self) {
        if let Ok(meta) = tokio::fs::metadata(&self.path).await {
            self.position = meta.len();
        }
    }

    pub async fn poll(&mut self) -> TailPoll {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // The server may not have written its log yet; create an
                // empty one so tailing starts with the first real write.
                if let Err(e) = self.create_missing().await {
                    tracing::debug!(
                        path = %self.path.display(),
                        error = %e,
                        "log file missing and could not be created"
                    );
                    return TailPoll::Unavailable;
                }
                tracing::info!(path = %self.path.display(), "created missing log file");
                self.position = 0;
                self.carry.clear();
                return TailPoll::Lines(Vec::new());
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to stat log file");
                return TailPoll::Unavailable;
            }
        };

        let size = meta.len();
        if size < self.position {
            tracing::info!(
                path = %self.path.display(),
                old_position = self.position,
                new_size = size,
                "log file truncated, resetting position"
            );
            self.position = 0;
            self.carry.clear();
        }

        if size == self.position {
            return TailPoll::Lines(Vec::new());
        }

        let mut f = match tokio::fs::File::open(&self.path).await {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to open log file");
                return TailPoll::Unavailable;
            }
        };
        if let Err(e) = f.seek(SeekFrom::Start(self.position)).await {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to seek log file");
            return TailPoll::Unavailable;
        }

        // Read exactly the delta measured by the stat above; bytes appended
        // mid-read are picked up on the next tick. A concurrent truncation
        // makes read_exact fail, which lands in the transient retry path with
        // the position untouched.
        let mut buf = vec![0u8; (size - self.position) as usize];
        if let Err(e) = f.read_exact(&mut buf).await {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to read log file");
            return TailPoll::Unavailable;
        }
        self.position = size;

        let mut chunk = std::mem::take(&mut self.carry);
        chunk.extend_from_slice(&buf);

        // Split on raw newlines and decode complete lines only. Decoding the
        // chunk up front would mangle a multi-byte character whose trailing
        // bytes arrive on the next poll; those bytes must ride in the carry
        // intact. Within a complete line, invalid sequences are replaced
        // rather than failing the read.
        let mut lines = Vec::new();
        let mut rest = chunk.as_slice();
        while let Some(idx) = rest.iter().position(|&b| b == b'\n') {
            let (line, tail) = rest.split_at(idx);
            let line = String::from_utf8_lossy(line);
            lines.push(line.trim_end_matches('\r').to_string());
            rest = &tail[1..];
        }
        self.carry = rest.to_vec();

        TailPoll::Lines(lines)
    }

    async fn create_missing(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        Ok(())
    }
}

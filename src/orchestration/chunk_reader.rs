//! # Chunk Reader
//!
//! Streams the transactions of one partition. Lines before the partition's first line
//! are skipped and reading stops after its last line. A malformed line yields a parse
//! error for that line and the scan continues with the next one.

use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{BatchError, Result};
use crate::models::{LineFormat, Partition, Transaction};

pub struct ChunkReader {
    path: PathBuf,
    partition: Partition,
    format: LineFormat,
    reader: BufReader<File>,
    buffer: Vec<u8>,
    /// File line number of the most recently consumed line
    current_line: u64,
    lines_read: u64,
    exhausted: bool,
}

impl std::fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkReader")
            .field("path", &self.path)
            .field("partition", &self.partition)
            .field("current_line", &self.current_line)
            .field("lines_read", &self.lines_read)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl ChunkReader {
    /// Open `path` positioned before the file's first line
    pub async fn open(
        path: impl AsRef<Path>,
        partition: Partition,
        format: LineFormat,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|e| BatchError::io(&path, &e))?;

        Ok(Self {
            path,
            partition,
            format,
            reader: BufReader::new(file),
            buffer: Vec::with_capacity(256),
            current_line: 0,
            lines_read: 0,
            exhausted: false,
        })
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    /// Lines of this partition handed out so far, malformed ones included
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Next record of the partition, `None` once its range (or the file) is exhausted
    ///
    /// An I/O error ends the stream after it is returned.
    pub async fn next_record(&mut self) -> Option<Result<Transaction>> {
        loop {
            if self.exhausted || self.current_line >= self.partition.end_line {
                return None;
            }

            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer).await {
                Ok(0) => {
                    self.exhausted = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(BatchError::io(&self.path, &e)));
                }
            }

            self.current_line += 1;
            if self.current_line < self.partition.start_line {
                continue;
            }

            self.lines_read += 1;
            let line_number = self.current_line;
            return Some(match std::str::from_utf8(&self.buffer) {
                Ok(line) => Transaction::parse_line(line, line_number, &self.format),
                Err(e) => Err(BatchError::parse(
                    line_number,
                    format!("line is not valid UTF-8: {e}"),
                )),
            });
        }
    }
}

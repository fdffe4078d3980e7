//! Transaction file fixtures and test configurations.

#![allow(dead_code)]

use std::io::Write;
use tempfile::NamedTempFile;

use rewards_batch::config::RewardsBatchConfig;

pub const HEADER: &str = "customerId,timestamp,amount";

/// A well-formed data line; amount is `(n % 50) * 10 + 5`, so points are `n % 50`
pub fn valid_line(n: usize) -> String {
    format!(
        "C-{n:05},2024-05-01T{:02}:{:02}:00,{}.00",
        (n / 60) % 24,
        n % 60,
        (n % 50) * 10 + 5
    )
}

/// Builds a temporary transaction file line by line
#[derive(Debug, Clone)]
pub struct TransactionFileBuilder {
    lines: Vec<String>,
    line_ending: &'static str,
    trailing_newline: bool,
}

impl Default for TransactionFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionFileBuilder {
    pub fn new() -> Self {
        Self {
            lines: vec![HEADER.to_string()],
            line_ending: "\n",
            trailing_newline: true,
        }
    }

    /// Append `count` well-formed lines numbered from the current data line count
    pub fn valid_records(mut self, count: usize) -> Self {
        let start = self.lines.len() - 1;
        self.lines.extend((start..start + count).map(valid_line));
        self
    }

    pub fn line(mut self, raw: impl Into<String>) -> Self {
        self.lines.push(raw.into());
        self
    }

    /// Append `count` lines that fail to parse
    pub fn malformed_records(mut self, count: usize) -> Self {
        self.lines
            .extend((0..count).map(|n| format!("BAD-{n},not-a-timestamp,??")));
        self
    }

    pub fn crlf(mut self) -> Self {
        self.line_ending = "\r\n";
        self
    }

    pub fn without_trailing_newline(mut self) -> Self {
        self.trailing_newline = false;
        self
    }

    /// Total lines including the header
    pub fn total_lines(&self) -> usize {
        self.lines.len()
    }

    pub fn build(self) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("create temp file");
        let mut contents = self.lines.join(self.line_ending);
        if self.trailing_newline {
            contents.push_str(self.line_ending);
        }
        file.write_all(contents.as_bytes()).expect("write fixture");
        file.flush().expect("flush fixture");
        file
    }
}

/// Configuration with no retry backoff so tests run fast
pub fn test_config(
    partition_size: u64,
    chunk_size: usize,
    max_concurrency: usize,
) -> RewardsBatchConfig {
    let mut config = RewardsBatchConfig::default();
    config.job.partition_size = partition_size;
    config.job.chunk_size = chunk_size;
    config.job.max_concurrency = max_concurrency;
    config.fault_tolerance.backoff_base_ms = 0;
    config.fault_tolerance.backoff_max_ms = 0;
    config.fault_tolerance.backoff_jitter_factor = 0.0;
    config
}

//! # Range Partitioner
//!
//! Splits the data lines of an input file into contiguous, non-overlapping line ranges.
//! Line 1 is the header; partitions cover file lines `2..=T` exactly, where `T` is the
//! file's total line count.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{BatchError, Result};
use crate::models::Partition;

/// Computes the partitions of one input file
#[derive(Debug, Clone)]
pub struct RangePartitioner {
    path: PathBuf,
    partition_size: u64,
}

impl RangePartitioner {
    pub fn new(path: impl Into<PathBuf>, partition_size: u64) -> Self {
        Self {
            path: path.into(),
            partition_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count the file's lines and lay out the partitions
    ///
    /// Blocking; run it on a blocking thread from async code.
    pub fn partition(&self) -> Result<Vec<Partition>> {
        if self.partition_size == 0 {
            return Err(BatchError::configuration(
                "partition size must be greater than 0",
            ));
        }

        let total_lines = count_lines(&self.path)?;
        let partitions = compute_partitions(total_lines, self.partition_size);

        debug!(
            path = %self.path.display(),
            total_lines = total_lines,
            partition_size = self.partition_size,
            partition_count = partitions.len(),
            "Computed partitions"
        );

        Ok(partitions)
    }
}

/// Lay out partitions for a file of `total_lines` lines, header included
///
/// `partition_size` must be non-zero.
pub fn compute_partitions(total_lines: u64, partition_size: u64) -> Vec<Partition> {
    if total_lines <= 1 || partition_size == 0 {
        return Vec::new();
    }

    let data_lines = total_lines - 1;
    let partition_count = data_lines.div_ceil(partition_size);

    (0..partition_count)
        .map(|i| {
            let first_data_line = i * partition_size + 1;
            let last_data_line = ((i + 1) * partition_size).min(data_lines);
            // +1 shifts data-line numbers past the header into file-line numbers
            Partition::new(i as usize, first_data_line + 1, last_data_line + 1)
        })
        .collect()
}

/// Number of lines in the file
///
/// A final line without a trailing newline still counts; a trailing newline does not
/// start an extra empty line.
pub fn count_lines(path: &Path) -> Result<u64> {
    let file = File::open(path).map_err(|e| BatchError::io(path, &e))?;
    let mut reader = BufReader::new(file);
    let mut count = 0u64;
    let mut ends_with_newline = true;

    loop {
        let buffer = reader.fill_buf().map_err(|e| BatchError::io(path, &e))?;
        if buffer.is_empty() {
            break;
        }
        count += buffer.iter().filter(|&&b| b == b'\n').count() as u64;
        ends_with_newline = buffer.last() == Some(&b'\n');
        let consumed = buffer.len();
        reader.consume(consumed);
    }

    if !ends_with_newline {
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_compute_partitions_301_lines() {
        let partitions = compute_partitions(301, 250);
        assert_eq!(
            partitions,
            vec![Partition::new(0, 2, 251), Partition::new(1, 252, 301)]
        );
        assert_eq!(partitions[0].line_count(), 250);
        assert_eq!(partitions[1].line_count(), 50);
    }

    #[test]
    fn test_compute_partitions_exact_multiple() {
        let partitions = compute_partitions(501, 250);
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[1].end_line, 501);
    }

    #[test]
    fn test_header_only_and_empty_yield_nothing() {
        assert!(compute_partitions(0, 250).is_empty());
        assert!(compute_partitions(1, 250).is_empty());
        assert_eq!(compute_partitions(2, 250), vec![Partition::new(0, 2, 2)]);
    }

    #[test]
    fn test_count_lines_with_and_without_trailing_newline() {
        assert_eq!(count_lines(file_with("").path()).unwrap(), 0);
        assert_eq!(count_lines(file_with("header").path()).unwrap(), 1);
        assert_eq!(count_lines(file_with("header\n").path()).unwrap(), 1);
        assert_eq!(count_lines(file_with("header\na\nb").path()).unwrap(), 3);
        assert_eq!(count_lines(file_with("header\na\nb\n").path()).unwrap(), 3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let partitioner = RangePartitioner::new("/nonexistent/transactions.csv", 250);
        assert!(matches!(partitioner.partition(), Err(BatchError::Io { .. })));
    }

    #[test]
    fn test_zero_partition_size_is_configuration_error() {
        let file = file_with("header\na\n");
        let partitioner = RangePartitioner::new(file.path(), 0);
        assert!(matches!(
            partitioner.partition(),
            Err(BatchError::Configuration { .. })
        ));
    }
}

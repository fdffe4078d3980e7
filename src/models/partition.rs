use serde::{Deserialize, Serialize};
use std::fmt;

/// A contiguous range of file lines assigned to one partition worker
///
/// Line numbers are 1-indexed file lines; line 1 is the header and is never part of a
/// partition. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub id: usize,
    pub start_line: u64,
    pub end_line: u64,
}

impl Partition {
    pub fn new(id: usize, start_line: u64, end_line: u64) -> Self {
        Self {
            id,
            start_line,
            end_line,
        }
    }

    /// Number of data lines covered
    pub fn line_count(&self) -> u64 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn contains(&self, line: u64) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }

    pub fn name(&self) -> String {
        format!("partition{}", self.id)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [lines {}..={}]",
            self.name(),
            self.start_line,
            self.end_line
        )
    }
}

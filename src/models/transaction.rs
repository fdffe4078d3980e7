//! Input transaction records and the delimited line format they are parsed from.

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::constants::defaults;
use crate::error::{BatchError, Result};

const FIELD_COUNT: usize = 3;

/// One purchase read from the transaction file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub customer_id: String,
    pub timestamp: NaiveDateTime,
    pub amount: BigDecimal,
}

/// Shape of a data line: `customerId<delim>timestamp<delim>amount`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFormat {
    pub delimiter: char,
    pub timestamp_format: String,
}

impl Default for LineFormat {
    fn default() -> Self {
        Self {
            delimiter: defaults::FIELD_DELIMITER,
            timestamp_format: defaults::TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl Transaction {
    /// Parse a single data line
    ///
    /// `line_number` is the 1-indexed file line and only feeds error messages.
    pub fn parse_line(line: &str, line_number: u64, format: &LineFormat) -> Result<Self> {
        let fields: Vec<&str> = line
            .trim_end_matches(['\r', '\n'])
            .split(format.delimiter)
            .map(clean_field)
            .collect();

        if fields.len() != FIELD_COUNT {
            return Err(BatchError::parse(
                line_number,
                format!("expected {FIELD_COUNT} fields, found {}", fields.len()),
            ));
        }

        let customer_id = fields[0];
        if customer_id.is_empty() {
            return Err(BatchError::parse(line_number, "customerId is empty"));
        }

        let timestamp = NaiveDateTime::parse_from_str(fields[1], &format.timestamp_format)
            .map_err(|e| {
                BatchError::parse(
                    line_number,
                    format!("invalid timestamp '{}': {e}", fields[1]),
                )
            })?;

        let amount = BigDecimal::from_str(fields[2]).map_err(|e| {
            BatchError::parse(line_number, format!("invalid amount '{}': {e}", fields[2]))
        })?;

        Ok(Self {
            customer_id: customer_id.to_string(),
            timestamp,
            amount,
        })
    }
}

/// Trim whitespace and one pair of surrounding double quotes
fn clean_field(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_parse_valid_line() {
        let tx = Transaction::parse_line(
            "C-1001,2024-05-01T09:30:00,105.00",
            2,
            &LineFormat::default(),
        )
        .unwrap();

        assert_eq!(tx.customer_id, "C-1001");
        assert_eq!(
            tx.timestamp,
            NaiveDate::from_ymd_opt(2024, 5, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap()
        );
        assert_eq!(tx.amount, BigDecimal::from_str("105.00").unwrap());
    }

    #[test]
    fn test_parse_trims_whitespace_quotes_and_crlf() {
        let tx = Transaction::parse_line(
            " \"C-7\" , 2024-05-01T09:30:00.250 , 9.99\r\n",
            5,
            &LineFormat::default(),
        )
        .unwrap();
        assert_eq!(tx.customer_id, "C-7");
        assert_eq!(tx.amount, BigDecimal::from_str("9.99").unwrap());
    }

    #[test]
    fn test_parse_custom_delimiter() {
        let format = LineFormat {
            delimiter: '|',
            ..LineFormat::default()
        };
        let tx = Transaction::parse_line("C-9|2024-01-31T23:59:59|-15.00", 2, &format).unwrap();
        assert_eq!(tx.amount, BigDecimal::from_str("-15.00").unwrap());
    }

    #[test]
    fn test_field_count_mismatch() {
        let err = Transaction::parse_line("C-1,2024-05-01T09:30:00", 7, &LineFormat::default())
            .unwrap_err();
        assert_eq!(err, BatchError::parse(7, "expected 3 fields, found 2"));

        let err = Transaction::parse_line("", 8, &LineFormat::default()).unwrap_err();
        assert!(matches!(err, BatchError::Parse { line: 8, .. }));
    }

    #[test]
    fn test_invalid_timestamp_and_amount() {
        let format = LineFormat::default();
        let err = Transaction::parse_line("C-1,yesterday,10.00", 3, &format).unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"));

        let err = Transaction::parse_line("C-1,2024-05-01T09:30:00,ten", 4, &format).unwrap_err();
        assert!(err.to_string().contains("invalid amount"));
    }

    #[test]
    fn test_empty_customer_id_rejected() {
        let err = Transaction::parse_line(" ,2024-05-01T09:30:00,10.00", 3, &LineFormat::default())
            .unwrap_err();
        assert!(err.to_string().contains("customerId is empty"));
    }
}

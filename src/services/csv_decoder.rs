//! Decoding of batch retirement uploads.
//!
//! The first line is a header that must name `creditId`, `amount` and `purpose`
//! (any order, any case, extra columns ignored). Each following line becomes a
//! [`BatchLine`]: rows with a bad shape are kept as rejected lines carrying a
//! reason, so they can be recorded as failed items without touching credits.

use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord, Trim};
use rust_decimal::Decimal;

use crate::{
    error::{ApiError, Result},
    models::{
        batch::{BatchLine, RetirementLine},
        common::amount_problem,
    },
};

const CREDIT_ID: &str = "creditId";
const AMOUNT: &str = "amount";
const PURPOSE: &str = "purpose";

struct Columns {
    credit_id: usize,
    amount: usize,
    purpose: usize,
}

impl Columns {
    fn from_header(header: &StringRecord) -> Result<Self> {
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let missing: Vec<&str> = [CREDIT_ID, AMOUNT, PURPOSE]
            .into_iter()
            .filter(|name| find(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::InvalidFormat(format!(
                "CSV header is missing required column(s): {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            credit_id: find(CREDIT_ID).unwrap_or_default(),
            amount: find(AMOUNT).unwrap_or_default(),
            purpose: find(PURPOSE).unwrap_or_default(),
        })
    }
}

/// Decode raw CSV text into batch lines, in row order.
///
/// Only a bad header fails the whole input; every other problem is reported on
/// its own line.
pub fn decode_batch_csv(raw: &str) -> Result<Vec<BatchLine>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(raw.as_bytes());

    let header = reader
        .headers()
        .map_err(|e| ApiError::InvalidFormat(format!("CSV header could not be read: {}", e)))?
        .clone();
    let columns = Columns::from_header(&header)?;

    let mut lines = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                // Header is line 1; without a position, count data rows after it
                let line = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(index as u64 + 2);
                lines.push(BatchLine::Rejected {
                    credit_id: None,
                    amount: None,
                    purpose: String::new(),
                    reason: format!("line {}: unreadable row: {}", line, e),
                });
                continue;
            }
        };

        // Whitespace-only lines; a row of bare delimiters is still a row
        if record.len() == 1 && record.iter().all(str::is_empty) {
            continue;
        }

        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(index as u64 + 2);
        lines.push(decode_row(&record, &columns, line));
    }

    Ok(lines)
}

fn decode_row(record: &StringRecord, columns: &Columns, line: u64) -> BatchLine {
    let credit_id = record
        .get(columns.credit_id)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let raw_amount = record.get(columns.amount);
    let purpose = record.get(columns.purpose).unwrap_or_default().to_string();

    let reject = |amount: Option<Decimal>, reason: String| BatchLine::Rejected {
        credit_id: credit_id.clone(),
        amount,
        purpose: purpose.clone(),
        reason: format!("line {}: {}", line, reason),
    };

    let Some(raw_amount) = raw_amount else {
        return reject(None, format!("row has no '{}' value", AMOUNT));
    };
    if record.get(columns.purpose).is_none() {
        return reject(None, format!("row has no '{}' value", PURPOSE));
    }

    if raw_amount.is_empty() {
        return reject(None, "amount is missing".to_string());
    }
    let amount = match Decimal::from_str(raw_amount) {
        Ok(amount) => amount,
        Err(_) => return reject(None, format!("amount '{}' is not a number", raw_amount)),
    };
    if let Some(reason) = amount_problem(amount) {
        return reject(Some(amount), reason);
    }
    if purpose.is_empty() {
        return reject(Some(amount), "purpose is required".to_string());
    }

    BatchLine::Ready(RetirementLine {
        credit_id,
        amount,
        purpose,
    })
}

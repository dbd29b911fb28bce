use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    model::ProcessingStatus,
};

/// Default number of line items returned when the caller does not ask for
/// a specific count.
pub const DEFAULT_LINE_ITEM_LIMIT: usize = 20;

/// Search criteria for invoice line items: free text plus structural,
/// invoice-context, date, and amount filters.
///
/// Date fields are carried as ISO `YYYY-MM-DD` strings (they arrive from
/// LLM tool calls and CLI flags) and are validated before any query plan
/// executes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineItemCriteria {
    /// Semantic search terms. Empty when the caller only wants
    /// structural filtering.
    pub query_text: Option<String>,

    /// Exact page number; takes precedence over the page range.
    pub page_number: Option<u32>,
    /// Start of a page range, inclusive.
    pub min_page: Option<u32>,
    /// End of a page range, inclusive.
    pub max_page: Option<u32>,

    /// Exact invoice number of the parent document.
    pub invoice_number: Option<String>,
    /// Sender/vendor name, matched case-insensitively as a substring.
    pub sender_name: Option<String>,

    /// Parent invoice issued on or after this date (YYYY-MM-DD).
    pub invoice_date_start: Option<String>,
    /// Parent invoice issued on or before this date (YYYY-MM-DD).
    pub invoice_date_end: Option<String>,

    /// Minimum line-item total amount, inclusive.
    pub min_amount: Option<f64>,
    /// Maximum line-item total amount, inclusive.
    pub max_amount: Option<f64>,

    /// Result cap; must be greater than zero.
    pub limit: usize,
}

impl Default for LineItemCriteria {
    fn default() -> Self {
        Self {
            query_text: None,
            page_number: None,
            min_page: None,
            max_page: None,
            invoice_number: None,
            sender_name: None,
            invoice_date_start: None,
            invoice_date_end: None,
            min_amount: None,
            max_amount: None,
            limit: DEFAULT_LINE_ITEM_LIMIT,
        }
    }
}

impl LineItemCriteria {
    /// Whether any invoice-level filter is set, requiring parent-context
    /// resolution before the child query runs.
    pub fn has_invoice_filters(&self) -> bool {
        self.invoice_number.is_some()
            || self.sender_name.is_some()
            || self.invoice_date_start.is_some()
            || self.invoice_date_end.is_some()
    }
}

/// Search criteria for whole invoices. Purely structured; invoice searches
/// never use vector retrieval and are always capped at a fixed size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceCriteria {
    /// Exact invoice number to look up.
    pub invoice_number: Option<String>,
    /// Sender/vendor name, matched case-insensitively as a substring.
    pub sender_name: Option<String>,
    /// Partial match against the original filename.
    pub filename_query: Option<String>,
    /// Processing status filter.
    pub status: Option<ProcessingStatus>,
    /// Invoice date on or after (YYYY-MM-DD).
    pub start_date: Option<String>,
    /// Invoice date on or before (YYYY-MM-DD).
    pub end_date: Option<String>,
}

/// Parse an ISO calendar date from a criteria field.
///
/// Unlike the lenient parsing applied to extractor output, a malformed
/// date here is a caller error and aborts the query before any store
/// round-trip.
pub fn parse_iso_date(value: &str, field: &'static str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        Error::InvalidDateFormat {
            field,
            value: value.to_string(),
        }
    })
}

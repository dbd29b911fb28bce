use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle state of an ingested invoice document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessingStatus {
    Completed,
    Failed,
    Processing,
}

impl std::str::FromStr for ProcessingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "PROCESSING" => Ok(Self::Processing),
            other => Err(Error::Config(format!(
                "unknown processing status: '{other}' \
                 (expected COMPLETED, FAILED, or PROCESSING)"
            ))),
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Processing => "PROCESSING",
        };
        f.write_str(s)
    }
}

/// A stored invoice document: file metadata, extraction metadata, and the
/// business fields used for filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: u64,
    pub filename: String,
    /// SHA-256 of the file contents; prevents duplicate ingestion.
    pub file_hash: String,
    pub upload_date: DateTime<Utc>,

    pub status: ProcessingStatus,
    pub error_message: Option<String>,
    pub total_pages: u32,
    pub processing_time_seconds: f64,

    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub sender_name: Option<String>,
    pub receiver_name: Option<String>,
    pub currency: String,
    pub total_amount: Option<f64>,
}

/// A stored invoice line item. The embedding vector lives alongside the
/// record in the store, keyed by the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItemRecord {
    pub id: u64,
    pub invoice_id: u64,
    pub page_number: u32,

    pub description: String,
    pub quantity: Option<f64>,
    pub quantity_unit: Option<String>,
    pub unit_price: Option<f64>,
    pub total_amount: Option<f64>,
    /// Section header under which the item appears ("Labor", "Materials").
    pub section: String,
    pub item_code: Option<String>,
    pub delivery_date: Option<String>,

    /// The text that was embedded for semantic retrieval.
    pub search_text: String,
}

/// A flattened line-item search result: child fields plus selected parent
/// fields joined from the invoice.
///
/// `score` is the vector similarity when a vector stage ran, or 1.0 when
/// the search was purely structured and no ranking was computed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItemHit {
    pub score: f32,
    pub invoice_id: u64,
    pub page_number: u32,

    pub description: String,
    pub section: String,
    pub quantity: Option<f64>,
    pub quantity_unit: Option<String>,
    pub unit_price: Option<f64>,
    pub total_amount: Option<f64>,
    pub item_code: Option<String>,
    pub delivery_date: Option<String>,

    pub invoice_number: Option<String>,
    pub sender_name: Option<String>,
    pub invoice_date: Option<NaiveDate>,
}

/// A flattened invoice search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceHit {
    pub invoice_number: Option<String>,
    pub sender_name: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub total_amount: Option<f64>,
    pub currency: String,
    pub status: ProcessingStatus,
    pub filename: String,
    pub error_message: Option<String>,
}

/// Record counts reported by a store, for the status command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub invoices: u64,
    pub line_items: u64,
}

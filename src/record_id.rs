use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

/// A stable record identifier used as the key in redb tables.
///
/// Invoice IDs are derived from the document's content hash, so re-ingesting
/// the same file always maps to the same record. Line-item IDs are derived
/// from (invoice_id, page_number, index) and stay stable across re-runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordId {
    /// The numeric ID used as the storage key.
    pub numeric: u64,
    /// The short hex string for human display (e.g. "a1b2c3").
    pub short: String,
}

impl RecordId {
    /// Generate a stable invoice ID from the document's file hash.
    pub fn for_invoice(file_hash: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        "invoice".hash(&mut hasher);
        file_hash.hash(&mut hasher);
        Self::from_numeric(hasher.finish())
    }

    /// Generate a stable line-item ID from its position within an invoice.
    pub fn for_line_item(
        invoice_id: u64,
        page_number: u32,
        index: usize,
    ) -> Self {
        let mut hasher = DefaultHasher::new();
        "line_item".hash(&mut hasher);
        invoice_id.hash(&mut hasher);
        page_number.hash(&mut hasher);
        index.hash(&mut hasher);
        Self::from_numeric(hasher.finish())
    }

    fn from_numeric(numeric: u64) -> Self {
        let short = format!("{numeric:016x}")[..6].to_string();
        Self { numeric, short }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.short)
    }
}

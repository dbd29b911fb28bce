use async_trait::async_trait;

use crate::{
    error::Result,
    model::{
        InvoiceHit,
        InvoiceRecord,
        LineItemHit,
        LineItemRecord,
        StoreCounts,
    },
    plan::{InvoiceFilter, RetrievalPlan},
};

/// Contract for the document store backing ingestion and retrieval.
///
/// The store must support equality/range matching, case-insensitive
/// substring matching, foreign-key joins, and an approximate vector
/// similarity stage with an optional pre-filter. Plans are executed in a
/// single round-trip; callers treat failures as final.
///
/// Two adapters ship with the crate: [`crate::RedbInvoiceStore`] for
/// persistence and [`crate::MemoryInvoiceStore`] for tests.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Insert or replace an invoice record.
    async fn insert_invoice(&self, record: &InvoiceRecord) -> Result<()>;

    /// Update an existing invoice record (same as insert for both
    /// shipped adapters; kept separate for stores that distinguish).
    async fn update_invoice(&self, record: &InvoiceRecord) -> Result<()>;

    /// Insert line items together with their embedding vectors.
    /// `items` and `vectors` correspond index-wise.
    async fn insert_line_items(
        &self,
        items: &[LineItemRecord],
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    /// Look up an invoice by its file hash (ingestion dedup check).
    async fn invoice_by_hash(
        &self,
        file_hash: &str,
    ) -> Result<Option<InvoiceRecord>>;

    /// Identifier-only projection of invoices matching a filter. Used by
    /// the context resolver; must not materialize full records.
    async fn find_invoice_ids(&self, filter: &InvoiceFilter)
    -> Result<Vec<u64>>;

    /// Execute a line-item retrieval plan.
    async fn run_line_item_plan(
        &self,
        plan: &RetrievalPlan,
    ) -> Result<Vec<LineItemHit>>;

    /// Execute an invoice retrieval plan.
    async fn run_invoice_plan(
        &self,
        plan: &RetrievalPlan,
    ) -> Result<Vec<InvoiceHit>>;

    /// Record counts, for the status surface.
    async fn counts(&self) -> Result<StoreCounts>;
}

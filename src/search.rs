use std::sync::Arc;

use crate::{
    criteria::{InvoiceCriteria, LineItemCriteria},
    embed::{Embedder, EmbeddingMode},
    error::Result,
    model::{InvoiceHit, LineItemHit},
    plan,
    resolver,
    store::InvoiceStore,
};

/// Executes search requests: resolve parent context, obtain a query
/// embedding when free text is present, compile the plan, run it.
pub struct RetrievalService {
    store: Arc<dyn InvoiceStore>,
    embedder: Arc<dyn Embedder>,
}

impl RetrievalService {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self { store, embedder }
    }

    /// Search line items.
    ///
    /// 1. Resolve invoice-level filters to a parent id set
    /// 2. Embed the query text, if any (a failing embedder aborts the
    ///    request; there is no partial-vector fallback)
    /// 3. Compile and execute the retrieval plan
    pub async fn search_line_items(
        &self,
        criteria: &LineItemCriteria,
    ) -> Result<Vec<LineItemHit>> {
        let resolved = resolver::resolve(self.store.as_ref(), criteria).await?;

        // An empty parent set already means zero results; skip the
        // embedding round-trip.
        let embedding = match &criteria.query_text {
            Some(query)
                if !query.trim().is_empty()
                    && !resolved.is_empty_id_set() =>
            {
                Some(
                    self.embedder
                        .embed(query, EmbeddingMode::Query)
                        .await?,
                )
            }
            _ => None,
        };

        let plan = plan::build_line_item_plan(criteria, embedding, &resolved)?;
        self.store.run_line_item_plan(&plan).await
    }

    /// Search whole invoices. Purely structured; never embeds.
    pub async fn search_invoices(
        &self,
        criteria: &InvoiceCriteria,
    ) -> Result<Vec<InvoiceHit>> {
        let plan = plan::build_invoice_plan(criteria)?;
        self.store.run_invoice_plan(&plan).await
    }
}

/// Format line-item results for human-readable terminal output.
pub fn format_line_items_human(hits: &[LineItemHit]) {
    if hits.is_empty() {
        println!("No line items found.");
        return;
    }

    for (i, hit) in hits.iter().enumerate() {
        let amount = hit
            .total_amount
            .map(|a| format!("{a:.2}"))
            .unwrap_or_else(|| "-".to_string());
        let invoice = hit.invoice_number.as_deref().unwrap_or("?");
        println!(
            "{:>3}. [{:.3}] {} | {} | p{} | {}",
            i + 1,
            hit.score,
            hit.description,
            amount,
            hit.page_number,
            invoice,
        );
        if let Some(sender) = &hit.sender_name {
            println!("     {sender}");
        }
    }
    println!("\n{} line item(s)", hits.len());
}

/// Format invoice results for human-readable terminal output.
pub fn format_invoices_human(hits: &[InvoiceHit]) {
    if hits.is_empty() {
        println!("No invoices found.");
        return;
    }

    for hit in hits {
        let number = hit.invoice_number.as_deref().unwrap_or("?");
        let sender = hit.sender_name.as_deref().unwrap_or("?");
        let date = hit
            .invoice_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let amount = hit
            .total_amount
            .map(|a| format!("{a:.2} {}", hit.currency))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{number}\t{sender}\t{date}\t{amount}\t{}\t{}",
            hit.status, hit.filename
        );
        if let Some(error) = &hit.error_message {
            println!("\terror: {error}");
        }
    }
    println!("\n{} invoice(s)", hits.len());
}

/// Serialize results as a single JSON line.
pub fn format_json<T: serde::Serialize>(results: &[T]) -> Result<String> {
    Ok(serde_json::to_string(results)?)
}

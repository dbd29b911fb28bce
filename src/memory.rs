//! In-memory store adapter for tests and development.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    error::Result,
    executor,
    model::{
        InvoiceHit,
        InvoiceRecord,
        LineItemHit,
        LineItemRecord,
        StoreCounts,
    },
    plan::{InvoiceFilter, RetrievalPlan},
    store::InvoiceStore,
};

/// An [`InvoiceStore`] that keeps everything in memory and scores vectors
/// by brute force. Not meant for large corpora; it exists so the query
/// compiler and executor can be exercised without touching disk.
#[derive(Default)]
pub struct MemoryInvoiceStore {
    invoices: RwLock<HashMap<u64, InvoiceRecord>>,
    line_items: RwLock<Vec<(LineItemRecord, Vec<f32>)>>,
}

impl MemoryInvoiceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InvoiceStore for MemoryInvoiceStore {
    async fn insert_invoice(&self, record: &InvoiceRecord) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        invoices.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_invoice(&self, record: &InvoiceRecord) -> Result<()> {
        self.insert_invoice(record).await
    }

    async fn insert_line_items(
        &self,
        items: &[LineItemRecord],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        assert_eq!(
            items.len(),
            vectors.len(),
            "every line item needs exactly one vector"
        );
        let mut line_items = self.line_items.write().await;
        for (item, vector) in items.iter().zip(vectors.iter()) {
            line_items.push((item.clone(), vector.clone()));
        }
        Ok(())
    }

    async fn invoice_by_hash(
        &self,
        file_hash: &str,
    ) -> Result<Option<InvoiceRecord>> {
        let invoices = self.invoices.read().await;
        Ok(invoices
            .values()
            .find(|invoice| invoice.file_hash == file_hash)
            .cloned())
    }

    async fn find_invoice_ids(
        &self,
        filter: &InvoiceFilter,
    ) -> Result<Vec<u64>> {
        let invoices = self.invoices.read().await;
        let mut ids: Vec<u64> = invoices
            .values()
            .filter(|invoice| filter.matches(invoice))
            .map(|invoice| invoice.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn run_line_item_plan(
        &self,
        plan: &RetrievalPlan,
    ) -> Result<Vec<LineItemHit>> {
        if plan.is_empty_result() {
            return Ok(Vec::new());
        }
        let invoices = self.invoices.read().await;
        let line_items = self.line_items.read().await;
        Ok(executor::run_line_item_plan(plan, &line_items, &invoices))
    }

    async fn run_invoice_plan(
        &self,
        plan: &RetrievalPlan,
    ) -> Result<Vec<InvoiceHit>> {
        let invoices = self.invoices.read().await;
        let records: Vec<InvoiceRecord> = invoices.values().cloned().collect();
        Ok(executor::run_invoice_plan(plan, &records))
    }

    async fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            invoices: self.invoices.read().await.len() as u64,
            line_items: self.line_items.read().await.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::ProcessingStatus;

    fn invoice(id: u64, hash: &str) -> InvoiceRecord {
        InvoiceRecord {
            id,
            filename: "test.pdf".into(),
            file_hash: hash.into(),
            upload_date: Utc::now(),
            status: ProcessingStatus::Completed,
            error_message: None,
            total_pages: 1,
            processing_time_seconds: 0.0,
            invoice_number: None,
            invoice_date: None,
            sender_name: None,
            receiver_name: None,
            currency: "USD".into(),
            total_amount: None,
        }
    }

    #[tokio::test]
    async fn hash_lookup() {
        let store = MemoryInvoiceStore::new();
        store.insert_invoice(&invoice(1, "aaa")).await.unwrap();

        assert!(store.invoice_by_hash("aaa").await.unwrap().is_some());
        assert!(store.invoice_by_hash("bbb").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_is_upsert() {
        let store = MemoryInvoiceStore::new();
        store.insert_invoice(&invoice(1, "aaa")).await.unwrap();

        let mut updated = invoice(1, "aaa");
        updated.status = ProcessingStatus::Failed;
        store.update_invoice(&updated).await.unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.invoices, 1);
        let stored = store.invoice_by_hash("aaa").await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn counts_track_line_items() {
        let store = MemoryInvoiceStore::new();
        store.insert_invoice(&invoice(1, "aaa")).await.unwrap();

        let item = LineItemRecord {
            id: 10,
            invoice_id: 1,
            page_number: 1,
            description: "widget".into(),
            quantity: None,
            quantity_unit: None,
            unit_price: None,
            total_amount: None,
            section: "General".into(),
            item_code: None,
            delivery_date: None,
            search_text: "widget".into(),
        };
        store
            .insert_line_items(&[item], &[vec![1.0, 0.0]])
            .await
            .unwrap();

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.invoices, 1);
        assert_eq!(counts.line_items, 1);
    }
}

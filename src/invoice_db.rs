use std::{collections::HashMap, path::Path};

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

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

const INVOICES: TableDefinition<u64, &[u8]> = TableDefinition::new("invoices");
const LINE_ITEMS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("line_items");
/// Embedding vectors as raw f32 slabs, keyed by line-item id.
const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");
const FILE_HASHES: TableDefinition<&str, u64> =
    TableDefinition::new("file_hashes");

/// Redb-backed [`InvoiceStore`].
///
/// Invoice and line-item records are stored as JSON values; vectors are
/// raw f32 bytes. Plan execution loads the record set and delegates to
/// the shared executor.
pub struct RedbInvoiceStore {
    db: Database,
}

impl RedbInvoiceStore {
    /// Open or create an invoice database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(INVOICES)?;
        txn.open_table(LINE_ITEMS)?;
        txn.open_table(VECTORS)?;
        txn.open_table(FILE_HASHES)?;
        txn.commit()?;

        Ok(Self { db })
    }

    fn load_invoices(&self) -> Result<HashMap<u64, InvoiceRecord>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(INVOICES)?;
        let mut result = HashMap::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            let record: InvoiceRecord = serde_json::from_slice(v.value())?;
            result.insert(k.value(), record);
        }
        Ok(result)
    }

    fn load_line_items(&self) -> Result<Vec<(LineItemRecord, Vec<f32>)>> {
        let txn = self.db.begin_read()?;
        let items = txn.open_table(LINE_ITEMS)?;
        let vectors = txn.open_table(VECTORS)?;

        let mut result = Vec::new();
        for entry in items.iter()? {
            let (k, v) = entry?;
            let record: LineItemRecord = serde_json::from_slice(v.value())?;
            let vector = match vectors.get(k.value())? {
                // pod_collect copes with unaligned byte slices.
                Some(guard) => bytemuck::pod_collect_to_vec(guard.value()),
                None => Vec::new(),
            };
            result.push((record, vector));
        }
        Ok(result)
    }
}

#[async_trait]
impl InvoiceStore for RedbInvoiceStore {
    async fn insert_invoice(&self, record: &InvoiceRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut invoices = txn.open_table(INVOICES)?;
            invoices.insert(record.id, bytes.as_slice())?;
            let mut hashes = txn.open_table(FILE_HASHES)?;
            hashes.insert(record.file_hash.as_str(), record.id)?;
        }
        txn.commit()?;
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
        let txn = self.db.begin_write()?;
        {
            let mut records = txn.open_table(LINE_ITEMS)?;
            let mut vector_table = txn.open_table(VECTORS)?;
            for (item, vector) in items.iter().zip(vectors.iter()) {
                let bytes = serde_json::to_vec(item)?;
                records.insert(item.id, bytes.as_slice())?;
                vector_table
                    .insert(item.id, bytemuck::cast_slice::<f32, u8>(vector))?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    async fn invoice_by_hash(
        &self,
        file_hash: &str,
    ) -> Result<Option<InvoiceRecord>> {
        let txn = self.db.begin_read()?;
        let hashes = txn.open_table(FILE_HASHES)?;
        let Some(id) = hashes.get(file_hash)?.map(|guard| guard.value()) else {
            return Ok(None);
        };

        let invoices = txn.open_table(INVOICES)?;
        match invoices.get(id)? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn find_invoice_ids(
        &self,
        filter: &InvoiceFilter,
    ) -> Result<Vec<u64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(INVOICES)?;
        let mut ids = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            let record: InvoiceRecord = serde_json::from_slice(v.value())?;
            if filter.matches(&record) {
                ids.push(k.value());
            }
        }
        Ok(ids)
    }

    async fn run_line_item_plan(
        &self,
        plan: &RetrievalPlan,
    ) -> Result<Vec<LineItemHit>> {
        if plan.is_empty_result() {
            return Ok(Vec::new());
        }
        let invoices = self.load_invoices()?;
        let line_items = self.load_line_items()?;
        Ok(executor::run_line_item_plan(plan, &line_items, &invoices))
    }

    async fn run_invoice_plan(
        &self,
        plan: &RetrievalPlan,
    ) -> Result<Vec<InvoiceHit>> {
        let invoices: Vec<InvoiceRecord> =
            self.load_invoices()?.into_values().collect();
        Ok(executor::run_invoice_plan(plan, &invoices))
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let txn = self.db.begin_read()?;
        let invoices = txn.open_table(INVOICES)?;
        let line_items = txn.open_table(LINE_ITEMS)?;
        Ok(StoreCounts {
            invoices: invoices.iter()?.count() as u64,
            line_items: line_items.iter()?.count() as u64,
        })
    }
}

impl std::fmt::Debug for RedbInvoiceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbInvoiceStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::{
        criteria::{InvoiceCriteria, LineItemCriteria},
        model::ProcessingStatus,
        plan::{build_invoice_plan, build_line_item_plan},
        resolver::ResolvedContext,
    };

    fn test_store() -> (tempfile::TempDir, RedbInvoiceStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            RedbInvoiceStore::open(&tmp.path().join("invoices.redb")).unwrap();
        (tmp, store)
    }

    fn invoice(id: u64, number: &str, hash: &str) -> InvoiceRecord {
        InvoiceRecord {
            id,
            filename: format!("{number}.pdf"),
            file_hash: hash.into(),
            upload_date: Utc::now(),
            status: ProcessingStatus::Completed,
            error_message: None,
            total_pages: 1,
            processing_time_seconds: 0.5,
            invoice_number: Some(number.into()),
            invoice_date: NaiveDate::from_ymd_opt(2023, 10, 1),
            sender_name: Some("Acme".into()),
            receiver_name: None,
            currency: "USD".into(),
            total_amount: Some(100.0),
        }
    }

    fn item(id: u64, invoice_id: u64, description: &str) -> LineItemRecord {
        LineItemRecord {
            id,
            invoice_id,
            page_number: 1,
            description: description.into(),
            quantity: Some(1.0),
            quantity_unit: None,
            unit_price: Some(10.0),
            total_amount: Some(10.0),
            section: "General".into(),
            item_code: None,
            delivery_date: None,
            search_text: description.into(),
        }
    }

    #[tokio::test]
    async fn hash_dedup_roundtrip() {
        let (_tmp, store) = test_store();
        store.insert_invoice(&invoice(1, "INV-001", "aaa")).await.unwrap();

        let found = store.invoice_by_hash("aaa").await.unwrap().unwrap();
        assert_eq!(found.invoice_number.as_deref(), Some("INV-001"));
        assert!(store.invoice_by_hash("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn vectors_roundtrip_through_plan() {
        let (_tmp, store) = test_store();
        store.insert_invoice(&invoice(1, "INV-001", "aaa")).await.unwrap();
        store
            .insert_line_items(
                &[item(10, 1, "cable"), item(11, 1, "gpu")],
                &[vec![0.0, 1.0], vec![1.0, 0.0]],
            )
            .await
            .unwrap();

        let criteria = LineItemCriteria {
            query_text: Some("gpu".into()),
            ..Default::default()
        };
        let plan = build_line_item_plan(
            &criteria,
            Some(vec![1.0, 0.0]),
            &ResolvedContext::Unconstrained,
        )
        .unwrap();
        let hits = store.run_line_item_plan(&plan).await.unwrap();

        assert_eq!(hits[0].description, "gpu");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("invoices.redb");

        {
            let store = RedbInvoiceStore::open(&path).unwrap();
            store.insert_invoice(&invoice(1, "INV-001", "aaa")).await.unwrap();
            store
                .insert_line_items(&[item(10, 1, "cable")], &[vec![1.0]])
                .await
                .unwrap();
        }

        {
            let store = RedbInvoiceStore::open(&path).unwrap();
            let counts = store.counts().await.unwrap();
            assert_eq!(counts.invoices, 1);
            assert_eq!(counts.line_items, 1);

            let plan =
                build_invoice_plan(&InvoiceCriteria::default()).unwrap();
            let hits = store.run_invoice_plan(&plan).await.unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].invoice_number.as_deref(), Some("INV-001"));
        }
    }

    #[tokio::test]
    async fn find_ids_uses_filter() {
        let (_tmp, store) = test_store();
        store.insert_invoice(&invoice(1, "INV-001", "aaa")).await.unwrap();
        let mut other = invoice(2, "INV-002", "bbb");
        other.sender_name = Some("Globex".into());
        store.insert_invoice(&other).await.unwrap();

        let filter = InvoiceFilter {
            sender_name: Some("acme".into()),
            ..Default::default()
        };
        assert_eq!(store.find_invoice_ids(&filter).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn empty_plan_skips_record_loading() {
        let (_tmp, store) = test_store();
        let plan = build_line_item_plan(
            &LineItemCriteria::default(),
            None,
            &ResolvedContext::IdSet(vec![]),
        )
        .unwrap();
        assert!(store.run_line_item_plan(&plan).await.unwrap().is_empty());
    }
}

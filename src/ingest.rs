use std::{path::Path, sync::Arc, time::Instant};

use chrono::{NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;

use crate::{
    chain::{FinalInvoice, PageChain},
    embed::{Embedder, EmbeddingMode},
    error::{Error, Result},
    extract::PageExtractor,
    model::{InvoiceRecord, LineItemRecord, ProcessingStatus},
    record_id::RecordId,
    store::InvoiceStore,
    text,
};

/// Maximum number of documents parsed/extracted concurrently during batch
/// ingestion. Matches the rate limit of the external extraction service;
/// the chain within one document stays strictly sequential.
pub const PARSE_CONCURRENCY: usize = 5;

/// What happened to a single document during ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The file hash already exists in the store.
    Skipped { invoice_id: u64 },
    Completed {
        invoice_id: u64,
        line_items: usize,
        pages_processed: u32,
    },
}

/// Drives the full ingestion pipeline: dedup, page split, chained
/// extraction, embedding, storage.
pub struct IngestionService {
    store: Arc<dyn InvoiceStore>,
    extractor: Arc<dyn PageExtractor>,
    embedder: Arc<dyn Embedder>,
}

impl IngestionService {
    pub fn new(
        store: Arc<dyn InvoiceStore>,
        extractor: Arc<dyn PageExtractor>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            store,
            extractor,
            embedder,
        }
    }

    /// Ingest one invoice document.
    ///
    /// Re-ingesting a file with an unchanged hash is a no-op. Extraction
    /// failures are recorded as a `Failed` invoice before the error
    /// propagates, so they remain visible to invoice searches.
    pub async fn ingest_invoice(&self, path: &Path) -> Result<IngestOutcome> {
        let started = Instant::now();

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let content = std::fs::read_to_string(path).map_err(|_| {
            Error::NotFound {
                kind: "file",
                name: path.display().to_string(),
            }
        })?;

        let file_hash = hex_digest(content.as_bytes());
        if let Some(existing) = self.store.invoice_by_hash(&file_hash).await? {
            tracing::info!(
                filename = %filename,
                invoice = %RecordId::for_invoice(&file_hash),
                "file hash already ingested, skipping"
            );
            return Ok(IngestOutcome::Skipped {
                invoice_id: existing.id,
            });
        }

        let pages = text::split_pages(&content);
        if pages.is_empty() {
            return Err(Error::Extraction(format!(
                "document contains no text: {filename}"
            )));
        }

        let invoice_id = RecordId::for_invoice(&file_hash).numeric;
        let chain = PageChain::new(self.extractor.as_ref());
        let extraction = match chain.extract(&pages).await {
            Ok(extraction) => extraction,
            Err(err) => {
                self.record_failure(
                    invoice_id,
                    &filename,
                    &file_hash,
                    pages.len() as u32,
                    &err,
                )
                .await?;
                return Err(err);
            }
        };

        let mut record = invoice_record(
            invoice_id,
            &filename,
            &file_hash,
            &extraction,
            started.elapsed().as_secs_f64(),
        );
        self.store.insert_invoice(&record).await?;

        let (items, vectors) =
            self.embed_line_items(invoice_id, &extraction).await?;
        self.store.insert_line_items(&items, &vectors).await?;

        record.processing_time_seconds = started.elapsed().as_secs_f64();
        self.store.update_invoice(&record).await?;

        tracing::info!(
            filename = %filename,
            line_items = items.len(),
            pages = extraction.pages_processed,
            "invoice ingested"
        );

        Ok(IngestOutcome::Completed {
            invoice_id,
            line_items: items.len(),
            pages_processed: extraction.pages_processed,
        })
    }

    async fn embed_line_items(
        &self,
        invoice_id: u64,
        extraction: &FinalInvoice,
    ) -> Result<(Vec<LineItemRecord>, Vec<Vec<f32>>)> {
        let sender_name = extraction.metadata.sender_name.as_deref();

        let mut items = Vec::new();
        let mut vectors = Vec::new();
        let mut index = 0usize;

        for page in &extraction.pages {
            for line_item in &page.line_items {
                let search_text = text::build_search_text(
                    sender_name,
                    &line_item.section,
                    &line_item.description,
                    line_item.item_code.as_deref(),
                );
                let vector = self
                    .embedder
                    .embed(&search_text, EmbeddingMode::Passage)
                    .await?;

                items.push(LineItemRecord {
                    id: RecordId::for_line_item(
                        invoice_id,
                        page.page_number,
                        index,
                    )
                    .numeric,
                    invoice_id,
                    page_number: page.page_number,
                    description: line_item.description.clone(),
                    quantity: line_item.quantity,
                    quantity_unit: line_item.quantity_unit.clone(),
                    unit_price: line_item.unit_price,
                    total_amount: line_item.line_total,
                    section: line_item.section.clone(),
                    item_code: line_item.item_code.clone(),
                    delivery_date: line_item.delivery_date.clone(),
                    search_text,
                });
                vectors.push(vector);
                index += 1;
            }
        }

        Ok((items, vectors))
    }

    async fn record_failure(
        &self,
        invoice_id: u64,
        filename: &str,
        file_hash: &str,
        total_pages: u32,
        err: &Error,
    ) -> Result<()> {
        let record = InvoiceRecord {
            id: invoice_id,
            filename: filename.to_string(),
            file_hash: file_hash.to_string(),
            upload_date: Utc::now(),
            status: ProcessingStatus::Failed,
            error_message: Some(err.to_string()),
            total_pages,
            processing_time_seconds: 0.0,
            invoice_number: None,
            invoice_date: None,
            sender_name: None,
            receiver_name: None,
            currency: "USD".to_string(),
            total_amount: None,
        };
        self.store.insert_invoice(&record).await
    }
}

/// Ingest independent documents with bounded concurrency.
///
/// Per-document failures are returned in place, never aborting the batch.
/// Results come back in input order.
pub async fn ingest_batch(
    service: Arc<IngestionService>,
    paths: Vec<std::path::PathBuf>,
) -> Vec<(std::path::PathBuf, Result<IngestOutcome>)> {
    let semaphore = Arc::new(Semaphore::new(PARSE_CONCURRENCY));

    let mut handles = Vec::with_capacity(paths.len());
    for path in &paths {
        let service = Arc::clone(&service);
        let semaphore = Arc::clone(&semaphore);
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("ingest semaphore closed");
            service.ingest_invoice(&path).await
        }));
    }

    let mut results = Vec::with_capacity(paths.len());
    for (path, handle) in paths.into_iter().zip(handles) {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                Err(Error::Config(format!("ingest task failed: {join_err}")))
            }
        };
        results.push((path, outcome));
    }
    results
}

fn invoice_record(
    invoice_id: u64,
    filename: &str,
    file_hash: &str,
    extraction: &FinalInvoice,
    processing_time_seconds: f64,
) -> InvoiceRecord {
    let metadata = &extraction.metadata;
    InvoiceRecord {
        id: invoice_id,
        filename: filename.to_string(),
        file_hash: file_hash.to_string(),
        upload_date: Utc::now(),
        status: ProcessingStatus::Completed,
        error_message: None,
        total_pages: extraction.pages_processed,
        processing_time_seconds,
        invoice_number: metadata.invoice_number.clone(),
        invoice_date: parse_metadata_date(metadata.invoice_date.as_deref()),
        sender_name: metadata.sender_name.clone(),
        receiver_name: metadata.receiver_name.clone(),
        currency: metadata
            .currency
            .clone()
            .unwrap_or_else(|| "USD".to_string()),
        total_amount: metadata
            .total_amount
            .as_deref()
            .and_then(text::parse_amount),
    }
}

/// Extractor-reported dates are untrusted model output; anything that is
/// not a clean ISO date becomes `None` instead of an error.
fn parse_metadata_date(value: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value?, "%Y-%m-%d").ok()
}

fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

//! End-to-end pipeline test: ingest documents through a scripted
//! extractor and embedder, then exercise both retrieval paths against the
//! stored records.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use invobert::{
    Embedder,
    IngestionService,
    MemoryInvoiceStore,
    PageExtractor,
    RetrievalService,
    chain::{
        ChainedPageExtraction,
        ExtractedLineItem,
        InvoiceContext,
        PageState,
        SinglePageExtraction,
        TableStatus,
    },
    criteria::{InvoiceCriteria, LineItemCriteria},
    embed::EmbeddingMode,
    error::{Error, Result},
    ingest::IngestOutcome,
    model::ProcessingStatus,
};

/// Deterministic embedder: maps known keywords to fixed unit vectors so
/// semantic ranking is predictable.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn dimension(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str, _mode: EmbeddingMode) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        if lower.contains("gpu") {
            Ok(vec![1.0, 0.0, 0.0])
        } else if lower.contains("cable") {
            Ok(vec![0.0, 1.0, 0.0])
        } else {
            Ok(vec![0.0, 0.0, 1.0])
        }
    }
}

/// Extractor scripted per page content. Pages containing "FAIL" error
/// out, which lets a test drive the bridge-on-failure path end to end.
struct ScriptedExtractor;

fn line_item(description: &str, amount: f64, section: &str) -> ExtractedLineItem {
    ExtractedLineItem {
        description: description.to_string(),
        line_total: Some(amount),
        section: section.to_string(),
        ..Default::default()
    }
}

#[async_trait]
impl PageExtractor for ScriptedExtractor {
    async fn extract_page(
        &self,
        page_text: &str,
        page_number: u32,
        _previous_state: &PageState,
    ) -> Result<ChainedPageExtraction> {
        if page_text.contains("FAIL") {
            return Err(Error::Extraction("scripted page failure".into()));
        }

        let context = if page_number == 1 {
            Some(InvoiceContext {
                invoice_number: Some("HW-999".into()),
                sender_name: Some("Nvidia".into()),
                invoice_date: Some("2023-11-15".into()),
                ..Default::default()
            })
        } else {
            // A later page disagreeing about the sender must not win.
            Some(InvoiceContext {
                sender_name: Some("Not Nvidia".into()),
                currency: Some("USD".into()),
                ..Default::default()
            })
        };

        let items = if page_text.contains("gpu") {
            vec![line_item("RTX 4090 gpu", 1500.0, "Hardware")]
        } else if page_text.contains("cable") {
            vec![line_item("HDMI cable", 20.0, "Cables")]
        } else {
            vec![]
        };

        Ok(ChainedPageExtraction {
            next_page_state: PageState {
                table_status: TableStatus::TableOpenHeadless,
                active_columns: vec!["Description".into(), "Amount".into()],
                active_section_title: "Hardware".into(),
            },
            invoice_context: context,
            line_items: items,
        })
    }

    async fn extract_single(
        &self,
        page_text: &str,
    ) -> Result<SinglePageExtraction> {
        if page_text.contains("FAIL") {
            return Err(Error::Extraction("scripted page failure".into()));
        }
        Ok(SinglePageExtraction {
            invoice_context: InvoiceContext {
                invoice_number: Some("SVC-1".into()),
                sender_name: Some("CloudCo".into()),
                invoice_date: Some("2024-01-10".into()),
                ..Default::default()
            },
            line_items: vec![line_item("Cloud service fee", 300.0, "Services")],
        })
    }
}

fn write_file(dir: &std::path::Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn services(
    store: Arc<MemoryInvoiceStore>,
) -> (IngestionService, RetrievalService) {
    let ingestion = IngestionService::new(
        Arc::clone(&store) as Arc<dyn invobert::InvoiceStore>,
        Arc::new(ScriptedExtractor),
        Arc::new(KeywordEmbedder),
    );
    let retrieval = RetrievalService::new(
        store as Arc<dyn invobert::InvoiceStore>,
        Arc::new(KeywordEmbedder),
    );
    (ingestion, retrieval)
}

#[tokio::test]
async fn ingest_then_search_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryInvoiceStore::new());
    let (ingestion, retrieval) = services(Arc::clone(&store));

    // Multi-page hardware invoice plus a single-page services invoice.
    let hardware = write_file(
        tmp.path(),
        "hardware.txt",
        "page with gpu\u{0c}page with cable",
    );
    let services_file =
        write_file(tmp.path(), "services.txt", "single page service invoice");

    let outcome = ingestion.ingest_invoice(&hardware).await.unwrap();
    let IngestOutcome::Completed { line_items, .. } = outcome else {
        panic!("expected completed ingest");
    };
    assert_eq!(line_items, 2);
    ingestion.ingest_invoice(&services_file).await.unwrap();

    // Semantic search ranks the GPU item first for a GPU query.
    let criteria = LineItemCriteria {
        query_text: Some("gpu accelerator".into()),
        ..Default::default()
    };
    let hits = retrieval.search_line_items(&criteria).await.unwrap();
    assert_eq!(hits[0].description, "RTX 4090 gpu");
    assert_eq!(hits[0].invoice_number.as_deref(), Some("HW-999"));
    assert!(hits[0].score > hits[1].score);

    // Structured amount search carries the sentinel score and joins the
    // parent invoice.
    let criteria = LineItemCriteria {
        min_amount: Some(1000.0),
        ..Default::default()
    };
    let hits = retrieval.search_line_items(&criteria).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].description, "RTX 4090 gpu");
    assert_eq!(hits[0].score, 1.0);
    assert_eq!(hits[0].sender_name.as_deref(), Some("Nvidia"));

    // Amount bounds are inclusive.
    let criteria = LineItemCriteria {
        min_amount: Some(20.0),
        max_amount: Some(20.0),
        ..Default::default()
    };
    let hits = retrieval.search_line_items(&criteria).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].description, "HDMI cable");

    // Invoice search sees both documents, newest invoice date first.
    let hits = retrieval
        .search_invoices(&InvoiceCriteria::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].invoice_number.as_deref(), Some("SVC-1"));
    assert_eq!(hits[1].invoice_number.as_deref(), Some("HW-999"));
}

#[tokio::test]
async fn parent_context_narrows_and_short_circuits() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryInvoiceStore::new());
    let (ingestion, retrieval) = services(Arc::clone(&store));

    let path = write_file(tmp.path(), "hw.txt", "gpu page\u{0c}cable page");
    ingestion.ingest_invoice(&path).await.unwrap();

    // Matching sender narrows to that invoice's items.
    let criteria = LineItemCriteria {
        sender_name: Some("nvidia".into()),
        ..Default::default()
    };
    let hits = retrieval.search_line_items(&criteria).await.unwrap();
    assert_eq!(hits.len(), 2);

    // A sender with no invoices yields an empty result, not an error.
    let criteria = LineItemCriteria {
        query_text: Some("gpu".into()),
        sender_name: Some("Globex".into()),
        ..Default::default()
    };
    let hits = retrieval.search_line_items(&criteria).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn failed_middle_page_keeps_the_rest() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryInvoiceStore::new());
    let (ingestion, retrieval) = services(Arc::clone(&store));

    let path = write_file(
        tmp.path(),
        "partial.txt",
        "gpu page\u{0c}FAIL page\u{0c}cable page",
    );
    let outcome = ingestion.ingest_invoice(&path).await.unwrap();

    let IngestOutcome::Completed {
        line_items,
        pages_processed,
        ..
    } = outcome
    else {
        panic!("expected completed ingest");
    };
    // Page 2 is lost, pages 1 and 3 survive, and the attempt count still
    // covers all three pages.
    assert_eq!(line_items, 2);
    assert_eq!(pages_processed, 3);

    // Items from the surviving pages keep their original page numbers.
    let criteria = LineItemCriteria {
        page_number: Some(3),
        ..Default::default()
    };
    let hits = retrieval.search_line_items(&criteria).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].description, "HDMI cable");

    // Metadata first reported on page 1 wins over page 3's conflicting
    // sender.
    let hits = retrieval
        .search_invoices(&InvoiceCriteria::default())
        .await
        .unwrap();
    assert_eq!(hits[0].sender_name.as_deref(), Some("Nvidia"));
}

#[tokio::test]
async fn failed_single_page_document_is_recorded_as_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryInvoiceStore::new());
    let (ingestion, retrieval) = services(Arc::clone(&store));

    let path = write_file(tmp.path(), "broken.txt", "FAIL everything");
    assert!(ingestion.ingest_invoice(&path).await.is_err());

    let criteria = InvoiceCriteria {
        status: Some(ProcessingStatus::Failed),
        ..Default::default()
    };
    let hits = retrieval.search_invoices(&criteria).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "broken.txt");
    assert!(hits[0].error_message.is_some());
}

#[tokio::test]
async fn page_range_and_exact_page_precedence() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryInvoiceStore::new());
    let (ingestion, retrieval) = services(Arc::clone(&store));

    let path = write_file(tmp.path(), "hw.txt", "gpu page\u{0c}cable page");
    ingestion.ingest_invoice(&path).await.unwrap();

    // Range [2, 5] only sees page 2.
    let criteria = LineItemCriteria {
        min_page: Some(2),
        max_page: Some(5),
        ..Default::default()
    };
    let hits = retrieval.search_line_items(&criteria).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].page_number, 2);

    // An exact page wins over a simultaneously supplied range.
    let criteria = LineItemCriteria {
        page_number: Some(1),
        min_page: Some(2),
        max_page: Some(5),
        ..Default::default()
    };
    let hits = retrieval.search_line_items(&criteria).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].page_number, 1);
}

#[tokio::test]
async fn malformed_criteria_date_aborts_before_search() {
    let store = Arc::new(MemoryInvoiceStore::new());
    let (_ingestion, retrieval) = services(store);

    let criteria = LineItemCriteria {
        invoice_date_start: Some("2023/13/40".into()),
        ..Default::default()
    };
    let err = retrieval.search_line_items(&criteria).await.unwrap_err();
    assert!(matches!(err, Error::InvalidDateFormat { .. }));

    let criteria = InvoiceCriteria {
        end_date: Some("13-2023-01".into()),
        ..Default::default()
    };
    let err = retrieval.search_invoices(&criteria).await.unwrap_err();
    assert!(matches!(err, Error::InvalidDateFormat { .. }));
}

//! Sequential page-context chaining for multi-page extraction.
//!
//! A multi-page invoice is extracted one page at a time. Each call hands
//! the extractor the state the previous page ended in (open table, its
//! column headers, the active section), so tables that span page breaks
//! and metadata scattered across pages are reconstructed correctly. The
//! chain is strictly sequential: page i+1 needs page i's reported state.

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    extract::PageExtractor,
    text,
};

/// Status of the table at the very bottom of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// No active table at the page break.
    NoTable,
    /// Table continues to the next page without repeating headers.
    TableOpenHeadless,
    /// Table continues but the next page likely repeats headers.
    TableOpenWithHeaders,
}

/// The rolling state carried from one page's extraction into the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    pub table_status: TableStatus,
    /// Column headers of the table currently open at the bottom of the
    /// page, if any.
    #[serde(default)]
    pub active_columns: Vec<String>,
    /// The last section header seen; carries over to the next page.
    pub active_section_title: String,
}

impl PageState {
    /// The state before any page has been processed.
    pub fn initial() -> Self {
        Self {
            table_status: TableStatus::NoTable,
            active_columns: Vec::new(),
            active_section_title: "Start".to_string(),
        }
    }

    /// Deterministic JSON representation, embedded verbatim into the
    /// extractor prompt so the model sees a stable encoding.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Invoice-level metadata found on a single page. All fields optional;
/// the aggregate is assembled across pages, first non-null value winning.
///
/// `total_amount` is the raw text as printed (it may carry separators or
/// a currency symbol) and is normalized at ingestion time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceContext {
    pub invoice_number: Option<String>,
    /// Issue date in ISO 8601.
    pub invoice_date: Option<String>,
    pub sender_name: Option<String>,
    pub receiver_name: Option<String>,
    pub currency: Option<String>,
    pub total_amount: Option<String>,
}

/// A line item as reported by the extractor for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractedLineItem {
    pub description: String,
    pub item_code: Option<String>,
    pub delivery_date: Option<String>,
    #[serde(alias = "quantity_value")]
    pub quantity: Option<f64>,
    pub quantity_unit: Option<String>,
    pub unit_price: Option<f64>,
    #[serde(alias = "line_total_amount")]
    pub line_total: Option<f64>,
    /// Section header this item appears under.
    pub section: String,
}

impl Default for ExtractedLineItem {
    fn default() -> Self {
        Self {
            description: String::new(),
            item_code: None,
            delivery_date: None,
            quantity: None,
            quantity_unit: None,
            unit_price: None,
            line_total: None,
            section: "General".to_string(),
        }
    }
}

/// One page's worth of extracted line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// 1-based page number.
    pub page_number: u32,
    pub line_items: Vec<ExtractedLineItem>,
}

/// Extractor output for one page in chained mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainedPageExtraction {
    /// State instructions for whoever processes the next page.
    pub next_page_state: PageState,
    /// Invoice-level data found strictly on this page.
    #[serde(default)]
    pub invoice_context: Option<InvoiceContext>,
    #[serde(default)]
    pub line_items: Vec<ExtractedLineItem>,
}

/// Extractor output for the one-shot single-page path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePageExtraction {
    pub invoice_context: InvoiceContext,
    #[serde(default)]
    pub line_items: Vec<ExtractedLineItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingType {
    SingleShot,
    SequentialChain,
}

/// The assembled result of extracting a whole document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalInvoice {
    pub metadata: InvoiceContext,
    /// In page order; pages whose extraction failed are absent.
    pub pages: Vec<ExtractedPage>,
    /// Total page count attempted, including failed pages.
    pub pages_processed: u32,
    pub processing_type: ProcessingType,
}

/// Fill unset fields of `target` from `source`. A field set by an earlier
/// page is never overwritten by a later one.
pub fn merge_context(target: &mut InvoiceContext, source: &InvoiceContext) {
    fn fill(target: &mut Option<String>, source: &Option<String>) {
        if target.is_none() && source.is_some() {
            *target = source.clone();
        }
    }

    fill(&mut target.invoice_number, &source.invoice_number);
    fill(&mut target.invoice_date, &source.invoice_date);
    fill(&mut target.sender_name, &source.sender_name);
    fill(&mut target.receiver_name, &source.receiver_name);
    fill(&mut target.currency, &source.currency);
    fill(&mut target.total_amount, &source.total_amount);
}

/// Drives per-page extraction over an ordered page list.
pub struct PageChain<'a> {
    extractor: &'a dyn PageExtractor,
}

impl<'a> PageChain<'a> {
    pub fn new(extractor: &'a dyn PageExtractor) -> Self {
        Self { extractor }
    }

    /// Extract a whole document.
    ///
    /// Single-page documents bypass the chain and run a one-shot
    /// extraction. Multi-page documents run the sequential chain, where a
    /// failing page is logged and bridged rather than aborting the
    /// document.
    pub async fn extract(&self, pages: &[String]) -> Result<FinalInvoice> {
        match pages {
            [] => Err(Error::Extraction(
                "no pages provided for extraction".into(),
            )),
            [only] => self.single_shot(only).await,
            _ => self.sequential_chain(pages).await,
        }
    }

    async fn single_shot(&self, page: &str) -> Result<FinalInvoice> {
        tracing::info!("single-page invoice, using single-shot extraction");

        let clean = text::clean_page_text(page);
        let result = self.extractor.extract_single(&clean).await?;

        Ok(FinalInvoice {
            metadata: result.invoice_context,
            pages: vec![ExtractedPage {
                page_number: 1,
                line_items: result.line_items,
            }],
            pages_processed: 1,
            processing_type: ProcessingType::SingleShot,
        })
    }

    async fn sequential_chain(&self, pages: &[String]) -> Result<FinalInvoice> {
        tracing::info!(
            pages = pages.len(),
            "multi-page invoice, using sequential chain extraction"
        );

        let mut extracted: Vec<ExtractedPage> = Vec::new();
        let mut aggregate = InvoiceContext::default();
        let mut state = PageState::initial();

        for (i, page) in pages.iter().enumerate() {
            let page_number = (i + 1) as u32;
            let clean = text::clean_page_text(page);

            match self
                .extractor
                .extract_page(&clean, page_number, &state)
                .await
            {
                Ok(result) => {
                    extracted.push(ExtractedPage {
                        page_number,
                        line_items: result.line_items,
                    });
                    if let Some(fragment) = &result.invoice_context {
                        merge_context(&mut aggregate, fragment);
                    }
                    state = result.next_page_state;
                }
                Err(err) => {
                    // Bridge: keep the previous state and move on. One
                    // bad page degrades table continuity but must not
                    // lose the pages already extracted.
                    tracing::error!(
                        page = page_number,
                        error = %err,
                        "chain broke, bridging state to the next page"
                    );
                }
            }
        }

        Ok(FinalInvoice {
            metadata: aggregate,
            pages: extracted,
            pages_processed: pages.len() as u32,
            processing_type: ProcessingType::SequentialChain,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Scripted extractor: one canned outcome per page, in order.
    struct ScriptedExtractor {
        outcomes: Mutex<Vec<Result<ChainedPageExtraction>>>,
        seen_states: Mutex<Vec<PageState>>,
    }

    impl ScriptedExtractor {
        fn new(outcomes: Vec<Result<ChainedPageExtraction>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes),
                seen_states: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageExtractor for ScriptedExtractor {
        async fn extract_page(
            &self,
            _page_text: &str,
            _page_number: u32,
            previous_state: &PageState,
        ) -> Result<ChainedPageExtraction> {
            self.seen_states.lock().unwrap().push(previous_state.clone());
            self.outcomes.lock().unwrap().remove(0)
        }

        async fn extract_single(
            &self,
            _page_text: &str,
        ) -> Result<SinglePageExtraction> {
            Ok(SinglePageExtraction {
                invoice_context: InvoiceContext {
                    invoice_number: Some("INV-SINGLE".into()),
                    ..Default::default()
                },
                line_items: vec![ExtractedLineItem {
                    description: "only item".into(),
                    ..Default::default()
                }],
            })
        }
    }

    fn page_result(
        status: TableStatus,
        section: &str,
        context: Option<InvoiceContext>,
        descriptions: &[&str],
    ) -> Result<ChainedPageExtraction> {
        Ok(ChainedPageExtraction {
            next_page_state: PageState {
                table_status: status,
                active_columns: vec!["Description".into(), "Amount".into()],
                active_section_title: section.into(),
            },
            invoice_context: context,
            line_items: descriptions
                .iter()
                .map(|d| ExtractedLineItem {
                    description: (*d).into(),
                    ..Default::default()
                })
                .collect(),
        })
    }

    #[test]
    fn initial_state() {
        let state = PageState::initial();
        assert_eq!(state.table_status, TableStatus::NoTable);
        assert!(state.active_columns.is_empty());
        assert_eq!(state.active_section_title, "Start");
    }

    #[test]
    fn state_json_is_stable() {
        let state = PageState::initial();
        assert_eq!(
            state.to_json().unwrap(),
            r#"{"table_status":"no_table","active_columns":[],"active_section_title":"Start"}"#
        );
    }

    #[test]
    fn merge_first_write_wins() {
        let mut target = InvoiceContext {
            sender_name: Some("Acme".into()),
            ..Default::default()
        };
        let source = InvoiceContext {
            sender_name: Some("Other".into()),
            invoice_number: Some("INV-1".into()),
            ..Default::default()
        };
        merge_context(&mut target, &source);

        assert_eq!(target.sender_name.as_deref(), Some("Acme"));
        assert_eq!(target.invoice_number.as_deref(), Some("INV-1"));
    }

    #[test]
    fn merge_never_clears_fields() {
        let mut target = InvoiceContext {
            currency: Some("EUR".into()),
            ..Default::default()
        };
        merge_context(&mut target, &InvoiceContext::default());
        assert_eq!(target.currency.as_deref(), Some("EUR"));
    }

    #[tokio::test]
    async fn empty_document_is_an_error() {
        let extractor = ScriptedExtractor::new(vec![]);
        let chain = PageChain::new(&extractor);
        assert!(chain.extract(&[]).await.is_err());
    }

    #[tokio::test]
    async fn single_page_bypasses_chain() {
        let extractor = ScriptedExtractor::new(vec![]);
        let chain = PageChain::new(&extractor);

        let result = chain.extract(&["one page".to_string()]).await.unwrap();
        assert_eq!(result.processing_type, ProcessingType::SingleShot);
        assert_eq!(result.pages_processed, 1);
        assert_eq!(result.pages.len(), 1);
        assert_eq!(result.metadata.invoice_number.as_deref(), Some("INV-SINGLE"));
        // The chained extract_page path was never invoked.
        assert!(extractor.seen_states.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chain_threads_state_forward() {
        let extractor = ScriptedExtractor::new(vec![
            page_result(
                TableStatus::TableOpenHeadless,
                "Labor",
                None,
                &["item a"],
            ),
            page_result(TableStatus::NoTable, "Materials", None, &["item b"]),
        ]);
        let chain = PageChain::new(&extractor);

        let result = chain
            .extract(&["p1".to_string(), "p2".to_string()])
            .await
            .unwrap();
        assert_eq!(result.processing_type, ProcessingType::SequentialChain);

        let seen = extractor.seen_states.lock().unwrap();
        // Page 1 sees the initial state, page 2 sees page 1's output.
        assert_eq!(seen[0], PageState::initial());
        assert_eq!(seen[1].table_status, TableStatus::TableOpenHeadless);
        assert_eq!(seen[1].active_section_title, "Labor");
    }

    #[tokio::test]
    async fn failed_page_is_bridged() {
        let extractor = ScriptedExtractor::new(vec![
            page_result(
                TableStatus::TableOpenWithHeaders,
                "Labor",
                Some(InvoiceContext {
                    sender_name: Some("Acme".into()),
                    ..Default::default()
                }),
                &["page one item"],
            ),
            Err(Error::Extraction("model timeout".into())),
            page_result(
                TableStatus::NoTable,
                "End",
                Some(InvoiceContext {
                    sender_name: Some("Wrong Name".into()),
                    invoice_number: Some("INV-9".into()),
                    ..Default::default()
                }),
                &["page three item"],
            ),
        ]);
        let chain = PageChain::new(&extractor);

        let pages: Vec<String> =
            ["p1", "p2", "p3"].iter().map(|s| s.to_string()).collect();
        let result = chain.extract(&pages).await.unwrap();

        // Page 2 is absent but pages 1 and 3 survive.
        let numbers: Vec<u32> =
            result.pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 3]);
        assert_eq!(result.pages_processed, 3);

        // Page 3 saw page 1's state, bridged across the failure.
        let seen = extractor.seen_states.lock().unwrap();
        assert_eq!(seen[2].active_section_title, "Labor");
        assert_eq!(seen[2].table_status, TableStatus::TableOpenWithHeaders);

        // First write wins even when a later page disagrees.
        assert_eq!(result.metadata.sender_name.as_deref(), Some("Acme"));
        assert_eq!(result.metadata.invoice_number.as_deref(), Some("INV-9"));
    }

    #[tokio::test]
    async fn all_pages_failing_yields_empty_result() {
        let extractor = ScriptedExtractor::new(vec![
            Err(Error::Extraction("boom".into())),
            Err(Error::Extraction("boom".into())),
        ]);
        let chain = PageChain::new(&extractor);

        let result = chain
            .extract(&["p1".to_string(), "p2".to_string()])
            .await
            .unwrap();
        assert!(result.pages.is_empty());
        assert_eq!(result.pages_processed, 2);
        assert_eq!(result.metadata, InvoiceContext::default());
    }

    #[test]
    fn extracted_line_item_defaults_section() {
        let item: ExtractedLineItem =
            serde_json::from_str(r#"{"description": "widget"}"#).unwrap();
        assert_eq!(item.section, "General");
    }

    #[test]
    fn extracted_line_item_accepts_schema_aliases() {
        let item: ExtractedLineItem = serde_json::from_str(
            r#"{"description": "w", "quantity_value": 2.0, "line_total_amount": 9.5}"#,
        )
        .unwrap();
        assert_eq!(item.quantity, Some(2.0));
        assert_eq!(item.line_total, Some(9.5));
    }
}

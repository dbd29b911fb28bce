//! invobert - local ingestion, extraction, and hybrid retrieval for
//! scanned invoices.
//!
//! invobert reads multi-page invoice documents as per-page text, extracts
//! structured line items through an external document-understanding model
//! (carrying a rolling page state so tables that span page breaks are
//! reconstructed), embeds line items for semantic retrieval, and answers
//! structured or natural-language queries by compiling typed search
//! criteria into retrieval plans against a local document store.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use invobert::{
//!     DataDir, HttpEmbedder, RedbInvoiceStore, RetrievalService,
//! };
//! use invobert::criteria::LineItemCriteria;
//!
//! # async fn run() -> invobert::Result<()> {
//! let data_dir = DataDir::resolve(None)?;
//! let store = Arc::new(RedbInvoiceStore::open(&data_dir.invoices_db())?);
//! let embedder = Arc::new(HttpEmbedder::from_env());
//! let retrieval = RetrievalService::new(store, embedder);
//!
//! let criteria = LineItemCriteria {
//!     query_text: Some("server maintenance".to_string()),
//!     min_amount: Some(100.0),
//!     ..Default::default()
//! };
//!
//! let hits = retrieval.search_line_items(&criteria).await?;
//! for hit in &hits {
//!     println!(
//!         "[{:.3}] {} ({:?})",
//!         hit.score, hit.description, hit.invoice_number
//!     );
//! }
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod criteria;
pub mod data_dir;
pub mod embed;
pub mod error;
pub mod executor;
pub mod extract;
pub mod ingest;
pub mod invoice_db;
pub mod mcp;
pub mod memory;
pub mod model;
pub mod plan;
pub mod qa;
pub mod record_id;
pub mod resolver;
pub mod search;
pub mod store;
pub mod text;
pub mod walker;

pub use chain::{FinalInvoice, PageChain, PageState};
pub use data_dir::DataDir;
pub use embed::{Embedder, HttpEmbedder};
pub use error::{Error, Result};
pub use extract::{HttpPageExtractor, PageExtractor};
pub use ingest::IngestionService;
pub use invoice_db::RedbInvoiceStore;
pub use memory::MemoryInvoiceStore;
pub use record_id::RecordId;
pub use search::RetrievalService;
pub use store::InvoiceStore;

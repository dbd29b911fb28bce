use chrono::NaiveDate;

use crate::{
    criteria::{InvoiceCriteria, LineItemCriteria, parse_iso_date},
    error::{Error, Result},
    model::{InvoiceRecord, LineItemRecord, ProcessingStatus},
    resolver::ResolvedContext,
};

/// Hard cap on invoice search results, regardless of what the caller
/// asked for. Protects downstream consumers (LLM context windows included)
/// from unbounded result sets.
pub const INVOICE_RESULT_CAP: usize = 50;

/// Relevance score reported when no vector stage ran.
pub const SENTINEL_SCORE: f32 = 1.0;

/// Page constraint inside a line-item filter. An exact page wins over a
/// simultaneously supplied range.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum PageFilter {
    #[default]
    Any,
    Exact(u32),
    Range {
        min: Option<u32>,
        max: Option<u32>,
    },
}

impl PageFilter {
    fn matches(&self, page_number: u32) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(page) => page_number == *page,
            Self::Range { min, max } => {
                min.is_none_or(|min| page_number >= min)
                    && max.is_none_or(|max| page_number <= max)
            }
        }
    }
}

/// Structured filter applied to line items, either as a standalone match
/// stage or as the pre-filter of a vector search stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineItemFilter {
    /// Restrict to line items of these parent invoices.
    pub invoice_ids: Option<Vec<u64>>,
    pub page: PageFilter,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
}

impl LineItemFilter {
    pub fn is_empty(&self) -> bool {
        self.invoice_ids.is_none()
            && self.page == PageFilter::Any
            && self.min_amount.is_none()
            && self.max_amount.is_none()
    }

    /// Whether a record passes every set condition. Range bounds are
    /// inclusive; items without an amount never match an amount filter.
    pub fn matches(&self, item: &LineItemRecord) -> bool {
        if let Some(ids) = &self.invoice_ids
            && !ids.contains(&item.invoice_id)
        {
            return false;
        }
        if !self.page.matches(item.page_number) {
            return false;
        }
        if self.min_amount.is_some() || self.max_amount.is_some() {
            let Some(amount) = item.total_amount else {
                return false;
            };
            if self.min_amount.is_some_and(|min| amount < min) {
                return false;
            }
            if self.max_amount.is_some_and(|max| amount > max) {
                return false;
            }
        }
        true
    }
}

/// Structured filter applied to invoice records, both for invoice search
/// and for the resolver's id-only projection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceFilter {
    /// Exact match.
    pub invoice_number: Option<String>,
    pub status: Option<ProcessingStatus>,
    /// Case-insensitive substring match.
    pub sender_name: Option<String>,
    /// Case-insensitive substring match against the filename.
    pub filename_query: Option<String>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
}

impl InvoiceFilter {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, invoice: &InvoiceRecord) -> bool {
        if let Some(number) = &self.invoice_number
            && invoice.invoice_number.as_deref() != Some(number.as_str())
        {
            return false;
        }
        if let Some(status) = self.status
            && invoice.status != status
        {
            return false;
        }
        if let Some(sender) = &self.sender_name {
            let Some(name) = &invoice.sender_name else {
                return false;
            };
            if !name.to_lowercase().contains(&sender.to_lowercase()) {
                return false;
            }
        }
        if let Some(fragment) = &self.filename_query
            && !invoice
                .filename
                .to_lowercase()
                .contains(&fragment.to_lowercase())
        {
            return false;
        }
        if self.date_start.is_some() || self.date_end.is_some() {
            let Some(date) = invoice.invoice_date else {
                return false;
            };
            if self.date_start.is_some_and(|start| date < start) {
                return false;
            }
            if self.date_end.is_some_and(|end| date > end) {
                return false;
            }
        }
        true
    }
}

/// Where a projected line-item score comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreSource {
    /// The similarity reported by the vector search stage.
    Similarity,
    /// A fixed value, signaling that no ranking was computed.
    Constant(f32),
}

/// One stage of a retrieval plan. The vocabulary mirrors what a document
/// store with structured-match, join, and approximate-vector-search
/// primitives can execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Produces no results, without touching the store. Emitted when the
    /// resolved parent context is a concrete empty id set.
    Empty,
    /// Approximate nearest-neighbor search over line-item vectors. The
    /// filter is applied before scoring; `num_candidates` over-fetches to
    /// compensate for filter pruning, then results are cut to `limit`.
    VectorSearch {
        embedding: Vec<f32>,
        filter: LineItemFilter,
        limit: usize,
        num_candidates: usize,
    },
    MatchLineItems(LineItemFilter),
    MatchInvoices(InvoiceFilter),
    Sort(SortKey),
    Limit(usize),
    /// Join each line item to its parent invoice by foreign key.
    JoinInvoice,
    ProjectLineItems(ScoreSource),
    ProjectInvoices,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// `(invoice_id asc, page_number asc)`; gives structured searches a
    /// deterministic order for stable pagination.
    InvoicePageAsc,
    /// Newest invoices first; records without a date sort last.
    InvoiceDateDesc,
}

/// An ordered sequence of stages, executed by a store adapter in one
/// round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPlan {
    pub stages: Vec<Stage>,
}

impl RetrievalPlan {
    /// True when the plan is the always-empty short-circuit.
    pub fn is_empty_result(&self) -> bool {
        matches!(self.stages.first(), Some(Stage::Empty))
    }
}

/// Compile line-item criteria plus resolved parent context into an
/// executable plan.
///
/// Vector-first when both an embedding and query text are present,
/// structured-first otherwise. An empty resolved id set short-circuits to
/// a plan that yields zero results without store I/O.
pub fn build_line_item_plan(
    criteria: &LineItemCriteria,
    embedding: Option<Vec<f32>>,
    resolved: &ResolvedContext,
) -> Result<RetrievalPlan> {
    if criteria.limit == 0 {
        return Err(Error::Config(
            "line item search limit must be greater than zero".into(),
        ));
    }

    let mut filter = LineItemFilter::default();
    match resolved {
        ResolvedContext::Unconstrained => {}
        ResolvedContext::IdSet(ids) if ids.is_empty() => {
            return Ok(RetrievalPlan {
                stages: vec![Stage::Empty],
            });
        }
        ResolvedContext::IdSet(ids) => filter.invoice_ids = Some(ids.clone()),
    }

    filter.page = if let Some(page) = criteria.page_number {
        PageFilter::Exact(page)
    } else if criteria.min_page.is_some() || criteria.max_page.is_some() {
        PageFilter::Range {
            min: criteria.min_page,
            max: criteria.max_page,
        }
    } else {
        PageFilter::Any
    };
    filter.min_amount = criteria.min_amount;
    filter.max_amount = criteria.max_amount;

    let mut stages = Vec::new();
    match (embedding, &criteria.query_text) {
        (Some(embedding), Some(_)) => {
            stages.push(Stage::VectorSearch {
                embedding,
                filter,
                limit: criteria.limit,
                num_candidates: (criteria.limit * 10).max(100),
            });
            stages.push(Stage::JoinInvoice);
            stages.push(Stage::ProjectLineItems(ScoreSource::Similarity));
        }
        _ => {
            // A no-op scan predicate would force the store to evaluate an
            // empty match against every record; omit the stage instead.
            if !filter.is_empty() {
                stages.push(Stage::MatchLineItems(filter));
            }
            stages.push(Stage::Sort(SortKey::InvoicePageAsc));
            stages.push(Stage::Limit(criteria.limit));
            stages.push(Stage::JoinInvoice);
            stages.push(Stage::ProjectLineItems(ScoreSource::Constant(
                SENTINEL_SCORE,
            )));
        }
    }

    Ok(RetrievalPlan { stages })
}

/// Compile invoice criteria into an executable plan. Purely structured:
/// optional match, newest-first sort, unconditional cap of
/// [`INVOICE_RESULT_CAP`].
pub fn build_invoice_plan(criteria: &InvoiceCriteria) -> Result<RetrievalPlan> {
    let filter = InvoiceFilter {
        invoice_number: criteria.invoice_number.clone(),
        status: criteria.status,
        sender_name: criteria.sender_name.clone(),
        filename_query: criteria.filename_query.clone(),
        date_start: criteria
            .start_date
            .as_deref()
            .map(|value| parse_iso_date(value, "start_date"))
            .transpose()?,
        date_end: criteria
            .end_date
            .as_deref()
            .map(|value| parse_iso_date(value, "end_date"))
            .transpose()?,
    };

    let mut stages = Vec::new();
    if !filter.is_empty() {
        stages.push(Stage::MatchInvoices(filter));
    }
    stages.push(Stage::Sort(SortKey::InvoiceDateDesc));
    stages.push(Stage::Limit(INVOICE_RESULT_CAP));
    stages.push(Stage::ProjectInvoices);

    Ok(RetrievalPlan { stages })
}

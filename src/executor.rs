//! Pure interpreter for retrieval plans over in-memory record slices.
//!
//! Both store adapters load (or already hold) their records in memory and
//! delegate plan execution here, so the stage semantics are implemented
//! and tested exactly once.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::{
    model::{InvoiceHit, InvoiceRecord, LineItemHit, LineItemRecord},
    plan::{RetrievalPlan, ScoreSource, SortKey, Stage},
};

/// One line item flowing through the plan, with the similarity score
/// attached once a vector stage has run.
struct Candidate<'a> {
    item: &'a LineItemRecord,
    score: Option<f32>,
}

/// Execute a line-item plan against the full record set.
///
/// `items` pairs each record with its embedding vector; `invoices` is the
/// join target keyed by id.
pub fn run_line_item_plan(
    plan: &RetrievalPlan,
    items: &[(LineItemRecord, Vec<f32>)],
    invoices: &HashMap<u64, InvoiceRecord>,
) -> Vec<LineItemHit> {
    let mut current: Vec<Candidate<'_>> = items
        .iter()
        .map(|(item, _)| Candidate { item, score: None })
        .collect();
    let mut hits = Vec::new();

    for stage in &plan.stages {
        match stage {
            Stage::Empty => return Vec::new(),
            Stage::VectorSearch {
                embedding,
                filter,
                limit,
                num_candidates,
            } => {
                // Pre-filter, then brute-force score the survivors.
                let mut scored: Vec<Candidate<'_>> = items
                    .par_iter()
                    .filter(|(item, _)| filter.matches(item))
                    .map(|(item, vector)| Candidate {
                        item,
                        score: Some(cosine_similarity(embedding, vector)),
                    })
                    .collect();
                scored.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                // Candidate over-fetch, then the caller-facing cut. With
                // brute-force scoring the candidate pool is exact, but
                // the stage contract still bounds it.
                scored.truncate(*num_candidates);
                scored.truncate(*limit);
                current = scored;
            }
            Stage::MatchLineItems(filter) => {
                current.retain(|candidate| filter.matches(candidate.item));
            }
            Stage::Sort(SortKey::InvoicePageAsc) => {
                current.sort_by_key(|candidate| {
                    (candidate.item.invoice_id, candidate.item.page_number)
                });
            }
            Stage::Limit(limit) => current.truncate(*limit),
            Stage::JoinInvoice => {
                // The join itself is folded into projection; the lookup
                // map is already keyed by the foreign key.
            }
            Stage::ProjectLineItems(score_source) => {
                hits = current
                    .iter()
                    .map(|candidate| {
                        project_line_item(candidate, score_source, invoices)
                    })
                    .collect();
            }
            // Invoice-only stages never appear in line-item plans.
            Stage::MatchInvoices(_)
            | Stage::Sort(SortKey::InvoiceDateDesc)
            | Stage::ProjectInvoices => {}
        }
    }

    hits
}

/// Execute an invoice plan against the full invoice set.
pub fn run_invoice_plan(
    plan: &RetrievalPlan,
    invoices: &[InvoiceRecord],
) -> Vec<InvoiceHit> {
    let mut current: Vec<&InvoiceRecord> = invoices.iter().collect();
    let mut hits = Vec::new();

    for stage in &plan.stages {
        match stage {
            Stage::Empty => return Vec::new(),
            Stage::MatchInvoices(filter) => {
                current.retain(|invoice| filter.matches(invoice));
            }
            Stage::Sort(SortKey::InvoiceDateDesc) => {
                current.sort_by(|a, b| {
                    match (a.invoice_date, b.invoice_date) {
                        (Some(x), Some(y)) => y.cmp(&x),
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    }
                });
            }
            Stage::Limit(limit) => current.truncate(*limit),
            Stage::ProjectInvoices => {
                hits = current
                    .iter()
                    .map(|invoice| InvoiceHit {
                        invoice_number: invoice.invoice_number.clone(),
                        sender_name: invoice.sender_name.clone(),
                        invoice_date: invoice.invoice_date,
                        total_amount: invoice.total_amount,
                        currency: invoice.currency.clone(),
                        status: invoice.status,
                        filename: invoice.filename.clone(),
                        error_message: invoice.error_message.clone(),
                    })
                    .collect();
            }
            // Line-item stages never appear in invoice plans.
            Stage::VectorSearch { .. }
            | Stage::MatchLineItems(_)
            | Stage::Sort(SortKey::InvoicePageAsc)
            | Stage::JoinInvoice
            | Stage::ProjectLineItems(_) => {}
        }
    }

    hits
}

fn project_line_item(
    candidate: &Candidate<'_>,
    score_source: &ScoreSource,
    invoices: &HashMap<u64, InvoiceRecord>,
) -> LineItemHit {
    let item = candidate.item;
    // A missing parent leaves the flattened invoice fields unset rather
    // than dropping the item.
    let invoice = invoices.get(&item.invoice_id);

    LineItemHit {
        score: match score_source {
            ScoreSource::Similarity => candidate.score.unwrap_or(0.0),
            ScoreSource::Constant(value) => *value,
        },
        invoice_id: item.invoice_id,
        page_number: item.page_number,
        description: item.description.clone(),
        section: item.section.clone(),
        quantity: item.quantity,
        quantity_unit: item.quantity_unit.clone(),
        unit_price: item.unit_price,
        total_amount: item.total_amount,
        item_code: item.item_code.clone(),
        delivery_date: item.delivery_date.clone(),
        invoice_number: invoice.and_then(|i| i.invoice_number.clone()),
        sender_name: invoice.and_then(|i| i.sender_name.clone()),
        invoice_date: invoice.and_then(|i| i.invoice_date),
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

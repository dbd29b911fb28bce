use crate::{
    criteria::{LineItemCriteria, parse_iso_date},
    error::Result,
    plan::InvoiceFilter,
    store::InvoiceStore,
};

/// The outcome of resolving invoice-level filters embedded in a line-item
/// request.
///
/// `IdSet` is a concrete, possibly empty, set of parent identifiers. An
/// empty set must short-circuit the child query to zero results without
/// further store I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedContext {
    /// No invoice-level filter was given.
    Unconstrained,
    IdSet(Vec<u64>),
}

impl ResolvedContext {
    pub fn is_empty_id_set(&self) -> bool {
        matches!(self, Self::IdSet(ids) if ids.is_empty())
    }
}

/// Build the invoice-level filter implied by line-item criteria.
///
/// Returns `None` when no invoice-level field is set. Date strings are
/// validated here, before any store round-trip.
pub fn invoice_filter(
    criteria: &LineItemCriteria,
) -> Result<Option<InvoiceFilter>> {
    if !criteria.has_invoice_filters() {
        return Ok(None);
    }

    Ok(Some(InvoiceFilter {
        invoice_number: criteria.invoice_number.clone(),
        sender_name: criteria.sender_name.clone(),
        date_start: criteria
            .invoice_date_start
            .as_deref()
            .map(|value| parse_iso_date(value, "invoice_date_start"))
            .transpose()?,
        date_end: criteria
            .invoice_date_end
            .as_deref()
            .map(|value| parse_iso_date(value, "invoice_date_end"))
            .transpose()?,
        ..Default::default()
    }))
}

/// Resolve the set of parent invoice ids matching the invoice-level
/// filters of a line-item request.
///
/// Fetches identifiers only (a thin projection, not full records). Store
/// failures propagate as a single wrapped error; there is no local retry.
pub async fn resolve(
    store: &dyn InvoiceStore,
    criteria: &LineItemCriteria,
) -> Result<ResolvedContext> {
    let Some(filter) = invoice_filter(criteria)? else {
        return Ok(ResolvedContext::Unconstrained);
    };

    let ids = store.find_invoice_ids(&filter).await?;
    Ok(ResolvedContext::IdSet(ids))
}

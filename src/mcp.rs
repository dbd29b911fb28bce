use std::sync::Arc;

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    criteria::{InvoiceCriteria, LineItemCriteria},
    data_dir::DataDir,
    embed::HttpEmbedder,
    error,
    invoice_db::RedbInvoiceStore,
    model::{InvoiceHit, LineItemHit, ProcessingStatus},
    search::RetrievalService,
};

struct InvobertState {
    retrieval: RetrievalService,
}

#[derive(Clone)]
pub struct InvobertMcpServer {
    state: Arc<InvobertState>,
    tool_router: ToolRouter<Self>,
}

impl InvobertMcpServer {
    fn new(state: InvobertState) -> Self {
        Self {
            state: Arc::new(state),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl InvobertMcpServer {
    /// Search invoice line items with semantic and structured filters.
    #[tool(
        name = "search_line_items",
        description = "The primary tool for querying invoice data. Use this for any question about line items, costs, specific products, or details inside a table. Supports semantic query text, page filters, invoice context filters, date ranges, and amount ranges."
    )]
    pub async fn search_line_items(
        &self,
        params: Parameters<LineItemSearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let criteria = params.0.into_criteria();

        let hits = self
            .state
            .retrieval
            .search_line_items(&criteria)
            .await
            .map_err(|e| mcp_error("line item search failed", e))?;

        let summary = format_line_item_summary(&hits);
        let structured = serde_json::to_value(LineItemResponse {
            result_count: hits.len(),
            results: hits,
        })
        .map_err(|e| mcp_error("failed to serialize results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }

    /// Search whole invoices by metadata.
    #[tool(
        name = "search_invoices",
        description = "Use this tool only for high-level document questions (how many invoices from a sender, processing status, filenames). Do not use it for questions about line items, products, or costs inside an invoice."
    )]
    pub async fn search_invoices(
        &self,
        params: Parameters<InvoiceSearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let criteria = params.0.into_criteria()?;

        let hits = self
            .state
            .retrieval
            .search_invoices(&criteria)
            .await
            .map_err(|e| mcp_error("invoice search failed", e))?;

        let summary = format_invoice_summary(&hits);
        let structured = serde_json::to_value(InvoiceResponse {
            result_count: hits.len(),
            results: hits,
        })
        .map_err(|e| mcp_error("failed to serialize results", e))?;

        let mut result = CallToolResult::success(vec![Content::text(summary)]);
        result.structured_content = Some(structured);
        Ok(result)
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for InvobertMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_server_info(
                Implementation::new("invobert", env!("CARGO_PKG_VERSION"))
                    .with_title("invobert MCP"),
            )
            .with_instructions(
                "Use search_line_items for questions about items, costs, and table contents; use search_invoices for document-level questions.",
            )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItemSearchParams {
    /// Semantic search terms ("labor", "server maintenance"). Leave empty
    /// for purely structural queries.
    pub query_text: Option<String>,
    /// Exact page number; overrides the page range.
    pub page_number: Option<u32>,
    /// Start of a page range, inclusive.
    pub min_page: Option<u32>,
    /// End of a page range, inclusive.
    pub max_page: Option<u32>,
    /// Exact invoice number (e.g. "INV-2024-001").
    pub invoice_number: Option<String>,
    /// Vendor/sender name, fuzzy match.
    pub sender_name: Option<String>,
    /// Invoices issued on or after this date (YYYY-MM-DD).
    pub invoice_date_start: Option<String>,
    /// Invoices issued on or before this date (YYYY-MM-DD).
    pub invoice_date_end: Option<String>,
    /// Minimum line item total amount.
    pub min_amount: Option<f64>,
    /// Maximum line item total amount.
    pub max_amount: Option<f64>,
    /// Maximum number of items to retrieve (default: 20).
    pub limit: Option<usize>,
}

impl LineItemSearchParams {
    fn into_criteria(self) -> LineItemCriteria {
        LineItemCriteria {
            query_text: self.query_text,
            page_number: self.page_number,
            min_page: self.min_page,
            max_page: self.max_page,
            invoice_number: self.invoice_number,
            sender_name: self.sender_name,
            invoice_date_start: self.invoice_date_start,
            invoice_date_end: self.invoice_date_end,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            limit: self
                .limit
                .unwrap_or(crate::criteria::DEFAULT_LINE_ITEM_LIMIT),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSearchParams {
    /// Exact invoice number to look up.
    pub invoice_number: Option<String>,
    /// Sender/vendor name, fuzzy match.
    pub sender_name: Option<String>,
    /// Partial match for the filename.
    pub filename_query: Option<String>,
    /// Processing status: COMPLETED, FAILED, or PROCESSING.
    pub status: Option<String>,
    /// Invoice date on or after (YYYY-MM-DD).
    pub start_date: Option<String>,
    /// Invoice date on or before (YYYY-MM-DD).
    pub end_date: Option<String>,
}

impl InvoiceSearchParams {
    fn into_criteria(self) -> Result<InvoiceCriteria, rmcp::ErrorData> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<ProcessingStatus>)
            .transpose()
            .map_err(|e| {
                rmcp::ErrorData::invalid_params(e.to_string(), None)
            })?;

        Ok(InvoiceCriteria {
            invoice_number: self.invoice_number,
            sender_name: self.sender_name,
            filename_query: self.filename_query,
            status,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LineItemResponse {
    result_count: usize,
    results: Vec<LineItemHit>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceResponse {
    result_count: usize,
    results: Vec<InvoiceHit>,
}

fn format_line_item_summary(hits: &[LineItemHit]) -> String {
    if hits.is_empty() {
        return "No line items found".to_string();
    }

    let mut lines = Vec::with_capacity(hits.len() + 1);
    let suffix = if hits.len() == 1 { "" } else { "s" };
    lines.push(format!("Found {} line item{}:", hits.len(), suffix));

    for hit in hits {
        lines.push(format!(
            "[{:.3}] {} (p{}, {})",
            hit.score,
            hit.description,
            hit.page_number,
            hit.invoice_number.as_deref().unwrap_or("?"),
        ));
    }

    lines.join("\n")
}

fn format_invoice_summary(hits: &[InvoiceHit]) -> String {
    if hits.is_empty() {
        return "No invoices found".to_string();
    }

    let mut lines = Vec::with_capacity(hits.len() + 1);
    let suffix = if hits.len() == 1 { "" } else { "s" };
    lines.push(format!("Found {} invoice{}:", hits.len(), suffix));

    for hit in hits {
        lines.push(format!(
            "{} {} ({})",
            hit.invoice_number.as_deref().unwrap_or("?"),
            hit.sender_name.as_deref().unwrap_or("?"),
            hit.status,
        ));
    }

    lines.join("\n")
}

fn mcp_error(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

/// Serve the MCP tools over stdio until the client disconnects.
pub async fn run_mcp(data_dir: DataDir) -> error::Result<()> {
    let store = Arc::new(RedbInvoiceStore::open(&data_dir.invoices_db())?);
    let embedder = Arc::new(HttpEmbedder::from_env());
    let retrieval = RetrievalService::new(store, embedder);

    let server = InvobertMcpServer::new(InvobertState { retrieval });

    let transport = rmcp::transport::stdio();
    let running = server.serve(transport).await.map_err(|e| {
        error::Error::Config(format!("MCP server initialization failed: {e}"))
    })?;
    running
        .waiting()
        .await
        .map_err(|e| error::Error::Config(format!("MCP server error: {e}")))?;
    Ok(())
}

//! Natural-language question answering over the invoice store.
//!
//! A router model maps a user question to one of the two search tools (or
//! answers directly when no search is needed); an answer model optionally
//! writes a prose answer over the retrieved context. Both models stay
//! behind traits; the HTTP adapters target an Ollama-compatible endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::{
    criteria::{InvoiceCriteria, LineItemCriteria},
    error::{Error, Result},
    model::{InvoiceHit, LineItemHit},
    search::RetrievalService,
    text,
};

/// Where the router decided a question should go.
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedQuery {
    LineItems(LineItemCriteria),
    Invoices(InvoiceCriteria),
    /// The model answered directly without needing a search.
    Direct(String),
}

#[async_trait]
pub trait QueryRouter: Send + Sync {
    async fn route(&self, question: &str) -> Result<RoutedQuery>;
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn answer(&self, question: &str, context: &str) -> Result<String>;
}

/// Result of an `ask` request.
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    /// Router answered without a search.
    Direct(String),
    /// LLM-written answer over retrieved context.
    Answer(String),
    LineItems(Vec<LineItemHit>),
    Invoices(Vec<InvoiceHit>),
}

/// Routes a question, executes the search, and optionally generates a
/// prose answer.
pub struct AskService {
    router: Arc<dyn QueryRouter>,
    retrieval: RetrievalService,
    answers: Arc<dyn AnswerGenerator>,
}

impl AskService {
    pub fn new(
        router: Arc<dyn QueryRouter>,
        retrieval: RetrievalService,
        answers: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            router,
            retrieval,
            answers,
        }
    }

    pub async fn ask(
        &self,
        question: &str,
        llm_answer: bool,
    ) -> Result<AskOutcome> {
        match self.router.route(question).await? {
            RoutedQuery::Direct(text) => Ok(AskOutcome::Direct(text)),
            RoutedQuery::LineItems(criteria) => {
                tracing::debug!(?criteria, "routed to line item search");
                let hits = self.retrieval.search_line_items(&criteria).await?;
                if llm_answer {
                    let context = format_line_item_context(&hits);
                    let answer =
                        self.answers.answer(question, &context).await?;
                    Ok(AskOutcome::Answer(answer))
                } else {
                    Ok(AskOutcome::LineItems(hits))
                }
            }
            RoutedQuery::Invoices(criteria) => {
                tracing::debug!(?criteria, "routed to invoice search");
                let hits = self.retrieval.search_invoices(&criteria).await?;
                if llm_answer {
                    let context = format_invoice_context(&hits);
                    let answer =
                        self.answers.answer(question, &context).await?;
                    Ok(AskOutcome::Answer(answer))
                } else {
                    Ok(AskOutcome::Invoices(hits))
                }
            }
        }
    }
}

/// Render retrieved line items as context for answer generation.
pub fn format_line_item_context(hits: &[LineItemHit]) -> String {
    let mut context = String::from("Found Line Items:\n");
    for hit in hits {
        let cost = hit
            .total_amount
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        context.push_str(&format!(
            "- Item: {} | Cost: {} | Date: {} | [Inv: {}, Page: {}]\n",
            hit.description,
            cost,
            hit.delivery_date.as_deref().unwrap_or("unknown"),
            hit.invoice_number.as_deref().unwrap_or("?"),
            hit.page_number,
        ));
    }
    context
}

/// Render retrieved invoices as context for answer generation.
pub fn format_invoice_context(hits: &[InvoiceHit]) -> String {
    let mut context = String::from("Found Invoices:\n");
    for hit in hits {
        context.push_str(&format!(
            "- Invoice: {} | Sender: {} | Date: {} | Total: {} {} | Status: {}\n",
            hit.invoice_number.as_deref().unwrap_or("?"),
            hit.sender_name.as_deref().unwrap_or("?"),
            hit.invoice_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            hit.total_amount
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            hit.currency,
            hit.status,
        ));
    }
    context
}

const ROUTER_SYSTEM_PROMPT: &str = "\
You route questions about ingested invoices. Respond with a single JSON \
object. To search inside invoices (line items, costs, products, table \
contents) use {\"tool\": \"search_line_items\", \"arguments\": \
{query_text?, page_number?, min_page?, max_page?, invoice_number?, \
sender_name?, invoice_date_start?, invoice_date_end?, min_amount?, \
max_amount?, limit?}}. For high-level document questions (how many \
invoices, processing status, filenames) use {\"tool\": \
\"search_invoices\", \"arguments\": {invoice_number?, sender_name?, \
filename_query?, status?, start_date?, end_date?}}. Dates are \
YYYY-MM-DD. If no search is needed, respond with {\"answer\": \"...\"}.";

const ANSWER_SYSTEM_PROMPT: &str = "\
You answer questions about invoices using only the provided context. Be \
concise; cite invoice numbers and page numbers when relevant. If the \
context does not contain the answer, say so.";

/// The JSON envelope the router model is instructed to emit.
#[derive(Debug, Deserialize)]
struct RouterReply {
    tool: Option<String>,
    arguments: Option<serde_json::Value>,
    answer: Option<String>,
}

/// [`QueryRouter`] backed by an Ollama-compatible HTTP endpoint.
pub struct HttpQueryRouter {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl HttpQueryRouter {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var(crate::extract::LLM_URL_ENV_VAR)
            .unwrap_or_else(|_| crate::extract::DEFAULT_LLM_URL.to_string());
        let model = std::env::var(crate::extract::LLM_MODEL_ENV_VAR)
            .unwrap_or_else(|_| crate::extract::DEFAULT_LLM_MODEL.to_string());
        Self::new(&base_url, &model)
    }
}

#[async_trait]
impl QueryRouter for HttpQueryRouter {
    async fn route(&self, question: &str) -> Result<RoutedQuery> {
        let raw = generate(
            &self.client,
            &self.base_url,
            &self.model,
            ROUTER_SYSTEM_PROMPT,
            question,
            true,
        )
        .await?;

        parse_router_reply(&raw)
    }
}

/// [`AnswerGenerator`] backed by an Ollama-compatible HTTP endpoint.
pub struct HttpAnswerGenerator {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl HttpAnswerGenerator {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        let base_url = std::env::var(crate::extract::LLM_URL_ENV_VAR)
            .unwrap_or_else(|_| crate::extract::DEFAULT_LLM_URL.to_string());
        let model = std::env::var(crate::extract::LLM_MODEL_ENV_VAR)
            .unwrap_or_else(|_| crate::extract::DEFAULT_LLM_MODEL.to_string());
        Self::new(&base_url, &model)
    }
}

#[async_trait]
impl AnswerGenerator for HttpAnswerGenerator {
    async fn answer(&self, question: &str, context: &str) -> Result<String> {
        let prompt = format!("{context}\nQuestion: {question}");
        let answer = generate(
            &self.client,
            &self.base_url,
            &self.model,
            ANSWER_SYSTEM_PROMPT,
            &prompt,
            false,
        )
        .await?;

        if answer.trim().is_empty() {
            return Err(Error::Extraction("no generated answer returned".into()));
        }
        Ok(answer)
    }
}

async fn generate(
    client: &reqwest::Client,
    base_url: &str,
    model: &str,
    system: &str,
    prompt: &str,
    json_mode: bool,
) -> Result<String> {
    let url = format!("{base_url}/api/generate");
    let mut body = json!({
        "model": model,
        "prompt": prompt,
        "system": system,
        "stream": false,
    });
    if json_mode {
        body["format"] = json!("json");
    }

    let response =
        client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_connect() {
                Error::Extraction(format!(
                    "cannot reach model endpoint at {base_url}"
                ))
            } else {
                Error::Extraction(e.to_string())
            }
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Extraction(format!(
            "model endpoint returned {status}: {body}"
        )));
    }

    #[derive(Deserialize)]
    struct GenerateResponse {
        response: String,
    }

    let parsed: GenerateResponse = response
        .json()
        .await
        .map_err(|e| Error::Extraction(e.to_string()))?;
    Ok(parsed.response)
}

fn parse_router_reply(raw: &str) -> Result<RoutedQuery> {
    let cleaned = text::strip_code_fences(raw);
    let reply: RouterReply = serde_json::from_str(&cleaned).map_err(|e| {
        Error::Extraction(format!("router returned malformed JSON: {e}"))
    })?;

    match reply.tool.as_deref() {
        Some("search_line_items") => {
            let criteria: LineItemCriteria = serde_json::from_value(
                reply.arguments.unwrap_or_else(|| json!({})),
            )?;
            Ok(RoutedQuery::LineItems(criteria))
        }
        Some("search_invoices") => {
            let criteria: InvoiceCriteria = serde_json::from_value(
                reply.arguments.unwrap_or_else(|| json!({})),
            )?;
            Ok(RoutedQuery::Invoices(criteria))
        }
        Some(other) => Err(Error::Extraction(format!(
            "router selected unknown tool: {other}"
        ))),
        None => match reply.answer {
            Some(answer) => Ok(RoutedQuery::Direct(answer)),
            None => Err(Error::Extraction(
                "router returned neither a tool call nor an answer".into(),
            )),
        },
    }
}

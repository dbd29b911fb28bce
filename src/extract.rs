use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    chain::{ChainedPageExtraction, PageState, SinglePageExtraction},
    error::{Error, Result},
    text,
};

pub const DEFAULT_LLM_URL: &str = "http://localhost:11434";
pub const DEFAULT_LLM_MODEL: &str = "llama3.1";
pub const LLM_URL_ENV_VAR: &str = "INVOBERT_LLM_URL";
pub const LLM_MODEL_ENV_VAR: &str = "INVOBERT_LLM_MODEL";

const REQUEST_TIMEOUT_SECS: u64 = 300;

/// The external document-understanding model, seen through the two
/// operations the page chain needs.
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Extract one page of a multi-page document, given the state the
    /// previous page ended in.
    async fn extract_page(
        &self,
        page_text: &str,
        page_number: u32,
        previous_state: &PageState,
    ) -> Result<ChainedPageExtraction>;

    /// One-shot extraction for single-page documents.
    async fn extract_single(
        &self,
        page_text: &str,
    ) -> Result<SinglePageExtraction>;
}

const CHAINED_SYSTEM_PROMPT: &str = "\
You extract structured data from one page of a scanned invoice. You are \
given the table/section state the previous page ended in; use it to \
continue tables that span the page break. Respond with a single JSON \
object with keys: next_page_state {table_status: one of no_table, \
table_open_headless, table_open_with_headers; active_columns: string \
list; active_section_title: string}, invoice_context (nullable object \
with invoice_number, invoice_date, sender_name, receiver_name, currency, \
total_amount, only for data printed on THIS page), and line_items (list \
of {description, item_code, delivery_date, quantity, quantity_unit, \
unit_price, line_total, section}).";

const SINGLE_SYSTEM_PROMPT: &str = "\
You extract structured data from a single-page scanned invoice. Respond \
with a single JSON object with keys: invoice_context {invoice_number, \
invoice_date, sender_name, receiver_name, currency, total_amount} and \
line_items (list of {description, item_code, delivery_date, quantity, \
quantity_unit, unit_price, line_total, section}).";

/// Request body for the generate endpoint.
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    format: &'a str,
}

/// Response body from the generate endpoint.
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// [`PageExtractor`] backed by an Ollama-compatible HTTP endpoint.
pub struct HttpPageExtractor {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl HttpPageExtractor {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }

    /// Resolve endpoint and model from `INVOBERT_LLM_URL` /
    /// `INVOBERT_LLM_MODEL`, falling back to a local Ollama instance.
    pub fn from_env() -> Self {
        let base_url = std::env::var(LLM_URL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_LLM_URL.to_string());
        let model = std::env::var(LLM_MODEL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string());
        Self::new(&base_url, &model)
    }

    async fn generate(&self, system: &str, prompt: String) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
            format: "json",
        };

        let response =
            self.client.post(&url).json(&body).send().await.map_err(|e| {
                if e.is_connect() {
                    Error::Extraction(format!(
                        "cannot reach extraction endpoint at {}",
                        self.base_url
                    ))
                } else {
                    Error::Extraction(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Extraction(format!(
                "extraction endpoint returned {status}: {body}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Extraction(e.to_string()))?;
        Ok(parsed.response)
    }
}

#[async_trait]
impl PageExtractor for HttpPageExtractor {
    async fn extract_page(
        &self,
        page_text: &str,
        page_number: u32,
        previous_state: &PageState,
    ) -> Result<ChainedPageExtraction> {
        let state_json = previous_state.to_json()?;
        let prompt = format!(
            "Previous page state: {state_json}\n\nPage {page_number} text:\n{page_text}"
        );

        let raw = self.generate(CHAINED_SYSTEM_PROMPT, prompt).await?;
        parse_model_json(&raw)
    }

    async fn extract_single(
        &self,
        page_text: &str,
    ) -> Result<SinglePageExtraction> {
        let prompt = format!("Invoice text:\n{page_text}");
        let raw = self.generate(SINGLE_SYSTEM_PROMPT, prompt).await?;
        parse_model_json(&raw)
    }
}

impl std::fmt::Debug for HttpPageExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPageExtractor")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Parse a JSON payload out of model output, tolerating code fences.
fn parse_model_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    let cleaned = text::strip_code_fences(raw);
    serde_json::from_str(&cleaned).map_err(|e| {
        Error::Extraction(format!("model returned malformed JSON: {e}"))
    })
}

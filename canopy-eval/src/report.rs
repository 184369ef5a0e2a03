//! Narrative policy-evaluation reports from an OpenAI-compatible chat API.

use crate::error::{EvalError, Result};
use async_trait::async_trait;
use canopy_data::DerivedRecord;
use canopy_db::{Database, QueryFilter};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4.1";

/// Upper bound on the data context sent with a prompt.
pub const MAX_CONTEXT_CHARS: usize = 50_000;
pub const SAMPLE_ROWS: usize = 20;
const TRUNCATION_MARKER: &str = "\n\n...[OVERALL CONTEXT TRUNCATED]...";

/// Produces narrative text for one parcel.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn evaluate(&self, parcel: &str) -> Result<String>;
}

/// Connection settings for the chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Sends the parcel's derived records, summarised, to a chat model.
pub struct ChatReportGenerator {
    db: Database,
    config: ChatConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatErrorBody {
    error: ChatErrorDetail,
}

#[derive(Deserialize)]
struct ChatErrorDetail {
    message: String,
}

impl ChatReportGenerator {
    pub fn new(db: Database, config: ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self { db, config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ReportGenerator for ChatReportGenerator {
    async fn evaluate(&self, parcel: &str) -> Result<String> {
        if self.config.api_key.is_empty() {
            return Err(EvalError::Report {
                message: "no API key configured (set OPENAI_API_KEY)".to_string(),
            });
        }

        let records = self
            .db
            .query_records(&QueryFilter::all().with_parcels([parcel]))?
            .records;
        let prompt = build_prompt(parcel, &build_data_context(&records)?);

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        log::info!(
            "report: requesting evaluation of {} ({} records) from {}",
            parcel,
            records.len(),
            self.config.model
        );
        let resp = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ChatErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}: {body}"));
            return Err(EvalError::Report { message });
        }

        let response: ChatResponse = serde_json::from_str(&body)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| EvalError::Report {
                message: "empty response from model".to_string(),
            })
    }
}

/// Summarise records as column names, row count and the first
/// [`SAMPLE_ROWS`] rows as CSV, capped at [`MAX_CONTEXT_CHARS`].
pub fn build_data_context(records: &[DerivedRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records.iter().take(SAMPLE_ROWS) {
        writer
            .serialize(record)
            .map_err(|e| EvalError::Report { message: e.to_string() })?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| EvalError::Report { message: e.to_string() })?;
    let sample = String::from_utf8_lossy(&bytes);

    let columns = sample
        .lines()
        .next()
        .map_or_else(|| RECORD_COLUMNS.join(", "), |header| header.replace(',', ", "));

    let parts = [
        "=== CSV SUMMARY ===".to_string(),
        format!("Columns: {columns}"),
        format!("Rows: {}", records.len()),
        format!("Sample rows (up to {SAMPLE_ROWS}):"),
        sample.into_owned(),
    ];
    Ok(truncate_context(parts.join("\n\n")))
}

const RECORD_COLUMNS: [&str; 16] = [
    "parcel", "date", "year", "month", "vv_db", "vh_db", "vv_lin", "vh_lin", "vh_vv_ratio", "rvi",
    "rfdi", "red_ref", "nir_ref", "ndvi", "filled", "alert",
];

fn truncate_context(combined: String) -> String {
    if combined.chars().count() <= MAX_CONTEXT_CHARS {
        return combined;
    }
    let keep = MAX_CONTEXT_CHARS - TRUNCATION_MARKER.chars().count();
    let mut out: String = combined.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

pub fn build_prompt(parcel: &str, data_context: &str) -> String {
    format!(
        "You are a policy effectiveness evaluator. Using the CSV data containing \
         satellite-derived vegetation indices for the forest parcel '{parcel}' \
         (radar backscatter, RVI, RFDI, NDVI and disturbance alerts), perform the following:\n\n\
         1. Identify the mitigation steps, policies, or proposed actions that apply to this forest.\n\
         2. Examine the biomass and forest cover trends in the data over time.\n\
         3. For each step, determine whether the observed data indicates it is achieving \
         its intended outcome (e.g. increased biomass or fewer alerts).\n\
         4. Highlight any correlation between actions and observed improvements. \
         If data is missing or inconclusive, say so.\n\
         5. Present results as a table or bullet points with: Proposed Step, \
         Evidence, Observed Outcome, Effectiveness Assessment.\n\n\
         === DATA CONTEXT ===\n{data_context}"
    )
}

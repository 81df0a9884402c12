use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use hyper::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Request, Uri};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::http::{ensure_success, read_body, Transport};
use crate::retry::{send_with_retry, RetryPolicy};

/// Maximum characters of serialized data context sent to OpenAI.
const OPENAI_CONTEXT_CHARS: usize = 4000;
const TEMPERATURE: f64 = 0.3;
const DEEPSEEK_MAX_TOKENS: u32 = 800;
const NO_CONTENT: &str = "No content.";

const OPENAI_SYSTEM: &str = "You are an AI that analyzes water quality datasets.";
const DEEPSEEK_SYSTEM: &str = "You are a data analyst for river water quality. \
You receive a compact JSON summary from sensors. \
Be concise, structured, and specific. Use bullet points.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    DeepSeek,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Provider::OpenAi => f.write_str("openai"),
            Provider::DeepSeek => f.write_str("deepseek"),
        }
    }
}

impl Provider {
    /// Vendor name as written in messages, e.g. "DeepSeek".
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OpenAI",
            Provider::DeepSeek => "DeepSeek",
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "deepseek" => Ok(Provider::DeepSeek),
            _ => Err(Error::InvalidProvider(s.to_string())),
        }
    }
}

/// A preset group of questions offered to the user.
#[derive(Debug, Clone, Copy)]
pub struct Category {
    pub label: &'static str,
    pub prompts: &'static [&'static str],
}

pub const CATEGORIES: &[Category] = &[
    Category {
        label: "Trend and Behavior Insights",
        prompts: &[
            "Summarize the recent 7-day trend for all parameters.",
            "Which parameters show an increasing trend over the past month?",
            "Highlight any abnormal changes or spikes in the last 24 hours.",
            "Compare today's readings with the monthly average.",
        ],
    },
    Category {
        label: "Anomaly and Threshold Detection",
        prompts: &[
            "List parameters exceeding threshold limits in the last 7 days.",
            "Which parameter had the highest deviation from normal range?",
            "What is the likely cause of recent pH fluctuations?",
        ],
    },
    Category {
        label: "Prediction and Early Warning",
        prompts: &[
            "Predict pollution risk in the next 3 days.",
            "What is the risk level of deterioration this week?",
        ],
    },
    Category {
        label: "Performance Summary",
        prompts: &[
            "Provide a weekly water quality summary.",
            "Is water quality within acceptable standards?",
            "Which parameter influences overall quality today?",
        ],
    },
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightRequest {
    pub prompt: String,
    #[serde(default)]
    pub category: Option<String>,
    /// Data context, usually a dataset summary.
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Chat completion body for OpenAI: the prompt followed by the data context,
/// cut to a fixed number of characters.
pub fn openai_body(req: &InsightRequest, model: &str) -> Value {
    let context = req.payload.to_string();
    let user = format!(
        "{}\n\nData context:\n{}",
        req.prompt,
        truncate_chars(&context, OPENAI_CONTEXT_CHARS)
    );
    json!({
        "model": model,
        "messages": [
            {"role": "system", "content": OPENAI_SYSTEM},
            {"role": "user", "content": user},
        ],
        "temperature": TEMPERATURE,
    })
}

/// Chat completion body for DeepSeek: category, prompt and the full data
/// context as a fenced JSON block.
pub fn deepseek_body(req: &InsightRequest, model: &str) -> Result<Value> {
    let user = [
        req.category
            .as_deref()
            .map(|c| format!("Category: {c}"))
            .unwrap_or_default(),
        format!("Prompt: {}", req.prompt),
        "JSON data summary:".to_string(),
        "```json".to_string(),
        serde_json::to_string_pretty(&req.payload)?,
        "```".to_string(),
    ]
    .join("\n");
    Ok(json!({
        "model": model,
        "messages": [
            {"role": "system", "content": DEEPSEEK_SYSTEM},
            {"role": "user", "content": user},
        ],
        "temperature": TEMPERATURE,
        "max_tokens": DEEPSEEK_MAX_TOKENS,
    }))
}

/// Text of the first choice, trimmed, or a placeholder when empty.
pub fn parse_answer(body: &[u8]) -> Result<String> {
    let res: ChatResponse = serde_json::from_slice(body)?;
    let text = res
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| NO_CONTENT.to_string());
    Ok(text)
}

/// Forwards questions about a dataset to an LLM provider.
pub struct InsightClient {
    transport: Arc<dyn Transport>,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl InsightClient {
    pub fn new(transport: Arc<dyn Transport>, config: LlmConfig, retry: RetryPolicy) -> Self {
        InsightClient {
            transport,
            config,
            retry,
        }
    }

    pub async fn ask(&self, provider: Provider, req: &InsightRequest) -> Result<String> {
        let (url, key, body) = match provider {
            Provider::OpenAi => (
                &self.config.openai_url,
                &self.config.openai_api_key,
                openai_body(req, &self.config.openai_model),
            ),
            Provider::DeepSeek => (
                &self.config.deepseek_url,
                &self.config.deepseek_api_key,
                deepseek_body(req, &self.config.deepseek_model)?,
            ),
        };
        let key = key.as_deref().ok_or(Error::MissingApiKey(provider))?;
        let uri = Uri::from_str(url)?;
        let body = serde_json::to_vec(&body)?;
        let authorization = format!("Bearer {key}");

        log::info!("asking {}: {}", provider, req.prompt);
        let res = send_with_retry(self.transport.as_ref(), &self.retry, || {
            Ok(Request::post(uri.clone())
                .header(AUTHORIZATION, authorization.as_str())
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "application/json")
                .body(Body::from(body.clone()))?)
        })
        .await?;

        let (status, body) = read_body(res).await?;
        let body = ensure_success(status, body)?;
        parse_answer(&body)
    }
}

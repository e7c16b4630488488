use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;

use crate::config::{AiConfig, ProviderKind};
use crate::models::{AiReport, NewApplication};

// --- Provider trait ---

pub trait AIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
    fn model_name(&self) -> &str;
}

const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

pub fn create_provider(config: &AiConfig) -> Result<Box<dyn AIProvider>> {
    match config.provider {
        ProviderKind::Worker => {
            let provider = WorkerProvider::new(config.worker_url.as_deref())?;
            Ok(Box::new(provider))
        }
        ProviderKind::Anthropic => {
            let model = config.model.as_deref().unwrap_or(DEFAULT_ANTHROPIC_MODEL);
            Ok(Box::new(AnthropicProvider::new(model.to_string())?))
        }
        ProviderKind::OpenAI => {
            let model = config.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            Ok(Box::new(OpenAIProvider::new(model.to_string())?))
        }
    }
}

// --- Worker provider (prompt proxy in front of a hosted model) ---

#[derive(Debug, Serialize)]
struct WorkerRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug)]
pub struct WorkerProvider {
    url: String,
    client: reqwest::blocking::Client,
}

impl WorkerProvider {
    pub fn new(url: Option<&str>) -> Result<Self> {
        let url = url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "AI worker URL is not configured. Set OFFERFLOW_WORKER_URL or [ai] worker_url in config.toml"
                )
            })?;
        Ok(Self {
            url: url.to_string(),
            client: reqwest::blocking::Client::new(),
        })
    }
}

impl AIProvider for WorkerProvider {
    fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&WorkerRequest { prompt })
            .send()
            .context("Failed to send request to AI worker")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "AI worker request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let body: Value = response
            .json()
            .context("Failed to parse AI worker response")?;
        unwrap_worker_payload(body)
    }

    fn model_name(&self) -> &str {
        "worker"
    }
}

/// The worker answers with either `{"result": ...}`, `{"response": ...}` or
/// the payload itself; the payload may be an object or a JSON string.
fn unwrap_worker_payload(body: Value) -> Result<String> {
    let inner = match body {
        Value::Object(mut map) => {
            if let Some(result) = map.remove("result") {
                result
            } else if let Some(response) = map.remove("response") {
                response
            } else if let Some(error) = map.get("error") {
                return Err(anyhow!("AI worker returned an error: {}", error));
            } else {
                Value::Object(map)
            }
        }
        other => other,
    };

    match inner {
        Value::String(text) => Ok(text),
        Value::Null => Err(anyhow!("Empty response from AI worker")),
        other => Ok(other.to_string()),
    }
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set. Set it with: export ANTHROPIC_API_KEY=your-key-here")?;
        let client = reqwest::blocking::Client::new();
        Ok(Self { api_key, model_id, client })
    }
}

impl AIProvider for AnthropicProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Anthropic API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: AnthropicResponse = response
            .json()
            .context("Failed to parse Anthropic API response")?;

        api_response
            .content
            .into_iter()
            .next()
            .map(|block| block.text)
            .ok_or_else(|| anyhow!("No content in Anthropic API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- OpenAI provider ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set. Set it with: export OPENAI_API_KEY=your-key-here")?;
        let client = reqwest::blocking::Client::new();
        Ok(Self { api_key, model_id, client })
    }
}

impl AIProvider for OpenAIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = OpenAIRequest {
            model: self.model_id.clone(),
            max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .context("Failed to send request to OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "OpenAI API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: OpenAIResponse = response
            .json()
            .context("Failed to parse OpenAI API response")?;

        api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("No choices in OpenAI API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Job analysis ---

const SYSTEM_PROMPT: &str = "You are a helpful career assistant AI. You output strictly JSON.";

/// What the user typed before asking for an analysis. Every field may be blank.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub company_name: Option<String>,
    pub position_title: Option<String>,
    pub jd_link: Option<String>,
    pub jd_text: Option<String>,
}

impl AnalysisRequest {
    pub fn is_empty(&self) -> bool {
        [
            &self.company_name,
            &self.position_title,
            &self.jd_link,
            &self.jd_text,
        ]
        .iter()
        .all(|field| non_blank(field).is_none())
    }
}

impl From<&NewApplication> for AnalysisRequest {
    fn from(form: &NewApplication) -> Self {
        let owned = |s: &str| (!s.trim().is_empty()).then(|| s.to_string());
        Self {
            company_name: owned(&form.company_name),
            position_title: owned(&form.position_title),
            jd_link: form.jd_link.clone(),
            jd_text: form.jd_text.clone(),
        }
    }
}

/// Structured metadata returned for a job posting, validated at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAnalysis {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub position_title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(flatten)]
    pub report: AiReport,
}

pub fn build_analysis_prompt(request: &AnalysisRequest) -> String {
    let mut source = String::new();
    if let Some(link) = non_blank(&request.jd_link) {
        source.push_str(&format!("Job link: {}\n", link));
    }
    if let Some(text) = non_blank(&request.jd_text) {
        source.push_str(&format!("Job description text:\n{}\n", text));
    }

    format!(
        "Analyze this job opportunity based on the provided info.\n\
        Input company (may be empty): {company}\n\
        Input position (may be empty): {position}\n\
        {source}\n\
        IMPORTANT:\n\
        1. If the input company or position are 'Unknown' or look wrong, take the real company name and position title from the job link or description text.\n\
        2. Identify the specific work location (city). If several cities are mentioned, list them in one string. If the role is remote, say 'Remote'.\n\n\
        Return a JSON object with these keys:\n\
        companyName (string), positionTitle (string), location (string),\n\
        summary (string, a concise overview of the role),\n\
        responsibilities (array of strings), requirements (array of strings),\n\
        suitabilityAssessment (string, what kind of candidate fits best),\n\
        interviewTips (array of 3-5 strings), potentialQuestions (array of 5-8 strings).\n\n\
        Return ONLY raw JSON, no markdown formatting.",
        company = non_blank(&request.company_name).unwrap_or("Unknown"),
        position = non_blank(&request.position_title).unwrap_or("Unknown"),
    )
}

pub fn analyze_job(provider: &dyn AIProvider, request: &AnalysisRequest) -> Result<JobAnalysis> {
    let prompt = build_analysis_prompt(request);
    tracing::info!(model = provider.model_name(), "requesting job analysis");
    let response = provider.complete(&prompt, 4096)?;
    parse_analysis(&response)
}

/// Rejects anything that is not a JSON object of the expected shape, so no
/// partially typed data reaches the store.
pub fn parse_analysis(response: &str) -> Result<JobAnalysis> {
    let json = extract_json_object(response);
    let value: Value = serde_json::from_str(json).context("AI response is not valid JSON")?;
    if !value.is_object() {
        bail!("AI response is not a JSON object");
    }
    serde_json::from_value(value).context("AI response does not match the job analysis schema")
}

// Models like to wrap JSON in ``` fences or a sentence of prose.
fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

pub(crate) fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

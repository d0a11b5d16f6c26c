use serde_json::{json, Value};

use crate::error::ParseError;
use crate::models::{ProviderConfig, ProviderId};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f64 = 0.7;

/**
 * \brief Provider 无关的请求描述，由 Transport 负责真正发出。
 */
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl WireRequest {
    /** \brief 按名称（忽略大小写）查找请求头。 */
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/**
 * \brief 各 Provider 报文格式适配器。
 */
pub trait ProviderAdapter: Send + Sync {
    fn config(&self) -> &'static ProviderConfig;

    /**
     * \brief 构造请求。
     * \param message    用户消息（单轮，不携带历史）
     * \param credential API Key
     */
    fn build_request(&self, message: &str, credential: &str) -> WireRequest;

    /**
     * \brief 从原始响应体中提取回复文本。
     */
    fn parse_response(&self, raw: &str) -> Result<String, ParseError>;
}

#[derive(Debug)]
pub struct OpenAiAdapter;

#[derive(Debug)]
pub struct PerplexityAdapter;

#[derive(Debug)]
pub struct AnthropicAdapter;

static OPENAI: OpenAiAdapter = OpenAiAdapter;
static PERPLEXITY: PerplexityAdapter = PerplexityAdapter;
static ANTHROPIC: AnthropicAdapter = AnthropicAdapter;

/**
 * \brief 按 ProviderId 取得对应适配器。
 */
pub fn adapter_for(id: ProviderId) -> &'static dyn ProviderAdapter {
    match id {
        ProviderId::OpenAI => &OPENAI,
        ProviderId::Perplexity => &PERPLEXITY,
        ProviderId::Anthropic => &ANTHROPIC,
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn config(&self) -> &'static ProviderConfig {
        ProviderId::OpenAI.config()
    }

    fn build_request(&self, message: &str, credential: &str) -> WireRequest {
        chat_completions_request(self.config(), message, credential)
    }

    fn parse_response(&self, raw: &str) -> Result<String, ParseError> {
        extract_openai_content(&parse_json(raw)?)
    }
}

// Perplexity 与 OpenAI 共用 chat/completions 报文，仅端点与模型不同。
impl ProviderAdapter for PerplexityAdapter {
    fn config(&self) -> &'static ProviderConfig {
        ProviderId::Perplexity.config()
    }

    fn build_request(&self, message: &str, credential: &str) -> WireRequest {
        chat_completions_request(self.config(), message, credential)
    }

    fn parse_response(&self, raw: &str) -> Result<String, ParseError> {
        extract_openai_content(&parse_json(raw)?)
    }
}

impl ProviderAdapter for AnthropicAdapter {
    fn config(&self) -> &'static ProviderConfig {
        ProviderId::Anthropic.config()
    }

    fn build_request(&self, message: &str, credential: &str) -> WireRequest {
        let config = self.config();
        let body = json!({
            "model": config.model_name,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": message}],
        });
        WireRequest {
            url: config.endpoint_url.to_string(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("x-api-key".to_string(), credential.to_string()),
                (
                    "anthropic-version".to_string(),
                    ANTHROPIC_VERSION.to_string(),
                ),
            ],
            body,
        }
    }

    fn parse_response(&self, raw: &str) -> Result<String, ParseError> {
        extract_anthropic_content(&parse_json(raw)?)
    }
}

fn chat_completions_request(
    config: &ProviderConfig,
    message: &str,
    credential: &str,
) -> WireRequest {
    let body = json!({
        "model": config.model_name,
        "messages": [{"role": "user", "content": message}],
        "max_tokens": MAX_TOKENS,
        "temperature": TEMPERATURE,
    });
    WireRequest {
        url: config.endpoint_url.to_string(),
        headers: vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), format!("Bearer {}", credential)),
        ],
        body,
    }
}

fn parse_json(raw: &str) -> Result<Value, ParseError> {
    serde_json::from_str(raw).map_err(|e| ParseError::InvalidJson(e.to_string()))
}

fn extract_openai_content(v: &Value) -> Result<String, ParseError> {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or(ParseError::MissingField("choices[0].message.content"))
}

fn extract_anthropic_content(v: &Value) -> Result<String, ParseError> {
    v.get("content")
        .and_then(|arr| arr.get(0))
        .and_then(|item| item.get("text"))
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
        .ok_or(ParseError::MissingField("content[0].text"))
}

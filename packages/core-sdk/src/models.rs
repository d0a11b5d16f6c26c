use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ConfigError;

/**
 * \brief Provider 标识，同时决定端点与报文格式。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAI,
    Perplexity,
    Anthropic,
}

impl ProviderId {
    /** \brief 全部 Provider，顺序与界面下拉框一致。 */
    pub const ALL: [ProviderId; 3] = [
        ProviderId::OpenAI,
        ProviderId::Perplexity,
        ProviderId::Anthropic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAI => "openai",
            ProviderId::Perplexity => "perplexity",
            ProviderId::Anthropic => "anthropic",
        }
    }

    /**
     * \brief 获取该 Provider 的静态配置。
     */
    pub fn config(&self) -> &'static ProviderConfig {
        match self {
            ProviderId::OpenAI => &PROVIDERS[0],
            ProviderId::Perplexity => &PROVIDERS[1],
            ProviderId::Anthropic => &PROVIDERS[2],
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAI),
            "perplexity" => Ok(ProviderId::Perplexity),
            "anthropic" | "claude" => Ok(ProviderId::Anthropic),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

/**
 * \brief Provider 静态配置，运行期不可变。
 */
#[derive(Debug, Clone, Serialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    /** \brief 界面显示名称 */
    pub display_name: &'static str,
    /** \brief 完整请求地址 */
    pub endpoint_url: &'static str,
    /** \brief 模型名 */
    pub model_name: &'static str,
    pub description: &'static str,
}

pub static PROVIDERS: [ProviderConfig; 3] = [
    ProviderConfig {
        id: ProviderId::OpenAI,
        display_name: "OpenAI GPT-4",
        endpoint_url: "https://api.openai.com/v1/chat/completions",
        model_name: "gpt-4",
        description: "Advanced general-purpose AI model",
    },
    ProviderConfig {
        id: ProviderId::Perplexity,
        display_name: "Perplexity AI",
        endpoint_url: "https://api.perplexity.ai/chat/completions",
        model_name: "sonar-pro",
        description: "AI with real-time web search capabilities",
    },
    ProviderConfig {
        id: ProviderId::Anthropic,
        display_name: "Anthropic Claude",
        endpoint_url: "https://api.anthropic.com/v1/messages",
        model_name: "claude-3-sonnet-20240229",
        description: "Thoughtful and analytical AI assistant",
    },
];

/**
 * \brief 消息角色。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/**
 * \brief 会话中的一条消息，创建后不可修改。
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /** \brief 角色：user/assistant */
    pub role: Role,
    /** \brief 内容 */
    pub content: String,
    /** \brief 回复来源；用户消息为空 */
    pub provider_id: Option<ProviderId>,
    /** \brief 创建时间（UTC） */
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            provider_id: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn assistant(provider: ProviderId, content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            provider_id: Some(provider),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /**
     * \brief 导出与渲染时使用的角色名称。
     */
    pub fn role_name(&self) -> &'static str {
        match (self.role, self.provider_id) {
            (Role::User, _) => "You",
            (Role::Assistant, Some(p)) => p.config().display_name,
            (Role::Assistant, None) => "Assistant",
        }
    }
}

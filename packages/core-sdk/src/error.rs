use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/**
 * \brief 发送失败的封闭分类，由调用方映射为界面文案。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[error("missing credential")]
    MissingCredential,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("rate limited")]
    RateLimited,
    #[error("timeout")]
    Timeout,
    #[error("network error")]
    NetworkError,
    #[error("unknown error")]
    Unknown,
}

/**
 * \brief 响应体解析失败。
 */
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("response is missing `{0}`")]
    MissingField(&'static str),
}

/**
 * \brief 单次请求（attempt）的失败原因。
 */
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("request cancelled")]
    Cancelled,
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl AttemptError {
    /**
     * \brief 将最终一次失败归类。401/403 视为凭据无效，429 视为限流。
     */
    pub fn classify(&self) -> ErrorKind {
        match self {
            AttemptError::Status {
                status: 401 | 403, ..
            } => ErrorKind::InvalidCredential,
            AttemptError::Status { status: 429, .. } => ErrorKind::RateLimited,
            AttemptError::Timeout(_) => ErrorKind::Timeout,
            AttemptError::Network(_) => ErrorKind::NetworkError,
            AttemptError::Status { .. }
            | AttemptError::InvalidRequest(_)
            | AttemptError::Cancelled
            | AttemptError::Parse(_) => ErrorKind::Unknown,
        }
    }
}

/**
 * \brief 一次逻辑发送的最终结果。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendOutcome {
    Success { text: String },
    Failure { kind: ErrorKind, detail: String },
}

impl SendOutcome {
    pub fn failure(kind: ErrorKind, detail: impl Into<String>) -> Self {
        SendOutcome::Failure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Success { .. })
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            SendOutcome::Success { .. } => None,
            SendOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

/**
 * \brief 会话层错误（调用前置条件不满足）。
 */
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no message to send")]
    EmptyMessage,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

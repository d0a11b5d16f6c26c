use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

use crate::error::AttemptError;
use crate::llm::WireRequest;

/**
 * \brief 网络调用边界：2xx 返回原始响应体，其余情况返回单次失败原因。
 */
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(
        &self,
        request: &WireRequest,
        cancel: CancellationToken,
    ) -> Result<String, AttemptError>;
}

/**
 * \brief 基于 reqwest 的默认实现。
 */
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn execute(&self, request: &WireRequest) -> Result<String, AttemptError> {
        let headers = header_map(&request.headers)?;
        let resp = self
            .client
            .post(&request.url)
            .headers(headers)
            .json(&request.body)
            .send()
            .await
            .map_err(network_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AttemptError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        resp.text().await.map_err(network_err)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        request: &WireRequest,
        cancel: CancellationToken,
    ) -> Result<String, AttemptError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AttemptError::Cancelled),
            result = self.execute(request) => result,
        }
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, AttemptError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AttemptError::InvalidRequest(format!("header name {}: {}", name, e)))?;
        // 不回显取值，避免 API Key 进入日志
        let value = HeaderValue::from_str(value)
            .map_err(|_| AttemptError::InvalidRequest(format!("header value for {}", name)))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn network_err(e: reqwest::Error) -> AttemptError {
    AttemptError::Network(e.without_url().to_string())
}

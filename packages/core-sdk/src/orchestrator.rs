use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{AttemptError, ErrorKind, SendOutcome};
use crate::llm::{adapter_for, WireRequest};
use crate::models::ProviderId;
use crate::telemetry;
use crate::transport::{HttpTransport, Transport};

/**
 * \brief 重试策略：总尝试次数、单次超时与线性退避步长。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    /** \brief 第 n 次失败后等待 backoff_step * n */
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            backoff_step: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

/**
 * \brief 退避等待的时间来源，测试中可替换为记录型实现。
 */
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/**
 * \brief 驱动一次逻辑发送直至成功或重试耗尽。
 */
#[derive(Clone)]
pub struct RequestOrchestrator {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl Default for RequestOrchestrator {
    fn default() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }
}

impl RequestOrchestrator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            clock: Arc::new(TokioClock),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /**
     * \brief 发送文本到指定 Provider。
     * \param provider   目标 Provider
     * \param text       用户消息（调用方已去除首尾空白）
     * \param credential API Key，为空时不发起任何请求
     */
    pub async fn send(&self, provider: ProviderId, text: &str, credential: &str) -> SendOutcome {
        let config = provider.config();
        if credential.trim().is_empty() {
            return SendOutcome::failure(
                ErrorKind::MissingCredential,
                format!("no API key configured for {}", config.display_name),
            );
        }

        let adapter = adapter_for(provider);
        let request = adapter.build_request(text, credential);
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = AttemptError::Cancelled;

        for attempt in 1..=attempts {
            let result = match self.attempt(&request).await {
                Ok(raw) => adapter.parse_response(&raw).map_err(AttemptError::from),
                Err(e) => Err(e),
            };
            match result {
                Ok(text) => {
                    telemetry::log_event(
                        "orchestrator.send",
                        &format!(
                            "provider={} attempt={} reply_len={}",
                            provider,
                            attempt,
                            text.len()
                        ),
                    );
                    return SendOutcome::Success { text };
                }
                Err(e) => {
                    telemetry::log_error(
                        "orchestrator.attempt",
                        &format!(
                            "provider={} attempt={}/{} error={}",
                            provider, attempt, attempts, e
                        ),
                    );
                    last_error = e;
                }
            }
            if attempt < attempts {
                self.clock.sleep(self.policy.backoff_after(attempt)).await;
            }
        }

        let kind = last_error.classify();
        telemetry::log_error(
            "orchestrator.send",
            &format!("provider={} kind={:?} error={}", provider, kind, last_error),
        );
        SendOutcome::failure(kind, last_error.to_string())
    }

    async fn attempt(&self, request: &WireRequest) -> Result<String, AttemptError> {
        let cancel = CancellationToken::new();
        let call = self.transport.post(request, cancel.clone());
        tokio::pin!(call);
        tokio::select! {
            result = &mut call => result,
            _ = tokio::time::sleep(self.policy.attempt_timeout) => {
                cancel.cancel();
                // 超时后再轮询一次，使 transport 能观察到取消并释放连接
                let _ = tokio::time::timeout(Duration::ZERO, &mut call).await;
                Err(AttemptError::Timeout(self.policy.attempt_timeout))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use super::*;

    /** \brief 按脚本依次返回结果的 Transport。 */
    pub enum Step {
        Reply(Result<String, AttemptError>),
        Hang,
        /** \brief 阻塞直到收到取消信号 */
        AwaitCancel,
    }

    pub struct ScriptedTransport {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
        cancelled: AtomicUsize,
        pub requests: Mutex<Vec<WireRequest>>,
    }

    impl ScriptedTransport {
        pub fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
                cancelled: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /** \brief 观察到取消信号的次数 */
        pub fn cancelled(&self) -> usize {
            self.cancelled.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post(
            &self,
            request: &WireRequest,
            cancel: CancellationToken,
        ) -> Result<String, AttemptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(r)) => r,
                Some(Step::Hang) => std::future::pending().await,
                Some(Step::AwaitCancel) => {
                    cancel.cancelled().await;
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    Err(AttemptError::Cancelled)
                }
                None => Err(AttemptError::Network("script exhausted".into())),
            }
        }
    }

    #[derive(Default)]
    pub struct RecordingClock {
        pub sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Clock for RecordingClock {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    pub fn status(code: u16) -> Step {
        Step::Reply(Err(AttemptError::Status {
            status: code,
            reason: "stub".into(),
        }))
    }

    pub fn ok(body: &str) -> Step {
        Step::Reply(Ok(body.to_string()))
    }

    pub fn orchestrator(
        transport: Arc<ScriptedTransport>,
        clock: Arc<RecordingClock>,
    ) -> RequestOrchestrator {
        RequestOrchestrator::new(transport).with_clock(clock)
    }
}

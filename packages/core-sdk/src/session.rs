use time::OffsetDateTime;

use crate::config::{Settings, SettingsUpdate};
use crate::error::{ErrorKind, SendOutcome, SessionError};
use crate::models::{ChatMessage, ProviderId};
use crate::orchestrator::RequestOrchestrator;
use crate::telemetry;
use crate::transcript::{export_file_name, TranscriptStore};

/**
 * \brief 一次会话的全部状态：设置、会话记录与请求编排器。
 *
 * 创建即初始化，销毁即结束；不存在全局会话状态。
 */
pub struct Session {
    settings: Settings,
    transcript: TranscriptStore,
    orchestrator: RequestOrchestrator,
}

/**
 * \brief 导出结果：文件名与正文。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub file_name: String,
    pub content: String,
}

impl Session {
    pub fn new(settings: Settings, orchestrator: RequestOrchestrator) -> Self {
        telemetry::set_enabled(settings.telemetry_enabled);
        Self {
            settings,
            transcript: TranscriptStore::new(),
            orchestrator,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /**
     * \brief 替换设置；校验失败时保留原设置。
     */
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), SessionError> {
        settings.validate()?;
        telemetry::set_enabled(settings.telemetry_enabled);
        self.settings = settings;
        telemetry::log_event("session.settings", "settings updated");
        Ok(())
    }

    /**
     * \brief 合并局部更新；请求中未出现的 API Key 保持不变。
     */
    pub fn apply_update(&mut self, update: SettingsUpdate) -> Result<(), SessionError> {
        let next = self.settings.merged(update);
        self.update_settings(next)
    }

    pub fn transcript(&self) -> &TranscriptStore {
        &self.transcript
    }

    pub fn clear_transcript(&mut self) {
        let removed = self.transcript.len();
        self.transcript.clear();
        telemetry::log_event("session.transcript", &format!("cleared {} messages", removed));
    }

    pub fn export(&self) -> Option<Export> {
        let content = self.transcript.export_text()?;
        Some(Export {
            file_name: export_file_name(OffsetDateTime::now_utc().date()),
            content,
        })
    }

    /**
     * \brief 提交一条用户消息并等待回复。
     *
     * 凭据缺失时直接返回失败且不写入会话记录；成功时依次追加用户与助手消息。
     */
    pub async fn submit(
        &mut self,
        provider: ProviderId,
        text: &str,
    ) -> Result<SendOutcome, SessionError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        let credential = self.settings.credential(provider).to_string();
        if credential.trim().is_empty() {
            return Ok(self.orchestrator.send(provider, text, &credential).await);
        }

        self.transcript.append(ChatMessage::user(text));
        telemetry::log_event(
            "session.submit",
            &format!("provider={} prompt_len={}", provider, text.len()),
        );

        let outcome = self.orchestrator.send(provider, text, &credential).await;
        if let SendOutcome::Success { text: reply } = &outcome {
            self.transcript
                .append(ChatMessage::assistant(provider, reply.clone()));
        }
        Ok(outcome)
    }
}

/**
 * \brief 错误类别到界面提示文案的映射。
 */
pub fn user_copy(kind: ErrorKind, provider: ProviderId, detail: &str) -> String {
    let name = provider.config().display_name;
    match kind {
        ErrorKind::MissingCredential => {
            format!("Please configure your {} API key in settings.", name)
        }
        ErrorKind::InvalidCredential => {
            format!("Your {} API key was rejected. Please check it in settings.", name)
        }
        ErrorKind::RateLimited => {
            format!("{} is rate limiting requests. Please wait and try again.", name)
        }
        ErrorKind::Timeout => format!("{} did not respond in time. Please try again.", name),
        ErrorKind::NetworkError => {
            "Network error while contacting the AI service. Check your connection.".to_string()
        }
        ErrorKind::Unknown => format!("Failed to get AI response: {}", detail),
    }
}

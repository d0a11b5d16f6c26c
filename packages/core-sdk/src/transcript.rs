use time::{macros::format_description, Date, OffsetDateTime};

use crate::models::ChatMessage;

const EXPORT_TITLE: &str = "Voice AI Chatbot Conversation";

/**
 * \brief 只追加的会话记录；除整体清空外不允许删改。
 */
#[derive(Debug, Clone, Default)]
pub struct TranscriptStore {
    messages: Vec<ChatMessage>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /** \brief 供“复制消息”使用。 */
    pub fn get(&self, index: usize) -> Option<&ChatMessage> {
        self.messages.get(index)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /**
     * \brief 导出为纯文本；空记录返回 None。
     */
    pub fn export_text(&self) -> Option<String> {
        if self.messages.is_empty() {
            return None;
        }
        let mut out = format!("{}\n{}\n\n", EXPORT_TITLE, "=".repeat(32));
        for message in &self.messages {
            out.push_str(&format!(
                "[{}] {}:\n{}\n\n",
                format_timestamp(message.created_at),
                message.role_name(),
                message.content
            ));
        }
        Some(out)
    }
}

/**
 * \brief 导出文件名：voice-chat-YYYY-MM-DD.txt
 */
pub fn export_file_name(date: Date) -> String {
    let fmt = format_description!("[year]-[month]-[day]");
    let day = date
        .format(fmt)
        .unwrap_or_else(|_| date.to_string());
    format!("voice-chat-{}.txt", day)
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    ts.to_offset(time::UtcOffset::UTC)
        .format(fmt)
        .unwrap_or_else(|_| ts.to_string())
}

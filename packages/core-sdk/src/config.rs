use std::{collections::HashMap, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::ProviderId;

const ENV_PREFIX: &str = "VOICECHAT_";

/**
 * \brief 每个 Provider 的 API Key，仅存在于当前会话内存中。
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeys {
    #[serde(default)]
    pub openai: String,
    #[serde(default)]
    pub perplexity: String,
    #[serde(default)]
    pub anthropic: String,
}

impl ApiKeys {
    pub fn get(&self, provider: ProviderId) -> &str {
        match provider {
            ProviderId::OpenAI => &self.openai,
            ProviderId::Perplexity => &self.perplexity,
            ProviderId::Anthropic => &self.anthropic,
        }
    }

    pub fn set(&mut self, provider: ProviderId, key: impl Into<String>) {
        let slot = match provider {
            ProviderId::OpenAI => &mut self.openai,
            ProviderId::Perplexity => &mut self.perplexity,
            ProviderId::Anthropic => &mut self.anthropic,
        };
        *slot = key.into();
    }

    pub fn is_configured(&self, provider: ProviderId) -> bool {
        !self.get(provider).trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

/**
 * \brief 会话级设置；语言、音频与主题仅供前端录音与渲染使用。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_keys: ApiKeys,
    /** \brief 语音识别语言，如 en-US */
    pub language: String,
    pub audio_format: AudioFormat,
    /** \brief 录音采样率（Hz） */
    pub sample_rate: u32,
    pub theme: Theme,
    #[serde(default)]
    pub telemetry_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_keys: ApiKeys::default(),
            language: "en-US".to_string(),
            audio_format: AudioFormat::Wav,
            sample_rate: 44100,
            theme: Theme::System,
            telemetry_enabled: false,
        }
    }
}

impl Settings {
    /**
     * \brief 从进程环境变量加载设置，缺省项使用默认值。
     */
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /**
     * \brief 从任意键值对加载（便于测试）。
     */
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(ENV_PREFIX).map(|k| (k.to_string(), v)))
            .collect();

        let mut settings = Settings::default();
        for provider in ProviderId::ALL {
            let key = format!("{}_API_KEY", provider.as_str().to_ascii_uppercase());
            if let Some(value) = vars.get(&key) {
                settings.api_keys.set(provider, value.trim());
            }
        }
        if let Some(lang) = vars.get("LANGUAGE") {
            settings.language = lang.trim().to_string();
        }
        if let Some(rate) = vars.get("SAMPLE_RATE") {
            settings.sample_rate = u32::from_str(rate.trim()).map_err(|_| {
                ConfigError::InvalidValue {
                    key: "sample_rate",
                    value: rate.clone(),
                }
            })?;
        }
        if let Some(flag) = vars.get("TELEMETRY") {
            settings.telemetry_enabled = parse_flag(flag).ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: "telemetry",
                    value: flag.clone(),
                }
            })?;
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.language.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "language",
                value: self.language.clone(),
            });
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sample_rate",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn credential(&self, provider: ProviderId) -> &str {
        self.api_keys.get(provider)
    }
}

/**
 * \brief API Key 局部更新：缺省字段保留原值，空字符串表示清除。
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiKeysUpdate {
    #[serde(default)]
    pub openai: Option<String>,
    #[serde(default)]
    pub perplexity: Option<String>,
    #[serde(default)]
    pub anthropic: Option<String>,
}

/**
 * \brief 设置局部更新，对应设置面板的一次保存。
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub api_keys: ApiKeysUpdate,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub audio_format: Option<AudioFormat>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub telemetry_enabled: Option<bool>,
}

impl Settings {
    /**
     * \brief 将局部更新合并到当前设置上，返回新设置（未校验）。
     */
    pub fn merged(&self, update: SettingsUpdate) -> Settings {
        let mut next = self.clone();
        let keys = [
            (ProviderId::OpenAI, update.api_keys.openai),
            (ProviderId::Perplexity, update.api_keys.perplexity),
            (ProviderId::Anthropic, update.api_keys.anthropic),
        ];
        for (provider, key) in keys {
            if let Some(key) = key {
                next.api_keys.set(provider, key.trim());
            }
        }
        if let Some(language) = update.language {
            next.language = language.trim().to_string();
        }
        if let Some(format) = update.audio_format {
            next.audio_format = format;
        }
        if let Some(rate) = update.sample_rate {
            next.sample_rate = rate;
        }
        if let Some(theme) = update.theme {
            next.theme = theme;
        }
        if let Some(enabled) = update.telemetry_enabled {
            next.telemetry_enabled = enabled;
        }
        next
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

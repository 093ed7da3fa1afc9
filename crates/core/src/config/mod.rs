use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::guardrails::{FilterLevel, SafetyMode};
use crate::prompts::PromptMode;

mod inference;

pub use inference::{
    map_legacy_backend, resolve_config, InferenceMode, InferenceModeConfig, ProviderKind,
};

fn default_temperature() -> f32 {
    0.8
}

fn default_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_fallback_pause_ms() -> u64 {
    500
}

fn default_global_style() -> String {
    "soft watercolor storybook illustration, gentle warm lighting, rounded friendly shapes, \
     cozy bedtime atmosphere, muted pastel colors, no text, no letters"
        .to_string()
}

fn default_style_max_words() -> usize {
    20
}

fn default_clip_max_words() -> usize {
    60
}

fn default_child_mode() -> bool {
    true
}

fn default_severity_threshold() -> u8 {
    4
}

fn default_cloud_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_cloud_story_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_cloud_speech_model() -> String {
    "tts-1".to_string()
}

fn default_cloud_voice() -> String {
    "shimmer".to_string()
}

fn default_cloud_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_local_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_local_story_model() -> String {
    "llama3.2".to_string()
}

fn default_local_tts_url() -> String {
    "http://localhost:5002".to_string()
}

fn default_local_image_url() -> String {
    "http://localhost:7860".to_string()
}

fn default_image_steps() -> u32 {
    25
}

fn default_companion_base_url() -> String {
    "http://127.0.0.1:8765".to_string()
}

fn default_companion_voice() -> String {
    "default".to_string()
}

fn default_companion_image_steps() -> u32 {
    20
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown inference mode `{0}`")]
    UnknownInferenceMode(String),
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_timeout(),
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PromptConfig {
    #[serde(default)]
    pub mode: PromptMode,
    #[serde(default)]
    pub custom_directories: Vec<PathBuf>,
    #[serde(default = "default_global_style")]
    pub global_style: String,
    #[serde(default = "default_style_max_words")]
    pub style_max_words: usize,
    #[serde(default = "default_clip_max_words")]
    pub clip_max_words: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            mode: PromptMode::default(),
            custom_directories: Vec::new(),
            global_style: default_global_style(),
            style_max_words: default_style_max_words(),
            clip_max_words: default_clip_max_words(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GuardrailSettings {
    #[serde(default)]
    pub config_path: Option<PathBuf>,
    #[serde(default)]
    pub safety_mode: SafetyMode,
    #[serde(default = "default_child_mode")]
    pub child_mode: bool,
    #[serde(default)]
    pub filter_level: FilterLevel,
    #[serde(default)]
    pub moderation_enabled: bool,
    #[serde(default = "default_severity_threshold")]
    pub moderation_severity_threshold: u8,
    #[serde(default)]
    pub parental_consent_recorded: bool,
}

impl Default for GuardrailSettings {
    fn default() -> Self {
        Self {
            config_path: None,
            safety_mode: SafetyMode::default(),
            child_mode: default_child_mode(),
            filter_level: FilterLevel::default(),
            moderation_enabled: false,
            moderation_severity_threshold: default_severity_threshold(),
            parental_consent_recorded: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CloudConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_cloud_base_url")]
    pub base_url: String,
    #[serde(default = "default_cloud_story_model")]
    pub story_model: String,
    #[serde(default = "default_cloud_speech_model")]
    pub speech_model: String,
    #[serde(default = "default_cloud_voice")]
    pub voice: String,
    #[serde(default = "default_cloud_image_model")]
    pub image_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_cloud_base_url(),
            story_model: default_cloud_story_model(),
            speech_model: default_cloud_speech_model(),
            voice: default_cloud_voice(),
            image_model: default_cloud_image_model(),
            temperature: default_temperature(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LocalConfig {
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
    #[serde(default = "default_local_story_model")]
    pub story_model: String,
    #[serde(default = "default_local_tts_url")]
    pub tts_url: String,
    #[serde(default)]
    pub voice_model_path: Option<PathBuf>,
    #[serde(default = "default_local_image_url")]
    pub image_url: String,
    #[serde(default = "default_image_steps")]
    pub image_steps: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_url: default_local_base_url(),
            story_model: default_local_story_model(),
            tts_url: default_local_tts_url(),
            voice_model_path: None,
            image_url: default_local_image_url(),
            image_steps: default_image_steps(),
            temperature: default_temperature(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CompanionConfig {
    #[serde(default = "default_companion_base_url")]
    pub base_url: String,
    #[serde(default = "default_companion_voice")]
    pub voice: String,
    #[serde(default = "default_companion_image_steps")]
    pub image_steps: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            base_url: default_companion_base_url(),
            voice: default_companion_voice(),
            image_steps: default_companion_image_steps(),
            temperature: default_temperature(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderSettings {
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub companion: CompanionConfig,
}

/// Process-wide settings, built once at startup and shared read-only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub inference_mode: InferenceMode,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_fallback_pause_ms")]
    pub fallback_pause_ms: u64,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default)]
    pub guardrails: GuardrailSettings,
    #[serde(default)]
    pub providers: ProviderSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inference_mode: InferenceMode::default(),
            retry: RetrySettings::default(),
            fallback_pause_ms: default_fallback_pause_ms(),
            prompts: PromptConfig::default(),
            guardrails: GuardrailSettings::default(),
            providers: ProviderSettings::default(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode_config(&self) -> InferenceModeConfig {
        self.inference_mode.config()
    }

    pub fn fallback_pause(&self) -> Duration {
        Duration::from_millis(self.fallback_pause_ms)
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value = serde_json::from_str(input)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let settings = if value.get("preferred_backend").is_some()
            && value.get("inference_mode").is_none()
        {
            let legacy: LegacySettings = serde_json::from_value(value)?;
            Self::from_legacy(legacy)
        } else {
            serde_json::from_value(value)?
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Loads settings from `path`, or returns defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_path(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.max_retries",
                reason: "must allow at least one attempt".to_string(),
            });
        }
        if self.retry.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.timeout_secs",
                reason: "must be positive".to_string(),
            });
        }
        if self.prompts.clip_max_words == 0 {
            return Err(ConfigError::Invalid {
                field: "prompts.clip_max_words",
                reason: "must be positive".to_string(),
            });
        }
        if self.guardrails.moderation_severity_threshold > 7 {
            return Err(ConfigError::Invalid {
                field: "guardrails.moderation_severity_threshold",
                reason: format!(
                    "{} is outside the 0-7 severity scale",
                    self.guardrails.moderation_severity_threshold
                ),
            });
        }
        Ok(())
    }

    fn from_legacy(legacy: LegacySettings) -> Self {
        let mut settings = Self::default();

        if let Some(backend) = legacy.preferred_backend.as_deref() {
            settings.inference_mode = map_legacy_backend(backend);
        }
        if let Some(key) = legacy.openai_api_key.filter(|k| !k.trim().is_empty()) {
            settings.providers.cloud.api_key = key;
        }
        if let Some(url) = legacy.ollama_url.filter(|u| !u.trim().is_empty()) {
            settings.providers.local.base_url = url;
        }
        if let Some(url) = legacy.companion_url.filter(|u| !u.trim().is_empty()) {
            settings.providers.companion.base_url = url;
        }
        if let Some(timeout) = legacy.request_timeout {
            settings.retry.timeout_secs = timeout;
        }
        if let Some(path) = legacy.guardrails_path {
            settings.guardrails.config_path = Some(path);
        }

        settings
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
struct LegacySettings {
    #[serde(default)]
    preferred_backend: Option<String>,
    #[serde(default)]
    openai_api_key: Option<String>,
    #[serde(default)]
    ollama_url: Option<String>,
    #[serde(default)]
    companion_url: Option<String>,
    #[serde(default)]
    request_timeout: Option<u64>,
    #[serde(default)]
    guardrails_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_modern_settings() {
        let json = r#"{
            "inference_mode": "server_only",
            "retry": { "max_retries": 5, "base_delay_ms": 250 },
            "prompts": { "mode": "mindfulness", "clip_max_words": 40 },
            "guardrails": { "child_mode": false, "filter_level": "strict" },
            "providers": {
                "local": { "story_model": "qwen2.5:3b" }
            }
        }"#;

        let settings = Settings::from_json_str(json).unwrap();
        assert_eq!(settings.inference_mode, InferenceMode::ServerOnly);
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.timeout_secs, 120);
        assert_eq!(settings.prompts.mode, PromptMode::Mindfulness);
        assert_eq!(settings.prompts.clip_max_words, 40);
        assert!(!settings.guardrails.child_mode);
        assert_eq!(settings.guardrails.filter_level, FilterLevel::Strict);
        assert_eq!(settings.providers.local.story_model, "qwen2.5:3b");
        assert_eq!(
            settings.providers.local.base_url,
            "http://localhost:11434/v1"
        );
    }

    #[test]
    fn legacy_preferred_backend_maps_to_mode() {
        let json = r#"{
            "preferred_backend": "local",
            "openai_api_key": "sk-test",
            "request_timeout": 30
        }"#;

        let settings = Settings::from_json_str(json).unwrap();
        assert_eq!(settings.inference_mode, InferenceMode::ServerFirst);
        assert_eq!(settings.providers.cloud.api_key, "sk-test");
        assert_eq!(settings.retry.timeout_secs, 30);
    }

    #[test]
    fn explicit_mode_wins_over_legacy_flag() {
        let json = r#"{ "preferred_backend": "phone", "inference_mode": "cloud_only" }"#;
        let settings = Settings::from_json_str(json).unwrap();
        assert_eq!(settings.inference_mode, InferenceMode::CloudOnly);
    }

    #[test]
    fn stale_prompt_keys_are_ignored() {
        let json = r#"{ "prompts": { "enable_hot_reload": true, "style_max_words": 12 } }"#;
        let settings = Settings::from_json_str(json).unwrap();
        assert_eq!(settings.prompts.style_max_words, 12);
        assert_eq!(settings.prompts, PromptConfig { style_max_words: 12, ..PromptConfig::default() });
    }

    #[test]
    fn rejects_zero_retries() {
        let err = Settings::from_json_str(r#"{ "retry": { "max_retries": 0 } }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "retry.max_retries",
                ..
            }
        ));
    }

    #[test]
    fn settings_round_trip_through_disk() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.inference_mode = InferenceMode::PhoneFirst;
        settings.to_path(&path).unwrap();

        let loaded = Settings::load_or_default(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().unwrap();
        let settings = Settings::load_or_default(&temp.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}

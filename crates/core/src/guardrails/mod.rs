//! Content-safety rules applied before prompts reach a model and after output comes back.
//!
//! Two gates with different strictness live here. [`ContentGuard`] is advisory: it
//! reports violations and leaves the decision to the caller. [`PromptSanitizer`] is
//! the hard gate in front of every provider call: it rewrites what it can and
//! returns a [`GuardrailError`] when the prompt cannot be made safe.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod config;
mod content;
mod moderation;
mod sanitizer;

pub use config::{GuardrailConfigLoader, GuardrailRules, ToneThresholds};
pub use content::ContentGuard;
pub use moderation::{CategorySeverity, ModerationClient, ModerationError, ModerationVerdict};
pub use sanitizer::{PromptSanitizer, SanitizedPrompt};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    Safety,
    BrandCompliance,
    Tone,
    Coppa,
    PromptSafety,
    CharacterWhitelist,
    EmojiWhitelist,
    PromptIntegrity,
    AiModeration,
    Consent,
}

impl ViolationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safety => "safety",
            Self::BrandCompliance => "brand_compliance",
            Self::Tone => "tone",
            Self::Coppa => "coppa",
            Self::PromptSafety => "prompt_safety",
            Self::CharacterWhitelist => "character_whitelist",
            Self::EmojiWhitelist => "emoji_whitelist",
            Self::PromptIntegrity => "prompt_integrity",
            Self::AiModeration => "ai_moderation",
            Self::Consent => "consent",
        }
    }

    /// Whether the sanitizer can repair this class of problem without blocking the prompt.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::PromptSafety)
    }
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailViolation {
    pub category: ViolationCategory,
    pub detail: String,
}

impl GuardrailViolation {
    pub fn new(category: ViolationCategory, detail: impl Into<String>) -> Self {
        Self {
            category,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for GuardrailViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.detail)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyMode {
    #[default]
    BedtimeSafety,
    BrandCompliance,
}

impl SafetyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BedtimeSafety => "bedtime_safety",
            Self::BrandCompliance => "brand_compliance",
        }
    }

    pub fn violation_category(&self) -> ViolationCategory {
        match self {
            Self::BedtimeSafety => ViolationCategory::Safety,
            Self::BrandCompliance => ViolationCategory::BrandCompliance,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterLevel {
    #[default]
    Standard,
    Strict,
}

impl FilterLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Strict => "strict",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    Story,
    Narration,
    Image,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Story => "story",
            Self::Narration => "narration",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for PromptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised by [`PromptSanitizer::enforce`]; the original prompt must not be sent.
#[derive(Debug, Error)]
#[error("{prompt_type} prompt blocked by guardrails: {}", summarize(.violations))]
pub struct GuardrailError {
    pub violations: Vec<GuardrailViolation>,
    pub content: String,
    pub prompt_type: PromptType,
}

impl GuardrailError {
    pub fn categories(&self) -> impl Iterator<Item = ViolationCategory> + '_ {
        self.violations.iter().map(|v| v.category)
    }
}

fn summarize(violations: &[GuardrailViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

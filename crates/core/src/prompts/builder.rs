use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::clip::summarize_for_clip;
use super::mode::PromptMode;
use super::{PromptError, PromptRegistry};
use crate::config::PromptConfig;
use crate::profile::{join_list, UserProfile};

pub const DEFAULT_TARGET_WORDS: u32 = 500;
const SUBJECT_MAX_CHARS: usize = 160;

static LANGUAGE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([A-Za-z]{2,3}):\s*([^\]]*)\]").expect("valid language tag regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptContextError {
    #[error("language code must not be empty")]
    EmptyLanguage,
    #[error("bilingual output needs two distinct language codes, got `{0}` twice")]
    DuplicateLanguage(String),
    #[error("unknown prompt mode `{0}`")]
    UnknownMode(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LanguageSelection {
    Single(String),
    Bilingual { primary: String, secondary: String },
}

impl Default for LanguageSelection {
    fn default() -> Self {
        Self::Single("en".to_string())
    }
}

impl LanguageSelection {
    pub fn single(code: &str) -> Result<Self, PromptContextError> {
        Ok(Self::Single(normalize_code(code)?))
    }

    pub fn bilingual(primary: &str, secondary: &str) -> Result<Self, PromptContextError> {
        let primary = normalize_code(primary)?;
        let secondary = normalize_code(secondary)?;
        if primary == secondary {
            return Err(PromptContextError::DuplicateLanguage(primary));
        }
        Ok(Self::Bilingual { primary, secondary })
    }

    pub fn primary(&self) -> &str {
        match self {
            Self::Single(code) => code,
            Self::Bilingual { primary, .. } => primary,
        }
    }

    pub fn is_bilingual(&self) -> bool {
        matches!(self, Self::Bilingual { .. })
    }
}

fn normalize_code(code: &str) -> Result<String, PromptContextError> {
    let code = code.trim().to_ascii_lowercase();
    if code.is_empty() {
        Err(PromptContextError::EmptyLanguage)
    } else {
        Ok(code)
    }
}

fn language_name(code: &str) -> String {
    match code {
        "en" => "English".to_string(),
        "es" => "Spanish".to_string(),
        "fr" => "French".to_string(),
        "de" => "German".to_string(),
        "pt" => "Portuguese".to_string(),
        "it" => "Italian".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgeBand {
    Toddler,
    EarlyReader,
    Independent,
}

impl AgeBand {
    /// `None` for ages past the children's bands.
    pub fn for_age(age: u8) -> Option<Self> {
        match age {
            0..=5 => Some(Self::Toddler),
            6..=8 => Some(Self::EarlyReader),
            9..=12 => Some(Self::Independent),
            _ => None,
        }
    }

    pub fn max_words(&self) -> u32 {
        match self {
            Self::Toddler => 300,
            Self::EarlyReader => 600,
            Self::Independent => 900,
        }
    }

    pub fn guidance(&self) -> &'static str {
        match self {
            Self::Toddler => {
                "The listener is 5 or younger: use very simple words, sentences under 8 words, \
                 gentle repetition and familiar objects."
            }
            Self::EarlyReader => {
                "The listener is 6 to 8: use everyday vocabulary, sentences under 12 words \
                 and a clear, simple plot."
            }
            Self::Independent => {
                "The listener is 9 to 12: richer vocabulary is welcome, keep sentences under \
                 18 words and the mood calm."
            }
        }
    }
}

/// Everything a single generation request knows before any prompt is built.
#[derive(Clone, Debug, PartialEq)]
pub struct PromptContext {
    prompt: String,
    theme: String,
    target_words: u32,
    profile: Option<UserProfile>,
    child_age: Option<u8>,
    language: LanguageSelection,
    mode: PromptMode,
}

impl PromptContext {
    pub fn new(prompt: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            theme: theme.into(),
            target_words: DEFAULT_TARGET_WORDS,
            profile: None,
            child_age: None,
            language: LanguageSelection::default(),
            mode: PromptMode::default(),
        }
    }

    pub fn with_target_words(mut self, words: u32) -> Self {
        self.target_words = words;
        self
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = (!profile.is_empty()).then_some(profile);
        self
    }

    pub fn with_child_age(mut self, age: u8) -> Self {
        self.child_age = Some(age);
        self
    }

    pub fn with_language(mut self, language: LanguageSelection) -> Self {
        self.language = language;
        self
    }

    pub fn with_mode(mut self, mode: PromptMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn child_age(&self) -> Option<u8> {
        self.child_age
    }

    pub fn age_band(&self) -> Option<AgeBand> {
        self.child_age.and_then(AgeBand::for_age)
    }

    pub fn language(&self) -> &LanguageSelection {
        &self.language
    }

    pub fn mode(&self) -> PromptMode {
        self.mode
    }

    /// Requested length, clamped to the age band's maximum.
    pub fn target_words(&self) -> u32 {
        match self.age_band() {
            Some(band) => self.target_words.min(band.max_words()),
            None => self.target_words,
        }
    }
}

/// Renders story, narration and visual prompts from registry templates.
#[derive(Debug)]
pub struct PromptBuilder {
    registry: PromptRegistry,
    global_style: String,
    style_max_words: usize,
    clip_max_words: usize,
}

impl PromptBuilder {
    pub fn new(config: &PromptConfig) -> Result<Self, PromptError> {
        let registry = PromptRegistry::from_prompt_config(config)?;
        Ok(Self::with_registry(registry, config))
    }

    pub fn with_registry(registry: PromptRegistry, config: &PromptConfig) -> Self {
        Self {
            registry,
            global_style: config.global_style.clone(),
            style_max_words: config.style_max_words,
            clip_max_words: config.clip_max_words,
        }
    }

    pub fn registry(&self) -> &PromptRegistry {
        &self.registry
    }

    pub fn story_prompt(&self, context: &PromptContext) -> Result<String, PromptError> {
        let mode = context.mode();
        let body = self.registry.format_with(
            "story_draft",
            [
                ("role", mode.role().to_string()),
                ("tone", mode.tone().to_string()),
                ("rules", render_rules(mode)),
                ("age_guidance", age_section(context)),
                ("profile", profile_section(context)),
                ("language_instruction", language_section(context)),
                ("theme", context.theme().trim().to_string()),
                ("prompt", context.prompt().trim().to_string()),
                ("target_words", context.target_words().to_string()),
            ],
        )?;
        Ok(with_bilingual_preamble(context, body))
    }

    pub fn narration_prompt(
        &self,
        context: &PromptContext,
        story: &str,
    ) -> Result<String, PromptError> {
        let mode = context.mode();
        let body = self.registry.format_with(
            "narration_script",
            [
                ("role", mode.role().to_string()),
                ("tone", mode.tone().to_string()),
                ("rules", render_rules(mode)),
                ("age_guidance", age_section(context)),
                ("language_instruction", language_section(context)),
                ("story", story.trim().to_string()),
            ],
        )?;
        Ok(with_bilingual_preamble(context, body))
    }

    /// Image prompt for one scene, cut down to the configured CLIP word budget.
    pub fn visual_prompt(
        &self,
        context: &PromptContext,
        scene_text: &str,
    ) -> Result<String, PromptError> {
        let scene = strip_language_tags(scene_text, context.language().primary());
        let subject = primary_subject(&scene);

        let mut details = Vec::new();
        let mut preserve = Vec::new();
        match context.profile() {
            Some(profile) if !profile.favorite_colors.is_empty() => {
                details.push(format!("soft palette of {}", join_list(&profile.favorite_colors)));
                preserve.extend(profile.favorite_colors.iter().map(String::as_str));
            }
            _ => details.push("soft palette of dusky blues and lavender".to_string()),
        }
        if let Some(profile) = context.profile() {
            if !profile.favorite_characters.is_empty() {
                details.push(format!(
                    "featuring {}",
                    join_list(&profile.favorite_characters)
                ));
                preserve.extend(profile.favorite_characters.iter().map(String::as_str));
            }
        }
        let theme = context.theme().trim();
        if !theme.is_empty() {
            details.push(format!("{theme} setting"));
        }

        let style = summarize_for_clip(&self.global_style, self.style_max_words, &[]);
        let composed = self.registry.format_with(
            "visual_scene",
            [
                ("subject", subject),
                ("details", details.join(", ")),
                ("style", style),
            ],
        )?;

        Ok(summarize_for_clip(&composed, self.clip_max_words, &preserve))
    }
}

fn render_rules(mode: PromptMode) -> String {
    mode.rules()
        .iter()
        .enumerate()
        .map(|(index, rule)| format!("{}. {rule}", index + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn age_section(context: &PromptContext) -> String {
    context
        .age_band()
        .map(|band| format!("Age guidance: {}\n", band.guidance()))
        .unwrap_or_default()
}

fn profile_section(context: &PromptContext) -> String {
    match context.profile().map(UserProfile::describe) {
        Some(description) if !description.is_empty() => {
            format!("About the listener: {description}.\n")
        }
        _ => String::new(),
    }
}

fn language_section(context: &PromptContext) -> String {
    match context.language() {
        LanguageSelection::Single(code) if code != "en" => {
            format!("Write entirely in {}.\n", language_name(code))
        }
        _ => String::new(),
    }
}

fn with_bilingual_preamble(context: &PromptContext, body: String) -> String {
    let LanguageSelection::Bilingual { primary, secondary } = context.language() else {
        return body;
    };
    let (first, second) = (primary.to_ascii_uppercase(), secondary.to_ascii_uppercase());
    format!(
        "Write every paragraph in {} and then in {}, tagging each version as \
         [{first}: ...] [{second}: ...]. Keep both versions side by side, paragraph by paragraph.\n\n{body}",
        language_name(primary),
        language_name(secondary),
    )
}

/// Keeps only the `[XX: ...]` segments written in `primary`; untagged text passes through.
fn strip_language_tags(text: &str, primary: &str) -> String {
    if !LANGUAGE_TAG.is_match(text) {
        return text.trim().to_string();
    }
    let kept = LANGUAGE_TAG.replace_all(text, |caps: &regex::Captures<'_>| {
        if caps[1].eq_ignore_ascii_case(primary) {
            caps[2].trim().to_string()
        } else {
            String::new()
        }
    });
    let kept = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    if !kept.is_empty() {
        return kept;
    }
    LANGUAGE_TAG
        .captures(text)
        .map(|caps| caps[2].trim().to_string())
        .unwrap_or_default()
}

fn primary_subject(scene: &str) -> String {
    let first = scene
        .char_indices()
        .find(|(_, ch)| matches!(ch, '.' | '!' | '?'))
        .map(|(index, _)| &scene[..index])
        .unwrap_or(scene)
        .trim();
    first.chars().take(SUBJECT_MAX_CHARS).collect::<String>().trim().to_string()
}

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::logging::{LogRecord, NullLogSink, SharedLogSink};
use crate::profile::UserProfile;

use super::config::{GuardrailConfigLoader, GuardrailRules, ToneThresholds};
use super::moderation::{ModerationClient, ModerationVerdict};
use super::sanitizer::PromptSanitizer;
use super::{FilterLevel, GuardrailViolation, SafetyMode, ViolationCategory};

const LOG_TARGET: &str = "guardrails::content";

const CHILD_STANDARD_TERMS: &[&str] = &["stranger", "abandoned", "screaming", "trapped", "lost forever"];

const CHILD_STRICT_TERMS: &[&str] = &["alone", "shadow", "storm", "crying", "darkness", "fell"];

const COPPA_TERMS: &[&str] = &[
    "full name",
    "last name",
    "home address",
    "phone number",
    "email address",
    "school name",
    "where do you live",
    "password",
    "photo of you",
    "send a picture",
];

const CHILD_STANDARD_TONE: ToneThresholds = ToneThresholds {
    max_exclamation_points: 4,
    max_all_caps_chunks: 2,
};

const CHILD_STRICT_TONE: ToneThresholds = ToneThresholds {
    max_exclamation_points: 2,
    max_all_caps_chunks: 1,
};

const STRICT_SEVERITY_CAP: u8 = 2;
const ALL_CAPS_MIN_LEN: usize = 6;

/// Advisory checks on story or video text. Returns violations, never blocks.
pub struct ContentGuard {
    loader: Arc<GuardrailConfigLoader>,
    mode: SafetyMode,
    moderation: Option<Arc<dyn ModerationClient>>,
    severity_threshold: u8,
    sink: SharedLogSink,
}

impl ContentGuard {
    pub fn new(loader: Arc<GuardrailConfigLoader>, mode: SafetyMode) -> Self {
        Self {
            loader,
            mode,
            moderation: None,
            severity_threshold: 4,
            sink: Arc::new(NullLogSink),
        }
    }

    /// Attaches the cloud moderation service; without it only local checks run.
    pub fn with_moderation(mut self, client: Arc<dyn ModerationClient>, threshold: u8) -> Self {
        self.moderation = Some(client);
        self.severity_threshold = threshold;
        self
    }

    pub fn with_sink(mut self, sink: SharedLogSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn mode(&self) -> SafetyMode {
        self.mode
    }

    /// Hard prompt gate for one request: the default table plus the rules resolved for `profile`.
    pub fn sanitizer(&self, profile: Option<&UserProfile>) -> PromptSanitizer {
        PromptSanitizer::with_rules(&self.loader.resolve_rules(self.mode, profile))
    }

    pub fn check_story(
        &self,
        text: &str,
        profile: Option<&UserProfile>,
        child_mode: bool,
        filter_level: FilterLevel,
    ) -> Vec<GuardrailViolation> {
        let rules = self.child_rules(profile, child_mode, filter_level);
        self.evaluate(text, &rules, child_mode, filter_level, &[])
    }

    pub fn check_video_prompt(
        &self,
        text: &str,
        profile: Option<&UserProfile>,
        child_mode: bool,
        filter_level: FilterLevel,
    ) -> Vec<GuardrailViolation> {
        let rules = self.child_rules(profile, child_mode, filter_level);
        let coppa: &[&str] = if child_mode { COPPA_TERMS } else { &[] };
        self.evaluate(text, &rules, child_mode, filter_level, coppa)
    }

    /// Post-generation check on a produced image. Empty when no moderation service is attached.
    pub fn check_image(
        &self,
        bytes: &[u8],
        child_mode: bool,
        filter_level: FilterLevel,
    ) -> Vec<GuardrailViolation> {
        let Some(client) = self.moderation.as_ref() else {
            return Vec::new();
        };
        let threshold = self.effective_threshold(child_mode, filter_level);
        match client.moderate_image(bytes, threshold) {
            Ok(verdict) => moderation_violation("image", &verdict, threshold)
                .into_iter()
                .collect(),
            Err(err) => {
                self.sink.log(LogRecord::warn(
                    LOG_TARGET,
                    format!("image moderation unavailable, skipping: {err}"),
                ));
                Vec::new()
            }
        }
    }

    pub fn check_parental_consent(
        &self,
        child_mode: bool,
        consent_recorded: bool,
    ) -> Vec<GuardrailViolation> {
        if child_mode && !consent_recorded {
            vec![GuardrailViolation::new(
                ViolationCategory::Consent,
                "child-mode generation requested without recorded parental consent",
            )]
        } else {
            Vec::new()
        }
    }

    fn child_rules(
        &self,
        profile: Option<&UserProfile>,
        child_mode: bool,
        filter_level: FilterLevel,
    ) -> GuardrailRules {
        let mut rules = self.loader.resolve_rules(self.mode, profile);
        if !child_mode {
            return rules;
        }

        add_terms(&mut rules.banned_terms, CHILD_STANDARD_TERMS);
        match filter_level {
            FilterLevel::Standard => {
                rules.tone = rules.tone.tightened(CHILD_STANDARD_TONE);
            }
            FilterLevel::Strict => {
                add_terms(&mut rules.banned_terms, CHILD_STRICT_TERMS);
                rules.tone = rules.tone.tightened(CHILD_STRICT_TONE);
            }
        }
        rules
    }

    fn effective_threshold(&self, child_mode: bool, filter_level: FilterLevel) -> u8 {
        if child_mode && filter_level == FilterLevel::Strict {
            self.severity_threshold.min(STRICT_SEVERITY_CAP)
        } else {
            self.severity_threshold
        }
    }

    fn evaluate(
        &self,
        text: &str,
        rules: &GuardrailRules,
        child_mode: bool,
        filter_level: FilterLevel,
        coppa_terms: &[&str],
    ) -> Vec<GuardrailViolation> {
        let lowered = text.to_lowercase();
        let mut violations = Vec::new();

        let category = self.mode.violation_category();
        for term in &rules.banned_terms {
            if lowered.contains(term.as_str()) {
                violations.push(GuardrailViolation::new(
                    category,
                    format!("contains banned term `{term}`"),
                ));
            }
        }

        for term in coppa_terms {
            if lowered.contains(term) {
                violations.push(GuardrailViolation::new(
                    ViolationCategory::Coppa,
                    format!("requests personal information (`{term}`)"),
                ));
            }
        }

        violations.extend(tone_violations(text, &rules.tone));

        if let Some(client) = self.moderation.as_ref() {
            let threshold = self.effective_threshold(child_mode, filter_level);
            match client.moderate_text(text, threshold) {
                Ok(verdict) => violations.extend(moderation_violation("text", &verdict, threshold)),
                Err(err) => self.sink.log(LogRecord::warn(
                    LOG_TARGET,
                    format!("text moderation unavailable, keeping local checks only: {err}"),
                )),
            }
        }

        violations
    }
}

fn add_terms(set: &mut BTreeSet<String>, terms: &[&str]) {
    set.extend(terms.iter().map(|term| term.to_string()));
}

fn tone_violations(text: &str, tone: &ToneThresholds) -> Vec<GuardrailViolation> {
    let mut violations = Vec::new();

    let exclamations = text.chars().filter(|c| *c == '!').count();
    if exclamations > tone.max_exclamation_points {
        violations.push(GuardrailViolation::new(
            ViolationCategory::Tone,
            format!(
                "overstimulating: {exclamations} exclamation marks (limit {})",
                tone.max_exclamation_points
            ),
        ));
    }

    let shouted = text.split_whitespace().filter(|word| is_shouted(word)).count();
    if shouted > tone.max_all_caps_chunks {
        violations.push(GuardrailViolation::new(
            ViolationCategory::Tone,
            format!(
                "overstimulating: {shouted} all-caps words (limit {})",
                tone.max_all_caps_chunks
            ),
        ));
    }

    violations
}

fn is_shouted(word: &str) -> bool {
    let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric());
    trimmed.chars().count() >= ALL_CAPS_MIN_LEN
        && trimmed.chars().any(char::is_alphabetic)
        && !trimmed.chars().any(char::is_lowercase)
}

fn moderation_violation(
    subject: &str,
    verdict: &ModerationVerdict,
    threshold: u8,
) -> Option<GuardrailViolation> {
    let flagged = verdict.flagged(threshold);
    if flagged.is_empty() && verdict.is_safe {
        return None;
    }

    let detail = if flagged.is_empty() {
        format!("moderation service marked {subject} unsafe")
    } else {
        let categories = flagged
            .iter()
            .map(|c| format!("{} (severity {})", c.category, c.severity))
            .collect::<Vec<_>>()
            .join(", ");
        format!("moderation flagged {subject} at threshold {threshold}: {categories}")
    };
    Some(GuardrailViolation::new(ViolationCategory::AiModeration, detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::moderation::{CategorySeverity, ModerationError};
    use crate::guardrails::PromptType;
    use std::io;
    use std::sync::Mutex;

    struct ScriptedModeration {
        verdict: Option<ModerationVerdict>,
        thresholds: Mutex<Vec<u8>>,
    }

    impl ScriptedModeration {
        fn returning(verdict: ModerationVerdict) -> Self {
            Self {
                verdict: Some(verdict),
                thresholds: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                verdict: None,
                thresholds: Mutex::new(Vec::new()),
            }
        }

        fn answer(&self, threshold: u8) -> Result<ModerationVerdict, ModerationError> {
            self.thresholds.lock().unwrap().push(threshold);
            self.verdict.clone().ok_or_else(|| {
                ModerationError::new(io::Error::new(io::ErrorKind::Other, "service down"))
            })
        }
    }

    impl ModerationClient for ScriptedModeration {
        fn moderate_text(
            &self,
            _text: &str,
            threshold: u8,
        ) -> Result<ModerationVerdict, ModerationError> {
            self.answer(threshold)
        }

        fn moderate_image(
            &self,
            _bytes: &[u8],
            threshold: u8,
        ) -> Result<ModerationVerdict, ModerationError> {
            self.answer(threshold)
        }
    }

    fn guard() -> ContentGuard {
        ContentGuard::new(
            Arc::new(GuardrailConfigLoader::builtin_only()),
            SafetyMode::BedtimeSafety,
        )
    }

    fn categories(violations: &[GuardrailViolation]) -> Vec<ViolationCategory> {
        violations.iter().map(|v| v.category).collect()
    }

    #[test]
    fn seven_exclamation_marks_trip_the_tone_check() {
        let text = "Wow! Look! Stars! Moon! Owls! Boats! Yes!";
        let violations = guard().check_story(text, None, false, FilterLevel::Standard);
        assert!(categories(&violations).contains(&ViolationCategory::Tone));
    }

    #[test]
    fn six_exclamation_marks_are_fine() {
        let text = "Wow! Look! Stars! Moon! Owls! Boats!";
        let violations = guard().check_story(text, None, false, FilterLevel::Standard);
        assert!(!categories(&violations).contains(&ViolationCategory::Tone));
    }

    #[test]
    fn banned_terms_are_tagged_by_mode() {
        let bedtime = guard().check_story("A Monster hid.", None, false, FilterLevel::Standard);
        assert_eq!(categories(&bedtime), vec![ViolationCategory::Safety]);

        let brand = ContentGuard::new(
            Arc::new(GuardrailConfigLoader::builtin_only()),
            SafetyMode::BrandCompliance,
        );
        let violations =
            brand.check_story("A miracle sleep aid.", None, false, FilterLevel::Standard);
        assert_eq!(categories(&violations), vec![ViolationCategory::BrandCompliance]);
    }

    #[test]
    fn request_sanitizer_rewrites_mode_terms() {
        let brand = ContentGuard::new(
            Arc::new(GuardrailConfigLoader::builtin_only()),
            SafetyMode::BrandCompliance,
        );
        let sanitized = brand
            .sanitizer(None)
            .enforce("A miracle cure for a scary night", PromptType::Story)
            .unwrap();
        assert_eq!(sanitized.text, "A for a mysterious night");
        assert_eq!(sanitized.rewrites.len(), 3);
    }

    #[test]
    fn shouted_words_count_only_when_long() {
        let text = "GOOD NIGHT SLEEPY BUNNIES DREAMING FOREVER TONIGHT";
        let adult = guard().check_story(text, None, false, FilterLevel::Standard);
        assert!(categories(&adult).contains(&ViolationCategory::Tone));

        let short = guard().check_story("OK HI YES NO GO UP", None, false, FilterLevel::Standard);
        assert!(short.is_empty());
    }

    #[test]
    fn strict_child_mode_widens_and_tightens() {
        let text = "The bear walked alone. Hush! Hush! Hush!";
        let relaxed = guard().check_story(text, None, false, FilterLevel::Standard);
        assert!(relaxed.is_empty());

        let strict = guard().check_story(text, None, true, FilterLevel::Strict);
        let found = categories(&strict);
        assert!(found.contains(&ViolationCategory::Safety));
        assert!(found.contains(&ViolationCategory::Tone));
    }

    #[test]
    fn video_prompts_add_coppa_terms_in_child_mode() {
        let text = "Tell me your home address and I will visit.";
        let child = guard().check_video_prompt(text, None, true, FilterLevel::Standard);
        assert!(categories(&child).contains(&ViolationCategory::Coppa));

        let adult = guard().check_video_prompt(text, None, false, FilterLevel::Standard);
        assert!(!categories(&adult).contains(&ViolationCategory::Coppa));
    }

    #[test]
    fn moderation_adds_one_summary_violation() {
        let client = Arc::new(ScriptedModeration::returning(ModerationVerdict {
            is_safe: false,
            categories_analyzed: vec![
                CategorySeverity {
                    category: "Violence".into(),
                    severity: 4,
                },
                CategorySeverity {
                    category: "Hate".into(),
                    severity: 6,
                },
                CategorySeverity {
                    category: "Sexual".into(),
                    severity: 0,
                },
            ],
        }));
        let guard = guard().with_moderation(client.clone(), 4);

        let violations = guard.check_story("A calm tale.", None, false, FilterLevel::Standard);
        assert_eq!(categories(&violations), vec![ViolationCategory::AiModeration]);
        assert!(violations[0].detail.contains("Violence"));
        assert!(violations[0].detail.contains("Hate"));
        assert!(!violations[0].detail.contains("Sexual"));
    }

    #[test]
    fn strict_child_mode_lowers_moderation_threshold() {
        let client = Arc::new(ScriptedModeration::returning(ModerationVerdict {
            is_safe: true,
            categories_analyzed: Vec::new(),
        }));
        let guard = guard().with_moderation(client.clone(), 4);

        guard.check_story("Calm.", None, false, FilterLevel::Strict);
        guard.check_story("Calm.", None, true, FilterLevel::Strict);
        assert_eq!(*client.thresholds.lock().unwrap(), vec![4, 2]);
    }

    #[test]
    fn moderation_failures_fail_open() {
        let guard = guard().with_moderation(Arc::new(ScriptedModeration::failing()), 4);
        let violations = guard.check_story("A calm tale.", None, false, FilterLevel::Standard);
        assert!(violations.is_empty());
        assert!(guard
            .check_image(&[1, 2, 3], true, FilterLevel::Strict)
            .is_empty());
    }

    #[test]
    fn consent_is_required_only_in_child_mode() {
        let guard = guard();
        assert_eq!(
            categories(&guard.check_parental_consent(true, false)),
            vec![ViolationCategory::Consent]
        );
        assert!(guard.check_parental_consent(true, true).is_empty());
        assert!(guard.check_parental_consent(false, false).is_empty());
    }
}

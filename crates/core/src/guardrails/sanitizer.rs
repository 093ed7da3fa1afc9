use regex::Regex;
use std::collections::HashSet;

use super::config::GuardrailRules;
use super::{GuardrailError, GuardrailViolation, PromptType, ViolationCategory};

const DEFAULT_REPLACEMENTS: &[(&str, Option<&str>)] = &[
    ("monster", Some("friendly creature")),
    ("monsters", Some("friendly creatures")),
    ("scary", Some("mysterious")),
    ("nightmare", Some("strange dream")),
    ("nightmares", Some("strange dreams")),
    ("weapon", Some("tool")),
    ("weapons", Some("tools")),
    ("fight", Some("disagreement")),
    ("evil", Some("grumpy")),
    ("zombie", Some("sleepy wanderer")),
    ("kill", Some("stop")),
    ("killed", Some("stopped")),
    ("death", Some("goodbye")),
    ("blood", None),
    ("gore", None),
];

/// Accented Latin letters and typography kept for bilingual prompts.
const EXTRA_ALLOWED: &str = "áéíóúüñÁÉÍÓÚÜÑ¿¡àèìòùÀÈÌÒÙâêîôûÂÊÎÔÛçÇäëïöÄËÏÖßœŒ‘’“”–—…";

const EMOJI_ALLOWLIST: &[char] = &[
    '🌙', '⭐', '✨', '🌟', '💤', '🐻', '🦄', '🌈', '💫', '🌸', '🐰', '🦉', '☁',
];

struct Replacement {
    term: String,
    pattern: Regex,
    replacement: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedPrompt {
    pub text: String,
    /// Banned phrases that were rewritten or removed on the way.
    pub rewrites: Vec<GuardrailViolation>,
}

/// Hard gate in front of every model call.
pub struct PromptSanitizer {
    replacements: Vec<Replacement>,
}

impl Default for PromptSanitizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_REPLACEMENTS
                .iter()
                .map(|(term, replacement)| (term.to_string(), replacement.map(str::to_string))),
        )
    }
}

impl PromptSanitizer {
    /// `terms` maps each banned phrase to its gentler replacement; `None` deletes the phrase.
    pub fn new<I>(terms: I) -> Self
    where
        I: IntoIterator<Item = (String, Option<String>)>,
    {
        let mut seen = HashSet::new();
        let replacements = terms
            .into_iter()
            .filter_map(|(term, replacement)| {
                let term = term.trim().to_lowercase();
                if term.is_empty() || !seen.insert(term.clone()) {
                    return None;
                }
                let pattern = Regex::new(&term_pattern(&term)).ok()?;
                Some(Replacement {
                    term,
                    pattern,
                    replacement,
                })
            })
            .collect();
        Self { replacements }
    }

    /// Default replacement table plus every resolved banned term (deleted when no replacement exists).
    pub fn with_rules(rules: &GuardrailRules) -> Self {
        let defaults = DEFAULT_REPLACEMENTS
            .iter()
            .map(|(term, replacement)| (term.to_string(), replacement.map(str::to_string)));
        let extra = rules.banned_terms.iter().map(|term| (term.clone(), None));
        Self::new(defaults.chain(extra))
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.replacements.iter().map(|r| r.term.as_str())
    }

    pub fn enforce(
        &self,
        prompt: &str,
        prompt_type: PromptType,
    ) -> Result<SanitizedPrompt, GuardrailError> {
        let mut violations = Vec::new();

        let mut text = prompt.to_string();
        for rule in &self.replacements {
            if !rule.pattern.is_match(&text) {
                continue;
            }
            let replacement = rule.replacement.as_deref().unwrap_or("");
            text = rule.pattern.replace_all(&text, replacement).into_owned();
            let detail = match rule.replacement.as_deref() {
                Some(gentle) => format!("replaced `{}` with `{gentle}`", rule.term),
                None => format!("removed `{}`", rule.term),
            };
            violations.push(GuardrailViolation::new(ViolationCategory::PromptSafety, detail));
        }

        let (filtered, rejected) = apply_whitelist(&text);
        violations.extend(rejected);

        let normalized = normalize_whitespace(&filtered);
        if normalized.trim().is_empty() {
            violations.push(GuardrailViolation::new(
                ViolationCategory::PromptIntegrity,
                "prompt is empty after sanitization",
            ));
        }

        if violations.iter().any(|v| !v.category.is_recoverable()) {
            return Err(GuardrailError {
                violations,
                content: prompt.to_string(),
                prompt_type,
            });
        }

        Ok(SanitizedPrompt {
            text: normalized,
            rewrites: violations,
        })
    }
}

/// Case-insensitive pattern with word boundaries only on edges that are word characters.
fn term_pattern(term: &str) -> String {
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let start = if is_word(term.chars().next()) { r"\b" } else { "" };
    let end = if is_word(term.chars().last()) { r"\b" } else { "" };
    format!("(?i){start}{}{end}", regex::escape(term))
}

fn is_variation_selector(c: char) -> bool {
    matches!(c, '\u{FE0E}' | '\u{FE0F}')
}

fn is_allowed(c: char) -> bool {
    matches!(c, ' ' | '\n' | '\r' | '\t')
        || c.is_ascii_graphic()
        || EXTRA_ALLOWED.contains(c)
        || EMOJI_ALLOWLIST.contains(&c)
}

fn looks_like_emoji(c: char) -> bool {
    matches!(
        c as u32,
        0x1F000..=0x1FAFF | 0x2600..=0x27BF | 0x2B00..=0x2BFF | 0xFE00..=0xFE0F | 0x200D | 0xE0020..=0xE007F
    )
}

fn apply_whitelist(text: &str) -> (String, Vec<GuardrailViolation>) {
    let mut kept = String::with_capacity(text.len());
    let mut reported = HashSet::new();
    let mut violations = Vec::new();

    for c in text.chars() {
        let follows_allowed_emoji = kept
            .chars()
            .last()
            .is_some_and(|previous| EMOJI_ALLOWLIST.contains(&previous));
        if is_allowed(c) || (is_variation_selector(c) && follows_allowed_emoji) {
            kept.push(c);
            continue;
        }
        if reported.insert(c) {
            let category = if looks_like_emoji(c) {
                ViolationCategory::EmojiWhitelist
            } else {
                ViolationCategory::CharacterWhitelist
            };
            violations.push(GuardrailViolation::new(
                category,
                format!("dropped disallowed character {c:?} (U+{:04X})", c as u32),
            ));
        }
    }

    (kept, violations)
}

fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut previous_blank = true;

    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !previous_blank {
                lines.push(String::new());
            }
            previous_blank = true;
        } else {
            lines.push(collapsed);
            previous_blank = false;
        }
    }

    while lines.last().is_some_and(|line| line.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrails::SafetyMode;

    fn categories(violations: &[GuardrailViolation]) -> Vec<ViolationCategory> {
        violations.iter().map(|v| v.category).collect()
    }

    #[test]
    fn replaces_banned_word_without_blocking() {
        let sanitized = PromptSanitizer::default()
            .enforce("I saw a monster near the lake!", PromptType::Story)
            .unwrap();
        assert_eq!(sanitized.text, "I saw a friendly creature near the lake!");
        assert_eq!(categories(&sanitized.rewrites), vec![ViolationCategory::PromptSafety]);
    }

    #[test]
    fn replacement_is_case_insensitive_and_whole_word() {
        let sanitized = PromptSanitizer::default()
            .enforce("A SCARY night. Skill, not kill.", PromptType::Story)
            .unwrap();
        assert_eq!(sanitized.text, "A mysterious night. Skill, not stop.");
    }

    #[test]
    fn deletes_terms_without_replacement() {
        let sanitized = PromptSanitizer::default()
            .enforce("no blood here", PromptType::Narration)
            .unwrap();
        assert_eq!(sanitized.text, "no here");
        assert!(sanitized.rewrites[0].detail.contains("removed `blood`"));
    }

    #[test]
    fn only_disallowed_symbols_are_blocked() {
        let err = PromptSanitizer::default()
            .enforce("§§ ©© ¤", PromptType::Story)
            .unwrap_err();
        let found = categories(&err.violations);
        assert_eq!(
            found
                .iter()
                .filter(|c| **c == ViolationCategory::CharacterWhitelist)
                .count(),
            3
        );
        assert!(found.contains(&ViolationCategory::PromptIntegrity));
        assert_eq!(err.content, "§§ ©© ¤");
        assert_eq!(err.prompt_type, PromptType::Story);
    }

    #[test]
    fn emoji_outside_allowlist_is_tagged_separately() {
        let err = PromptSanitizer::default()
            .enforce("Goodnight 🌙 little ghost 👻", PromptType::Image)
            .unwrap_err();
        assert_eq!(categories(&err.violations), vec![ViolationCategory::EmojiWhitelist]);
    }

    #[test]
    fn accented_letters_and_allowed_emoji_pass() {
        let sanitized = PromptSanitizer::default()
            .enforce("[ES: Una canción suave] ✨", PromptType::Story)
            .unwrap();
        assert_eq!(sanitized.text, "[ES: Una canción suave] ✨");
        assert!(sanitized.rewrites.is_empty());
    }

    #[test]
    fn variation_selector_after_allowed_emoji_is_kept() {
        let sanitized = PromptSanitizer::default()
            .enforce("Goodnight \u{2601}\u{FE0F} sky", PromptType::Story)
            .unwrap();
        assert_eq!(sanitized.text, "Goodnight \u{2601}\u{FE0F} sky");
        assert!(sanitized.rewrites.is_empty());

        let err = PromptSanitizer::default()
            .enforce("plain \u{FE0F} text", PromptType::Story)
            .unwrap_err();
        assert_eq!(categories(&err.violations), vec![ViolationCategory::EmojiWhitelist]);
    }

    #[test]
    fn terms_with_symbol_edges_still_match() {
        let sanitizer = PromptSanitizer::new([
            ("c++".to_string(), Some("code".to_string())),
            ("!!".to_string(), None),
        ]);
        let sanitized = sanitizer
            .enforce("Learn C++ tonight!!", PromptType::Story)
            .unwrap();
        assert_eq!(sanitized.text, "Learn code tonight");
        assert_eq!(sanitized.rewrites.len(), 2);
    }

    #[test]
    fn normalizes_whitespace() {
        let sanitized = PromptSanitizer::default()
            .enforce("\n\n  Once   upon\ta time \n\n\n\nthe end  \n\n", PromptType::Story)
            .unwrap();
        assert_eq!(sanitized.text, "Once upon a time\n\nthe end");
    }

    #[test]
    fn resolved_rules_extend_the_table() {
        let mut rules = GuardrailRules::builtin(SafetyMode::BedtimeSafety);
        rules.banned_terms.insert("thunder".to_string());
        let sanitizer = PromptSanitizer::with_rules(&rules);

        assert!(sanitizer.terms().any(|t| t == "thunder"));
        let sanitized = sanitizer
            .enforce("Thunder rolled softly.", PromptType::Story)
            .unwrap();
        assert_eq!(sanitized.text, "rolled softly.");
    }
}

use std::fs;
use std::sync::Arc;

use bedtime_core::{
    ContentGuard, FilterLevel, GuardrailConfigLoader, LanguageSelection, LogLevel, PromptBuilder,
    PromptConfig, PromptContext, PromptSanitizer, PromptType, SafetyMode, UserProfile,
    VecLogSink, ViolationCategory,
};
use tempfile::tempdir;

const RULES_YAML: &str = "\
defaults:
  banned_terms: [thunder]
  tone_thresholds:
    max_exclamation_points: 5
profiles:
  anxious:
    banned_terms: [storm]
    tone_thresholds:
      max_exclamation_points: 2
";

fn anxious_profile() -> UserProfile {
    UserProfile {
        mood: Some("Anxious".into()),
        favorite_characters: vec!["Pip the penguin".into()],
        ..UserProfile::default()
    }
}

#[test]
fn prompts_pass_the_sanitizer_built_from_resolved_rules() -> Result<(), Box<dyn std::error::Error>>
{
    let temp = tempdir()?;
    let path = temp.path().join("guardrails.yaml");
    fs::write(&path, RULES_YAML)?;

    let sink = Arc::new(VecLogSink::new());
    let loader = GuardrailConfigLoader::new(&path, sink.clone());
    let rules = loader.resolve_rules(SafetyMode::BedtimeSafety, Some(&anxious_profile()));
    assert_eq!(rules.matched_profile.as_deref(), Some("anxious"));
    assert!(rules.banned_terms.contains("storm"));
    assert!(rules.banned_terms.contains("thunder"));

    let builder = PromptBuilder::new(&PromptConfig::default())?;
    let context = PromptContext::new("a penguin hears thunder during a storm", "icy harbor")
        .with_profile(anxious_profile())
        .with_child_age(6)
        .with_language(LanguageSelection::bilingual("en", "es")?);
    let prompt = builder.story_prompt(&context)?;

    let sanitizer = PromptSanitizer::with_rules(&rules);
    let sanitized = sanitizer.enforce(&prompt, PromptType::Story)?;
    assert!(sanitized.text.starts_with("Write every paragraph in English and then in Spanish"));
    assert!(!sanitized.text.to_lowercase().contains("thunder"));
    assert!(!sanitized.text.to_lowercase().contains("storm"));
    assert_eq!(
        sanitized
            .rewrites
            .iter()
            .filter(|v| v.category == ViolationCategory::PromptSafety)
            .count(),
        2
    );
    assert_eq!(sink.count_at(LogLevel::Warn), 0);
    Ok(())
}

#[test]
fn guard_uses_profile_thresholds_and_reloads_only_on_change(
) -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let path = temp.path().join("guardrails.yaml");
    fs::write(&path, RULES_YAML)?;

    let loader = Arc::new(GuardrailConfigLoader::new(&path, Arc::new(VecLogSink::new())));
    let guard = ContentGuard::new(loader.clone(), SafetyMode::BedtimeSafety);
    let story = "Pip waved goodnight! The moon smiled! The sea hushed!";

    let with_profile =
        guard.check_story(story, Some(&anxious_profile()), false, FilterLevel::Standard);
    assert!(with_profile
        .iter()
        .any(|v| v.category == ViolationCategory::Tone));

    let without_profile = guard.check_story(story, None, false, FilterLevel::Standard);
    assert!(without_profile.is_empty());

    assert_eq!(loader.disk_reads(), 1);
    Ok(())
}

#[test]
fn missing_rules_file_falls_back_to_builtin_and_warns_once() {
    let temp = tempdir().expect("temp dir");
    let sink = Arc::new(VecLogSink::new());
    let loader = GuardrailConfigLoader::new(temp.path().join("absent.yaml"), sink.clone());

    let first = loader.resolve_rules(SafetyMode::BrandCompliance, None);
    let second = loader.resolve_rules(SafetyMode::BrandCompliance, None);

    assert!(first.banned_terms.contains("miracle"));
    assert_eq!(first, second);
    assert_eq!(sink.count_at(LogLevel::Warn), 1);
}

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use crate::logging::{LogRecord, NullLogSink, SharedLogSink};
use crate::profile::UserProfile;

use super::SafetyMode;

const LOG_TARGET: &str = "guardrails::config";

pub const DEFAULT_MAX_EXCLAMATION_POINTS: usize = 6;
pub const DEFAULT_MAX_ALL_CAPS_CHUNKS: usize = 3;

const BEDTIME_BANNED_TERMS: &[&str] = &[
    "monster",
    "blood",
    "killed",
    "killing",
    "murder",
    "death",
    "dead body",
    "gunshot",
    "weapon",
    "knife",
    "violence",
    "horror",
    "terrifying",
    "nightmare",
    "demon",
    "zombie",
];

const BRAND_BANNED_TERMS: &[&str] = &[
    "cure",
    "miracle",
    "guaranteed",
    "diagnose",
    "prescription",
    "medication",
    "clinically proven",
    "cheap",
    "competitor",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToneThresholds {
    pub max_exclamation_points: usize,
    pub max_all_caps_chunks: usize,
}

impl Default for ToneThresholds {
    fn default() -> Self {
        Self {
            max_exclamation_points: DEFAULT_MAX_EXCLAMATION_POINTS,
            max_all_caps_chunks: DEFAULT_MAX_ALL_CAPS_CHUNKS,
        }
    }
}

impl ToneThresholds {
    fn apply(self, overrides: &ToneOverrides) -> Self {
        Self {
            max_exclamation_points: overrides
                .max_exclamation_points
                .unwrap_or(self.max_exclamation_points),
            max_all_caps_chunks: overrides
                .max_all_caps_chunks
                .unwrap_or(self.max_all_caps_chunks),
        }
    }

    /// Keeps whichever limit is stricter, field by field.
    pub fn tightened(self, cap: ToneThresholds) -> Self {
        Self {
            max_exclamation_points: self.max_exclamation_points.min(cap.max_exclamation_points),
            max_all_caps_chunks: self.max_all_caps_chunks.min(cap.max_all_caps_chunks),
        }
    }
}

/// Rules resolved for one request. Built fresh each time and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailRules {
    pub banned_terms: BTreeSet<String>,
    pub tone: ToneThresholds,
    pub matched_profile: Option<String>,
}

impl GuardrailRules {
    pub fn builtin(mode: SafetyMode) -> Self {
        Self {
            banned_terms: builtin_terms(mode)
                .iter()
                .map(|term| term.to_string())
                .collect(),
            tone: ToneThresholds::default(),
            matched_profile: None,
        }
    }
}

fn builtin_terms(mode: SafetyMode) -> &'static [&'static str] {
    match mode {
        SafetyMode::BedtimeSafety => BEDTIME_BANNED_TERMS,
        SafetyMode::BrandCompliance => BRAND_BANNED_TERMS,
    }
}

#[derive(Debug, Default, Deserialize)]
struct GuardrailDocument {
    #[serde(default)]
    defaults: RuleOverrides,
    #[serde(default)]
    profiles: BTreeMap<String, RuleOverrides>,
}

impl GuardrailDocument {
    fn normalized(self) -> Self {
        let profiles = self
            .profiles
            .into_iter()
            .map(|(key, rules)| (key.trim().to_lowercase(), rules))
            .collect();
        Self {
            defaults: self.defaults,
            profiles,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RuleOverrides {
    #[serde(default)]
    banned_terms: Vec<String>,
    #[serde(default)]
    tone_thresholds: ToneOverrides,
}

#[derive(Debug, Default, Deserialize)]
struct ToneOverrides {
    #[serde(default)]
    max_exclamation_points: Option<usize>,
    #[serde(default)]
    max_all_caps_chunks: Option<usize>,
}

#[derive(Default)]
struct CacheState {
    modified: Option<SystemTime>,
    document: Arc<GuardrailDocument>,
    disk_reads: usize,
    missing_reported: bool,
}

/// Loads the guardrail YAML and re-reads it only when its modification time changes.
pub struct GuardrailConfigLoader {
    path: Option<PathBuf>,
    sink: SharedLogSink,
    state: Mutex<CacheState>,
}

impl GuardrailConfigLoader {
    pub fn new(path: impl Into<PathBuf>, sink: SharedLogSink) -> Self {
        Self {
            path: Some(path.into()),
            sink,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// A loader with no backing file: only the built-in rule sets apply.
    pub fn builtin_only() -> Self {
        Self {
            path: None,
            sink: Arc::new(NullLogSink),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn from_optional_path(path: Option<&Path>, sink: SharedLogSink) -> Self {
        match path {
            Some(path) => Self::new(path, sink),
            None => Self {
                path: None,
                sink,
                state: Mutex::new(CacheState::default()),
            },
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of times the backing file has actually been read from disk.
    pub fn disk_reads(&self) -> usize {
        self.lock_state().disk_reads
    }

    pub fn resolve_rules(&self, mode: SafetyMode, profile: Option<&UserProfile>) -> GuardrailRules {
        let document = self.current_document();
        let mut rules = GuardrailRules::builtin(mode);

        rules
            .banned_terms
            .extend(normalize_terms(&document.defaults.banned_terms));
        rules.tone = rules.tone.apply(&document.defaults.tone_thresholds);

        let matched = profile.and_then(|profile| {
            profile
                .match_keys()
                .into_iter()
                .find(|key| document.profiles.contains_key(key))
        });

        if let Some(key) = matched.as_deref() {
            if let Some(overrides) = document.profiles.get(key) {
                rules
                    .banned_terms
                    .extend(normalize_terms(&overrides.banned_terms));
                rules.tone = rules.tone.apply(&overrides.tone_thresholds);
            }
        }

        rules.matched_profile = matched;
        rules
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn current_document(&self) -> Arc<GuardrailDocument> {
        let Some(path) = self.path.as_deref() else {
            return Arc::default();
        };

        // Held across the staleness check and the reload.
        let mut state = self.lock_state();

        let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                if !state.missing_reported {
                    self.sink.log(LogRecord::warn(
                        LOG_TARGET,
                        format!(
                            "guardrail config `{}` unavailable ({err}); using built-in rules",
                            path.display()
                        ),
                    ));
                    state.missing_reported = true;
                }
                state.modified = None;
                state.document = Arc::default();
                return Arc::clone(&state.document);
            }
        };

        if state.modified == Some(modified) {
            return Arc::clone(&state.document);
        }

        state.disk_reads += 1;
        state.missing_reported = false;
        state.modified = Some(modified);
        state.document = Arc::new(self.read_document(path));
        Arc::clone(&state.document)
    }

    fn read_document(&self, path: &Path) -> GuardrailDocument {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                self.sink.log(LogRecord::warn(
                    LOG_TARGET,
                    format!("failed to read guardrail config `{}`: {err}", path.display()),
                ));
                return GuardrailDocument::default();
            }
        };

        if text.trim().is_empty() {
            return GuardrailDocument::default();
        }

        match serde_yaml::from_str::<GuardrailDocument>(&text) {
            Ok(document) => {
                let document = document.normalized();
                self.sink.log(LogRecord::info(
                    LOG_TARGET,
                    format!(
                        "loaded guardrail config `{}` ({} default terms, {} profiles)",
                        path.display(),
                        document.defaults.banned_terms.len(),
                        document.profiles.len()
                    ),
                ));
                document
            }
            Err(err) => {
                self.sink.log(LogRecord::warn(
                    LOG_TARGET,
                    format!(
                        "failed to parse guardrail config `{}`: {err}; using built-in rules",
                        path.display()
                    ),
                ));
                GuardrailDocument::default()
            }
        }
    }
}

fn normalize_terms(terms: &[String]) -> impl Iterator<Item = String> + '_ {
    terms
        .iter()
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, VecLogSink};
    use std::fs::OpenOptions;
    use std::time::Duration;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
defaults:
  banned_terms: ["Thunder", "  spider  "]
  tone_thresholds:
    max_exclamation_points: 4
profiles:
  Anxious:
    banned_terms: ["storm"]
    tone_thresholds:
      max_all_caps_chunks: 1
"#;

    fn bump_mtime(path: &Path, seconds: u64) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(seconds))
            .unwrap();
    }

    #[test]
    fn builtin_only_uses_mode_defaults() {
        let loader = GuardrailConfigLoader::builtin_only();

        let bedtime = loader.resolve_rules(SafetyMode::BedtimeSafety, None);
        assert!(bedtime.banned_terms.contains("monster"));
        assert_eq!(bedtime.tone, ToneThresholds::default());
        assert_eq!(bedtime.matched_profile, None);

        let brand = loader.resolve_rules(SafetyMode::BrandCompliance, None);
        assert!(brand.banned_terms.contains("miracle"));
        assert!(!brand.banned_terms.contains("monster"));
    }

    #[test]
    fn defaults_and_profile_overrides_compose() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guardrails.yaml");
        fs::write(&path, SAMPLE).unwrap();
        let loader = GuardrailConfigLoader::new(&path, Arc::new(NullLogSink));

        let plain = loader.resolve_rules(SafetyMode::BedtimeSafety, None);
        assert!(plain.banned_terms.contains("thunder"));
        assert!(plain.banned_terms.contains("spider"));
        assert!(plain.banned_terms.contains("monster"));
        assert!(!plain.banned_terms.contains("storm"));
        assert_eq!(plain.tone.max_exclamation_points, 4);
        assert_eq!(plain.tone.max_all_caps_chunks, DEFAULT_MAX_ALL_CAPS_CHUNKS);

        let profile = UserProfile {
            mood: Some("ANXIOUS".into()),
            ..UserProfile::default()
        };
        let matched = loader.resolve_rules(SafetyMode::BedtimeSafety, Some(&profile));
        assert_eq!(matched.matched_profile.as_deref(), Some("anxious"));
        assert!(matched.banned_terms.contains("storm"));
        assert_eq!(matched.tone.max_exclamation_points, 4);
        assert_eq!(matched.tone.max_all_caps_chunks, 1);
    }

    #[test]
    fn profile_lookup_checks_calming_elements() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guardrails.yaml");
        fs::write(&path, "profiles:\n  ocean waves:\n    banned_terms: [shark]\n").unwrap();
        let loader = GuardrailConfigLoader::new(&path, Arc::new(NullLogSink));

        let profile = UserProfile {
            calming_elements: vec!["Ocean Waves".into()],
            ..UserProfile::default()
        };
        let rules = loader.resolve_rules(SafetyMode::BedtimeSafety, Some(&profile));
        assert_eq!(rules.matched_profile.as_deref(), Some("ocean waves"));
        assert!(rules.banned_terms.contains("shark"));
    }

    #[test]
    fn rereads_only_when_modification_time_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guardrails.yaml");
        fs::write(&path, SAMPLE).unwrap();
        let loader = GuardrailConfigLoader::new(&path, Arc::new(NullLogSink));

        loader.resolve_rules(SafetyMode::BedtimeSafety, None);
        loader.resolve_rules(SafetyMode::BedtimeSafety, None);
        assert_eq!(loader.disk_reads(), 1);

        fs::write(&path, "defaults:\n  banned_terms: [volcano]\n").unwrap();
        bump_mtime(&path, 30);

        let rules = loader.resolve_rules(SafetyMode::BedtimeSafety, None);
        assert_eq!(loader.disk_reads(), 2);
        assert!(rules.banned_terms.contains("volcano"));
        assert!(!rules.banned_terms.contains("thunder"));
    }

    #[test]
    fn missing_file_warns_once_and_falls_back() {
        let dir = tempdir().unwrap();
        let sink = Arc::new(VecLogSink::new());
        let loader = GuardrailConfigLoader::new(dir.path().join("absent.yaml"), sink.clone());

        let rules = loader.resolve_rules(SafetyMode::BedtimeSafety, None);
        loader.resolve_rules(SafetyMode::BedtimeSafety, None);

        assert_eq!(rules, GuardrailRules::builtin(SafetyMode::BedtimeSafety));
        assert_eq!(sink.count_at(LogLevel::Warn), 1);
        assert_eq!(loader.disk_reads(), 0);
    }

    #[test]
    fn unparsable_file_is_treated_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guardrails.yaml");
        fs::write(&path, "defaults: [this is: not: valid").unwrap();
        let sink = Arc::new(VecLogSink::new());
        let loader = GuardrailConfigLoader::new(&path, sink.clone());

        let rules = loader.resolve_rules(SafetyMode::BedtimeSafety, None);
        assert_eq!(rules, GuardrailRules::builtin(SafetyMode::BedtimeSafety));
        assert_eq!(sink.count_at(LogLevel::Warn), 1);
    }
}

pub mod assets;
pub mod config;
pub mod generation;
pub mod guardrails;
pub mod logging;
pub mod profile;
pub mod prompts;

pub use assets::{AssetError, AssetStore};
pub use config::{
    map_legacy_backend, resolve_config, CloudConfig, CompanionConfig, ConfigError,
    GuardrailSettings, InferenceMode, InferenceModeConfig, LocalConfig, PromptConfig,
    ProviderKind, ProviderSettings, RetrySettings, Settings,
};
pub use generation::{
    max_tokens_for_words, FrameSize, GenerationError, GeneratorTriple, NarrationAudio,
    NarrationGenerator, StoryDraft, StoryGenerator, VisualFrame, VisualGenerator,
};
pub use guardrails::{
    CategorySeverity, ContentGuard, FilterLevel, GuardrailConfigLoader, GuardrailError,
    GuardrailRules, GuardrailViolation, ModerationClient, ModerationError, ModerationVerdict,
    PromptSanitizer, PromptType, SafetyMode, SanitizedPrompt, ToneThresholds, ViolationCategory,
};
pub use logging::{
    LogCrateSink, LogLevel, LogRecord, LogSink, NullLogSink, SharedLogSink, VecLogSink,
};
pub use profile::UserProfile;
pub use prompts::{
    summarize_for_clip, AgeBand, LanguageSelection, PromptArguments, PromptBuilder,
    PromptContext, PromptContextError, PromptError, PromptMetadata, PromptMode, PromptRegistry,
    PromptSource, PromptTemplate,
};

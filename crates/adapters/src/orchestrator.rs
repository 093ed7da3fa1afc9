use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bedtime_core::{
    resolve_config, ConfigError, FrameSize, GenerationError, GeneratorTriple,
    GuardrailConfigLoader, GuardrailError, InferenceMode, InferenceModeConfig, LogCrateSink,
    NarrationAudio, PromptSanitizer, PromptType, ProviderKind, SanitizedPrompt, Settings,
    StoryDraft, VisualFrame,
};
use log::{info, warn};
use thiserror::Error;

use crate::error::ProviderError;
use crate::retry::{RetryConfig, RetryExecutor};

/// Builds the generator triple for one provider kind.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, kind: ProviderKind) -> Result<GeneratorTriple, GenerationError>;
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("could not construct {kind} provider: {source}")]
    Construction {
        kind: ProviderKind,
        #[source]
        source: GenerationError,
    },
    #[error("{kind} provider failed: {source}")]
    Provider {
        kind: ProviderKind,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    Guardrail(#[from] GuardrailError),
    #[error("inference mode {0} has no providers")]
    EmptyChain(InferenceMode),
    #[error("all providers failed in {mode} mode (tried {}); last error: {last}", KindList(.attempted))]
    ChainExhausted {
        mode: InferenceMode,
        attempted: Vec<ProviderKind>,
        #[source]
        last: Box<OrchestratorError>,
    },
}

impl OrchestratorError {
    /// Provider kind the failure is attributed to, if any.
    pub fn kind(&self) -> Option<ProviderKind> {
        match self {
            Self::Construction { kind, .. } | Self::Provider { kind, .. } => Some(*kind),
            Self::ChainExhausted { last, .. } => last.kind(),
            Self::Guardrail(_) | Self::EmptyChain(_) => None,
        }
    }
}

struct KindList<'a>(&'a [ProviderKind]);

impl fmt::Display for KindList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(ProviderKind::as_str).collect();
        f.write_str(&names.join(" -> "))
    }
}

/// The story produced by the first working provider, plus the triple that produced it.
#[derive(Debug)]
pub struct StoryOutcome {
    pub triple: GeneratorTriple,
    pub draft: StoryDraft,
    pub prompt: SanitizedPrompt,
    pub attempts: u32,
}

/// Walks the provider chain of the configured inference mode.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    mode: InferenceMode,
    mode_config: InferenceModeConfig,
    factory: Arc<dyn ProviderFactory>,
    executor: RetryExecutor,
    sanitizer: Arc<PromptSanitizer>,
    fallback_pause: Duration,
}

impl GenerationOrchestrator {
    pub fn new(
        mode: InferenceMode,
        factory: Arc<dyn ProviderFactory>,
        executor: RetryExecutor,
    ) -> Self {
        Self {
            mode,
            mode_config: mode.config(),
            factory,
            executor,
            sanitizer: Arc::new(PromptSanitizer::default()),
            fallback_pause: Duration::ZERO,
        }
    }

    /// Uses the guardrail rules configured for the settings' safety mode, without a profile.
    pub fn from_settings(settings: &Settings, factory: Arc<dyn ProviderFactory>) -> Self {
        let guardrails = &settings.guardrails;
        let loader = GuardrailConfigLoader::from_optional_path(
            guardrails.config_path.as_deref(),
            LogCrateSink::shared(),
        );
        let rules = loader.resolve_rules(guardrails.safety_mode, None);

        Self::new(
            settings.inference_mode,
            factory,
            RetryExecutor::new(RetryConfig::from(&settings.retry)),
        )
        .with_sanitizer(Arc::new(PromptSanitizer::with_rules(&rules)))
        .with_fallback_pause(settings.fallback_pause())
    }

    pub fn with_sanitizer(mut self, sanitizer: Arc<PromptSanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_fallback_pause(mut self, pause: Duration) -> Self {
        self.fallback_pause = pause;
        self
    }

    /// Ordered provider chain for a mode name such as `cloud_first`.
    pub fn resolve_config(mode: &str) -> Result<InferenceModeConfig, ConfigError> {
        resolve_config(mode)
    }

    pub fn mode(&self) -> InferenceMode {
        self.mode
    }

    pub fn mode_config(&self) -> &InferenceModeConfig {
        &self.mode_config
    }

    /// Sanitizes `prompt` once, then tries each provider kind in chain order.
    ///
    /// Construction and call failures both advance the chain. Without fallback the
    /// single provider's error is returned as is.
    pub async fn generate_story(
        &self,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<StoryOutcome, OrchestratorError> {
        let sanitized = self.sanitizer.enforce(prompt, PromptType::Story)?;
        let text: Arc<str> = Arc::from(sanitized.text.as_str());

        let chain = &self.mode_config.chain;
        let mut attempted = Vec::with_capacity(chain.len());
        let mut last_error = None;

        for (index, kind) in chain.iter().copied().enumerate() {
            attempted.push(kind);
            match self.try_story(kind, &text, max_tokens).await {
                Ok((triple, draft, attempts)) => {
                    if index > 0 {
                        info!("[orchestrator] {} mode served by fallback provider {kind}", self.mode);
                    }
                    return Ok(StoryOutcome {
                        triple,
                        draft,
                        prompt: sanitized,
                        attempts,
                    });
                }
                Err(err) if !self.mode_config.allow_fallback => return Err(err),
                Err(err) => {
                    warn!("[orchestrator] {kind} provider failed in {} mode: {err}", self.mode);
                    last_error = Some(err);
                    if index + 1 < chain.len() && !self.fallback_pause.is_zero() {
                        tokio::time::sleep(self.fallback_pause).await;
                    }
                }
            }
        }

        match last_error {
            Some(last) => Err(OrchestratorError::ChainExhausted {
                mode: self.mode,
                attempted,
                last: Box::new(last),
            }),
            None => Err(OrchestratorError::EmptyChain(self.mode)),
        }
    }

    /// Narrates with the triple chosen by [`Self::generate_story`]; no chain advancement.
    pub async fn narrate(
        &self,
        triple: &GeneratorTriple,
        text: &str,
    ) -> Result<NarrationAudio, OrchestratorError> {
        let sanitized = self.sanitizer.enforce(text, PromptType::Narration)?;
        let narration = Arc::clone(&triple.narration);
        let model = narration.model_id().to_string();
        self.executor
            .run(&model, "narrate", move || narration.narrate(&sanitized.text))
            .await
            .map_err(|source| OrchestratorError::Provider {
                kind: triple.kind,
                source,
            })
    }

    /// Renders one frame with the bound triple; no chain advancement.
    pub async fn render_frame(
        &self,
        triple: &GeneratorTriple,
        prompt: &str,
        size: FrameSize,
    ) -> Result<VisualFrame, OrchestratorError> {
        let sanitized = self.sanitizer.enforce(prompt, PromptType::Image)?;
        let visual = Arc::clone(&triple.visual);
        let model = visual.model_id().to_string();
        self.executor
            .run(&model, "render_frame", move || {
                visual.render_frame(&sanitized.text, size)
            })
            .await
            .map_err(|source| OrchestratorError::Provider {
                kind: triple.kind,
                source,
            })
    }

    /// Runs a follow-up text prompt (such as a narration script) on the bound story model.
    pub async fn rewrite(
        &self,
        triple: &GeneratorTriple,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<StoryDraft, OrchestratorError> {
        let sanitized = self.sanitizer.enforce(prompt, PromptType::Narration)?;
        let story = Arc::clone(&triple.story);
        let model = story.model_id().to_string();
        self.executor
            .run(&model, "rewrite", move || {
                story.generate_story(&sanitized.text, max_tokens)
            })
            .await
            .map_err(|source| OrchestratorError::Provider {
                kind: triple.kind,
                source,
            })
    }

    async fn try_story(
        &self,
        kind: ProviderKind,
        prompt: &Arc<str>,
        max_tokens: u32,
    ) -> Result<(GeneratorTriple, StoryDraft, u32), OrchestratorError> {
        // Blocking HTTP clients must be built off the async workers.
        let factory = Arc::clone(&self.factory);
        let triple = tokio::task::spawn_blocking(move || factory.create(kind))
            .await
            .unwrap_or_else(|join_err| Err(GenerationError::new(join_err)))
            .map_err(|source| OrchestratorError::Construction { kind, source })?;

        let story = Arc::clone(&triple.story);
        let model = story.model_id().to_string();
        let prompt = Arc::clone(prompt);
        let result = self
            .executor
            .run_counted(&model, "generate_story", move || {
                story.generate_story(&prompt, max_tokens)
            })
            .await;

        let attempts = result.attempts;
        let draft = result
            .outcome
            .map_err(|source| OrchestratorError::Provider { kind, source })?;
        Ok((triple, draft, attempts))
    }
}

//! End-to-end story package: story, narration and illustrated frames from one provider.

use std::sync::Arc;

use bedtime_core::{
    max_tokens_for_words, AssetError, AssetStore, ContentGuard, FrameSize, GuardrailSettings,
    GuardrailViolation, NarrationAudio, PromptBuilder, PromptContext, PromptError, ProviderKind,
    StoryDraft, VisualFrame,
};
use log::{info, warn};
use thiserror::Error;

use crate::orchestrator::{GenerationOrchestrator, OrchestratorError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("parental consent must be recorded before generating in child mode")]
    ConsentRequired(Vec<GuardrailViolation>),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("failed to store generated asset: {0}")]
    Asset(#[from] AssetError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Upper bound on illustrated frames; one per story paragraph.
    pub frame_count: usize,
    pub frame_size: FrameSize,
    pub narrate: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            frame_count: 3,
            frame_size: FrameSize::SQUARE,
            narrate: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoryPackage {
    pub kind: ProviderKind,
    pub draft: StoryDraft,
    pub attempts: u32,
    pub narration_script: Option<String>,
    pub narration_url: Option<String>,
    pub frame_urls: Vec<String>,
    /// Frames the provider could not render.
    pub placeholders: usize,
    /// Advisory findings from the content guard; none of them stopped the run.
    pub violations: Vec<GuardrailViolation>,
}

pub struct StoryPipeline {
    orchestrator: GenerationOrchestrator,
    builder: PromptBuilder,
    guard: ContentGuard,
    guardrails: GuardrailSettings,
    assets: Option<Arc<dyn AssetStore>>,
    options: PipelineOptions,
}

impl StoryPipeline {
    pub fn new(
        orchestrator: GenerationOrchestrator,
        builder: PromptBuilder,
        guard: ContentGuard,
        guardrails: GuardrailSettings,
    ) -> Self {
        Self {
            orchestrator,
            builder,
            guard,
            guardrails,
            assets: None,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_assets(mut self, assets: Arc<dyn AssetStore>) -> Self {
        self.assets = Some(assets);
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    pub async fn run(&self, context: &PromptContext) -> Result<StoryPackage, PipelineError> {
        let child_mode = self.guardrails.child_mode;
        let filter_level = self.guardrails.filter_level;
        let profile = context.profile();

        let consent = self
            .guard
            .check_parental_consent(child_mode, self.guardrails.parental_consent_recorded);
        if !consent.is_empty() {
            return Err(PipelineError::ConsentRequired(consent));
        }

        // Hard gate for this request's safety mode and profile.
        let orchestrator = self
            .orchestrator
            .clone()
            .with_sanitizer(Arc::new(self.guard.sanitizer(profile)));

        let mut violations = Vec::new();
        self.advise(
            "seed prompt",
            &mut violations,
            self.guard
                .check_story(context.prompt(), profile, child_mode, filter_level),
        );

        let story_prompt = self.builder.story_prompt(context)?;
        let max_tokens = max_tokens_for_words(context.target_words());
        let outcome = orchestrator
            .generate_story(&story_prompt, max_tokens)
            .await?;
        let triple = outcome.triple;
        let draft = outcome.draft;
        info!(
            "[pipeline] story drafted by {} ({}) after {} attempt(s)",
            triple.kind, draft.model, outcome.attempts
        );
        self.advise(
            "story draft",
            &mut violations,
            self.guard
                .check_story(&draft.text, profile, child_mode, filter_level),
        );

        let mut narration_script = None;
        let mut narration_url = None;
        if self.options.narrate {
            let script_prompt = self.builder.narration_prompt(context, &draft.text)?;
            let script = orchestrator
                .rewrite(&triple, &script_prompt, max_tokens)
                .await?
                .text;
            match orchestrator.narrate(&triple, &script).await? {
                NarrationAudio::Audio { bytes, extension } => {
                    narration_url = self.upload_audio(&bytes, &format!("story.{extension}"))?;
                }
                NarrationAudio::Unavailable => {
                    info!("[pipeline] {} provider has no narration, skipping audio", triple.kind);
                }
            }
            narration_script = Some(script);
        }

        let mut frame_urls = Vec::new();
        let mut placeholders = 0;
        for (index, scene) in scenes(&draft.text)
            .into_iter()
            .take(self.options.frame_count)
            .enumerate()
        {
            let prompt = self.builder.visual_prompt(context, scene)?;
            self.advise(
                "frame prompt",
                &mut violations,
                self.guard
                    .check_video_prompt(&prompt, profile, child_mode, filter_level),
            );

            match orchestrator
                .render_frame(&triple, &prompt, self.options.frame_size)
                .await?
            {
                VisualFrame::Image(bytes) => {
                    let flagged = self.guard.check_image(&bytes, child_mode, filter_level);
                    if !flagged.is_empty() {
                        warn!("[pipeline] frame {} withheld after image moderation", index + 1);
                        violations.extend(flagged);
                        continue;
                    }
                    if let Some(url) = self.upload_frame(&bytes, &format!("frame-{}.png", index + 1))? {
                        frame_urls.push(url);
                    }
                }
                VisualFrame::Placeholder => placeholders += 1,
            }
        }

        Ok(StoryPackage {
            kind: triple.kind,
            draft,
            attempts: outcome.attempts,
            narration_script,
            narration_url,
            frame_urls,
            placeholders,
            violations,
        })
    }

    fn advise(
        &self,
        stage: &str,
        collected: &mut Vec<GuardrailViolation>,
        found: Vec<GuardrailViolation>,
    ) {
        for violation in &found {
            warn!("[pipeline] {stage}: {violation}");
        }
        collected.extend(found);
    }

    fn upload_audio(&self, bytes: &[u8], filename: &str) -> Result<Option<String>, AssetError> {
        self.assets
            .as_ref()
            .map(|store| store.upload_audio(bytes, filename))
            .transpose()
    }

    fn upload_frame(&self, bytes: &[u8], filename: &str) -> Result<Option<String>, AssetError> {
        self.assets
            .as_ref()
            .map(|store| store.upload_frame(bytes, filename))
            .transpose()
    }
}

/// Paragraphs of the story, blank-line separated; a single block yields itself.
fn scenes(text: &str) -> Vec<&str> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|scene| !scene.is_empty())
        .collect()
}

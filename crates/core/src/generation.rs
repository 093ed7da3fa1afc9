use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::config::ProviderKind;

/// Opaque failure from a provider call; the retry layer classifies it by walking its source chain.
#[derive(Debug)]
pub struct GenerationError {
    inner: Box<dyn StdError + Send + Sync>,
}

impl GenerationError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Box::new(error),
        }
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(MessageError(message.into()))
    }

    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync> {
        self.inner
    }

    pub fn as_inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.as_ref()
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl StdError for GenerationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

#[derive(Debug)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for MessageError {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoryDraft {
    pub text: String,
    pub model: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NarrationAudio {
    Audio { bytes: Vec<u8>, extension: String },
    /// The backend answered that it cannot narrate; the caller ships the story without audio.
    Unavailable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VisualFrame {
    Image(Vec<u8>),
    /// The backend does not implement image generation; the caller substitutes a placeholder.
    Placeholder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const SQUARE: FrameSize = FrameSize {
        width: 1024,
        height: 1024,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::SQUARE
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

pub trait StoryGenerator: Send + Sync {
    fn model_id(&self) -> &str;

    fn generate_story(&self, prompt: &str, max_tokens: u32) -> Result<StoryDraft, GenerationError>;
}

pub trait NarrationGenerator: Send + Sync {
    fn model_id(&self) -> &str;

    fn narrate(&self, script: &str) -> Result<NarrationAudio, GenerationError>;
}

pub trait VisualGenerator: Send + Sync {
    fn model_id(&self) -> &str;

    fn render_frame(&self, prompt: &str, size: FrameSize) -> Result<VisualFrame, GenerationError>;
}

/// One generator per modality, all bound to the same provider kind.
#[derive(Clone)]
pub struct GeneratorTriple {
    pub kind: ProviderKind,
    pub story: Arc<dyn StoryGenerator>,
    pub narration: Arc<dyn NarrationGenerator>,
    pub visual: Arc<dyn VisualGenerator>,
}

impl GeneratorTriple {
    pub fn new(
        kind: ProviderKind,
        story: Arc<dyn StoryGenerator>,
        narration: Arc<dyn NarrationGenerator>,
        visual: Arc<dyn VisualGenerator>,
    ) -> Self {
        Self {
            kind,
            story,
            narration,
            visual,
        }
    }
}

impl fmt::Debug for GeneratorTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorTriple")
            .field("kind", &self.kind)
            .field("story", &self.story.model_id())
            .field("narration", &self.narration.model_id())
            .field("visual", &self.visual.model_id())
            .finish()
    }
}

/// Rough token budget for a story of `words` words.
pub fn max_tokens_for_words(words: u32) -> u32 {
    (words.saturating_mul(3) / 2).max(256)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn generation_error_exposes_source_chain() {
        let err = GenerationError::new(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        let source = err.source().expect("source");
        let io_err = source.downcast_ref::<io::Error>().expect("io error");
        assert_eq!(io_err.kind(), io::ErrorKind::TimedOut);
        assert_eq!(err.to_string(), "read timed out");
    }

    #[test]
    fn token_budget_has_a_floor() {
        assert_eq!(max_tokens_for_words(100), 256);
        assert_eq!(max_tokens_for_words(600), 900);
    }
}

//! Models running on the paired phone, reached over its local HTTP bridge.
//!
//! The bridge answers `501 Not Implemented` for modalities the device cannot run;
//! those become [`NarrationAudio::Unavailable`] and [`VisualFrame::Placeholder`].

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bedtime_core::{
    CompanionConfig, FrameSize, GenerationError, GeneratorTriple, NarrationAudio,
    NarrationGenerator, ProviderKind, StoryDraft, StoryGenerator, VisualFrame, VisualGenerator,
};
use log::info;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::base_url::service_url;
use crate::error::AdapterError;
use crate::openai::{ensure_success, http_client, is_not_implemented, json_post};

const STORY_MODEL_ID: &str = "companion-story";
const TTS_MODEL_ID: &str = "companion-tts";
const IMAGE_MODEL_ID: &str = "companion-image";

struct CompanionBridge {
    client: Client,
    base_url: String,
}

impl CompanionBridge {
    fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::blocking::Response, AdapterError> {
        let url = format!("{}{path}", self.base_url);
        Ok(json_post(&self.client, &url, None).json(body).send()?)
    }
}

pub fn companion_triple(config: &CompanionConfig) -> Result<GeneratorTriple, AdapterError> {
    let bridge = Arc::new(CompanionBridge {
        client: http_client(config.timeout)?,
        base_url: service_url(&config.base_url, "companion")?,
    });

    Ok(GeneratorTriple::new(
        ProviderKind::NativeMobile,
        Arc::new(CompanionStoryGenerator {
            bridge: Arc::clone(&bridge),
            temperature: config.temperature,
        }),
        Arc::new(CompanionNarrationGenerator {
            bridge: Arc::clone(&bridge),
            voice: config.voice.clone(),
        }),
        Arc::new(CompanionVisualGenerator {
            bridge,
            steps: config.image_steps.max(1),
        }),
    ))
}

struct CompanionStoryGenerator {
    bridge: Arc<CompanionBridge>,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoryRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct StoryResponse {
    story_text: String,
    #[serde(default)]
    model: Option<String>,
}

impl StoryGenerator for CompanionStoryGenerator {
    fn model_id(&self) -> &str {
        STORY_MODEL_ID
    }

    fn generate_story(&self, prompt: &str, max_tokens: u32) -> Result<StoryDraft, GenerationError> {
        let body = StoryRequest {
            prompt,
            max_tokens,
            temperature: self.temperature,
        };
        let response = self.bridge.post("/ml/story/generate", &body)?;
        let parsed: StoryResponse = ensure_success(response)?
            .json()
            .map_err(AdapterError::from)?;
        story_draft(parsed).map_err(GenerationError::from)
    }
}

fn story_draft(response: StoryResponse) -> Result<StoryDraft, AdapterError> {
    if response.story_text.trim().is_empty() {
        return Err(AdapterError::EmptyResponse);
    }
    Ok(StoryDraft {
        text: response.story_text,
        model: response
            .model
            .filter(|model| !model.trim().is_empty())
            .unwrap_or_else(|| STORY_MODEL_ID.to_string()),
    })
}

struct CompanionNarrationGenerator {
    bridge: Arc<CompanionBridge>,
    voice: String,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    audio: String,
}

impl NarrationGenerator for CompanionNarrationGenerator {
    fn model_id(&self) -> &str {
        TTS_MODEL_ID
    }

    fn narrate(&self, script: &str) -> Result<NarrationAudio, GenerationError> {
        let body = TtsRequest {
            text: script,
            voice: &self.voice,
        };
        let response = self.bridge.post("/ml/tts/generate", &body)?;
        if is_not_implemented(&response) {
            info!("[companion] device has no on-board narration model");
            return Ok(NarrationAudio::Unavailable);
        }
        let parsed: TtsResponse = ensure_success(response)?
            .json()
            .map_err(AdapterError::from)?;
        let bytes = STANDARD
            .decode(parsed.audio.trim())
            .map_err(AdapterError::from)?;
        Ok(NarrationAudio::Audio {
            bytes,
            extension: "wav".to_string(),
        })
    }
}

struct CompanionVisualGenerator {
    bridge: Arc<CompanionBridge>,
    steps: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
    num_inference_steps: u32,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    image: String,
}

impl VisualGenerator for CompanionVisualGenerator {
    fn model_id(&self) -> &str {
        IMAGE_MODEL_ID
    }

    fn render_frame(&self, prompt: &str, size: FrameSize) -> Result<VisualFrame, GenerationError> {
        let body = ImageRequest {
            prompt,
            width: size.width,
            height: size.height,
            num_inference_steps: self.steps,
        };
        let response = self.bridge.post("/ml/image/generate", &body)?;
        if is_not_implemented(&response) {
            info!("[companion] device has no on-board image model, using placeholder");
            return Ok(VisualFrame::Placeholder);
        }
        let parsed: ImageResponse = ensure_success(response)?
            .json()
            .map_err(AdapterError::from)?;
        let bytes = STANDARD
            .decode(parsed.image.trim())
            .map_err(AdapterError::from)?;
        Ok(VisualFrame::Image(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_bodies_use_bridge_field_names() {
        let story = serde_json::to_value(StoryRequest {
            prompt: "moon",
            max_tokens: 900,
            temperature: 0.5,
        })
        .unwrap();
        assert_eq!(story["maxTokens"], 900);
        assert_eq!(story["prompt"], "moon");

        let image = serde_json::to_value(ImageRequest {
            prompt: "moon",
            width: 512,
            height: 768,
            num_inference_steps: 20,
        })
        .unwrap();
        assert_eq!(image["numInferenceSteps"], 20);
        assert_eq!(image["height"], 768);
    }

    #[test]
    fn story_response_falls_back_to_bridge_model_id() {
        let parsed: StoryResponse =
            serde_json::from_str(r#"{"story_text":"The stars hummed."}"#).unwrap();
        let draft = story_draft(parsed).unwrap();
        assert_eq!(draft.model, STORY_MODEL_ID);

        let blank: StoryResponse =
            serde_json::from_str(r#"{"story_text":"  ","model":"gemma"}"#).unwrap();
        assert!(matches!(story_draft(blank), Err(AdapterError::EmptyResponse)));
    }

    #[test]
    fn construction_validates_base_url() {
        let config = CompanionConfig {
            base_url: "bluetooth://phone".into(),
            ..CompanionConfig::default()
        };
        assert!(companion_triple(&config).is_err());

        let triple = companion_triple(&CompanionConfig::default()).unwrap();
        assert_eq!(triple.kind, ProviderKind::NativeMobile);
        assert_eq!(triple.visual.model_id(), IMAGE_MODEL_ID);
    }
}

//! Self-hosted server stack: an OpenAI-compatible chat server (Ollama by default),
//! a voice-model TTS server and a Stable Diffusion WebUI instance.

use std::path::PathBuf;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bedtime_core::{
    FrameSize, GenerationError, GeneratorTriple, LocalConfig, NarrationAudio, NarrationGenerator,
    ProviderKind, StoryDraft, StoryGenerator, VisualFrame, VisualGenerator,
};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::base_url::{api_base_url, service_url};
use crate::error::AdapterError;
use crate::openai::{ensure_success, http_client, json_post, ChatClient, DEFAULT_SYSTEM_PROMPT};

const NEGATIVE_PROMPT: &str = "text, letters, watermark, scary, dark, blood, weapon";

pub fn local_triple(config: &LocalConfig) -> Result<GeneratorTriple, AdapterError> {
    let voice_model = config.voice_model_path.clone().ok_or_else(|| {
        AdapterError::invalid_config("local voice_model_path must be set for on-device narration")
    })?;
    if !voice_model.is_file() {
        return Err(AdapterError::invalid_config(format!(
            "local voice model `{}` not found",
            voice_model.display()
        )));
    }

    let chat_url = api_base_url(&config.base_url, "local")?;
    let tts_url = service_url(&config.tts_url, "local tts")?;
    let image_url = service_url(&config.image_url, "local image")?;
    let client = http_client(config.timeout)?;

    let story = LocalStoryGenerator {
        chat: ChatClient::new(
            client.clone(),
            &chat_url,
            None,
            config.story_model.clone(),
            config.temperature,
            Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        )?,
    };
    let model_id = voice_model
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("local-tts")
        .to_string();
    let narration = LocalNarrationGenerator {
        client: client.clone(),
        url: format!("{tts_url}/synthesize"),
        voice_model,
        model_id,
    };
    let visual = LocalVisualGenerator {
        client,
        url: format!("{image_url}/sdapi/v1/txt2img"),
        steps: config.image_steps.max(1),
    };

    Ok(GeneratorTriple::new(
        ProviderKind::Local,
        Arc::new(story),
        Arc::new(narration),
        Arc::new(visual),
    ))
}

struct LocalStoryGenerator {
    chat: ChatClient,
}

impl StoryGenerator for LocalStoryGenerator {
    fn model_id(&self) -> &str {
        self.chat.model_name()
    }

    fn generate_story(&self, prompt: &str, max_tokens: u32) -> Result<StoryDraft, GenerationError> {
        let text = self.chat.complete(prompt, max_tokens)?;
        Ok(StoryDraft {
            text,
            model: self.chat.model_name().to_string(),
        })
    }
}

struct LocalNarrationGenerator {
    client: Client,
    url: String,
    voice_model: PathBuf,
    model_id: String,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice_model: String,
}

impl NarrationGenerator for LocalNarrationGenerator {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn narrate(&self, script: &str) -> Result<NarrationAudio, GenerationError> {
        let body = SynthesizeRequest {
            text: script,
            voice_model: self.voice_model.display().to_string(),
        };
        let response = json_post(&self.client, &self.url, None)
            .json(&body)
            .send()
            .map_err(AdapterError::from)?;
        let bytes = ensure_success(response)?
            .bytes()
            .map_err(AdapterError::from)?;
        if bytes.is_empty() {
            return Err(AdapterError::EmptyResponse.into());
        }
        Ok(NarrationAudio::Audio {
            bytes: bytes.to_vec(),
            extension: "wav".to_string(),
        })
    }
}

struct LocalVisualGenerator {
    client: Client,
    url: String,
    steps: u32,
}

#[derive(Serialize)]
struct Txt2ImgRequest<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

fn decode_txt2img(response: Txt2ImgResponse) -> Result<Vec<u8>, AdapterError> {
    let encoded = response
        .images
        .into_iter()
        .find(|image| !image.trim().is_empty())
        .ok_or(AdapterError::EmptyResponse)?;
    // WebUI builds may prefix a data URL header.
    let payload = encoded
        .split_once(',')
        .map(|(_, data)| data)
        .unwrap_or(&encoded);
    Ok(STANDARD.decode(payload.trim())?)
}

impl VisualGenerator for LocalVisualGenerator {
    fn model_id(&self) -> &str {
        "stable-diffusion-webui"
    }

    fn render_frame(&self, prompt: &str, size: FrameSize) -> Result<VisualFrame, GenerationError> {
        let body = Txt2ImgRequest {
            prompt,
            negative_prompt: NEGATIVE_PROMPT,
            width: size.width,
            height: size.height,
            steps: self.steps,
        };
        let response = json_post(&self.client, &self.url, None)
            .json(&body)
            .send()
            .map_err(AdapterError::from)?;
        let parsed: Txt2ImgResponse = ensure_success(response)?
            .json()
            .map_err(AdapterError::from)?;
        Ok(VisualFrame::Image(decode_txt2img(parsed)?))
    }
}

//! Hosted OpenAI-compatible API: chat completions, speech and image generation.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bedtime_core::{
    CloudConfig, FrameSize, GenerationError, GeneratorTriple, NarrationAudio, NarrationGenerator,
    ProviderKind, StoryDraft, StoryGenerator, VisualFrame, VisualGenerator,
};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::base_url::api_base_url;
use crate::error::AdapterError;
use crate::openai::{
    ensure_success, http_client, json_post, optional_string, ChatClient, DEFAULT_SYSTEM_PROMPT,
};

pub fn cloud_triple(config: &CloudConfig) -> Result<GeneratorTriple, AdapterError> {
    let api_key = optional_string(&config.api_key)
        .ok_or_else(|| AdapterError::invalid_config("cloud api_key must not be empty"))?;
    let base_url = api_base_url(&config.base_url, "cloud")?;
    let client = http_client(config.timeout)?;

    let story = CloudStoryGenerator {
        chat: ChatClient::new(
            client.clone(),
            &base_url,
            Some(api_key.clone()),
            config.story_model.clone(),
            config.temperature,
            Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        )?,
    };
    let narration = CloudNarrationGenerator {
        client: client.clone(),
        url: format!("{base_url}/audio/speech"),
        api_key: api_key.clone(),
        model: non_empty(&config.speech_model, "speech_model")?,
        voice: config.voice.clone(),
    };
    let visual = CloudVisualGenerator {
        client,
        url: format!("{base_url}/images/generations"),
        api_key,
        model: non_empty(&config.image_model, "image_model")?,
    };

    Ok(GeneratorTriple::new(
        ProviderKind::Cloud,
        Arc::new(story),
        Arc::new(narration),
        Arc::new(visual),
    ))
}

fn non_empty(value: &str, field: &str) -> Result<String, AdapterError> {
    optional_string(value)
        .ok_or_else(|| AdapterError::invalid_config(format!("cloud {field} must not be empty")))
}

struct CloudStoryGenerator {
    chat: ChatClient,
}

impl StoryGenerator for CloudStoryGenerator {
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

struct CloudNarrationGenerator {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    voice: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

impl NarrationGenerator for CloudNarrationGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn narrate(&self, script: &str) -> Result<NarrationAudio, GenerationError> {
        let body = SpeechRequest {
            model: &self.model,
            input: script,
            voice: &self.voice,
            response_format: "mp3",
        };
        let response = json_post(&self.client, &self.url, Some(&self.api_key))
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
            extension: "mp3".to_string(),
        })
    }
}

struct CloudVisualGenerator {
    client: Client,
    url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: String,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
}

fn decode_image_response(response: ImageResponse) -> Result<Vec<u8>, AdapterError> {
    let encoded = response
        .data
        .into_iter()
        .find_map(|datum| datum.b64_json)
        .ok_or(AdapterError::EmptyResponse)?;
    Ok(STANDARD.decode(encoded.trim())?)
}

impl VisualGenerator for CloudVisualGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn render_frame(&self, prompt: &str, size: FrameSize) -> Result<VisualFrame, GenerationError> {
        let body = ImageRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: size.to_string(),
            response_format: "b64_json",
        };
        let response = json_post(&self.client, &self.url, Some(&self.api_key))
            .json(&body)
            .send()
            .map_err(AdapterError::from)?;
        let parsed: ImageResponse = ensure_success(response)?
            .json()
            .map_err(AdapterError::from)?;
        Ok(VisualFrame::Image(decode_image_response(parsed)?))
    }
}

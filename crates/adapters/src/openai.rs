use std::time::Duration;

use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{self, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::AdapterError;

pub(crate) const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

pub(crate) fn http_client(timeout_secs: u64) -> Result<Client, AdapterError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?)
}

pub(crate) fn optional_string(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub(crate) fn json_post(client: &Client, url: &str, api_key: Option<&str>) -> RequestBuilder {
    let request = client.post(url).header(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    match api_key {
        Some(key) if !key.is_empty() => request.bearer_auth(key),
        _ => request,
    }
}

/// Turns any non-2xx answer into [`AdapterError::HttpStatus`] with the body attached.
pub(crate) fn ensure_success(response: Response) -> Result<Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(AdapterError::HttpStatus { status, body })
}

pub(crate) fn is_not_implemented(response: &Response) -> bool {
    response.status() == StatusCode::NOT_IMPLEMENTED
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub(crate) struct ChatClient {
    client: Client,
    url: String,
    api_key: Option<String>,
    model_name: String,
    temperature: f32,
    system_prompt: Option<String>,
}

impl ChatClient {
    pub(crate) fn new(
        client: Client,
        base_url: &str,
        api_key: Option<String>,
        model_name: String,
        temperature: f32,
        system_prompt: Option<String>,
    ) -> Result<Self, AdapterError> {
        if model_name.trim().is_empty() {
            return Err(AdapterError::invalid_config("model_name must not be empty"));
        }

        Ok(Self {
            client,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model_name,
            temperature,
            system_prompt,
        })
    }

    pub(crate) fn model_name(&self) -> &str {
        &self.model_name
    }

    pub(crate) fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, AdapterError> {
        let body = self.request_body(prompt, max_tokens);
        debug!("[chat] POST {} model={}", self.url, self.model_name);
        let response = json_post(&self.client, &self.url, self.api_key.as_deref())
            .json(&body)
            .send()?;
        handle_chat_response(response)
    }

    fn request_body<'a>(&'a self, prompt: &'a str, max_tokens: u32) -> ChatCompletionRequest<'a> {
        let mut messages: Vec<ChatMessageRequest<'_>> = Vec::new();
        if let Some(system) = self.system_prompt.as_deref() {
            messages.push(ChatMessageRequest {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessageRequest {
            role: "user",
            content: prompt,
        });

        ChatCompletionRequest {
            model: &self.model_name,
            messages,
            max_tokens: (max_tokens > 0).then_some(max_tokens),
            temperature: Some(self.temperature),
        }
    }
}

fn handle_chat_response(response: Response) -> Result<String, AdapterError> {
    let parsed: ChatCompletionResponse = ensure_success(response)?.json()?;
    extract_choice_content(parsed).ok_or(AdapterError::EmptyResponse)
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessageRequest<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_choice_content(response: ChatCompletionResponse) -> Option<String> {
    response.choices.into_iter().find_map(|choice| {
        choice
            .message
            .and_then(|message| message.content)
            .or(choice.text)
            .filter(|content| !content.trim().is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(system_prompt: Option<&str>) -> ChatClient {
        ChatClient::new(
            http_client(5).unwrap(),
            "http://localhost:11434/v1/",
            None,
            "llama3.2".into(),
            0.7,
            system_prompt.map(str::to_string),
        )
        .unwrap()
    }

    #[test]
    fn builds_completion_url_and_body() {
        let client = chat(Some(DEFAULT_SYSTEM_PROMPT));
        assert_eq!(client.url, "http://localhost:11434/v1/chat/completions");

        let body = serde_json::to_value(client.request_body("Tell a story", 512)).unwrap();
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Tell a story");
    }

    #[test]
    fn zero_max_tokens_is_omitted() {
        let client = chat(None);
        let body = serde_json::to_value(client.request_body("hi", 0)).unwrap();
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn rejects_blank_model_name() {
        let result = ChatClient::new(http_client(5).unwrap(), "http://x/v1", None, " ".into(), 0.5, None);
        assert!(matches!(result, Err(AdapterError::InvalidConfig(_))));
    }

    #[test]
    fn extracts_first_non_blank_choice() {
        let parsed: ChatCompletionResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"content":"  "}},{"text":"Once upon a time"}]}"#,
        )
        .unwrap();
        assert_eq!(extract_choice_content(parsed).as_deref(), Some("Once upon a time"));

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(extract_choice_content(empty).is_none());
    }
}

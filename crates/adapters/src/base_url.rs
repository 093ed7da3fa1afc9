use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;

use crate::error::AdapterError;

static VERSION_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/v\d+$").expect("valid version suffix regex"));

/// Appends `/v1` to OpenAI-compatible base URLs that carry no version segment.
/// A trailing `#` opts out of the rewrite.
pub fn check_base_url(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    if trimmed.ends_with('#') {
        return trimmed.trim_end_matches('#').to_string();
    }

    if !VERSION_SUFFIX_RE.is_match(trimmed) && !trimmed.contains("/v1") {
        let without_slash = trimmed.trim_end_matches('/');
        format!("{}/v1", without_slash)
    } else {
        trimmed.to_string()
    }
}

/// Validates an http(s) service root and strips trailing slashes.
pub fn service_url(input: &str, label: &str) -> Result<String, AdapterError> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AdapterError::invalid_config(format!(
            "{label} base_url must not be empty"
        )));
    }

    let parsed = Url::parse(trimmed).map_err(|err| {
        AdapterError::invalid_config(format!("{label} base_url `{trimmed}` is not a valid URL: {err}"))
    })?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(AdapterError::invalid_config(format!(
            "{label} base_url `{trimmed}` must be an http(s) URL with a host"
        )));
    }

    Ok(trimmed.to_string())
}

/// [`check_base_url`] followed by [`service_url`] validation.
pub fn api_base_url(input: &str, label: &str) -> Result<String, AdapterError> {
    service_url(&check_base_url(input), label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_base_url_appends_v1_when_missing() {
        assert_eq!(check_base_url("http://localhost:11434"), "http://localhost:11434/v1");
    }

    #[test]
    fn check_base_url_keeps_existing_version() {
        assert_eq!(
            check_base_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1"
        );
        assert_eq!(check_base_url("https://example.com/v2"), "https://example.com/v2");
    }

    #[test]
    fn check_base_url_respects_hash_suffix() {
        assert_eq!(check_base_url("https://example.com/#"), "https://example.com/");
    }

    #[test]
    fn service_url_strips_trailing_slash() {
        assert_eq!(
            service_url("http://127.0.0.1:8765/ ", "companion").unwrap(),
            "http://127.0.0.1:8765"
        );
    }

    #[test]
    fn service_url_rejects_bad_syntax() {
        for bad in ["", "localhost:8765", "ftp://files.example.com", "http//broken"] {
            let err = service_url(bad, "companion").unwrap_err();
            assert!(matches!(err, AdapterError::InvalidConfig(_)), "{bad}");
        }
    }

    #[test]
    fn api_base_url_validates_after_rewrite() {
        assert_eq!(
            api_base_url("http://localhost:11434/", "local").unwrap(),
            "http://localhost:11434/v1"
        );
    }
}

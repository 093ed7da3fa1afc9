use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ConfigError;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Cloud,
    Local,
    NativeMobile,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::Cloud, Self::Local, Self::NativeMobile];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Local => "local",
            Self::NativeMobile => "native_mobile",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMode {
    #[default]
    CloudFirst,
    ServerFirst,
    PhoneFirst,
    CloudOnly,
    ServerOnly,
    PhoneOnly,
}

impl InferenceMode {
    pub const ALL: [InferenceMode; 6] = [
        Self::CloudFirst,
        Self::ServerFirst,
        Self::PhoneFirst,
        Self::CloudOnly,
        Self::ServerOnly,
        Self::PhoneOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CloudFirst => "cloud_first",
            Self::ServerFirst => "server_first",
            Self::PhoneFirst => "phone_first",
            Self::CloudOnly => "cloud_only",
            Self::ServerOnly => "server_only",
            Self::PhoneOnly => "phone_only",
        }
    }

    /// The fixed provider chain for this mode.
    pub fn config(&self) -> InferenceModeConfig {
        use ProviderKind::*;

        match self {
            Self::CloudFirst => InferenceModeConfig::fallback(vec![Cloud, Local, NativeMobile]),
            Self::ServerFirst => InferenceModeConfig::fallback(vec![Local, Cloud, NativeMobile]),
            Self::PhoneFirst => InferenceModeConfig::fallback(vec![NativeMobile, Local, Cloud]),
            Self::CloudOnly => InferenceModeConfig::single(Cloud),
            Self::ServerOnly => InferenceModeConfig::single(Local),
            Self::PhoneOnly => InferenceModeConfig::single(NativeMobile),
        }
    }
}

impl fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InferenceMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownInferenceMode(value.to_string()))
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InferenceModeConfig {
    pub primary: ProviderKind,
    pub chain: Vec<ProviderKind>,
    pub allow_fallback: bool,
}

impl InferenceModeConfig {
    fn fallback(chain: Vec<ProviderKind>) -> Self {
        Self {
            primary: chain[0],
            chain,
            allow_fallback: true,
        }
    }

    fn single(kind: ProviderKind) -> Self {
        Self {
            primary: kind,
            chain: vec![kind],
            allow_fallback: false,
        }
    }
}

pub fn resolve_config(mode: &str) -> Result<InferenceModeConfig, ConfigError> {
    Ok(mode.parse::<InferenceMode>()?.config())
}

/// Maps the older single `preferred_backend` flag onto the nearest ordered mode.
pub fn map_legacy_backend(preferred_backend: &str) -> InferenceMode {
    let normalized = preferred_backend.trim().to_ascii_lowercase();
    let mode = match normalized.as_str() {
        "cloud" | "openai" | "api" | "remote" => InferenceMode::CloudFirst,
        "local" | "server" | "ollama" | "on_device" | "on-device" => InferenceMode::ServerFirst,
        "phone" | "mobile" | "native" | "native_mobile" | "companion" => {
            InferenceMode::PhoneFirst
        }
        _ => {
            log::warn!(
                "unknown legacy preferred_backend `{}`, defaulting to {}",
                preferred_backend,
                InferenceMode::CloudFirst
            );
            return InferenceMode::CloudFirst;
        }
    };
    log::info!(
        "mapped legacy preferred_backend `{}` to inference mode {}",
        preferred_backend,
        mode
    );
    mode
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProviderKind::*;

    #[test]
    fn every_mode_resolves_to_its_chain() {
        let expected = [
            ("cloud_first", Cloud, vec![Cloud, Local, NativeMobile], true),
            ("server_first", Local, vec![Local, Cloud, NativeMobile], true),
            ("phone_first", NativeMobile, vec![NativeMobile, Local, Cloud], true),
            ("cloud_only", Cloud, vec![Cloud], false),
            ("server_only", Local, vec![Local], false),
            ("phone_only", NativeMobile, vec![NativeMobile], false),
        ];

        for (name, primary, chain, allow_fallback) in expected {
            let config = resolve_config(name).unwrap();
            assert_eq!(config.primary, primary, "{name}");
            assert_eq!(config.chain, chain, "{name}");
            assert_eq!(config.allow_fallback, allow_fallback, "{name}");
        }
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = resolve_config("quantum_first").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownInferenceMode(name) if name == "quantum_first"));
    }

    #[test]
    fn mode_names_tolerate_case_and_dashes() {
        assert_eq!(
            "Server-Only".parse::<InferenceMode>().unwrap(),
            InferenceMode::ServerOnly
        );
    }

    #[test]
    fn legacy_backend_maps_to_first_modes() {
        assert_eq!(map_legacy_backend("cloud"), InferenceMode::CloudFirst);
        assert_eq!(map_legacy_backend("Ollama"), InferenceMode::ServerFirst);
        assert_eq!(map_legacy_backend("phone"), InferenceMode::PhoneFirst);
        assert_eq!(map_legacy_backend("???"), InferenceMode::CloudFirst);
    }
}

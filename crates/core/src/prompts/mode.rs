use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::builder::PromptContextError;

/// Governs the role, brand tone and content rules embedded in every prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    #[default]
    BedtimeStory,
    Asmr,
    Mindfulness,
    BrandedWellness,
}

impl PromptMode {
    pub const ALL: [PromptMode; 4] = [
        Self::BedtimeStory,
        Self::Asmr,
        Self::Mindfulness,
        Self::BrandedWellness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BedtimeStory => "bedtime_story",
            Self::Asmr => "asmr",
            Self::Mindfulness => "mindfulness",
            Self::BrandedWellness => "branded_wellness",
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::BedtimeStory => {
                "You are a gentle children's author who writes soothing bedtime stories \
                 that help young listeners wind down and fall asleep."
            }
            Self::Asmr => {
                "You are a soft-spoken narrator who writes slow, sensory-rich scripts \
                 designed to relax listeners through quiet sounds and textures."
            }
            Self::Mindfulness => {
                "You are a calm mindfulness guide who writes short, kind practices \
                 that invite the listener to breathe slowly and rest."
            }
            Self::BrandedWellness => {
                "You are the storyteller for a family wellness brand, writing warm \
                 evening stories that reflect the brand's caring voice."
            }
        }
    }

    pub fn tone(&self) -> &'static str {
        match self {
            Self::BedtimeStory => "warm, cozy and reassuring",
            Self::Asmr => "hushed, slow and tactile",
            Self::Mindfulness => "grounded, patient and encouraging",
            Self::BrandedWellness => "friendly, trustworthy and uplifting",
        }
    }

    pub fn rules(&self) -> &'static [&'static str] {
        match self {
            Self::BedtimeStory => &[
                "Keep every scene safe and peaceful with nothing frightening.",
                "End with the characters settling down to sleep.",
                "Use simple, rhythmic sentences that are pleasant to read aloud.",
                "Avoid sudden surprises, loud noises and cliffhangers.",
            ],
            Self::Asmr => &[
                "Describe soft sounds and gentle textures in slow detail.",
                "Keep the pace unhurried with natural pauses between sentences.",
                "Never introduce tension, conflict or startling events.",
            ],
            Self::Mindfulness => &[
                "Guide the listener through slow breathing at least twice.",
                "Use second-person, present-tense invitations rather than commands.",
                "Keep imagery calm and grounded in the body and nature.",
            ],
            Self::BrandedWellness => &[
                "Never make medical, therapeutic or health claims.",
                "Do not mention other brands or promotions.",
                "Keep the story calm and suitable for the whole family.",
                "Close with a gentle goodnight message.",
            ],
        }
    }
}

impl fmt::Display for PromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptMode {
    type Err = PromptContextError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| PromptContextError::UnknownMode(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_names() {
        assert_eq!("asmr".parse::<PromptMode>().unwrap(), PromptMode::Asmr);
        assert_eq!(
            "Branded-Wellness".parse::<PromptMode>().unwrap(),
            PromptMode::BrandedWellness
        );
        assert!("lullaby".parse::<PromptMode>().is_err());
    }

    #[test]
    fn every_mode_has_rules() {
        for mode in PromptMode::ALL {
            assert!(!mode.rules().is_empty(), "{mode} has no rules");
            assert!(!mode.role().is_empty());
        }
    }
}

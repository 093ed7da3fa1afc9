use serde::{Deserialize, Serialize};

/// What the app knows about the listener; every field is optional.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub routine: Option<String>,
    #[serde(default)]
    pub preferences: Vec<String>,
    #[serde(default)]
    pub favorite_characters: Vec<String>,
    #[serde(default)]
    pub calming_elements: Vec<String>,
    #[serde(default)]
    pub favorite_colors: Vec<String>,
}

impl UserProfile {
    pub fn is_empty(&self) -> bool {
        self.mood.is_none()
            && self.routine.is_none()
            && self.preferences.is_empty()
            && self.favorite_characters.is_empty()
            && self.calming_elements.is_empty()
            && self.favorite_colors.is_empty()
    }

    /// Lower-cased attribute values in lookup order: mood, routine, preferences, calming elements.
    pub fn match_keys(&self) -> Vec<String> {
        self.mood
            .iter()
            .chain(self.routine.iter())
            .chain(self.preferences.iter())
            .chain(self.calming_elements.iter())
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
            .collect()
    }

    /// One-line description used inside text prompts.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(mood) = non_blank(self.mood.as_deref()) {
            parts.push(format!("current mood: {mood}"));
        }
        if let Some(routine) = non_blank(self.routine.as_deref()) {
            parts.push(format!("bedtime routine: {routine}"));
        }
        if !self.preferences.is_empty() {
            parts.push(format!("enjoys {}", join_list(&self.preferences)));
        }
        if !self.favorite_characters.is_empty() {
            parts.push(format!(
                "favorite characters: {}",
                join_list(&self.favorite_characters)
            ));
        }
        if !self.calming_elements.is_empty() {
            parts.push(format!(
                "finds comfort in {}",
                join_list(&self.calming_elements)
            ));
        }
        parts.join("; ")
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn join_list(items: &[String]) -> String {
    let items: Vec<&str> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    match items.as_slice() {
        [] => String::new(),
        [one] => one.to_string(),
        [head @ .., last] => format!("{} and {}", head.join(", "), last),
    }
}

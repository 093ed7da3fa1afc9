use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;

/// Severity of one analyzed category on the 0-7 scale used by the moderation service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySeverity {
    pub category: String,
    pub severity: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub is_safe: bool,
    #[serde(default)]
    pub categories_analyzed: Vec<CategorySeverity>,
}

impl ModerationVerdict {
    pub fn flagged(&self, threshold: u8) -> Vec<&CategorySeverity> {
        self.categories_analyzed
            .iter()
            .filter(|c| c.severity >= threshold)
            .collect()
    }
}

#[derive(Debug)]
pub struct ModerationError {
    inner: Box<dyn StdError + Send + Sync>,
}

impl ModerationError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Box::new(error),
        }
    }
}

impl fmt::Display for ModerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl StdError for ModerationError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Optional third-party content-safety service.
pub trait ModerationClient: Send + Sync {
    fn moderate_text(
        &self,
        text: &str,
        severity_threshold: u8,
    ) -> Result<ModerationVerdict, ModerationError>;

    fn moderate_image(
        &self,
        bytes: &[u8],
        severity_threshold: u8,
    ) -> Result<ModerationVerdict, ModerationError>;
}

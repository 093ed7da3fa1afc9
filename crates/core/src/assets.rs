use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct AssetError {
    inner: Box<dyn StdError + Send + Sync>,
}

impl AssetError {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Box::new(error),
        }
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl StdError for AssetError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner.as_ref())
    }
}

/// Where generated audio and frames end up; returns a retrievable URL.
pub trait AssetStore: Send + Sync {
    fn upload_audio(&self, bytes: &[u8], filename: &str) -> Result<String, AssetError>;

    fn upload_frame(&self, bytes: &[u8], filename: &str) -> Result<String, AssetError>;
}

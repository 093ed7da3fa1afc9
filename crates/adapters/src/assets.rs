use std::fs;
use std::path::{Path, PathBuf};

use bedtime_core::{AssetError, AssetStore};
use log::debug;
use uuid::Uuid;

use crate::error::AdapterError;

/// Writes generated assets under a local directory and hands back `file://` URLs.
#[derive(Clone, Debug)]
pub struct DirectoryAssetStore {
    root: PathBuf,
}

impl DirectoryAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, AdapterError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| AdapterError::io(&root, err))?;
        let root = root
            .canonicalize()
            .map_err(|err| AdapterError::io(&root, err))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn store(&self, folder: &str, bytes: &[u8], filename: &str) -> Result<String, AssetError> {
        let dir = self.root.join(folder);
        fs::create_dir_all(&dir).map_err(|err| AssetError::new(AdapterError::io(&dir, err)))?;

        let path = dir.join(unique_name(filename));
        fs::write(&path, bytes).map_err(|err| AssetError::new(AdapterError::io(&path, err)))?;
        debug!("[assets] wrote {} bytes to {}", bytes.len(), path.display());
        Ok(format!("file://{}", path.display()))
    }
}

impl AssetStore for DirectoryAssetStore {
    fn upload_audio(&self, bytes: &[u8], filename: &str) -> Result<String, AssetError> {
        self.store("audio", bytes, filename)
    }

    fn upload_frame(&self, bytes: &[u8], filename: &str) -> Result<String, AssetError> {
        self.store("frames", bytes, filename)
    }
}

/// Keeps only the final path component of `filename` and prefixes a fresh uuid.
fn unique_name(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or("asset.bin");
    format!("{}-{base}", Uuid::new_v4().simple())
}

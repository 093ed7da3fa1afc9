use bedtime_core::{GenerationError, GeneratorTriple, ProviderKind, ProviderSettings};
use log::debug;

use crate::cloud::cloud_triple;
use crate::companion::companion_triple;
use crate::local::local_triple;
use crate::orchestrator::ProviderFactory;

/// Builds HTTP-backed generator triples from the provider section of [`bedtime_core::Settings`].
#[derive(Clone, Debug, Default)]
pub struct HttpProviderFactory {
    settings: ProviderSettings,
}

impl HttpProviderFactory {
    pub fn new(settings: ProviderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, kind: ProviderKind) -> Result<GeneratorTriple, GenerationError> {
        debug!("[providers] constructing {kind} generators");
        let triple = match kind {
            ProviderKind::Cloud => cloud_triple(&self.settings.cloud),
            ProviderKind::Local => local_triple(&self.settings.local),
            ProviderKind::NativeMobile => companion_triple(&self.settings.companion),
        };
        triple.map_err(GenerationError::from)
    }
}

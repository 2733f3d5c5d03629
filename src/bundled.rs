//! The bundled provider ships the emoji font inside the application instead of fetching it.
//!
//! Bundling frees the application from the remote font service, which helps on devices without
//! it or when distributing outside the usual store, at the cost of a much larger bundle.  The
//! provider only takes part once [`install`] registers it.
use crate::{
    ConfigProvider, Context, EmojiConfig, FacilityError, Loading, Metadata, MetadataLoader,
    Provider, Registry,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// File name of the bundled emoji font inside the asset directory.
pub const BUNDLED_FONT: &str = "NotoColorEmojiCompat.ttf";

/// Registers [`BundledProvider`] under [`Provider::Bundled`].
pub fn install(registry: &Registry) {
    registry.register(Provider::Bundled, BundledProvider);
}

/// Builds configurations that read [`BUNDLED_FONT`] from the context's asset directory.
///
/// The asset has to exist when the configuration is built; a missing font is reported right away
/// as [`crate::LoadError::Io`] instead of surfacing later as a facility failure.
#[derive(Debug, Default, Copy, Clone)]
pub struct BundledProvider;

impl ConfigProvider for BundledProvider {
    fn load_config(&self, context: &Context) -> Loading<EmojiConfig> {
        let path = context.assets().join(BUNDLED_FONT);
        let found = fs::metadata(&path)?;
        tracing::debug!("Bundled font {} holds {} bytes.", path.display(), found.len());
        Ok(EmojiConfig::new(
            Provider::Bundled,
            Arc::new(AssetLoader::new(path)),
        ))
    }
}

/// Loads metadata straight from a font file on disk.
#[derive(Debug, Clone, derive_new::new, derive_getters::Getters)]
pub struct AssetLoader {
    path: PathBuf,
}

impl MetadataLoader for AssetLoader {
    fn load(&self) -> Result<Metadata, Option<FacilityError>> {
        let bytes = fs::read(&self.path).map_err(|e| Some(FacilityError::from(e)))?;
        Ok(Metadata::new(self.path.display().to_string(), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoadError;

    #[test]
    fn install_registers_bundled() {
        let registry = Registry::new();
        install(&registry);
        assert!(registry.contains(Provider::Bundled));
    }

    #[test]
    fn missing_asset_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let context = Context::default().with_assets(dir.path());
        let error = BundledProvider.load_config(&context).unwrap_err();
        assert!(matches!(error, LoadError::Io(_)));
    }

    #[test]
    fn reads_font_from_assets() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(BUNDLED_FONT), b"font bytes").unwrap();
        let context = Context::default().with_assets(dir.path());
        let config = BundledProvider.load_config(&context).unwrap();
        assert!(config.use_bundled());
        let metadata = config.loader().load().unwrap();
        assert_eq!(metadata.bytes(), b"font bytes");
    }
}

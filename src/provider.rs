use crate::{Context, FacilityError, LoadError, Loading, Metadata, MetadataLoader};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Authority of the remote font provider.
pub const PROVIDER_AUTHORITY: &str = "com.google.android.gms.fonts";
/// Package that hosts the remote font provider.
pub const PROVIDER_PACKAGE: &str = "com.google.android.gms";
/// Font queried from the remote provider.
pub const PROVIDER_QUERY: &str = "Noto Color Emoji Compat";
/// Context resource holding the certificates the remote provider must be signed with.
pub const PROVIDER_CERTIFICATES: &str = "com_google_android_gms_fonts_certs";

/// Where the emoji font comes from.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Provider {
    /// Font fetched through the platform font API.
    Remote,
    /// Font shipped in the application's assets.
    Bundled,
}

impl Provider {
    /// Maps the `use_bundled` switch onto a provider.
    pub fn select(use_bundled: bool) -> Self {
        if use_bundled {
            Self::Bundled
        } else {
            Self::Remote
        }
    }
}

/// The `EmojiConfig` struct is what the facility is built from.
///
/// A provider decides where the font comes from by picking the [`MetadataLoader`]; the loader
/// options decide `replace_all`, which forces substitution even for emoji the system can already
/// draw.  Clones share the same metadata loader.
#[derive(Debug, Clone, derive_getters::Getters, derive_setters::Setters)]
#[setters(prefix = "with_")]
pub struct EmojiConfig {
    #[setters(skip)]
    provider: Provider,
    #[setters(skip)]
    loader: Arc<dyn MetadataLoader>,
    replace_all: bool,
}

impl EmojiConfig {
    pub fn new(provider: Provider, loader: Arc<dyn MetadataLoader>) -> Self {
        Self {
            provider,
            loader,
            replace_all: false,
        }
    }

    pub fn use_bundled(&self) -> bool {
        self.provider == Provider::Bundled
    }
}

/// Anything that can turn a [`Context`] into an [`EmojiConfig`].
///
/// Implementations should not cache; the configuration cache does that.  Plain closures with the
/// right signature qualify, which keeps test doubles short.
///
/// The loader calls providers on the runtime's blocking pool with the configuration cache locked,
/// so blocking I/O is fine here.  A provider may read the loader but must not touch its
/// [`crate::ConfigCache`].
pub trait ConfigProvider: Send + Sync {
    fn load_config(&self, context: &Context) -> Loading<EmojiConfig>;
}

impl<F> ConfigProvider for F
where
    F: Fn(&Context) -> Loading<EmojiConfig> + Send + Sync,
{
    fn load_config(&self, context: &Context) -> Loading<EmojiConfig> {
        self(context)
    }
}

/// The `Registry` maps each [`Provider`] to the component that builds its configuration.
///
/// [`Registry::new`] starts out with [`GmsProvider`] under [`Provider::Remote`].  The bundled
/// provider is an optional add-on: it shows up only after something registers it, for instance
/// `bundled::install`.  Asking for a provider nobody registered is an ordinary
/// [`LoadError::ProviderNotFound`].
pub struct Registry {
    providers: RwLock<HashMap<Provider, Arc<dyn ConfigProvider>>>,
}

impl Registry {
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register(Provider::Remote, GmsProvider);
        registry
    }

    /// A registry with nothing in it.
    pub fn empty() -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `factory` under `provider`, replacing any previous entry.
    #[tracing::instrument(skip(self, factory))]
    pub fn register<P: ConfigProvider + 'static>(&self, provider: Provider, factory: P) {
        let previous = self
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider, Arc::new(factory));
        if previous.is_some() {
            tracing::debug!("Replaced {provider} provider.");
        } else {
            tracing::debug!("Registered {provider} provider.");
        }
    }

    pub fn unregister(&self, provider: Provider) -> bool {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&provider)
            .is_some()
    }

    pub fn contains(&self, provider: Provider) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&provider)
    }

    /// Builds a configuration with the provider picked by `use_bundled`.
    ///
    /// The registry lock is released before the provider runs, so a slow provider does not hold
    /// up registrations.
    #[tracing::instrument(skip(self, context))]
    pub fn resolve(&self, context: &Context, use_bundled: bool) -> Loading<EmojiConfig> {
        let provider = Provider::select(use_bundled);
        let factory = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&provider)
            .cloned();
        match factory {
            Some(factory) => {
                tracing::trace!("Resolving {provider} configuration.");
                factory.load_config(context)
            }
            None => {
                tracing::warn!("No {provider} provider registered.");
                Err(LoadError::ProviderNotFound { provider })
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut keys = providers.keys().collect::<Vec<&Provider>>();
        keys.sort();
        f.debug_struct("Registry").field("providers", &keys).finish()
    }
}

/// The identity a remote font provider is queried with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_new::new, derive_getters::Getters)]
pub struct FontRequest {
    authority: String,
    package: String,
    query: String,
    certificates: Vec<String>,
}

/// Builds configurations that fetch the emoji font from the Play Services font provider.
///
/// This is the preferred source, since it keeps the font out of the application bundle.  The
/// certificate list comes from the [`PROVIDER_CERTIFICATES`] resource of the context.
#[derive(Debug, Default, Copy, Clone)]
pub struct GmsProvider;

impl GmsProvider {
    pub fn request(context: &Context) -> FontRequest {
        let certificates = match context.resource(PROVIDER_CERTIFICATES) {
            Some(certificates) => certificates.to_vec(),
            None => {
                tracing::warn!("Context has no {PROVIDER_CERTIFICATES} resource.");
                Vec::new()
            }
        };
        FontRequest::new(
            PROVIDER_AUTHORITY.to_string(),
            PROVIDER_PACKAGE.to_string(),
            PROVIDER_QUERY.to_string(),
            certificates,
        )
    }
}

impl ConfigProvider for GmsProvider {
    fn load_config(&self, context: &Context) -> Loading<EmojiConfig> {
        let loader = FontRequestLoader::new(Self::request(context), context.resolver().clone());
        Ok(EmojiConfig::new(Provider::Remote, Arc::new(loader)))
    }
}

/// Loads metadata by handing a [`FontRequest`] to the platform font API.
#[derive(Debug, Clone, derive_new::new, derive_getters::Getters)]
pub struct FontRequestLoader {
    request: FontRequest,
    resolver: Option<Arc<dyn crate::FontResolver>>,
}

impl MetadataLoader for FontRequestLoader {
    fn load(&self) -> Result<Metadata, Option<FacilityError>> {
        let resolver = self.resolver.as_ref().ok_or_else(|| {
            Some(FacilityError::msg(format!(
                "no font resolver available for {}",
                self.request.authority()
            )))
        })?;
        let bytes = resolver.fetch(&self.request).map_err(Some)?;
        tracing::debug!("Fetched {} bytes of {}.", bytes.len(), self.request.query());
        Ok(Metadata::new(self.request.query().clone(), bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FontResolver;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[derive(Debug)]
    struct Echo;

    impl FontResolver for Echo {
        fn fetch(&self, request: &FontRequest) -> Result<Vec<u8>, FacilityError> {
            Ok(request.query().as_bytes().to_vec())
        }
    }

    #[test]
    fn provider_names_round_trip() {
        for provider in Provider::iter() {
            let name = provider.to_string();
            assert_eq!(Provider::from_str(&name).ok(), Some(provider));
        }
        assert_eq!(Provider::select(true), Provider::Bundled);
        assert_eq!(Provider::select(false), Provider::Remote);
    }

    #[test]
    fn default_registry_only_knows_remote() {
        let registry = Registry::new();
        assert!(registry.contains(Provider::Remote));
        assert!(!registry.contains(Provider::Bundled));

        let config = registry.resolve(&Context::default(), false).unwrap();
        assert_eq!(*config.provider(), Provider::Remote);
        assert!(!config.use_bundled());

        let error = registry.resolve(&Context::default(), true).unwrap_err();
        assert!(matches!(
            error,
            LoadError::ProviderNotFound {
                provider: Provider::Bundled
            }
        ));
    }

    #[test]
    fn gms_request_uses_fixed_identity() {
        let context = Context::new("com.example.demo")
            .with_resource(PROVIDER_CERTIFICATES, ["MIIEqDCCA5CgAwIBAgIJANWFuGx9"]);
        let request = GmsProvider::request(&context);
        assert_eq!(request.authority(), PROVIDER_AUTHORITY);
        assert_eq!(request.package(), PROVIDER_PACKAGE);
        assert_eq!(request.query(), PROVIDER_QUERY);
        assert_eq!(request.certificates().len(), 1);
    }

    #[test]
    fn font_request_loader_needs_a_resolver() {
        let loader = FontRequestLoader::new(GmsProvider::request(&Context::default()), None);
        let error = loader.load().unwrap_err().unwrap();
        assert!(error.to_string().contains(PROVIDER_AUTHORITY));

        let loader = FontRequestLoader::new(
            GmsProvider::request(&Context::default()),
            Some(Arc::new(Echo)),
        );
        let metadata = loader.load().unwrap();
        assert_eq!(metadata.origin(), PROVIDER_QUERY);
        assert_eq!(metadata.len(), PROVIDER_QUERY.len());
    }

    #[test]
    fn registered_closures_replace_entries() {
        let registry = Registry::empty();
        registry.register(Provider::Bundled, |_: &Context| -> Loading<EmojiConfig> {
            let loader = FontRequestLoader::new(GmsProvider::request(&Context::default()), None);
            Ok(EmojiConfig::new(Provider::Bundled, Arc::new(loader)))
        });
        let config = registry.resolve(&Context::default(), true).unwrap();
        assert!(config.use_bundled());
        assert!(registry.unregister(Provider::Bundled));
        assert!(!registry.unregister(Provider::Bundled));
    }
}

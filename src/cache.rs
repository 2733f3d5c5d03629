use crate::{Context, EmojiConfig, LoaderOptions, Loading, Registry};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Slot {
    config: Option<EmojiConfig>,
    valid: bool,
}

/// The `ConfigCache` struct holds the one [`EmojiConfig`] the facility is built from.
///
/// Every read and write goes through a single mutex, and the lock stays held while a provider
/// builds a new configuration, so nobody sees a half-built one.  A failed build commits nothing
/// and leaves the cache invalid.
#[derive(Debug, Default)]
pub struct ConfigCache {
    slot: Mutex<Slot>,
}

impl ConfigCache {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached configuration when the cache is valid, otherwise builds a new one with
    /// the provider selected by `options` and caches it.
    ///
    /// A valid cache wins over the options.  Changing `use_bundled` or `replace_all` takes effect
    /// only after [`ConfigCache::invalidate`].
    #[tracing::instrument(skip_all)]
    pub fn get_or_create(
        &self,
        context: &Context,
        options: &LoaderOptions,
        registry: &Registry,
    ) -> Loading<EmojiConfig> {
        let mut slot = self.slot();
        if slot.valid {
            if let Some(config) = &slot.config {
                if config.use_bundled() != *options.use_bundled()
                    || config.replace_all() != options.replace_all()
                {
                    tracing::warn!("Options changed since the emoji config was built.");
                }
                tracing::trace!("Returning cached emoji config.");
                return Ok(config.clone());
            }
        }
        let config = registry
            .resolve(context, *options.use_bundled())?
            .with_replace_all(*options.replace_all());
        slot.config = Some(config.clone());
        slot.valid = true;
        tracing::debug!("Emoji config built from the {} provider.", config.provider());
        Ok(config)
    }

    /// Marks the cache invalid.  The stored configuration stays put until the next build replaces
    /// it.
    pub fn invalidate(&self) {
        self.slot().valid = false;
        tracing::trace!("Emoji config invalidated.");
    }

    pub fn is_valid(&self) -> bool {
        self.slot().valid
    }

    /// The stored configuration, valid or not.
    pub fn peek(&self) -> Option<EmojiConfig> {
        self.slot().config.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FacilityError, LoadError, Metadata, MetadataLoader, Provider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Unused;

    impl MetadataLoader for Unused {
        fn load(&self) -> Result<Metadata, Option<FacilityError>> {
            Err(None)
        }
    }

    fn counting_registry(calls: Arc<AtomicUsize>) -> Registry {
        let registry = Registry::empty();
        registry.register(Provider::Remote, move |_: &Context| -> Loading<EmojiConfig> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(EmojiConfig::new(Provider::Remote, Arc::new(Unused)))
        });
        registry
    }

    #[test]
    fn builds_once_until_invalidated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = counting_registry(Arc::clone(&calls));
        let cache = ConfigCache::default();
        let options = LoaderOptions::default();
        let context = Context::default();

        let first = cache.get_or_create(&context, &options, &registry).unwrap();
        assert!(*first.replace_all());
        let second = cache.get_or_create(&context, &options, &registry).unwrap();
        assert!(Arc::ptr_eq(first.loader(), second.loader()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate();
        assert!(!cache.is_valid());
        assert!(cache.peek().is_some());

        let third = cache
            .get_or_create(&context, &options.clone().with_replace_all(false), &registry)
            .unwrap();
        assert!(!*third.replace_all());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failed_build_leaves_cache_invalid() {
        let cache = ConfigCache::default();
        let registry = Registry::new();
        let options = LoaderOptions::default().with_use_bundled(true);
        let error = cache
            .get_or_create(&Context::default(), &options, &registry)
            .unwrap_err();
        assert!(matches!(error, LoadError::ProviderNotFound { .. }));
        assert!(!cache.is_valid());
        assert!(cache.peek().is_none());
    }
}

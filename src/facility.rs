use crate::{EmojiConfig, FacilityError};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;

/// Fetches the emoji font metadata for the facility.  This is the expensive part of
/// initialization, so the facility runs it on the blocking pool of the runtime it was given.
///
/// A failure may come with an error object or without one; the facility reports exactly what it
/// was handed.
pub trait MetadataLoader: fmt::Debug + Send + Sync {
    fn load(&self) -> Result<Metadata, Option<FacilityError>>;
}

/// The font data a successful load produces, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq, derive_getters::Getters)]
pub struct Metadata {
    origin: String,
    #[getter(skip)]
    bytes: Arc<[u8]>,
}

impl Metadata {
    pub fn new(origin: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            origin: origin.into(),
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Where a facility instance is in its one and only load.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum LoadState {
    Loading,
    Succeeded,
    Failed,
}

/// What init callbacks receive: success carries nothing, failure may carry the error.
pub type InitOutcome = Result<(), Option<FacilityError>>;

type InitCallback = Box<dyn FnOnce(InitOutcome) + Send>;

/// Identifies a registered init callback so it can be unregistered before it fires.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

#[derive(Default)]
struct Progress {
    outcome: Option<InitOutcome>,
    metadata: Option<Metadata>,
    callbacks: Vec<(CallbackId, InitCallback)>,
    next_id: u64,
}

/// The `EmojiCompat` struct is the facility handle that callers end up holding.
///
/// An instance loads its metadata once.  Init callbacks registered before the load finishes
/// fire when it does; callbacks registered afterwards fire right away with the same outcome.
/// Each callback fires at most once, and only the first completion of the load counts.
pub struct EmojiCompat {
    config: EmojiConfig,
    progress: Mutex<Progress>,
}

impl EmojiCompat {
    fn new(config: EmojiConfig) -> Self {
        Self {
            config,
            progress: Mutex::new(Progress::default()),
        }
    }

    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &EmojiConfig {
        &self.config
    }

    pub fn replace_all(&self) -> bool {
        *self.config.replace_all()
    }

    pub fn load_state(&self) -> LoadState {
        match &self.progress().outcome {
            None => LoadState::Loading,
            Some(Ok(())) => LoadState::Succeeded,
            Some(Err(_)) => LoadState::Failed,
        }
    }

    /// The loaded font metadata, once the load has succeeded.
    pub fn metadata(&self) -> Option<Metadata> {
        self.progress().metadata.clone()
    }

    /// Registers `callback` to hear how the load ends.
    pub fn register_init_callback<F>(&self, callback: F) -> CallbackId
    where
        F: FnOnce(InitOutcome) + Send + 'static,
    {
        let mut progress = self.progress();
        let id = CallbackId(progress.next_id);
        progress.next_id += 1;
        match progress.outcome.clone() {
            Some(outcome) => {
                drop(progress);
                callback(outcome);
            }
            None => progress.callbacks.push((id, Box::new(callback))),
        }
        id
    }

    /// Removes a callback that has not fired yet.  Returns false if it already fired.
    pub fn unregister_init_callback(&self, id: CallbackId) -> bool {
        let mut progress = self.progress();
        let before = progress.callbacks.len();
        progress.callbacks.retain(|(candidate, _)| *candidate != id);
        progress.callbacks.len() != before
    }

    fn complete(&self, result: Result<Metadata, Option<FacilityError>>) {
        let mut progress = self.progress();
        if progress.outcome.is_some() {
            tracing::warn!("Ignoring second completion of the emoji facility.");
            return;
        }
        let outcome = match result {
            Ok(metadata) => {
                tracing::debug!("Emoji metadata loaded from {}.", metadata.origin());
                progress.metadata = Some(metadata);
                Ok(())
            }
            Err(error) => Err(error),
        };
        progress.outcome = Some(outcome.clone());
        let callbacks = std::mem::take(&mut progress.callbacks);
        drop(progress);
        for (_, callback) in callbacks {
            callback(outcome.clone());
        }
    }

    fn spawn_load(self: &Arc<Self>, runtime: &Handle) {
        let compat = Arc::clone(self);
        let loader = Arc::clone(self.config.loader());
        runtime.spawn_blocking(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| loader.load()))
                .unwrap_or_else(|_| Err(Some(FacilityError::msg("metadata loader panicked"))));
            compat.complete(result);
        });
    }
}

impl fmt::Debug for EmojiCompat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmojiCompat")
            .field("config", &self.config)
            .field("load_state", &self.load_state())
            .finish()
    }
}

/// Signals that [`Facility::get`] was called before [`Facility::init`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("EmojiCompat is not initialized")]
pub struct NotInitialized;

/// The `Facility` struct is the facility's own singleton slot.
///
/// [`Facility::init`] is idempotent: the first call creates an [`EmojiCompat`] and starts its
/// load; later calls hand back that same instance and ignore their config.  The slot only empties
/// on [`Facility::reset`] or [`Facility::discard`].
#[derive(Debug, Default)]
pub struct Facility {
    slot: Mutex<Option<Arc<EmojiCompat>>>,
}

impl Facility {
    fn slot(&self) -> MutexGuard<'_, Option<Arc<EmojiCompat>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> Result<Arc<EmojiCompat>, NotInitialized> {
        self.slot().clone().ok_or(NotInitialized)
    }

    #[tracing::instrument(skip_all)]
    pub fn init(&self, config: EmojiConfig, runtime: &Handle) -> Arc<EmojiCompat> {
        let mut slot = self.slot();
        if let Some(compat) = slot.as_ref() {
            tracing::debug!("Facility already initialized.");
            return Arc::clone(compat);
        }
        tracing::info!("Initializing emoji facility from the {} provider.", config.provider());
        let compat = Arc::new(EmojiCompat::new(config));
        *slot = Some(Arc::clone(&compat));
        drop(slot);
        compat.spawn_load(runtime);
        compat
    }

    /// Empties the slot, returning whatever instance it held.
    pub fn reset(&self) -> Option<Arc<EmojiCompat>> {
        self.slot().take()
    }

    /// Empties the slot only if it still holds `compat`.
    pub fn discard(&self, compat: &Arc<EmojiCompat>) -> bool {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(current) if Arc::ptr_eq(current, compat) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Provider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[derive(Debug)]
    struct Fixed(Result<Metadata, Option<FacilityError>>);

    impl MetadataLoader for Fixed {
        fn load(&self) -> Result<Metadata, Option<FacilityError>> {
            self.0.clone()
        }
    }

    fn config(result: Result<Metadata, Option<FacilityError>>) -> EmojiConfig {
        EmojiConfig::new(Provider::Remote, Arc::new(Fixed(result)))
    }

    async fn outcome(compat: &EmojiCompat) -> InitOutcome {
        let (tx, rx) = oneshot::channel();
        compat.register_init_callback(move |outcome| {
            let _ = tx.send(outcome);
        });
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn get_before_init_is_not_initialized() {
        let facility = Facility::default();
        assert_eq!(facility.get().unwrap_err(), NotInitialized);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn init_is_idempotent() {
        let facility = Facility::default();
        let runtime = Handle::current();
        let first = facility.init(config(Ok(Metadata::new("a", vec![1]))), &runtime);
        let second = facility.init(config(Ok(Metadata::new("b", vec![2]))), &runtime);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(outcome(&first).await.is_ok());
        assert_eq!(first.load_state(), LoadState::Succeeded);
        assert_eq!(first.metadata().unwrap().origin(), "a");
        assert!(Arc::ptr_eq(&facility.get().unwrap(), &first));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_reaches_late_callbacks() {
        let facility = Facility::default();
        let error = FacilityError::msg("no font");
        let compat = facility.init(config(Err(Some(error.clone()))), &Handle::current());
        let first = outcome(&compat).await.unwrap_err().unwrap();
        assert_eq!(compat.load_state(), LoadState::Failed);
        let late = outcome(&compat).await.unwrap_err().unwrap();
        assert!(first.ptr_eq(&error));
        assert!(late.ptr_eq(&error));
    }

    #[test]
    fn completion_fires_each_callback_once() {
        let compat = EmojiCompat::new(config(Err(None)));
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let kept = compat.register_init_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let dropped = compat.register_init_callback(|_| panic!("unregistered callback fired"));
        assert!(compat.unregister_init_callback(dropped));

        compat.complete(Ok(Metadata::new("x", Vec::new())));
        compat.complete(Err(None));

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(compat.load_state(), LoadState::Succeeded);
        assert!(!compat.unregister_init_callback(kept));
    }

    #[test]
    fn discard_only_removes_matching_instance() {
        let facility = Facility::default();
        let stranger = Arc::new(EmojiCompat::new(config(Err(None))));
        let held = Arc::new(EmojiCompat::new(config(Err(None))));
        *facility.slot() = Some(Arc::clone(&held));
        assert!(!facility.discard(&stranger));
        assert!(facility.discard(&held));
        assert!(facility.reset().is_none());
    }
}

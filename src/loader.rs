use crate::{
    ConfigCache, Context, EmojiCompat, EmojiConfig, Facility, FacilityError, LoadError,
    LoadState, LoaderOptions, Loading, Registry,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::task::{self, Poll};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// The value an in-flight initialization publishes: `None` until it settles.
type Outcome = Option<Loading<Arc<EmojiCompat>>>;

#[derive(Debug, Default)]
struct State {
    ready: Option<Arc<EmojiCompat>>,
    pending: Option<watch::Receiver<Outcome>>,
    generation: u64,
}

#[derive(Debug, Default)]
struct Shared {
    registry: Registry,
    cache: ConfigCache,
    facility: Facility,
    state: Mutex<State>,
}

/// The `EmojiLoader` struct hands out the emoji facility, building it at most once.
///
/// Building the facility means fetching a font, which takes a while, so the loader does it in the
/// background and lets any number of callers wait on the result.  A typical caller looks like:
///
/// ```no_run
/// # async fn demo() -> emoji_loader::Loading<()> {
/// use emoji_loader::{Context, EmojiLoader, LoaderOptions};
///
/// let context = Context::new("com.example.demo");
/// let options = LoaderOptions::default().with_replace_all(true);
/// let deferred = EmojiLoader::global().load_async(context, options)?;
/// // ... later, somewhere that can await
/// let compat = deferred.await?;
/// tracing::info!("Facility is {}", compat.load_state());
/// # Ok(())
/// # }
/// ```
///
/// The loader owns everything the facility depends on: the provider [`Registry`], the
/// [`ConfigCache`], the [`Facility`] slot, and the cached handle.  The handle and the in-flight
/// initialization sit behind one mutex, which is never held across an await.
///
/// A generation runs from one successful initialization to the next [`EmojiLoader::invalidate`].
/// Within a generation the provider runs once and the facility is built once, no matter how many
/// callers show up or when they give up waiting.
#[derive(Debug, Clone, Default)]
pub struct EmojiLoader {
    inner: Arc<Shared>,
}

impl EmojiLoader {
    /// Creates a loader that resolves configurations through `registry`.
    pub fn new(registry: Registry) -> Self {
        let inner = Shared {
            registry,
            ..Default::default()
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The process-wide loader.
    pub fn global() -> &'static EmojiLoader {
        static GLOBAL: OnceLock<EmojiLoader> = OnceLock::new();
        GLOBAL.get_or_init(EmojiLoader::default)
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn cache(&self) -> &ConfigCache {
        &self.inner.cache
    }

    pub fn facility(&self) -> &Facility {
        &self.inner.facility
    }

    /// The handle cached for the current generation, if any.
    pub fn cached(&self) -> Option<Arc<EmojiCompat>> {
        self.inner.state().ready.clone()
    }

    /// Starts loading on the runtime named by `options` and returns a handle to await.
    ///
    /// Dropping or aborting the returned [`Deferred`] only stops this caller from waiting; the
    /// facility keeps loading for everyone else.
    #[tracing::instrument(skip_all)]
    pub fn load_async(&self, context: Context, options: LoaderOptions) -> Loading<Deferred> {
        let runtime = options.runtime()?;
        let loader = self.clone();
        let handle = runtime.spawn(async move { loader.load(&context, &options).await });
        Ok(Deferred { handle })
    }

    /// Resolves to the facility, building it first if this generation has not yet.
    ///
    /// * A cached handle that finished loading comes back right away.
    /// * A caller arriving while another initialization is in flight waits on that one.
    /// * Otherwise a background task builds the facility and every waiter gets its outcome.
    ///
    /// Failures are never cached, so a later call starts over.  If the initialization being waited
    /// on dies without an outcome (its runtime shut down, say), the caller starts over once on its
    /// own runtime before giving up with [`LoadError::Aborted`].
    #[tracing::instrument(skip_all)]
    pub async fn load(
        &self,
        context: &Context,
        options: &LoaderOptions,
    ) -> Loading<Arc<EmojiCompat>> {
        let mut retried = false;
        loop {
            let mut pending = match self.join_or_start(context, options)? {
                Ok(compat) => return Ok(compat),
                Err(pending) => pending,
            };
            if let Ok(outcome) = pending.wait_for(Option::is_some).await {
                return match &*outcome {
                    Some(result) => result.clone(),
                    None => Err(LoadError::Aborted),
                };
            }
            if retried {
                return Err(LoadError::Aborted);
            }
            tracing::warn!("Initialization in flight was lost, starting over.");
            retried = true;
        }
    }

    /// Returns the ready handle, or the channel of the initialization to wait on, spawning one if
    /// none is in flight.
    fn join_or_start(
        &self,
        context: &Context,
        options: &LoaderOptions,
    ) -> Loading<Result<Arc<EmojiCompat>, watch::Receiver<Outcome>>> {
        let mut state = self.inner.state();
        if let Some(compat) = &state.ready {
            if compat.load_state() == LoadState::Succeeded {
                tracing::debug!("Obtaining previously generated instance.");
                return Ok(Ok(Arc::clone(compat)));
            }
        }
        if let Some(pending) = state.pending.clone() {
            tracing::debug!("Joining initialization already in flight.");
            return Ok(Err(pending));
        }
        if let Ok(compat) = self.inner.facility.get() {
            if compat.load_state() == LoadState::Succeeded {
                tracing::debug!("Adopting facility that is already loaded.");
                state.ready = Some(Arc::clone(&compat));
                return Ok(Ok(compat));
            }
        }
        let runtime = options.runtime()?;
        let (tx, rx) = watch::channel(None);
        state.pending = Some(rx.clone());
        let publish = Publish {
            inner: Arc::clone(&self.inner),
            generation: state.generation,
            rx: rx.clone(),
            tx: Some(tx),
        };
        let context = context.clone();
        let options = options.clone();
        let background = runtime.clone();
        runtime.spawn(async move {
            let result = publish
                .inner
                .initialize(publish.generation, &context, &options, &background)
                .await;
            publish.finish(result);
        });
        Ok(Err(rx))
    }

    /// Ends the current generation.
    ///
    /// The cached handle, the configuration and the facility slot are all dropped, so the next
    /// load builds everything again.  Handles already given out stay valid, and an initialization
    /// still in flight finishes for its own waiters without touching the new generation.
    #[tracing::instrument(skip_all)]
    pub fn invalidate(&self) {
        let mut state = self.inner.state();
        state.generation += 1;
        state.ready = None;
        state.pending = None;
        self.inner.cache.invalidate();
        self.inner.facility.reset();
        tracing::info!("Emoji loader reset to generation {}.", state.generation);
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Builds or joins the facility for `generation`.
    ///
    /// The provider runs on the blocking pool with no loader lock held.  The facility slot is
    /// only touched under the state lock, after the generation is checked again, so a reset that
    /// lands while the provider runs cannot be overwritten.
    async fn initialize(
        self: &Arc<Self>,
        generation: u64,
        context: &Context,
        options: &LoaderOptions,
        runtime: &Handle,
    ) -> Loading<Arc<EmojiCompat>> {
        let compat = match self.loading(generation)? {
            Some(compat) => {
                tracing::debug!("Waiting on facility instance that is still loading.");
                compat
            }
            None => {
                let config = self.resolve(context, options, runtime).await?;
                let state = self.state();
                if state.generation != generation {
                    return Err(LoadError::Aborted);
                }
                self.facility.init(config, runtime)
            }
        };
        match initialized(&compat).await {
            Ok(()) => Ok(compat),
            Err(e) => {
                self.facility.discard(&compat);
                Err(e)
            }
        }
    }

    /// The facility instance already in the slot, if `generation` is still current.
    fn loading(&self, generation: u64) -> Loading<Option<Arc<EmojiCompat>>> {
        let state = self.state();
        if state.generation != generation {
            return Err(LoadError::Aborted);
        }
        match self.facility.get() {
            Ok(compat) => Ok(Some(compat)),
            Err(e) => {
                tracing::debug!("{e}, initializing.");
                Ok(None)
            }
        }
    }

    /// Gets the configuration from the cache on the blocking pool.  A panicking provider comes
    /// back as [`LoadError::Aborted`].
    async fn resolve(
        self: &Arc<Self>,
        context: &Context,
        options: &LoaderOptions,
        runtime: &Handle,
    ) -> Loading<EmojiConfig> {
        let shared = Arc::clone(self);
        let context = context.clone();
        let options = options.clone();
        runtime
            .spawn_blocking(move || {
                shared
                    .cache
                    .get_or_create(&context, &options, &shared.registry)
            })
            .await?
    }

    /// Cleans up after an initialization task that stopped without an outcome.
    fn abandon(&self, generation: u64, channel: &watch::Receiver<Outcome>) {
        let mut state = self.state();
        if state.generation != generation {
            return;
        }
        if state
            .pending
            .as_ref()
            .is_some_and(|pending| pending.same_channel(channel))
        {
            state.pending = None;
        }
        if let Ok(compat) = self.facility.get() {
            if compat.load_state() == LoadState::Loading {
                self.facility.discard(&compat);
            }
        }
        tracing::warn!("Emoji facility initialization stopped before it finished.");
    }

    fn settle(&self, generation: u64, result: &Loading<Arc<EmojiCompat>>) {
        let mut state = self.state();
        if state.generation != generation {
            tracing::debug!("Loader was reset while initializing, not caching the result.");
            return;
        }
        state.pending = None;
        match result {
            Ok(compat) => {
                state.ready = Some(Arc::clone(compat));
                tracing::info!("Emoji facility ready.");
            }
            Err(e) if e.is_unexpected() => {
                tracing::error!("Unexpected error occurred during emoji facility initialization: {e}")
            }
            Err(e) => tracing::warn!("Emoji facility not loaded: {e}"),
        }
    }
}

/// Publishes the outcome of one initialization task to its waiters.
///
/// If the task is dropped before it finishes, the guard clears the pending slot it owns and
/// discards the facility instance left loading, then drops the sender so waiters wake up.
struct Publish {
    inner: Arc<Shared>,
    generation: u64,
    rx: watch::Receiver<Outcome>,
    tx: Option<watch::Sender<Outcome>>,
}

impl Publish {
    fn finish(mut self, result: Loading<Arc<EmojiCompat>>) {
        self.inner.settle(self.generation, &result);
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(result));
        }
    }
}

impl Drop for Publish {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.inner.abandon(self.generation, &self.rx);
            drop(tx);
        }
    }
}

/// Bridges the facility's init callback onto a future.  The callback is consumed the first time
/// it fires, so only one outcome ever reaches the channel.
async fn initialized(compat: &EmojiCompat) -> Loading<()> {
    let (tx, rx) = oneshot::channel();
    compat.register_init_callback(move |outcome| {
        let _ = tx.send(outcome);
    });
    match rx.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(error.unwrap_or_else(FacilityError::fallback).into()),
        Err(_) => Err(LoadError::Aborted),
    }
}

/// The `Deferred` struct is a caller's claim on a load started by [`EmojiLoader::load_async`].
///
/// Await it to get the facility.  Aborting it, or dropping it, leaves the shared initialization
/// alone.
#[derive(Debug)]
pub struct Deferred {
    handle: JoinHandle<Loading<Arc<EmojiCompat>>>,
}

impl Deferred {
    /// Stops waiting.  Awaiting afterwards yields [`LoadError::Aborted`].
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Future for Deferred {
    type Output = Loading<Arc<EmojiCompat>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|joined| joined.map_err(LoadError::from).and_then(|result| result))
    }
}

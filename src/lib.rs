//! The `emoji_loader` crate builds an emoji compatibility facility in the background and hands
//! the finished instance to whoever asks for it.
//!
//! Building the facility is slow: it has to fetch an emoji font, either from a remote font
//! provider or from the application's own assets.  The [`EmojiLoader`] makes sure that work
//! happens once, no matter how many callers ask at the same time, and gives each of them a
//! [`Deferred`] to await.
//!
//! The pieces, from the bottom up:
//!
//! 1. Picking a font source - [`Registry`], [`Provider`], [`ConfigProvider`]
//!     * [`GmsProvider`] asks the platform font API through a [`FontResolver`].
//!     * [`bundled::BundledProvider`] reads the font from the asset directory.
//! 2. Keeping the configuration - [`ConfigCache`]
//! 3. The facility itself - [`Facility`], [`EmojiCompat`]
//! 4. Loading it - [`EmojiLoader::load_async`], [`EmojiLoader::load`],
//!    [`EmojiLoader::invalidate`]
//!
//! Options come from [`LoaderOptions`], which can be read from an `EmojiLoader.toml` file with
//! [`LoaderOptions::load`].  Everything logs through [`tracing`]; call [`trace_init`] to see it.
#[cfg(feature = "bundled")]
pub mod bundled;
mod cache;
mod context;
mod error;
mod facility;
mod loader;
mod options;
mod provider;
mod utils;

pub use cache::ConfigCache;
pub use context::{Context, FontResolver};
pub use error::{FacilityError, LoadError, Loading, FALLBACK_MESSAGE};
pub use facility::{
    CallbackId, EmojiCompat, Facility, InitOutcome, LoadState, Metadata, MetadataLoader,
    NotInitialized,
};
pub use loader::{Deferred, EmojiLoader};
pub use options::{LoaderOptions, ENV_PREFIX, OPTIONS_FILE};
pub use provider::{
    ConfigProvider, EmojiConfig, FontRequest, FontRequestLoader, GmsProvider, Provider, Registry,
    PROVIDER_AUTHORITY, PROVIDER_CERTIFICATES, PROVIDER_PACKAGE, PROVIDER_QUERY,
};
pub use utils::trace_init;

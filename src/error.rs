use crate::Provider;
use std::sync::Arc;

/// Result alias used throughout the crate.  Every step of loading the facility either arrives at
/// a value or hands back a [`LoadError`].
pub type Loading<T> = Result<T, LoadError>;

/// Message carried by [`FacilityError::fallback`] when the facility fails without saying why.
pub const FALLBACK_MESSAGE: &str = "EmojiCompat failed to load";

/// The `LoadError` enum collects the ways a load can go wrong.
///
/// The same outcome is handed to every caller waiting on a shared initialization, so the enum is
/// [`Clone`].  Error types from other crates that are not themselves cloneable ride along inside
/// an [`Arc`].
///
/// * `ProviderNotFound` - The options asked for a [`Provider`] that nobody registered.
/// * `InitializationFailed` - The facility reported a failure, carried as the original error.
/// * `Io`, `Config`, `NoRuntime`, `Aborted` - Anything else.  These get logged at the error level
///   before they reach the caller.
#[derive(Debug, Clone, derive_more::Display, derive_more::From)]
pub enum LoadError {
    #[display("no {provider} emoji provider is registered")]
    ProviderNotFound { provider: Provider },
    #[display("emoji facility failed to initialize: {_0}")]
    #[from]
    InitializationFailed(FacilityError),
    #[display("io error: {_0}")]
    Io(Arc<std::io::Error>),
    #[display("could not read loader options: {_0}")]
    Config(Arc<config::ConfigError>),
    #[display("no async runtime is available to run the loader")]
    NoRuntime,
    #[display("emoji loading stopped before completion")]
    Aborted,
}

impl LoadError {
    /// True for the kinds that are not part of the normal failure contract.
    pub fn is_unexpected(&self) -> bool {
        !matches!(
            self,
            Self::ProviderNotFound { .. } | Self::InitializationFailed(_)
        )
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InitializationFailed(e) => Some(e),
            Self::Io(e) => Some(e.as_ref()),
            Self::Config(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl From<config::ConfigError> for LoadError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(Arc::new(e))
    }
}

impl From<tokio::runtime::TryCurrentError> for LoadError {
    fn from(_: tokio::runtime::TryCurrentError) -> Self {
        Self::NoRuntime
    }
}

impl From<tokio::task::JoinError> for LoadError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_panic() {
            tracing::error!("Loader task panicked: {e}");
        }
        Self::Aborted
    }
}

/// The `FacilityError` struct holds whatever error object the facility reported on failure.
///
/// Equality is identity: two `FacilityError` values are equal only when they share the same
/// underlying allocation, which lets callers check they received the exact object the facility
/// produced rather than a copy.
#[derive(Debug, Clone, derive_more::Display)]
#[display("{_0}")]
pub struct FacilityError(Arc<dyn std::error::Error + Send + Sync>);

impl FacilityError {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self(Arc::new(error))
    }

    /// Wraps a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// The error used when the facility fails without supplying one.
    pub fn fallback() -> Self {
        Self::msg(FALLBACK_MESSAGE)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

impl PartialEq for FacilityError {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl std::error::Error for FacilityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<std::io::Error> for FacilityError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e)
    }
}

#[derive(Debug, derive_more::Display)]
#[display("{_0}")]
struct Message(String);

impl std::error::Error for Message {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_carries_fixed_message() {
        let error = FacilityError::fallback();
        assert_eq!(error.to_string(), FALLBACK_MESSAGE);
    }

    #[test]
    fn equality_is_identity() {
        let first = FacilityError::msg("boom");
        let copy = first.clone();
        let lookalike = FacilityError::msg("boom");
        assert_eq!(first, copy);
        assert_ne!(first, lookalike);
    }

    #[test]
    fn provider_not_found_names_provider() {
        let error = LoadError::ProviderNotFound {
            provider: Provider::Bundled,
        };
        assert_eq!(error.to_string(), "no bundled emoji provider is registered");
        assert!(!error.is_unexpected());
        assert!(LoadError::NoRuntime.is_unexpected());
    }
}

use crate::Loading;
use tokio::runtime::Handle;

/// Name of the optional options file, without extension, read by [`LoaderOptions::load`].
pub const OPTIONS_FILE: &str = "EmojiLoader";

/// Prefix for environment variables that override the options file.
pub const ENV_PREFIX: &str = "EMOJI_LOADER";

/// The `LoaderOptions` struct tunes how the facility gets built.
///
/// * `runtime` - Where background work runs.  When unset, the loader uses the runtime it is
///   called from.
/// * `replace_all` - Substitute every emoji found, even the ones the system can already draw.
///   Defaults to `true`.
/// * `use_bundled` - Read the font from the bundled assets instead of the remote provider.  This
///   needs the bundled provider to be registered.  Defaults to `false`.
///
/// The loader takes a snapshot of the options each time it builds the facility.
#[derive(
    Debug, Clone, derive_getters::Getters, derive_setters::Setters, serde::Deserialize,
)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct LoaderOptions {
    #[serde(skip)]
    #[setters(skip)]
    #[getter(skip)]
    runtime: Option<Handle>,
    replace_all: bool,
    use_bundled: bool,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            runtime: None,
            replace_all: true,
            use_bundled: false,
        }
    }
}

impl LoaderOptions {
    /// Reads options from `EmojiLoader.toml` if present, then from `EMOJI_LOADER_*` environment
    /// variables.  Missing keys keep their defaults.
    #[tracing::instrument]
    pub fn load() -> Loading<Self> {
        Self::from_file(OPTIONS_FILE)
    }

    /// Like [`LoaderOptions::load`], reading the options file at `name` instead.  The file is
    /// optional; its format is guessed from the extension.
    #[tracing::instrument]
    pub fn from_file(name: &str) -> Loading<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;
        let options = Self::try_from(&config)?;
        tracing::debug!("{:?}", options);
        Ok(options)
    }

    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// The runtime background work should run on: the configured one, else the current one.
    pub fn runtime(&self) -> Loading<Handle> {
        match &self.runtime {
            Some(runtime) => Ok(runtime.clone()),
            None => Ok(Handle::try_current()?),
        }
    }
}

impl TryFrom<&config::Config> for LoaderOptions {
    type Error = config::ConfigError;

    fn try_from(config: &config::Config) -> Result<Self, Self::Error> {
        config.clone().try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LoadError;
    use std::io::Write;

    #[test]
    fn defaults_replace_all_without_bundled() {
        let options = LoaderOptions::default();
        assert!(*options.replace_all());
        assert!(!*options.use_bundled());
    }

    #[test]
    fn runtime_requires_a_runtime() {
        let error = LoaderOptions::default().runtime().unwrap_err();
        assert!(matches!(error, LoadError::NoRuntime));
    }

    #[tokio::test]
    async fn runtime_falls_back_to_current() {
        assert!(LoaderOptions::default().runtime().is_ok());
    }

    #[test]
    fn reads_partial_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "use_bundled = true").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let options = LoaderOptions::from_file(&path).unwrap();
        assert!(*options.use_bundled());
        assert!(*options.replace_all());
    }

    #[test]
    fn bad_values_are_config_errors() {
        let config = config::Config::builder()
            .set_override("replace_all", "sometimes")
            .unwrap()
            .build()
            .unwrap();
        let error: LoadError = LoaderOptions::try_from(&config).unwrap_err().into();
        assert!(matches!(error, LoadError::Config(_)));
    }
}

use crate::{FacilityError, FontRequest};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// The platform font API.  Given a [`FontRequest`], a resolver hands back the font bytes from
/// whatever service it fronts.  The resolver is called from the blocking pool, so it may block.
pub trait FontResolver: fmt::Debug + Send + Sync {
    fn fetch(&self, request: &FontRequest) -> Result<Vec<u8>, FacilityError>;
}

/// The `Context` struct is what a provider gets to look at when it builds a configuration.
///
/// * `package` - Name of the application asking for emoji.
/// * `assets` - Directory holding bundled assets, consulted by the bundled provider.
/// * `resources` - Named string arrays, such as the certificate list of a font provider.
/// * `resolver` - The platform font API, if this platform has one.
///
/// Contexts are cheap to clone; the loader takes its own copy into the background task.
#[derive(Debug, Clone, Default, derive_getters::Getters, derive_setters::Setters)]
#[setters(prefix = "with_", into)]
pub struct Context {
    package: String,
    assets: PathBuf,
    #[setters(skip)]
    resources: HashMap<String, Vec<String>>,
    #[setters(skip)]
    resolver: Option<Arc<dyn FontResolver>>,
}

impl Context {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ..Default::default()
        }
    }

    /// Adds or replaces the string array stored under `name`.
    pub fn with_resource<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.resources.insert(name.into(), values);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn FontResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn resource(&self, name: &str) -> Option<&[String]> {
        self.resources.get(name).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_are_looked_up_by_name() {
        let context = Context::new("com.example.demo")
            .with_assets("/tmp/assets")
            .with_resource("certs", ["abc", "def"]);
        assert_eq!(context.package(), "com.example.demo");
        assert_eq!(context.assets(), &PathBuf::from("/tmp/assets"));
        assert_eq!(
            context.resource("certs"),
            Some(&["abc".to_string(), "def".to_string()][..])
        );
        assert!(context.resource("missing").is_none());
        assert!(context.resolver().is_none());
    }
}

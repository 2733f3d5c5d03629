use emoji_loader::{trace_init, Context, EmojiLoader, LoaderOptions, Loading};

#[tokio::main]
async fn main() -> Loading<()> {
    trace_init();
    let options = LoaderOptions::load()?;
    let context = Context::new(env!("CARGO_PKG_NAME")).with_assets("assets");
    let loader = EmojiLoader::global();
    // `use_bundled` in EmojiLoader.toml or EMOJI_LOADER_USE_BUNDLED picks the provider.
    #[cfg(feature = "bundled")]
    emoji_loader::bundled::install(loader.registry());
    let deferred = loader.load_async(context.clone(), options.clone())?;
    let compat = deferred.await?;
    let size = compat.metadata().map(|metadata| metadata.len()).unwrap_or_default();
    tracing::info!(
        "Facility {} with {size} bytes of emoji data, replace all: {}.",
        compat.load_state(),
        compat.replace_all()
    );
    // A second request is served from the cache.
    let again = loader.load(&context, &options).await?;
    tracing::info!("Same instance: {}", std::sync::Arc::ptr_eq(&compat, &again));
    Ok(())
}

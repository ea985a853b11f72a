use crate::appender::Appender;
use crate::env::{env_opt, ECS_CONTAINER_METADATA_FILE_ENV};
use crate::layer::EcsLogLayer;
use crate::metadata::{EcsMetadataSource, DEFAULT_FETCH_TIMEOUT, DEFAULT_READINESS_DELAY, INSTANCE_IDENTITY_URL};
use crate::registry::MetadataRegistry;
use crate::render::Renderer;
use crate::sink::{LineSink, StdoutSink};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::Registry;

/// Configuration of the logging layer.
///
/// **Fields**
/// - `renderer`: plain colored lines or JSON records.
/// - `metadata_file`: ECS container metadata file; `None` outside ECS.
/// - `metadata_endpoint`: URL of the EC2 instance identity document.
/// - `readiness_delay`: wait before re-reading a metadata file that is
///   not `READY` yet.
/// - `fetch_timeout`: upper bound on the identity document request.
/// - `max_level`: most verbose level that is printed. Defaults to
///   `TRACE` so every level reaches the renderer; narrow it here.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub renderer: Renderer,
    pub metadata_file: Option<PathBuf>,
    pub metadata_endpoint: String,
    pub readiness_delay: Duration,
    pub fetch_timeout: Duration,
    pub max_level: LevelFilter,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            renderer: Renderer::Plain,
            metadata_file: None,
            metadata_endpoint: INSTANCE_IDENTITY_URL.to_string(),
            readiness_delay: DEFAULT_READINESS_DELAY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_level: LevelFilter::TRACE,
        }
    }
}

impl LayerConfig {
    /// Defaults plus `JSON_LOGGING` and `ECS_CONTAINER_METADATA_FILE`.
    pub fn from_env() -> Self {
        Self {
            renderer: Renderer::from_env(),
            metadata_file: env_opt(ECS_CONTAINER_METADATA_FILE_ENV).map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn metadata_source(&self) -> EcsMetadataSource {
        EcsMetadataSource::new(self.metadata_file.clone())
            .with_endpoint(self.metadata_endpoint.clone())
            .with_readiness_delay(self.readiness_delay)
            .with_fetch_timeout(self.fetch_timeout)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Build the layer for `config` writing to `sink`, without installing it.
///
/// The returned [`Appender`] handle exposes the event counters and the
/// metadata registry shared with the layer.
pub fn build_layer(config: &LayerConfig, sink: Arc<dyn LineSink>) -> (EcsLogLayer, Arc<Appender>) {
    let registry = Arc::new(MetadataRegistry::new(config.metadata_source()));
    let appender = Arc::new(Appender::new(config.renderer, registry, sink));
    (EcsLogLayer::new(Arc::clone(&appender)), appender)
}

/// Initialize the global `tracing` subscriber using [`LayerConfig`].
///
/// **Effects**
///
/// Installs a [`Registry`] combined with [`EcsLogLayer`] (filtered to
/// `config.max_level`) as the global default subscriber, so every
/// `tracing` event in the process ends up as one stdout line.
pub fn init_tracing_with_config(config: LayerConfig) -> Result<Arc<Appender>, InitError> {
    let (layer, appender) = build_layer(&config, Arc::new(StdoutSink));
    let subscriber = Registry::default().with(layer.with_filter(config.max_level));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(appender)
}

/// Initialize tracing from the environment.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::from_env`]. This is the recommended entrypoint for
/// services running on ECS.
pub fn init_tracing() -> Result<Arc<Appender>, InitError> {
    init_tracing_with_config(LayerConfig::from_env())
}

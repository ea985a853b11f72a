use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_ecs_log::appender::Appender;
use tracing_ecs_log::layer::EcsLogLayer;
use tracing_ecs_log::metadata::{InfrastructureIdentity, MetadataSource};
use tracing_ecs_log::registry::MetadataRegistry;
use tracing_ecs_log::render::Renderer;
use tracing_ecs_log::sink::StdoutSink;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Example of plugging a different identity source, e.g. for a platform
/// that exposes its metadata somewhere other than ECS/EC2.
struct StaticSource;

#[async_trait]
impl MetadataSource for StaticSource {
    async fn fetch(&self) -> InfrastructureIdentity {
        InfrastructureIdentity {
            cloud_provider: Some("on-prem".to_string()),
            cloud_cluster: Some("rack-12".to_string()),
            service_name: Some("inventory".to_string()),
            service_version: Some("3".to_string()),
            ..Default::default()
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(MetadataRegistry::new(StaticSource));
    let appender = Arc::new(Appender::new(Renderer::Json, registry, Arc::new(StdoutSink)));

    tracing::subscriber::set_global_default(Registry::default().with(EcsLogLayer::new(appender)))?;

    info!(target: "inventory", sku = "A-1", "stock level read");
    warn!(target: "inventory", sku = "A-1", remaining = 2, "stock running low");
    Ok(())
}

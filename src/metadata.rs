use crate::env::{env_opt, ECS_CONTAINER_METADATA_FILE_ENV};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Provider tag reported when the instance identity document was fetched.
pub const CLOUD_PROVIDER: &str = "ec2";

/// Link-local EC2 instance identity document.
pub const INSTANCE_IDENTITY_URL: &str =
    "http://169.254.169.254/latest/dynamic/instance-identity/document";

/// Value of `MetadataFileStatus` once the ECS agent has finished writing.
pub const METADATA_READY: &str = "READY";

pub const DEFAULT_READINESS_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Static description of where the process runs.
///
/// Built once per process and never mutated afterwards. Absent fields are
/// skipped when serialized, so the struct can be flattened straight into a
/// JSON log line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InfrastructureIdentity {
    #[serde(rename = "cloud.provider", skip_serializing_if = "Option::is_none")]
    pub cloud_provider: Option<String>,
    #[serde(rename = "cloud.availability_zone", skip_serializing_if = "Option::is_none")]
    pub cloud_availability_zone: Option<String>,
    #[serde(rename = "cloud.region", skip_serializing_if = "Option::is_none")]
    pub cloud_region: Option<String>,
    #[serde(rename = "cloud.instance.id", skip_serializing_if = "Option::is_none")]
    pub cloud_instance_id: Option<String>,
    #[serde(rename = "cloud.machine.type", skip_serializing_if = "Option::is_none")]
    pub cloud_machine_type: Option<String>,
    #[serde(rename = "cloud.instance.ip", skip_serializing_if = "Option::is_none")]
    pub cloud_instance_ip: Option<String>,
    #[serde(rename = "cloud.cluster", skip_serializing_if = "Option::is_none")]
    pub cloud_cluster: Option<String>,

    #[serde(rename = "container.id", skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(rename = "container.image.name", skip_serializing_if = "Option::is_none")]
    pub container_image_name: Option<String>,
    #[serde(rename = "container.name", skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,

    #[serde(rename = "service.name", skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(rename = "service.version", skip_serializing_if = "Option::is_none")]
    pub service_version: Option<String>,
}

impl InfrastructureIdentity {
    /// Merge the two independently fetched documents. Either may be missing.
    pub fn from_sources(task: Option<&RawMetadataFile>, cloud: Option<&RawCloudDocument>) -> Self {
        let mut identity = InfrastructureIdentity::default();

        if let Some(cloud) = cloud {
            identity.cloud_provider = Some(CLOUD_PROVIDER.to_string());
            identity.cloud_availability_zone = Some(cloud.availability_zone.clone());
            identity.cloud_region = Some(cloud.region.clone());
            identity.cloud_instance_id = Some(cloud.instance_id.clone());
            identity.cloud_machine_type = Some(cloud.instance_type.clone());
            identity.cloud_instance_ip = Some(cloud.private_ip.clone());
        }

        if let Some(task) = task {
            identity.cloud_cluster = Some(task.cluster.clone());
            identity.container_id = Some(task.container_id.clone());
            identity.container_image_name = Some(task.image_id.clone());
            identity.container_name = Some(task.container_name.clone());
            identity.service_name = Some(task.task_definition_family.clone());
            identity.service_version = Some(task.task_definition_revision.clone());
        }

        identity
    }

    pub fn is_empty(&self) -> bool {
        *self == InfrastructureIdentity::default()
    }
}

/// Shape of the file named by `ECS_CONTAINER_METADATA_FILE`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawMetadataFile {
    #[serde(rename = "MetadataFileStatus")]
    pub status: String,
    #[serde(rename = "Cluster")]
    pub cluster: String,
    #[serde(rename = "ContainerID")]
    pub container_id: String,
    #[serde(rename = "ImageID")]
    pub image_id: String,
    #[serde(rename = "ContainerName")]
    pub container_name: String,
    #[serde(rename = "TaskDefinitionFamily")]
    pub task_definition_family: String,
    #[serde(rename = "TaskDefinitionRevision")]
    pub task_definition_revision: String,
}

impl RawMetadataFile {
    pub fn is_ready(&self) -> bool {
        self.status == METADATA_READY
    }
}

/// Subset of the EC2 instance identity document we report.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCloudDocument {
    pub availability_zone: String,
    pub region: String,
    pub instance_id: String,
    pub instance_type: String,
    pub private_ip: String,
}

/// Failure of a single metadata source. Never escapes the bootstrap: the
/// fields fed by the failing source are simply left absent.
#[derive(thiserror::Error, Debug)]
pub enum MetadataError {
    #[error("failed to read metadata file {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed metadata document: {0}")]
    Parse(#[from] serde_json::Error),

    #[cfg(feature = "ec2")]
    #[error("instance identity request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("instance identity request timed out after {0:?}")]
    Timeout(Duration),

    #[error("cloud metadata support is disabled (build with the `ec2` feature)")]
    CloudFetchDisabled,
}

/// Origin of the [`InfrastructureIdentity`] used by JSON records.
///
/// `fetch` must not fail: implementations absorb their own errors and
/// return whatever they could resolve. The registry calls it at most once.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self) -> InfrastructureIdentity;
}

/// Reads the ECS container metadata file and the EC2 identity document.
#[derive(Debug, Clone)]
pub struct EcsMetadataSource {
    metadata_file: Option<PathBuf>,
    endpoint: String,
    readiness_delay: Duration,
    fetch_timeout: Duration,
}

impl EcsMetadataSource {
    /// `metadata_file: None` means "not running in a container": `fetch`
    /// then returns an empty identity without touching the network.
    pub fn new(metadata_file: Option<PathBuf>) -> Self {
        EcsMetadataSource {
            metadata_file,
            endpoint: INSTANCE_IDENTITY_URL.to_string(),
            readiness_delay: DEFAULT_READINESS_DELAY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Build a source from `ECS_CONTAINER_METADATA_FILE`.
    pub fn from_env() -> Self {
        Self::new(env_opt(ECS_CONTAINER_METADATA_FILE_ENV).map(PathBuf::from))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_readiness_delay(mut self, delay: Duration) -> Self {
        self.readiness_delay = delay;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn metadata_file(&self) -> Option<&Path> {
        self.metadata_file.as_deref()
    }

    /// Parse the metadata file, re-reading it once after the readiness
    /// delay if the agent has not marked it `READY` yet. The second read is
    /// returned whatever its status.
    pub async fn read_metadata_file(&self, path: &Path) -> Result<RawMetadataFile, MetadataError> {
        let first = parse_metadata_file(path).await?;
        if first.is_ready() {
            return Ok(first);
        }

        tokio::time::sleep(self.readiness_delay).await;
        parse_metadata_file(path).await
    }

    /// Fetch the instance identity document, bounded by the fetch timeout.
    pub async fn fetch_cloud_document(&self) -> Result<RawCloudDocument, MetadataError> {
        #[cfg(feature = "ec2")]
        {
            let client = reqwest::Client::builder()
                .timeout(self.fetch_timeout)
                .build()?;

            let request = async {
                client
                    .get(&self.endpoint)
                    .send()
                    .await?
                    .error_for_status()?
                    .json::<RawCloudDocument>()
                    .await
            };

            let document = tokio::time::timeout(self.fetch_timeout, request)
                .await
                .map_err(|_| MetadataError::Timeout(self.fetch_timeout))??;
            Ok(document)
        }

        #[cfg(not(feature = "ec2"))]
        {
            Err(MetadataError::CloudFetchDisabled)
        }
    }
}

async fn parse_metadata_file(path: &Path) -> Result<RawMetadataFile, MetadataError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl MetadataSource for EcsMetadataSource {
    async fn fetch(&self) -> InfrastructureIdentity {
        // Not on ECS.
        let Some(path) = self.metadata_file.as_deref() else {
            return InfrastructureIdentity::default();
        };

        let task = match self.read_metadata_file(path).await {
            Ok(task) => {
                if !task.is_ready() {
                    eprintln!(
                        "container metadata status is {:?} after retry, using it as-is",
                        task.status
                    );
                }
                Some(task)
            }
            Err(e) => {
                eprintln!("container metadata unavailable: {}", e);
                None
            }
        };

        let cloud = match self.fetch_cloud_document().await {
            Ok(cloud) => Some(cloud),
            Err(e) => {
                eprintln!("cloud metadata unavailable: {}", e);
                None
            }
        };

        InfrastructureIdentity::from_sources(task.as_ref(), cloud.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    const DOCUMENT_PATH: &str = "/latest/dynamic/instance-identity/document";

    fn task_metadata(status: &str, revision: &str) -> String {
        json!({
            "Cluster": "prod-cluster",
            "ContainerInstanceARN": "arn:aws:ecs:eu-west-1:123:container-instance/abc",
            "TaskARN": "arn:aws:ecs:eu-west-1:123:task/def",
            "TaskDefinitionFamily": "billing",
            "TaskDefinitionRevision": revision,
            "ContainerID": "98e44444008169587b826b4cd76c6732e5899747e753af1e19a35db64f9e9c32",
            "ContainerName": "billing-api",
            "DockerContainerName": "/ecs-billing-7-billing-api",
            "ImageID": "sha256:2ae34abc2ed0a22e280d17e13f9c01aaf725688b09b7a1525d1a2750e2c0d1de",
            "ImageName": "billing:latest",
            "MetadataFileStatus": status,
        })
        .to_string()
    }

    fn cloud_document() -> serde_json::Value {
        json!({
            "accountId": "123456789012",
            "architecture": "x86_64",
            "availabilityZone": "eu-west-1b",
            "imageId": "ami-0123456789",
            "instanceId": "i-0abc123def",
            "instanceType": "m5.large",
            "privateIp": "10.0.1.17",
            "region": "eu-west-1",
        })
    }

    fn metadata_file(contents: &str) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), contents).unwrap();
        file
    }

    #[tokio::test]
    async fn test_no_metadata_file_yields_empty_identity_without_network() {
        let server = MockServer::start_async().await;
        let document = server
            .mock_async(|when, then| {
                when.method(GET).path(DOCUMENT_PATH);
                then.status(200).json_body(cloud_document());
            })
            .await;

        let source = EcsMetadataSource::new(None).with_endpoint(server.url(DOCUMENT_PATH));
        let identity = source.fetch().await;

        assert!(identity.is_empty());
        assert_eq!(document.hits_async().await, 0);
    }

    #[cfg(feature = "ec2")]
    #[tokio::test]
    async fn test_combines_file_and_cloud_document() {
        let server = MockServer::start_async().await;
        let document = server
            .mock_async(|when, then| {
                when.method(GET).path(DOCUMENT_PATH);
                then.status(200).json_body(cloud_document());
            })
            .await;
        let file = metadata_file(&task_metadata("READY", "7"));

        let source = EcsMetadataSource::new(Some(file.path().to_path_buf()))
            .with_endpoint(server.url(DOCUMENT_PATH));
        let identity = source.fetch().await;

        assert_eq!(document.hits_async().await, 1);
        assert_eq!(identity.cloud_provider.as_deref(), Some("ec2"));
        assert_eq!(identity.cloud_availability_zone.as_deref(), Some("eu-west-1b"));
        assert_eq!(identity.cloud_region.as_deref(), Some("eu-west-1"));
        assert_eq!(identity.cloud_instance_id.as_deref(), Some("i-0abc123def"));
        assert_eq!(identity.cloud_machine_type.as_deref(), Some("m5.large"));
        assert_eq!(identity.cloud_instance_ip.as_deref(), Some("10.0.1.17"));
        assert_eq!(identity.cloud_cluster.as_deref(), Some("prod-cluster"));
        assert_eq!(identity.container_name.as_deref(), Some("billing-api"));
        assert_eq!(identity.service_name.as_deref(), Some("billing"));
        assert_eq!(identity.service_version.as_deref(), Some("7"));
        assert!(identity
            .container_image_name
            .as_deref()
            .is_some_and(|image| image.starts_with("sha256:")));
    }

    #[tokio::test]
    async fn test_not_ready_file_is_reread_once() {
        let file = metadata_file(&task_metadata("NOT_READY", "6"));
        let path = file.path().to_path_buf();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            std::fs::write(&writer_path, task_metadata("READY", "7")).unwrap();
        });

        let source = EcsMetadataSource::new(Some(path.clone()))
            .with_readiness_delay(Duration::from_millis(300));
        let task = source.read_metadata_file(&path).await.unwrap();
        writer.await.unwrap();

        assert!(task.is_ready());
        assert_eq!(task.task_definition_revision, "7");
    }

    #[tokio::test]
    async fn test_still_not_ready_is_used_as_is() {
        let file = metadata_file(&task_metadata("NOT_READY", "6"));
        let source = EcsMetadataSource::new(Some(file.path().to_path_buf()))
            .with_readiness_delay(Duration::from_millis(10));

        let task = source.read_metadata_file(file.path()).await.unwrap();

        assert!(!task.is_ready());
        assert_eq!(task.cluster, "prod-cluster");
    }

    #[cfg(feature = "ec2")]
    #[tokio::test]
    async fn test_malformed_file_does_not_block_cloud_fetch() {
        let server = MockServer::start_async().await;
        let document = server
            .mock_async(|when, then| {
                when.method(GET).path(DOCUMENT_PATH);
                then.status(200).json_body(cloud_document());
            })
            .await;
        let file = metadata_file("{\"Cluster\": \"prod-cluster\"");

        let source = EcsMetadataSource::new(Some(file.path().to_path_buf()))
            .with_endpoint(server.url(DOCUMENT_PATH));
        let identity = source.fetch().await;

        assert_eq!(document.hits_async().await, 1);
        assert_eq!(identity.cloud_region.as_deref(), Some("eu-west-1"));
        assert_eq!(identity.cloud_cluster, None);
        assert_eq!(identity.container_id, None);
        assert_eq!(identity.service_name, None);
    }

    #[tokio::test]
    async fn test_missing_required_field_is_a_parse_error() {
        let file = metadata_file(r#"{"MetadataFileStatus": "READY", "Cluster": "prod-cluster"}"#);
        let source = EcsMetadataSource::new(Some(file.path().to_path_buf()));

        let err = source.read_metadata_file(file.path()).await.unwrap_err();

        assert!(matches!(err, MetadataError::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let source = EcsMetadataSource::new(Some(path.clone()));

        let err = source.read_metadata_file(&path).await.unwrap_err();

        assert!(matches!(err, MetadataError::Io { .. }));
    }

    #[tokio::test]
    async fn test_cloud_failure_keeps_container_fields() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(DOCUMENT_PATH);
                then.status(500);
            })
            .await;
        let file = metadata_file(&task_metadata("READY", "7"));

        let source = EcsMetadataSource::new(Some(file.path().to_path_buf()))
            .with_endpoint(server.url(DOCUMENT_PATH));
        let identity = source.fetch().await;

        assert_eq!(identity.cloud_provider, None);
        assert_eq!(identity.cloud_region, None);
        assert_eq!(identity.cloud_cluster.as_deref(), Some("prod-cluster"));
        assert_eq!(identity.service_name.as_deref(), Some("billing"));
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path(DOCUMENT_PATH);
                then.status(200)
                    .delay(Duration::from_secs(2))
                    .json_body(cloud_document());
            })
            .await;

        let source = EcsMetadataSource::new(None)
            .with_endpoint(server.url(DOCUMENT_PATH))
            .with_fetch_timeout(Duration::from_millis(100));
        let result = source.fetch_cloud_document().await;

        assert!(result.is_err());
    }

    #[test]
    fn test_identity_serializes_only_present_fields() {
        let identity = InfrastructureIdentity {
            cloud_region: Some("eu-west-1".to_string()),
            service_name: Some("billing".to_string()),
            ..Default::default()
        };

        let value = serde_json::to_value(&identity).unwrap();

        assert_eq!(value, json!({"cloud.region": "eu-west-1", "service.name": "billing"}));
    }
}

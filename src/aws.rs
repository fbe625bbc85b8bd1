//! Capability boundaries for the cloud collaborators.
//!
//! The updater talks to two narrow interfaces: the load balancer control
//! plane and the instance identity provider. Both are expressed as traits so
//! tests can substitute deterministic fakes without a live network
//! dependency. Transport, auth and retry behaviour belong to the
//! implementations, not to this crate.

use anyhow::Context;
use async_trait::async_trait;

/// One page of a load balancer listing.
#[derive(Debug, Clone, Default)]
pub struct LoadBalancerPage {
    pub load_balancers: Vec<LoadBalancer>,
    /// Continuation marker; `None` on the final page.
    pub next_marker: Option<String>,
}

/// A load balancer as returned by the listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancer {
    pub name: String,
    pub arn: String,
    pub scheme: String,
    pub dns_name: String,
    pub hosted_zone_id: String,
}

/// A single resource tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// The tag set attached to one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDescription {
    pub resource_arn: String,
    pub tags: Vec<Tag>,
}

/// Load balancer control plane operations used by the updater.
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// List one page of load balancers, continuing from `marker` if given.
    async fn describe_load_balancers(
        &self,
        marker: Option<String>,
    ) -> anyhow::Result<LoadBalancerPage>;

    /// Look up the tag sets for the given resource ARNs.
    async fn describe_tags(&self, resource_arns: &[String]) -> anyhow::Result<Vec<TagDescription>>;

    /// Register the instance as a target of the given target group.
    async fn register_targets(
        &self,
        target_group_arn: &str,
        instance_id: &str,
    ) -> anyhow::Result<()>;

    /// Deregister the instance from the given target group.
    async fn deregister_targets(
        &self,
        target_group_arn: &str,
        instance_id: &str,
    ) -> anyhow::Result<()>;
}

/// Resolves the unique identifier of the local instance.
#[async_trait]
pub trait InstanceMetadata: Send + Sync {
    async fn instance_id(&self) -> anyhow::Result<String>;
}

/// Default endpoint of the EC2 instance metadata service.
pub const IMDS_BASE_URL: &str = "http://169.254.169.254";

const IMDS_TOKEN_TTL_SECONDS: &str = "21600";

/// [`InstanceMetadata`] implementation backed by the EC2 instance metadata
/// service, using the session-token (IMDSv2) flow.
pub struct Ec2MetadataClient {
    client: reqwest::Client,
    base_url: String,
}

impl Ec2MetadataClient {
    pub fn new() -> Self {
        Self::with_base_url(IMDS_BASE_URL)
    }

    /// Point the client at a non-standard endpoint, e.g. a test server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for Ec2MetadataClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceMetadata for Ec2MetadataClient {
    async fn instance_id(&self) -> anyhow::Result<String> {
        let token = self
            .client
            .put(format!("{}/latest/api/token", self.base_url))
            .header("X-aws-ec2-metadata-token-ttl-seconds", IMDS_TOKEN_TTL_SECONDS)
            .send()
            .await
            .context("metadata token request failed")?
            .error_for_status()
            .context("metadata token request rejected")?
            .text()
            .await
            .context("metadata token response unreadable")?;

        let instance_id = self
            .client
            .get(format!("{}/latest/meta-data/instance-id", self.base_url))
            .header("X-aws-ec2-metadata-token", token.trim())
            .send()
            .await
            .context("instance-id request failed")?
            .error_for_status()
            .context("instance-id request rejected")?
            .text()
            .await
            .context("instance-id response unreadable")?;

        Ok(instance_id.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_instance_id_via_token_flow() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/latest/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("tok-123"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/instance-id"))
            .and(header("X-aws-ec2-metadata-token", "tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_string("i-0abc123\n"))
            .mount(&server)
            .await;

        let client = Ec2MetadataClient::with_base_url(server.uri());
        let instance_id = client.instance_id().await.unwrap();

        assert_eq!(instance_id, "i-0abc123");
    }

    #[tokio::test]
    async fn token_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/latest/api/token"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = Ec2MetadataClient::with_base_url(server.uri());
        let result = client.instance_id().await;

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("metadata token request rejected"));
    }

    #[tokio::test]
    async fn instance_id_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/latest/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("tok-123"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/instance-id"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Ec2MetadataClient::with_base_url(server.uri());
        assert!(client.instance_id().await.is_err());
    }
}

//! Frontend discovery.
//!
//! Resolves the full, paginated set of cloud load balancers, filters to
//! those tagged as frontends of the configured cluster, and groups them by
//! scheme. The result is rebuilt from scratch on every update cycle and
//! never cached.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::aws::{LoadBalancer, LoadBalancerApi};
use crate::error::{Error, Result};

/// Resource tag key that marks a load balancer as a cluster frontend.
pub const FRONTEND_TAG: &str = "sky.uk/KubernetesClusterFrontend";

/// Details of a discovered cluster frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerDetails {
    pub name: String,
    /// Registration handle; one target group per frontend in this design.
    pub target_group_arn: String,
    pub scheme: String,
    pub dns_name: String,
    pub hosted_zone_id: String,
}

/// Discovered frontends keyed by scheme, at most one per scheme.
pub type FrontendMap = HashMap<String, LoadBalancerDetails>;

/// Find the load balancers tagged as frontends for `cluster_name`.
///
/// Pages through the listing API until no continuation marker remains, then
/// resolves tags for all discovered load balancers in a single call. A load
/// balancer is a frontend iff its tags contain [`FRONTEND_TAG`] with a value
/// exactly equal to `cluster_name`. When two matches share a scheme the
/// later one observed wins and the displaced frontend is logged.
pub async fn discover_frontends(
    elb: &dyn LoadBalancerApi,
    cluster_name: &str,
) -> Result<FrontendMap> {
    let mut discovered: Vec<LoadBalancer> = Vec::new();
    let mut marker: Option<String> = None;

    loop {
        let mut page = elb
            .describe_load_balancers(marker.take())
            .await
            .map_err(|e| Error::DescribeLoadBalancers {
                // Alternate formatting keeps the whole context chain.
                cause: format!("{e:#}"),
            })?;
        debug!(count = page.load_balancers.len(), "fetched load balancer page");
        discovered.append(&mut page.load_balancers);
        match page.next_marker {
            Some(next) => marker = Some(next),
            None => break,
        }
    }

    if discovered.is_empty() {
        return Ok(FrontendMap::new());
    }

    let arns: Vec<String> = discovered.iter().map(|lb| lb.arn.clone()).collect();
    let tag_descriptions = elb
        .describe_tags(&arns)
        .await
        .map_err(|e| Error::DescribeTags {
            cause: format!("{e:#}"),
        })?;

    let by_arn: HashMap<&str, &LoadBalancer> = discovered
        .iter()
        .map(|lb| (lb.arn.as_str(), lb))
        .collect();

    let mut frontends = FrontendMap::new();
    for description in &tag_descriptions {
        let is_frontend = description
            .tags
            .iter()
            .any(|tag| tag.key == FRONTEND_TAG && tag.value == cluster_name);
        if !is_frontend {
            continue;
        }
        let Some(lb) = by_arn.get(description.resource_arn.as_str()) else {
            continue;
        };
        debug!(name = %lb.name, scheme = %lb.scheme, "found frontend for cluster");
        let details = LoadBalancerDetails {
            name: lb.name.clone(),
            target_group_arn: lb.arn.clone(),
            scheme: lb.scheme.clone(),
            dns_name: lb.dns_name.clone(),
            hosted_zone_id: lb.hosted_zone_id.clone(),
        };
        if let Some(displaced) = frontends.insert(lb.scheme.clone(), details) {
            warn!(
                scheme = %lb.scheme,
                displaced = %displaced.name,
                kept = %lb.name,
                "multiple frontends share a scheme, keeping the later match"
            );
        }
    }

    Ok(frontends)
}

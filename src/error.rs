//! Error types for the attachment controller.

use thiserror::Error;

/// Errors surfaced by the updater and its discovery/drain cycles.
///
/// Collaborator causes are captured as rendered strings so the enum stays
/// `Clone`: `health` hands back the exact error of the most recent failed
/// update cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad construction arguments
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Instance identity lookup failed
    #[error("unable to query ec2 metadata service for InstanceId: {cause}")]
    InstanceMetadata { cause: String },

    /// Load balancer listing failed
    #[error("unable to describe load balancers: {cause}")]
    DescribeLoadBalancers { cause: String },

    /// Tag lookup failed
    #[error("unable to describe tags: {cause}")]
    DescribeTags { cause: String },

    /// Discovered frontend count differs from the configured expectation
    #[error("expected ELBs: {expected} actual: {actual}")]
    FrontendCount { expected: usize, actual: usize },

    /// Registering the instance with a single frontend failed
    #[error("unable to register instance {instance} with elb {elb}: {cause}")]
    RegisterTarget {
        instance: String,
        elb: String,
        cause: String,
    },

    /// One or more deregistration calls failed during shutdown
    #[error("at least one ELB failed to detach")]
    Detach,
}

impl Error {
    /// Short identifier for the failing stage, used as a metric label.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::InstanceMetadata { .. } => "metadata",
            Error::DescribeLoadBalancers { .. } => "describe-load-balancers",
            Error::DescribeTags { .. } => "describe-tags",
            Error::FrontendCount { .. } => "frontend-count",
            Error::RegisterTarget { .. } => "register",
            Error::Detach => "detach",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

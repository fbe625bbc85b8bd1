//! The attach/drain lifecycle of the local instance.
//!
//! An external scheduler drives `start` once, `update` repeatedly and `stop`
//! on shutdown; `health` may be read concurrently from a health-check
//! endpoint. Each `update` is an independent full cycle: resolve the
//! instance identity, discover the cluster frontends, and register the
//! instance with each. `stop` deregisters whatever the most recent
//! successful cycle attached and then waits out the drain delay so in-flight
//! connections can complete.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::aws::{InstanceMetadata, LoadBalancerApi};
use crate::discovery::{discover_frontends, LoadBalancerDetails};
use crate::error::{Error, Result};
use crate::metrics;

/// Construction-time configuration for [`ElbUpdater`].
#[derive(Debug, Clone)]
pub struct Config {
    pub region: String,
    /// Value the frontend tag must carry, must be non-empty.
    pub cluster_name: String,
    /// Number of frontends a successful cycle must attach, must be positive.
    pub expected_frontends: usize,
    /// Pause after deregistration before `stop` returns.
    pub drain_delay: Duration,
}

impl Config {
    pub fn new(region: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Config {
            region: region.into(),
            cluster_name: cluster_name.into(),
            expected_frontends: 1,
            drain_delay: Duration::ZERO,
        }
    }
}

/// Lifecycle capability exposed to the owning ingress process.
#[async_trait]
pub trait Updater: Send + Sync {
    /// Readiness hook; idempotent, performs no discovery or registration.
    async fn start(&self) -> Result<()>;

    /// Run one full discovery and registration cycle.
    async fn update(&self) -> Result<()>;

    /// Deregister everything the most recent successful cycle attached,
    /// then wait out the drain delay.
    async fn stop(&self) -> Result<()>;

    /// Outcome of the most recent cycle; `Ok` before the first one.
    fn health(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
struct AttachedFrontend {
    name: String,
    target_group_arn: String,
}

/// [`Updater`] that attaches the local instance to the cluster's tagged
/// cloud load balancers.
pub struct ElbUpdater {
    region: String,
    cluster_name: String,
    expected_frontends: usize,
    drain_delay: Duration,
    elb: Arc<dyn LoadBalancerApi>,
    metadata: Arc<dyn InstanceMetadata>,
    // Resolved once, held for the process lifetime.
    instance_id: Mutex<Option<String>>,
    // Exactly what `stop` must deregister.
    attached: Mutex<Vec<AttachedFrontend>>,
    // Read concurrently by `health`; never held across an await.
    health: StdMutex<Option<Error>>,
}

impl ElbUpdater {
    pub fn new(
        config: Config,
        elb: Arc<dyn LoadBalancerApi>,
        metadata: Arc<dyn InstanceMetadata>,
    ) -> Result<Self> {
        if config.cluster_name.is_empty() {
            return Err(Error::Config("cluster name must not be empty".to_string()));
        }
        if config.expected_frontends == 0 {
            return Err(Error::Config(
                "expected frontend count must be positive".to_string(),
            ));
        }
        Ok(ElbUpdater {
            region: config.region,
            cluster_name: config.cluster_name,
            expected_frontends: config.expected_frontends,
            drain_delay: config.drain_delay,
            elb,
            metadata,
            instance_id: Mutex::new(None),
            attached: Mutex::new(Vec::new()),
            health: StdMutex::new(None),
        })
    }

    async fn cached_instance_id(&self) -> Result<String> {
        let mut cached = self.instance_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }
        let id = self
            .metadata
            .instance_id()
            .await
            .map_err(|e| Error::InstanceMetadata {
                // Alternate formatting keeps the whole context chain.
                cause: format!("{e:#}"),
            })?;
        debug!(instance = %id, "resolved instance id from metadata service");
        *cached = Some(id.clone());
        Ok(id)
    }

    async fn attach(&self) -> Result<()> {
        let instance_id = self.cached_instance_id().await?;
        let frontends = discover_frontends(self.elb.as_ref(), &self.cluster_name).await?;

        if frontends.len() != self.expected_frontends {
            return Err(Error::FrontendCount {
                expected: self.expected_frontends,
                actual: frontends.len(),
            });
        }

        // Deterministic registration order within a cycle.
        let mut ordered: Vec<&LoadBalancerDetails> = frontends.values().collect();
        ordered.sort_by(|a, b| a.scheme.cmp(&b.scheme));

        let mut registered = Vec::with_capacity(ordered.len());
        for frontend in ordered {
            if let Err(e) = self
                .elb
                .register_targets(&frontend.target_group_arn, &instance_id)
                .await
            {
                // Partial attachment stays observable; no rollback.
                *self.attached.lock().await = registered;
                return Err(Error::RegisterTarget {
                    instance: instance_id,
                    elb: frontend.name.clone(),
                    cause: format!("{e:#}"),
                });
            }
            debug!(elb = %frontend.name, "registered instance with frontend");
            registered.push(AttachedFrontend {
                name: frontend.name.clone(),
                target_group_arn: frontend.target_group_arn.clone(),
            });
        }

        info!(
            instance = %instance_id,
            count = registered.len(),
            "attached instance to cluster frontends"
        );
        metrics::ATTACHED_FRONTENDS.set(registered.len() as i64);
        *self.attached.lock().await = registered;
        Ok(())
    }

    fn set_health(&self, outcome: Option<Error>) {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        *health = outcome;
    }
}

#[async_trait]
impl Updater for ElbUpdater {
    async fn start(&self) -> Result<()> {
        info!(
            cluster = %self.cluster_name,
            region = %self.region,
            expected = self.expected_frontends,
            "elb frontend updater ready"
        );
        Ok(())
    }

    async fn update(&self) -> Result<()> {
        match self.attach().await {
            Ok(()) => {
                self.set_health(None);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "update cycle failed");
                metrics::ATTACH_CYCLE_ERRORS
                    .get_or_create(&metrics::StageLabels {
                        stage: e.stage().to_string(),
                    })
                    .inc();
                self.set_health(Some(e.clone()));
                Err(e)
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        let attached = self.attached.lock().await.clone();
        if attached.is_empty() {
            info!("no frontends attached, nothing to drain");
            return Ok(());
        }

        let instance_id = self.cached_instance_id().await?;
        let mut detach_failed = false;
        for frontend in &attached {
            match self
                .elb
                .deregister_targets(&frontend.target_group_arn, &instance_id)
                .await
            {
                Ok(()) => debug!(elb = %frontend.name, "deregistered instance from frontend"),
                Err(e) => {
                    warn!(elb = %frontend.name, error = %e, "unable to deregister instance");
                    detach_failed = true;
                }
            }
        }

        info!(delay = ?self.drain_delay, "waiting for in-flight connections to drain");
        tokio::time::sleep(self.drain_delay).await;
        info!("drain wait complete");

        if detach_failed {
            Err(Error::Detach)
        } else {
            Ok(())
        }
    }

    fn health(&self) -> Result<()> {
        let health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        match health.as_ref() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

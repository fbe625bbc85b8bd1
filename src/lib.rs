//! ELB frontend attachment controller for a Kubernetes ingress edge process.
//!
//! Discovers the cloud load balancers tagged as frontends for a specific
//! cluster, registers the local instance as a traffic target on each,
//! deregisters it on shutdown with a drain pause, and reports aggregated
//! health to an external health-check endpoint. An external scheduler drives
//! the lifecycle through the [`Updater`] capability.

pub mod aws;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod updater;


pub use crate::error::{Error, Result};
pub use crate::updater::{Config, ElbUpdater, Updater};

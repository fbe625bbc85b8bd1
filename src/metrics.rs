//! Prometheus metrics for the attachment controller.
//!
//! # Exported metrics
//! - `elb_attached_frontends` (gauge): frontends attached by the most recent
//!   successful update cycle.
//! - `elb_attach_cycle_errors_total` (counter): failed update cycles,
//!   labeled by the stage that failed.

use std::sync::atomic::{AtomicI64, AtomicU64};
use std::sync::Once;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

/// Labels for the cycle error counter.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StageLabels {
    /// Failing stage, e.g. "register" or "frontend-count".
    pub stage: String,
}

/// Gauge tracking how many frontends the instance is attached to.
pub static ATTACHED_FRONTENDS: Lazy<Gauge<i64, AtomicI64>> = Lazy::new(Gauge::default);

/// Counter tracking failed update cycles by stage.
pub static ATTACH_CYCLE_ERRORS: Lazy<Family<StageLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

static REGISTER: Once = Once::new();

/// Register the controller's metrics with the owner's registry.
///
/// Explicitly called once at process start; repeated calls are no-ops so the
/// owning process never double-registers. The guard is process-global: the
/// metrics are registered into whichever registry the first call supplies,
/// and later calls with a different registry register nothing. The owning
/// process has exactly one registry.
pub fn register_metrics(registry: &mut Registry) {
    REGISTER.call_once(|| {
        registry.register(
            "elb_attached_frontends",
            "Frontends attached by the most recent successful update cycle",
            ATTACHED_FRONTENDS.clone(),
        );
        registry.register(
            "elb_attach_cycle_errors",
            "Failed attachment update cycles by stage",
            ATTACH_CYCLE_ERRORS.clone(),
        );
    });
}

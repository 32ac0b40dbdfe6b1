//! Cluster-manager service (Patroni under systemd).

use crate::exec::{CommandError, ExecContext, Invocation};
use tracing::debug;

/// Default systemd unit of the cluster manager
pub const DEFAULT_CLUSTER_SERVICE: &str = "patroni";

pub trait ClusterManager {
    /// Unit name shown in plans and logs
    fn name(&self) -> &str;
    fn is_active(&self) -> bool;
    fn stop(&self) -> Result<(), CommandError>;
}

#[derive(Debug, Clone)]
pub struct SystemdService {
    ctx: ExecContext,
    unit: String,
}

impl SystemdService {
    pub fn new(ctx: ExecContext, unit: impl Into<String>) -> Self {
        Self {
            ctx,
            unit: unit.into(),
        }
    }
}

impl ClusterManager for SystemdService {
    fn name(&self) -> &str {
        &self.unit
    }

    fn is_active(&self) -> bool {
        // is-active needs no privileges and exits non-zero when inactive
        match Invocation::new("systemctl", &["is-active", self.unit.as_str()]).run() {
            Ok(out) => out.trim() == "active",
            Err(e) => {
                debug!("{} not active: {}", self.unit, e);
                false
            }
        }
    }

    fn stop(&self) -> Result<(), CommandError> {
        self.ctx
            .run_as_root(&["systemctl", "stop", self.unit.as_str()])
            .map(|_| ())
    }
}

//! Pre-restore validation and state capture.

use crate::cluster::ClusterManager;
use crate::codes::PITR_PRECHECK_FAILED;
use crate::errors::{PitrError, PitrResult};
use crate::pgdata::DataDirInspector;
use crate::postgres::PostgresControl;
use crate::target::{RecoveryTarget, TargetFlags};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Snapshot of the host taken once before anything is changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemState {
    /// Cluster-manager unit name
    pub cluster_service: String,
    pub cluster_active: bool,
    pub pg_running: bool,
    pub pg_pid: Option<i32>,
    pub data_dir: PathBuf,
    pub dbsu: String,
    pub captured_at: DateTime<Utc>,
}

/// Validated input plus the captured state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prechecked {
    pub state: SystemState,
    pub target: RecoveryTarget,
}

pub struct PreflightValidator<'a> {
    cluster: &'a dyn ClusterManager,
    pg: &'a dyn PostgresControl,
    inspector: &'a dyn DataDirInspector,
}

impl<'a> PreflightValidator<'a> {
    pub fn new(
        cluster: &'a dyn ClusterManager,
        pg: &'a dyn PostgresControl,
        inspector: &'a dyn DataDirInspector,
    ) -> Self {
        Self { cluster, pg, inspector }
    }

    pub fn validate(&self, flags: &TargetFlags, data_dir: &Path, dbsu: &str) -> PitrResult<Prechecked> {
        let target = RecoveryTarget::from_flags(flags)?;
        debug!("recovery target: {}", target);

        if !self.inspector.exists(data_dir) {
            return Err(PitrError::new(PITR_PRECHECK_FAILED, "data directory does not exist")
                .with_detail(data_dir.display().to_string()));
        }
        if !self.inspector.is_initialized(data_dir) {
            return Err(PitrError::new(PITR_PRECHECK_FAILED, "data directory is not initialized")
                .with_detail(format!("{} has no PG_VERSION", data_dir.display())));
        }

        let status = self.pg.check_running();
        let state = SystemState {
            cluster_service: self.cluster.name().to_string(),
            cluster_active: self.cluster.is_active(),
            pg_running: status.running,
            pg_pid: status.pid,
            data_dir: data_dir.to_path_buf(),
            dbsu: dbsu.to_string(),
            captured_at: Utc::now(),
        };
        info!(
            "Precheck: {} active={}, PostgreSQL running={}",
            state.cluster_service, state.cluster_active, state.pg_running
        );

        Ok(Prechecked { state, target })
    }
}

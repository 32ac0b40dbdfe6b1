//! Stopping and starting the cluster manager and the database.
//!
//! Stopping escalates through tiers until a fresh liveness check says the
//! server is gone: wait for the cluster manager to take it down, `fast`
//! shutdown with exponential backoff, one `immediate` shutdown, then
//! SIGKILL. Every attempt is followed by a re-check whatever the command
//! itself returned.

use crate::cluster::ClusterManager;
use crate::codes::{PITR_PG_RUNNING, PITR_START_FAILED, PITR_START_TIMEOUT, PITR_STOP_FAILED};
use crate::errors::{PitrError, PitrResult};
use crate::postgres::{PostgresControl, ProcessStatus, StopMode};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Waits and retry counts for stop/start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    /// Interval between checks after the cluster manager was stopped
    pub cluster_poll_interval: Duration,
    pub cluster_poll_checks: u32,
    /// `fast` shutdown attempts
    pub graceful_retries: u32,
    /// Backoff before the second attempt, doubled afterwards
    pub initial_backoff: Duration,
    /// Passed to `pg_ctl stop -t`
    pub stop_timeout: Duration,
    /// Wait after SIGKILL before re-checking
    pub kill_settle: Duration,
    /// Passed to `pg_ctl start -t`
    pub start_timeout: Duration,
    pub start_poll_interval: Duration,
    /// How long to wait for a live pid after start returned
    pub start_wait: Duration,
}

impl Default for StopPolicy {
    fn default() -> Self {
        Self {
            cluster_poll_interval: Duration::from_secs(5),
            cluster_poll_checks: 6,
            graceful_retries: 3,
            initial_backoff: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(30),
            kill_settle: Duration::from_secs(2),
            start_timeout: Duration::from_secs(120),
            start_poll_interval: Duration::from_secs(1),
            start_wait: Duration::from_secs(30),
        }
    }
}

impl StopPolicy {
    /// Same counts with every wait set to zero
    pub fn no_wait() -> Self {
        Self {
            cluster_poll_interval: Duration::ZERO,
            initial_backoff: Duration::ZERO,
            kill_settle: Duration::ZERO,
            start_poll_interval: Duration::ZERO,
            start_wait: Duration::ZERO,
            ..Self::default()
        }
    }
}

pub struct ServiceStateController<'a> {
    cluster: &'a dyn ClusterManager,
    pg: &'a dyn PostgresControl,
    policy: StopPolicy,
}

impl<'a> ServiceStateController<'a> {
    pub fn new(cluster: &'a dyn ClusterManager, pg: &'a dyn PostgresControl, policy: StopPolicy) -> Self {
        Self { cluster, pg, policy }
    }

    pub async fn stop_cluster(&self) -> PitrResult<()> {
        let name = self.cluster.name();
        info!("Stopping {} service", name);
        self.cluster.stop().map_err(|e| {
            PitrError::from_command(PITR_STOP_FAILED, format!("failed to stop {name} service"), &e)
        })?;
        info!("{} service stopped", name);
        Ok(())
    }

    /// Make sure the server is down. `cluster_was_stopped` enables the
    /// initial wait for the cluster manager's own shutdown.
    pub async fn ensure_database_stopped(&self, cluster_was_stopped: bool) -> PitrResult<()> {
        let stopped = if cluster_was_stopped {
            self.wait_for_cluster_shutdown().await
        } else {
            !self.pg.check_running().running
        };
        if stopped {
            info!("PostgreSQL is not running");
            return Ok(());
        }

        let mut backoff = self.policy.initial_backoff;
        for attempt in 1..=self.policy.graceful_retries {
            info!("Stopping PostgreSQL (fast, attempt {}/{})", attempt, self.policy.graceful_retries);
            if let Err(e) = self.pg.stop(StopMode::Fast, self.policy.stop_timeout) {
                warn!("pg_ctl stop -m fast failed: {}", e);
            }
            if !self.pg.check_running().running {
                info!("PostgreSQL stopped");
                return Ok(());
            }
            if attempt < self.policy.graceful_retries {
                sleep(backoff).await;
                backoff *= 2;
            }
        }

        warn!("Graceful stop failed, trying immediate shutdown");
        if let Err(e) = self.pg.stop(StopMode::Immediate, self.policy.stop_timeout) {
            warn!("pg_ctl stop -m immediate failed: {}", e);
        }
        let status = self.pg.check_running();
        if !status.running {
            info!("PostgreSQL stopped (immediate)");
            return Ok(());
        }

        if let Some(pid) = status.pid {
            warn!("Immediate shutdown failed, sending SIGKILL to {}", pid);
            self.pg.force_kill(pid).map_err(|e| {
                PitrError::from_command(PITR_STOP_FAILED, format!("failed to kill PostgreSQL process {pid}"), &e)
            })?;
            sleep(self.policy.kill_settle).await;
            if !self.pg.check_running().running {
                info!("PostgreSQL killed");
                return Ok(());
            }
        }

        let pid = self
            .pg
            .check_running()
            .pid
            .map(|p| format!("pid {p}"))
            .unwrap_or_else(|| "pid unknown".to_string());
        Err(PitrError::new(
            PITR_PG_RUNNING,
            "PostgreSQL is still running, manual intervention required",
        )
        .with_detail(pid))
    }

    /// Give the cluster manager `cluster_poll_checks` intervals to take the
    /// server down, checking at the end of each one.
    async fn wait_for_cluster_shutdown(&self) -> bool {
        let checks = self.policy.cluster_poll_checks;
        for check in 1..=checks {
            info!("Waiting for PostgreSQL to stop ({}/{})", check, checks);
            sleep(self.policy.cluster_poll_interval).await;
            if !self.pg.check_running().running {
                info!("PostgreSQL stopped with {}", self.cluster.name());
                return true;
            }
        }
        false
    }

    /// Start the server and wait until it reports a live pid
    pub async fn start_database(&self) -> PitrResult<ProcessStatus> {
        info!("Starting PostgreSQL");
        self.pg
            .start(self.policy.start_timeout)
            .map_err(|e| PitrError::from_command(PITR_START_FAILED, "failed to start PostgreSQL", &e))?;

        let began = Instant::now();
        loop {
            let status = self.pg.check_running();
            if status.running {
                info!("PostgreSQL started (pid {})", status.pid.unwrap_or_default());
                return Ok(status);
            }
            if began.elapsed() >= self.policy.start_wait {
                break;
            }
            sleep(self.policy.start_poll_interval).await;
        }

        Err(PitrError::new(PITR_START_TIMEOUT, "PostgreSQL did not come up after start")
            .with_detail(format!("no live process after {}s", self.policy.start_wait.as_secs())))
    }
}

//! Restore delegation to the backup tool.

use crate::backrest::{classify_failure, restore_args, BackupTool, RestoreRequest};
use crate::codes::{PITR_PG_RUNNING, PITR_RESTORE_FAILED};
use crate::errors::{PitrError, PitrResult};
use crate::exec::CommandError;
use crate::postgres::PostgresControl;
use tracing::{error, info};

pub struct RestoreCoordinator<'a> {
    tool: &'a dyn BackupTool,
    pg: &'a dyn PostgresControl,
}

impl<'a> RestoreCoordinator<'a> {
    pub fn new(tool: &'a dyn BackupTool, pg: &'a dyn PostgresControl) -> Self {
        Self { tool, pg }
    }

    /// Restore into a stopped data directory. The running check is taken
    /// fresh here, not from the preflight snapshot.
    pub fn restore(&self, req: &RestoreRequest) -> PitrResult<()> {
        let status = self.pg.check_running();
        if status.running {
            let pid = status.pid.map(|p| format!("pid {p}")).unwrap_or_default();
            return Err(PitrError::new(PITR_PG_RUNNING, "PostgreSQL is running, refusing to restore")
                .with_detail(pid));
        }

        let args = restore_args(req);
        info!("Restoring {} to {}", req.data_dir.display(), req.target);
        match self.tool.restore(&args) {
            Ok(_) => {
                info!("Restore completed");
                Ok(())
            }
            Err(e) => {
                let code = match &e {
                    CommandError::Exit { .. } | CommandError::Signaled { .. } => classify_failure(e.output()),
                    _ => PITR_RESTORE_FAILED,
                };
                error!("Restore failed: {}", e);
                let message = if code == PITR_RESTORE_FAILED {
                    "pgBackRest restore failed"
                } else {
                    "no usable backup found for the requested target"
                };
                Err(PitrError::from_command(code, message, &e))
            }
        }
    }
}

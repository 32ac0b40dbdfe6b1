//! Role-gated operations: backups run on the primary only, promotion on a
//! replica only.

use crate::backrest::{BackupKind, BackupTool};
use crate::codes::{PB_BACKUP_FAILED, PB_NOT_PRIMARY, PB_PG_NOT_RUNNING, PG_ALREADY_PRIMARY, PG_NOT_RUNNING, PG_PROMOTE_FAILED};
use crate::errors::{PitrError, PitrResult};
use crate::postgres::PostgresControl;
use crate::role::{Role, RoleResult};
use tracing::{info, warn};

/// Refuse backups anywhere but a live primary. An undetermined role is
/// refused unless `force` is set.
pub fn check_backup_allowed(role: &RoleResult, force: bool) -> PitrResult<()> {
    match role.role {
        Role::Primary => Ok(()),
        Role::Replica => Err(PitrError::new(PB_NOT_PRIMARY, "backup must run on the primary")
            .with_detail("this instance is a replica")),
        Role::Unknown if !role.alive => Err(PitrError::new(PB_PG_NOT_RUNNING, "PostgreSQL is not running")),
        Role::Unknown if force => {
            warn!("Role could not be determined, continuing because of --force");
            Ok(())
        }
        Role::Unknown => Err(PitrError::new(PB_NOT_PRIMARY, "cannot determine instance role")
            .with_detail("use --force to back up anyway")),
    }
}

pub fn run_backup(tool: &dyn BackupTool, kind: BackupKind) -> PitrResult<()> {
    info!("Starting {} backup", kind.as_str());
    tool.backup(kind)
        .map(|_| ())
        .map_err(|e| PitrError::from_command(PB_BACKUP_FAILED, "pgBackRest backup failed", &e))
}

/// Only a running replica can be promoted
pub fn check_promote_allowed(role: &RoleResult) -> PitrResult<()> {
    if !role.alive {
        return Err(PitrError::new(PG_NOT_RUNNING, "PostgreSQL is not running"));
    }
    match role.role {
        Role::Primary => Err(PitrError::new(PG_ALREADY_PRIMARY, "instance is already primary")),
        Role::Replica | Role::Unknown => Ok(()),
    }
}

pub fn run_promote(pg: &dyn PostgresControl) -> PitrResult<()> {
    info!("Promoting PostgreSQL");
    pg.promote()
        .map_err(|e| PitrError::from_command(PG_PROMOTE_FAILED, "promote failed", &e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::RoleSource;

    fn role(role: Role, alive: bool) -> RoleResult {
        RoleResult { role, alive, source: RoleSource::Ps }
    }

    #[test]
    fn test_backup_gate() {
        assert!(check_backup_allowed(&role(Role::Primary, true), false).is_ok());
        assert_eq!(
            check_backup_allowed(&role(Role::Replica, true), true).unwrap_err().code,
            PB_NOT_PRIMARY
        );
        assert_eq!(
            check_backup_allowed(&role(Role::Unknown, false), true).unwrap_err().code,
            PB_PG_NOT_RUNNING
        );
        assert_eq!(
            check_backup_allowed(&role(Role::Unknown, true), false).unwrap_err().code,
            PB_NOT_PRIMARY
        );
        assert!(check_backup_allowed(&role(Role::Unknown, true), true).is_ok());
    }

    #[test]
    fn test_promote_gate() {
        assert!(check_promote_allowed(&role(Role::Replica, true)).is_ok());
        assert_eq!(
            check_promote_allowed(&role(Role::Primary, true)).unwrap_err().code,
            PG_ALREADY_PRIMARY
        );
        assert_eq!(
            check_promote_allowed(&role(Role::Replica, false)).unwrap_err().code,
            PG_NOT_RUNNING
        );
    }
}

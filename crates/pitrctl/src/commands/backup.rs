//! `pitrctl backup`

use super::App;
use crate::cli::ConnArgs;
use crate::output::emit;
use pitr_common::backrest::BackupKind;
use pitr_common::errors::PitrResult;
use pitr_common::gating::{check_backup_allowed, run_backup};
use pitr_common::host::Host;
use pitr_common::Outcome;

fn run(app: &App, kind: &str, force: bool, conn: &ConnArgs) -> PitrResult<BackupKind> {
    let kind: BackupKind = kind.parse()?;
    let host = Host::new(&app.config, &conn.overrides());
    let role = host.role_detector().verbose(app.verbose > 0).detect();
    check_backup_allowed(&role, force)?;
    run_backup(host.backrest()?, kind)?;
    Ok(kind)
}

pub fn backup(app: &App, kind: &str, force: bool, conn: &ConnArgs) -> i32 {
    let outcome = match run(app, kind, force, conn) {
        Ok(kind) => Outcome::ok(format!("{} backup completed", kind.as_str())),
        Err(e) => Outcome::from(e),
    };
    emit(&outcome, app.format);
    outcome.exit_code()
}

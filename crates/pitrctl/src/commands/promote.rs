//! `pitrctl promote`

use super::App;
use crate::cli::ConnArgs;
use crate::output::emit;
use pitr_common::errors::PitrResult;
use pitr_common::gating::{check_promote_allowed, run_promote};
use pitr_common::host::Host;
use pitr_common::Outcome;

fn run(app: &App, conn: &ConnArgs) -> PitrResult<()> {
    let host = Host::new(&app.config, &conn.overrides());
    let role = host.role_detector().verbose(app.verbose > 0).detect();
    check_promote_allowed(&role)?;
    run_promote(&host.pg)
}

pub fn promote(app: &App, conn: &ConnArgs) -> i32 {
    let outcome = match run(app, conn) {
        Ok(()) => Outcome::ok("PostgreSQL promoted"),
        Err(e) => Outcome::from(e),
    };
    emit(&outcome, app.format);
    outcome.exit_code()
}

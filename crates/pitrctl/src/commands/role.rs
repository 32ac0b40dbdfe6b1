//! `pitrctl role`

use super::App;
use crate::cli::ConnArgs;
use crate::output::emit;
use pitr_common::host::Host;
use pitr_common::{Outcome, OutputFormat};

pub fn role(app: &App, detail: bool, conn: &ConnArgs) -> i32 {
    let host = Host::new(&app.config, &conn.overrides());
    let result = host.role_detector().verbose(detail || app.verbose > 0).detect();

    if app.format == OutputFormat::Text {
        if detail {
            println!("role:   {}", result.role);
            println!("alive:  {}", result.alive);
            println!("source: {}", result.source.as_str());
        } else {
            println!("{}", result.role);
        }
        return 0;
    }

    emit(&Outcome::ok(format!("role: {}", result.role)).with_data(&result), app.format);
    0
}
